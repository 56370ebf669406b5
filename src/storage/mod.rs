pub mod writer;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::layout::{DATA_DIR, HISTORY_FILE, LEAGUES_DIR, PLAYERS_DIR};
use crate::error::{AppError, Result};
use crate::history::HistoryBaseline;

/// Output tree rooted at the configured directory. All paths handed to it are
/// relative to that root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    pub fn history_path(&self) -> PathBuf {
        PathBuf::from(DATA_DIR).join(HISTORY_FILE)
    }

    /// Catalog run setup: read the history baseline, wipe `data/` and `players/`,
    /// recreate them and put the baseline straight back so an interrupted run
    /// never loses it.
    pub async fn prepare_catalog(&self) -> Result<HistoryBaseline> {
        let baseline = self.load_history().await?;
        info!(
            entities = baseline.entity_count(),
            points = baseline.point_count(),
            "Loaded history baseline"
        );
        self.reset_dirs(&[DATA_DIR, PLAYERS_DIR]).await?;
        self.write_history(&baseline).await?;
        Ok(baseline)
    }

    /// Roster run setup: wipe and recreate `leagues/`.
    pub async fn prepare_roster(&self) -> Result<()> {
        self.reset_dirs(&[LEAGUES_DIR]).await
    }

    /// Missing file means an empty baseline. A file that exists but can't be
    /// parsed is fatal: overwriting it would destroy the recorded history.
    pub async fn load_history(&self) -> Result<HistoryBaseline> {
        let path = self.resolve(&self.history_path());
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::Bootstrap(format!("history baseline {} is unreadable: {e}", path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HistoryBaseline::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Written to a sibling temp file and renamed over the old one.
    pub async fn write_history(&self, baseline: &HistoryBaseline) -> Result<()> {
        let path = self.resolve(&self.history_path());
        let tmp = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }
        tokio::fs::write(&tmp, to_pretty_json(baseline)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn write_bytes(&self, rel: &Path, contents: &[u8]) -> std::io::Result<()> {
        let path = self.resolve(rel);
        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }
        tokio::fs::write(path, contents).await
    }

    pub async fn write_json<T: Serialize + ?Sized>(&self, rel: &Path, value: &T) -> Result<()> {
        let contents = to_pretty_json(value)?;
        self.write_bytes(rel, &contents).await?;
        Ok(())
    }

    async fn reset_dirs(&self, dirs: &[&str]) -> Result<()> {
        for dir in dirs {
            let path = self.root.join(dir);
            info!("Removing previous output {}", path.display());
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(AppError::Bootstrap(format!(
                        "cannot remove {}: {e}",
                        path.display()
                    )))
                }
            }
            ensure_dir(&path).await.map_err(|e| {
                AppError::Bootstrap(format!("cannot create {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }
}

/// Create a directory tree; a tree that already exists (possibly created by a
/// concurrent caller) is success.
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Pretty JSON with 4-space indentation.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryPoint;
    use crate::types::EntityId;

    #[tokio::test]
    async fn prepare_catalog_keeps_baseline_and_clears_output() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());

        let mut baseline = HistoryBaseline::new();
        baseline.merge_entity(
            EntityId(53),
            [HistoryPoint { date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), value: 100 }],
        );
        layout.write_history(&baseline).await.unwrap();
        layout
            .write_json(Path::new("players/3_FCB/53_pedri.json"), &serde_json::json!({"id": 53}))
            .await
            .unwrap();
        layout.write_json(Path::new("data/3_FCB.json"), &[1, 2]).await.unwrap();

        let loaded = layout.prepare_catalog().await.unwrap();

        assert_eq!(loaded, baseline);
        assert!(!dir.path().join("players/3_FCB").exists());
        assert!(!dir.path().join("data/3_FCB.json").exists());
        assert!(dir.path().join("players").is_dir());
        assert_eq!(layout.load_history().await.unwrap(), baseline);
    }

    #[tokio::test]
    async fn corrupt_baseline_is_fatal_and_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        layout.write_bytes(&layout.history_path(), b"{not json").await.unwrap();

        let err = layout.prepare_catalog().await.unwrap_err();
        assert!(matches!(err, AppError::Bootstrap(_)));
        assert!(dir.path().join("data/market_value_history.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_directory_creation_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("players/7_RMA");
        let mut handles = Vec::new();
        for _ in 0..16 {
            let target = target.clone();
            handles.push(tokio::spawn(async move { ensure_dir(&target).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(target.is_dir());
    }

    #[test]
    fn pretty_json_uses_four_spaces() {
        let out = to_pretty_json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\n    \"a\": 1\n}");
    }
}
