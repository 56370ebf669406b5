use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::storage::OutputLayout;

/// One serialized record, path relative to the output root.
#[derive(Debug)]
pub struct WriteJob {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    pub failed: usize,
}

/// Receives serialized records from harvest workers and writes them to disk.
/// Runs as a dedicated task so workers only wait on the network; finishes when
/// every sender is dropped and reports what it wrote.
pub struct RecordWriter {
    layout: OutputLayout,
    rx: mpsc::Receiver<WriteJob>,
}

impl RecordWriter {
    pub fn new(layout: OutputLayout, rx: mpsc::Receiver<WriteJob>) -> Self {
        Self { layout, rx }
    }

    pub async fn run(mut self) -> WriteReport {
        let mut report = WriteReport::default();
        while let Some(job) = self.rx.recv().await {
            match self.layout.write_bytes(&job.path, &job.contents).await {
                Ok(()) => {
                    debug!("Wrote {}", job.path.display());
                    report.written += 1;
                }
                Err(e) => {
                    error!("Record write error for {}: {e}", job.path.display());
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_until_senders_drop() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where a directory is needed makes that one write fail.
        std::fs::write(dir.path().join("blocked"), b"").unwrap();

        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(RecordWriter::new(OutputLayout::new(dir.path()), rx).run());

        tx.send(WriteJob { path: "players/1_A/1_a.json".into(), contents: b"{}".to_vec() })
            .await
            .unwrap();
        tx.send(WriteJob { path: "blocked/2_b.json".into(), contents: b"{}".to_vec() })
            .await
            .unwrap();
        drop(tx);

        let report = handle.await.unwrap();
        assert_eq!(report, WriteReport { written: 1, failed: 1 });
        assert_eq!(std::fs::read(dir.path().join("players/1_A/1_a.json")).unwrap(), b"{}");
    }
}
