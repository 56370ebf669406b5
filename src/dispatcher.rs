use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::config::CHANNEL_CAPACITY;
use crate::error::{AppError, Result};
use crate::history::{HistoryBaseline, HistoryPoint};
use crate::report::Reporter;
use crate::state::TeamStore;
use crate::storage::writer::{RecordWriter, WriteJob};
use crate::storage::{to_pretty_json, OutputLayout};
use crate::types::{EntityId, HarvestOutcome, OutcomeKind, RunSummary, TeamKey};

// ---------------------------------------------------------------------------
// HarvestTarget: what varies between catalog and roster mode
// ---------------------------------------------------------------------------

/// Result of one entity fetch: the classified outcome plus, in catalog mode, the
/// freshly fetched history fragment.
#[derive(Debug)]
pub struct Fetched<R> {
    pub outcome: HarvestOutcome<R>,
    pub history: Option<Vec<HistoryPoint>>,
}

impl<R> Fetched<R> {
    pub fn outcome(outcome: HarvestOutcome<R>) -> Self {
        Self { outcome, history: None }
    }
}

/// Where a stored record goes: its aggregation bucket, the summary appended to
/// that bucket, and its own file (relative to the output root).
#[derive(Debug)]
pub struct Placement<S> {
    pub bucket: TeamKey,
    pub summary: S,
    pub record_path: PathBuf,
}

/// The engine is parameterized by endpoint template, auth context (carried by
/// the `ApiClient`) and record shape. The ID source is whatever the caller
/// passes to [`Harvester::run`].
///
/// `fetch` must not touch shared state; it runs on many workers at once.
pub trait HarvestTarget: Send + Sync + 'static {
    type Record: Serialize + Send + Sync + 'static;
    type Summary: Serialize + Send + Sync + 'static;

    fn fetch(
        &self,
        client: &ApiClient,
        id: EntityId,
    ) -> impl Future<Output = Fetched<Self::Record>> + Send;

    fn place(&self, record: &Self::Record) -> Placement<Self::Summary>;

    fn bucket_path(&self, key: &TeamKey) -> PathBuf;

    /// Plural noun for progress and log lines.
    fn label(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Cooperative stop signal. Once requested no new IDs are submitted; in-flight
/// fetches finish (or time out) and the run proceeds to drain and flush.
#[derive(Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub fn channel() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown(rx))
    }

    /// A signal that never fires.
    #[cfg(test)]
    pub fn never() -> Shutdown {
        Self::channel().1
    }

    pub fn is_requested(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop is requested. Pending forever if the sender is gone
    /// without having requested one.
    pub async fn requested(&mut self) {
        if self.0.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Bounded worker pool over an ID list.
///
/// Each ID is submitted exactly once. Submission waits on a semaphore permit,
/// so at most `concurrency` workers exist at any moment; each worker holds its
/// permit until its last request completes. Workers append to a shared
/// [`TeamStore`] and hand stored records to the writer task. History fragments
/// come back through the join handles and are merged here, on one task, after
/// the pool has drained.
pub struct Harvester<T: HarvestTarget> {
    target: Arc<T>,
    client: Arc<ApiClient>,
    layout: OutputLayout,
    reporter: Arc<Reporter>,
    concurrency: usize,
    shutdown: Shutdown,
}

impl<T: HarvestTarget> Harvester<T> {
    pub fn new(
        target: T,
        client: Arc<ApiClient>,
        layout: OutputLayout,
        reporter: Arc<Reporter>,
        concurrency: usize,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            target: Arc::new(target),
            client,
            layout,
            reporter,
            concurrency: concurrency.max(1),
            shutdown,
        }
    }

    /// Harvest `ids`. When `history` is given, fresh fragments are merged into it
    /// and it is written back once every worker has finished.
    pub async fn run(
        &self,
        ids: Vec<EntityId>,
        mut history: Option<HistoryBaseline>,
    ) -> Result<RunSummary> {
        let total = ids.len();
        let mut summary = RunSummary::default();

        let store = Arc::new(TeamStore::<T::Summary>::new());
        let (record_tx, record_rx) = mpsc::channel::<WriteJob>(CHANNEL_CAPACITY);
        let writer = RecordWriter::new(self.layout.clone(), record_rx);
        let writer_handle = tokio::spawn(async move { writer.run().await });

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut shutdown = self.shutdown.clone();
        let mut workers = JoinSet::new();

        self.reporter.begin(self.target.label(), total);

        for (idx, id) in ids.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = shutdown.requested() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                summary.not_dispatched = total - idx;
                warn!("Stop requested: {} {} not dispatched", summary.not_dispatched, self.target.label());
                break;
            };

            let target = Arc::clone(&self.target);
            let client = Arc::clone(&self.client);
            let store = Arc::clone(&store);
            let reporter = Arc::clone(&self.reporter);
            let record_tx = record_tx.clone();

            workers.spawn(async move {
                let _permit = permit;
                let fetched = target.fetch(&client, id).await;
                let kind = fetched.outcome.kind();

                if let HarvestOutcome::Stored(record) = &fetched.outcome {
                    let placement = target.place(record);
                    store.append(placement.bucket, placement.summary);
                    match to_pretty_json(record) {
                        Ok(contents) => {
                            let job = WriteJob { path: placement.record_path, contents };
                            if record_tx.send(job).await.is_err() {
                                error!(entity_id = %id, "Record writer stopped; record not persisted");
                            }
                        }
                        Err(e) => error!(entity_id = %id, "Record serialization failed: {e}"),
                    }
                }
                reporter.outcome(id, &fetched.outcome);

                (id, kind, fetched.history)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((id, kind, fragment)) => {
                    summary.record(kind);
                    if let (Some(baseline), Some(points), OutcomeKind::Stored) =
                        (history.as_mut(), fragment, kind)
                    {
                        let added = baseline.merge_entity(id, points);
                        summary.history_points_added += added;
                        if let Some((date, value)) = baseline.series(id).and_then(|s| s.latest()) {
                            debug!(entity_id = %id, added, %date, value, "History merged");
                        }
                    }
                }
                Err(e) => {
                    error!("Worker task failed: {e}");
                    summary.failed += 1;
                }
            }
        }
        self.reporter.finish();

        drop(record_tx);
        let written = writer_handle
            .await
            .map_err(|e| AppError::Internal(format!("record writer task failed: {e}")))?;
        summary.records_written = written.written;
        summary.record_write_failures = written.failed;

        let store = Arc::try_unwrap(store)
            .map_err(|_| AppError::Internal("team store still shared after join".to_string()))?;
        for (team, members) in store.drain() {
            let path = self.target.bucket_path(&team);
            info!("Writing {} {} to {}", members.len(), self.target.label(), path.display());
            match self.layout.write_json(&path, &members).await {
                Ok(()) => summary.teams_written += 1,
                Err(e) => error!(team = %team, "Team file write failed: {e}"),
            }
        }

        if let Some(baseline) = &history {
            self.layout.write_history(baseline).await?;
            info!(
                entities = baseline.entity_count(),
                points = baseline.point_count(),
                added = summary.history_points_added,
                "History baseline written"
            );
        }

        summary.peak_in_flight = self.client.in_flight().peak();
        summary.latency = self.client.latency().snapshot();
        Ok(summary)
    }
}
