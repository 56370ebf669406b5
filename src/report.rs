use std::io::Write;
use std::sync::Mutex;

use crossterm::{cursor, queue, style, terminal};
use tracing::{info, warn};

use crate::types::{EntityId, HarvestOutcome, RunSummary};

const BAR_WIDTH: usize = 70;

/// How progress reaches the operator. The log file is written in both modes;
/// `Log` also streams it to the console, `Progress` draws a bar instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Log,
    Progress,
}

#[derive(Debug, Default)]
struct Progress {
    label: &'static str,
    done: usize,
    total: usize,
}

/// Receives one event per terminal outcome from the workers.
pub struct Reporter {
    mode: ReportMode,
    progress: Mutex<Progress>,
}

impl Reporter {
    pub fn new(mode: ReportMode) -> Self {
        Self { mode, progress: Mutex::new(Progress::default()) }
    }

    pub fn begin(&self, label: &'static str, total: usize) {
        info!("Harvesting {total} {label}");
        if let Ok(mut p) = self.progress.lock() {
            *p = Progress { label, done: 0, total };
            self.draw(&p);
        }
    }

    pub fn outcome<R>(&self, id: EntityId, outcome: &HarvestOutcome<R>) {
        match outcome {
            HarvestOutcome::Stored(_) => info!(entity_id = %id, "{id} stored"),
            HarvestOutcome::SkippedOutOfScope => {
                info!(entity_id = %id, outcome = "skipped", "{id} [OUT OF LEAGUE]")
            }
            HarvestOutcome::NotFound => {
                info!(entity_id = %id, outcome = "not_found", "{id} [NOT FOUND]")
            }
            HarvestOutcome::MissingTeamAssociation(reason) => warn!(
                entity_id = %id,
                outcome = "missing_association",
                %reason,
                "{id} [NO TEAM] {reason}"
            ),
            HarvestOutcome::TransientFailure(cause) => warn!(
                entity_id = %id,
                outcome = "failed",
                %cause,
                "{id} [FAILED] {cause}"
            ),
        }

        if let Ok(mut p) = self.progress.lock() {
            p.done += 1;
            self.draw(&p);
        }
    }

    /// Ends the progress line.
    pub fn finish(&self) {
        if self.mode == ReportMode::Progress {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err);
        }
    }

    pub fn summary(&self, s: &RunSummary) {
        info!(
            classified = s.classified(),
            stored = s.stored,
            skipped = s.skipped,
            not_found = s.not_found,
            missing_association = s.missing_association,
            failed = s.failed,
            not_dispatched = s.not_dispatched,
            "Run complete | {} classified | stored: {} | skipped: {} | not found: {} | missing team: {} | failed: {} | not dispatched: {}",
            s.classified(), s.stored, s.skipped, s.not_found, s.missing_association, s.failed, s.not_dispatched,
        );
        if s.leagues_unvisited > 0 {
            warn!(leagues_unvisited = s.leagues_unvisited, "{} leagues never visited", s.leagues_unvisited);
        }
        info!(
            "Output | records: {} written, {} failed | team files: {} | history days added: {} | peak in flight: {}",
            s.records_written,
            s.record_write_failures,
            s.teams_written,
            s.history_points_added,
            s.peak_in_flight,
        );
        for l in &s.latency {
            info!(
                stage = %l.stage,
                calls = l.calls,
                "Latency {} | {} calls | p50/p95/p99/max: {}/{}/{}/{}ms",
                l.stage, l.calls, l.p50_ms, l.p95_ms, l.p99_ms, l.max_ms
            );
        }
        if self.mode == ReportMode::Progress {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(
                err,
                "stored {} | skipped {} | not found {} | missing team {} | failed {}",
                s.stored, s.skipped, s.not_found, s.missing_association, s.failed
            );
        }
    }

    fn draw(&self, p: &Progress) {
        if self.mode != ReportMode::Progress {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = queue!(
            err,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::CurrentLine),
            style::Print(render_bar(p.done, p.total, BAR_WIDTH, p.label)),
        );
        let _ = err.flush();
    }
}

/// `Progress: |████----| 50.0% players harvested`
pub fn render_bar(done: usize, total: usize, width: usize, label: &str) -> String {
    let fraction = if total == 0 { 1.0 } else { (done.min(total)) as f64 / total as f64 };
    let filled = ((width as f64) * fraction) as usize;
    format!(
        "Progress: |{}{}| {:.1}% {label} harvested",
        "█".repeat(filled),
        "-".repeat(width - filled),
        fraction * 100.0,
    )
}
