//! Request latency, kept per call stage so a slow history endpoint does not hide
//! behind fast profile lookups. Every call through `ApiClient` is recorded,
//! whatever its status, including timeouts.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;

const MAX_TRACKED_MS: u64 = 600_000;
const STAGE_COUNT: usize = 4;

/// Which request a latency sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    /// Stage 1: `/player/{id}`.
    Profile,
    /// Stage 2: `/player/{id}/market-value`.
    History,
    /// `/leagues/{league}/teams/{team}`.
    Roster,
    /// Listings a run depends on (leagues, market, ranking).
    Bootstrap,
}

impl CallStage {
    pub const ALL: [CallStage; STAGE_COUNT] =
        [CallStage::Profile, CallStage::History, CallStage::Roster, CallStage::Bootstrap];

    pub fn as_str(self) -> &'static str {
        match self {
            CallStage::Profile => "profile",
            CallStage::History => "history",
            CallStage::Roster => "roster",
            CallStage::Bootstrap => "bootstrap",
        }
    }
}

impl std::fmt::Display for CallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentiles of one stage, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLatency {
    pub stage: CallStage,
    pub calls: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

/// One histogram per [`CallStage`], 1ms to 10min at 3 significant figures.
/// Workers record, the dispatcher snapshots at the end of a run.
pub struct LatencyStats {
    stages: [Mutex<Histogram<u64>>; STAGE_COUNT],
}

impl LatencyStats {
    pub fn new() -> Self {
        Self { stages: std::array::from_fn(|_| Mutex::new(stage_histogram())) }
    }

    /// Sub-millisecond calls count as 1ms; anything past the ceiling is clamped.
    pub fn record(&self, stage: CallStage, d: Duration) {
        let ms = (d.as_millis().min(MAX_TRACKED_MS as u128) as u64).max(1);
        if let Ok(mut h) = self.stages[stage as usize].lock() {
            let _ = h.record(ms);
        }
    }

    /// Stages that saw at least one call, in [`CallStage::ALL`] order.
    pub fn snapshot(&self) -> Vec<StageLatency> {
        CallStage::ALL
            .into_iter()
            .filter_map(|stage| {
                let h = self.stages[stage as usize].lock().ok()?;
                (h.len() > 0).then(|| StageLatency {
                    stage,
                    calls: h.len(),
                    p50_ms: h.value_at_quantile(0.5),
                    p95_ms: h.value_at_quantile(0.95),
                    p99_ms: h.value_at_quantile(0.99),
                    max_ms: h.max(),
                })
            })
            .collect()
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

fn stage_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, MAX_TRACKED_MS, 3).expect("constant histogram bounds are valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_stages_are_left_out() {
        assert!(LatencyStats::new().snapshot().is_empty());

        let stats = LatencyStats::new();
        stats.record(CallStage::History, Duration::from_millis(5));
        let snap = stats.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].stage, CallStage::History);
    }

    #[test]
    fn stages_are_tracked_separately() {
        let stats = LatencyStats::new();
        stats.record(CallStage::Profile, Duration::from_micros(200));
        stats.record(CallStage::Profile, Duration::from_millis(40));
        stats.record(CallStage::Bootstrap, Duration::from_secs(3));

        let snap = stats.snapshot();
        let profile = snap.iter().find(|s| s.stage == CallStage::Profile).unwrap();
        assert_eq!(profile.calls, 2);
        assert_eq!(profile.p50_ms, 1);
        assert!(profile.max_ms >= 40 && profile.max_ms < 3_000);

        let bootstrap = snap.iter().find(|s| s.stage == CallStage::Bootstrap).unwrap();
        assert_eq!(bootstrap.calls, 1);
        assert!(bootstrap.p50_ms >= 2_990);
    }

    #[test]
    fn ceiling_is_clamped() {
        let stats = LatencyStats::new();
        stats.record(CallStage::Roster, Duration::from_secs(3_600));
        let snap = stats.snapshot();
        assert_eq!(snap[0].calls, 1);
        assert!(snap[0].max_ms <= MAX_TRACKED_MS + MAX_TRACKED_MS / 100);
    }
}
