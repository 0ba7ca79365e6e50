//! Per-method attempt/success counters.
//!
//! Lifetime counters for one retriever instance: no decay, no windowing,
//! never decremented.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// The four counted retrieval methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    DirectFetch,
    LightEngine,
    FullEngine,
    Pdf,
}

#[derive(Debug, Default)]
struct Counter {
    attempts: AtomicU64,
    successes: AtomicU64,
}

impl Counter {
    fn snapshot(&self) -> MethodStats {
        MethodStats::new(
            self.attempts.load(Ordering::Relaxed),
            self.successes.load(Ordering::Relaxed),
        )
    }
}

/// Thread-safe accumulator shared by concurrent retrievals.
#[derive(Debug, Default)]
pub struct StatsTracker {
    direct_fetch: Counter,
    light_engine: Counter,
    full_engine: Counter,
    pdf: Counter,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, stage: Stage) -> &Counter {
        match stage {
            Stage::DirectFetch => &self.direct_fetch,
            Stage::LightEngine => &self.light_engine,
            Stage::FullEngine => &self.full_engine,
            Stage::Pdf => &self.pdf,
        }
    }

    pub fn record_attempt(&self, stage: Stage) {
        self.counter(stage).attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, stage: Stage) {
        self.counter(stage).successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, stage: Stage) -> MethodStats {
        self.counter(stage).snapshot()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            direct_fetch: self.direct_fetch.snapshot(),
            light_engine: self.light_engine.snapshot(),
            full_engine: self.full_engine.snapshot(),
            pdf: self.pdf.snapshot(),
        }
    }
}

/// Counters for one method plus the derived success rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodStats {
    pub attempts: u64,
    pub successes: u64,
    /// `successes / attempts` as a percentage with one decimal, `"0%"` when idle.
    pub rate: String,
}

impl MethodStats {
    pub fn new(attempts: u64, successes: u64) -> Self {
        Self {
            attempts,
            successes,
            rate: success_rate(attempts, successes),
        }
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub direct_fetch: MethodStats,
    pub light_engine: MethodStats,
    pub full_engine: MethodStats,
    pub pdf: MethodStats,
}

/// Format a success rate, e.g. `"33.3%"`.
pub fn success_rate(attempts: u64, successes: u64) -> String {
    if attempts == 0 {
        return "0%".to_string();
    }
    format!("{:.1}%", successes as f64 / attempts as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_formats_one_decimal() {
        assert_eq!(success_rate(3, 1), "33.3%");
        assert_eq!(success_rate(2, 2), "100.0%");
        assert_eq!(success_rate(3, 2), "66.7%");
        assert_eq!(success_rate(0, 0), "0%");
    }

    #[test]
    fn counters_are_independent() {
        let stats = StatsTracker::new();
        for _ in 0..3 {
            stats.record_attempt(Stage::LightEngine);
        }
        stats.record_success(Stage::LightEngine);
        stats.record_attempt(Stage::Pdf);

        let snap = stats.snapshot();
        assert_eq!(snap.light_engine.attempts, 3);
        assert_eq!(snap.light_engine.successes, 1);
        assert_eq!(snap.light_engine.rate, "33.3%");
        assert_eq!(snap.pdf, MethodStats::new(1, 0));
        assert_eq!(snap.direct_fetch.rate, "0%");
        assert_eq!(snap.full_engine.attempts, 0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(StatsTracker::new().snapshot()).unwrap();
        assert_eq!(json["directFetch"]["rate"], "0%");
        assert_eq!(json["fullEngine"]["attempts"], 0);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = std::sync::Arc::new(StatsTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = std::sync::Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_attempt(Stage::DirectFetch);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.get(Stage::DirectFetch).attempts, 800);
    }
}
