use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::models::MetricsSnapshot;

/// Thread-safe operation counters of the engine
///
/// Every counter is updated with relaxed atomics, so recording never blocks a
/// request and a snapshot may interleave with concurrent updates.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Number of completed training runs.
    pub training_runs: AtomicU64,

    /// Wall time of the most recent training run, in microseconds.
    pub last_training_micros: AtomicU64,

    /// Wall time summed over all training runs, in microseconds.
    pub total_training_micros: AtomicU64,

    /// Number of recommendation lists served.
    pub recommendations_served: AtomicU64,

    /// Latency summed over all served lists, in microseconds.
    pub total_recommendation_micros: AtomicU64,

    /// Number of interactions appended through the engine.
    pub interactions_logged: AtomicU64,
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn training_completed(&self, elapsed: Duration) {
        let us = micros(elapsed);
        self.training_runs.fetch_add(1, Ordering::Relaxed);
        self.last_training_micros.store(us, Ordering::Relaxed);
        self.total_training_micros.fetch_add(us, Ordering::Relaxed);
    }

    pub fn recommendation_served(&self, elapsed: Duration) {
        self.recommendations_served.fetch_add(1, Ordering::Relaxed);
        self.total_recommendation_micros
            .fetch_add(micros(elapsed), Ordering::Relaxed);
    }

    pub fn interaction_logged(&self) {
        self.interactions_logged.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter; `avg_engagement_score` comes from the caller
    pub fn snapshot(&self, avg_engagement_score: Option<f64>) -> MetricsSnapshot {
        let runs = self.training_runs.load(Ordering::Relaxed);
        let served = self.recommendations_served.load(Ordering::Relaxed);
        let last_training = self.last_training_micros.load(Ordering::Relaxed);
        let total_latency = self.total_recommendation_micros.load(Ordering::Relaxed);

        MetricsSnapshot {
            training_runs: runs,
            last_training_ms: (runs > 0).then(|| last_training as f64 / 1000.0),
            total_training_ms: self.total_training_micros.load(Ordering::Relaxed) as f64 / 1000.0,
            recommendations_served: served,
            mean_recommendation_ms: (served > 0)
                .then(|| total_latency as f64 / served as f64 / 1000.0),
            interactions_logged: self.interactions_logged.load(Ordering::Relaxed),
            avg_engagement_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_metrics_have_no_timings() {
        let snapshot = EngineMetrics::new().snapshot(None);
        assert_eq!(snapshot.training_runs, 0);
        assert_eq!(snapshot.last_training_ms, None);
        assert_eq!(snapshot.mean_recommendation_ms, None);
        assert_eq!(snapshot.interactions_logged, 0);
    }

    #[test]
    fn test_training_keeps_last_and_total() {
        let metrics = EngineMetrics::new();
        metrics.training_completed(Duration::from_millis(30));
        metrics.training_completed(Duration::from_millis(10));

        let snapshot = metrics.snapshot(Some(0.5));
        assert_eq!(snapshot.training_runs, 2);
        assert_eq!(snapshot.last_training_ms, Some(10.0));
        assert_eq!(snapshot.total_training_ms, 40.0);
        assert_eq!(snapshot.avg_engagement_score, Some(0.5));
    }

    #[test]
    fn test_recommendation_latency_is_averaged() {
        let metrics = EngineMetrics::new();
        metrics.recommendation_served(Duration::from_micros(1000));
        metrics.recommendation_served(Duration::from_micros(3000));
        metrics.interaction_logged();

        let snapshot = metrics.snapshot(None);
        assert_eq!(snapshot.recommendations_served, 2);
        assert_eq!(snapshot.mean_recommendation_ms, Some(2.0));
        assert_eq!(snapshot.interactions_logged, 1);
    }
}
