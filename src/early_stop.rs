//! # Early stopping
//!
//! The [`EarlyStopMonitor`] tracks, independently per objective, how many
//! individuals and how much wall-clock time have passed since the objective
//! last improved beyond its tolerance. The run stops early only when *every*
//! participating objective has stalled past the configured patience — a
//! single still-improving objective keeps the run alive.
//!
//! Objectives whose tolerance is `None` do not participate in early
//! stopping at all: they neither trigger it nor hold it open.

use std::time::Instant;

use tracing::debug;

use crate::selection::dominance::WeightedRow;

/// Per-objective stall tracking with AND-semantics firing.
#[derive(Debug, Clone)]
pub struct EarlyStopMonitor {
    tolerances: Vec<Option<f64>>,
    patience_count: Option<u64>,
    patience_secs: Option<f64>,
    best_seen: Vec<Option<f64>>,
    since_improvement: Vec<u64>,
    last_improvement: Vec<Instant>,
}

impl EarlyStopMonitor {
    /// Creates a monitor.
    ///
    /// # Arguments
    ///
    /// * `tolerances` - One entry per objective, in weighted (maximize)
    ///   space. `None` excludes the objective from early stopping.
    /// * `patience_count` - Number of consecutive non-improving evaluations
    ///   after which an objective counts as stalled, or `None` to disable
    ///   count-based stopping.
    /// * `patience_mins` - Minutes without improvement after which an
    ///   objective counts as stalled, or `None` to disable time-based
    ///   stopping.
    pub fn new(
        tolerances: Vec<Option<f64>>,
        patience_count: Option<u64>,
        patience_mins: Option<f64>,
    ) -> Self {
        let n = tolerances.len();
        let now = Instant::now();
        Self {
            tolerances,
            patience_count,
            patience_secs: patience_mins.map(|m| m * 60.0),
            best_seen: vec![None; n],
            since_improvement: vec![0; n],
            last_improvement: vec![now; n],
        }
    }

    /// Absorbs one newly evaluated individual's weighted score row.
    ///
    /// A failed row (`None`) counts as non-improving on every objective. For
    /// each objective, an improvement beyond its tolerance resets that
    /// objective's counters only; the first valid score an objective ever
    /// sees always counts as an improvement.
    pub fn observe(&mut self, row: &WeightedRow) {
        for i in 0..self.tolerances.len() {
            let score = row.as_ref().map(|r| r[i]);
            let improved = match (score, self.best_seen[i], self.tolerances[i]) {
                (Some(_), _, None) => false,
                (Some(s), Some(best), Some(tol)) => s - best > tol,
                (Some(_), None, Some(_)) => true,
                (None, _, _) => false,
            };

            if improved {
                debug!(
                    objective = i,
                    score = score.unwrap(),
                    "objective improved beyond tolerance"
                );
                self.best_seen[i] = score;
                self.since_improvement[i] = 0;
                self.last_improvement[i] = Instant::now();
            } else {
                self.since_improvement[i] += 1;
            }
        }
    }

    /// Whether every participating objective has stalled past the configured
    /// patience. Returns `false` when no patience is configured or no
    /// objective participates.
    pub fn should_stop(&self) -> bool {
        if self.patience_count.is_none() && self.patience_secs.is_none() {
            return false;
        }

        let mut participating = false;
        for i in 0..self.tolerances.len() {
            if self.tolerances[i].is_none() {
                continue;
            }
            participating = true;
            if !self.is_stalled(i) {
                return false;
            }
        }
        participating
    }

    fn is_stalled(&self, i: usize) -> bool {
        let count_stalled = self
            .patience_count
            .map(|patience| self.since_improvement[i] >= patience)
            .unwrap_or(false);
        let time_stalled = self
            .patience_secs
            .map(|patience| self.last_improvement[i].elapsed().as_secs_f64() >= patience)
            .unwrap_or(false);
        count_stalled || time_stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(scores: &[f64]) -> WeightedRow {
        Some(scores.to_vec())
    }

    #[test]
    fn test_fires_after_patience_non_improving_evaluations() {
        let mut monitor = EarlyStopMonitor::new(vec![Some(0.0)], Some(3), None);

        // 0.1 and 0.2 improve; the three following 0.2s do not (tolerance
        // 0.0 requires a strict improvement).
        for score in [0.1, 0.2, 0.2, 0.2] {
            monitor.observe(&row(&[score]));
            assert!(!monitor.should_stop());
        }
        monitor.observe(&row(&[0.2]));
        assert!(monitor.should_stop());
    }

    #[test]
    fn test_improvement_resets_only_its_own_counter() {
        let mut monitor = EarlyStopMonitor::new(vec![Some(0.0), Some(0.0)], Some(2), None);

        monitor.observe(&row(&[1.0, 1.0]));
        // Objective 0 keeps improving, objective 1 stalls.
        monitor.observe(&row(&[2.0, 1.0]));
        monitor.observe(&row(&[3.0, 1.0]));
        monitor.observe(&row(&[4.0, 1.0]));

        // Objective 1 is stalled (3 >= 2) but objective 0 is not, so the
        // conjunction does not fire.
        assert!(!monitor.should_stop());

        // Now objective 0 stalls too.
        monitor.observe(&row(&[4.0, 1.0]));
        monitor.observe(&row(&[4.0, 1.0]));
        assert!(monitor.should_stop());
    }

    #[test]
    fn test_none_tolerance_is_excluded_from_the_conjunction() {
        let mut monitor = EarlyStopMonitor::new(vec![Some(0.0), None], Some(1), None);

        monitor.observe(&row(&[1.0, 1.0]));
        monitor.observe(&row(&[1.0, 5.0]));
        // Objective 1 is "improving" wildly but has no tolerance, so only
        // objective 0 is consulted.
        assert!(monitor.should_stop());
    }

    #[test]
    fn test_all_none_tolerances_never_fire() {
        let mut monitor = EarlyStopMonitor::new(vec![None, None], Some(1), None);
        for _ in 0..10 {
            monitor.observe(&row(&[0.0, 0.0]));
        }
        assert!(!monitor.should_stop());
    }

    #[test]
    fn test_no_patience_configured_never_fires() {
        let mut monitor = EarlyStopMonitor::new(vec![Some(0.0)], None, None);
        for _ in 0..10 {
            monitor.observe(&row(&[0.0]));
        }
        assert!(!monitor.should_stop());
    }

    #[test]
    fn test_failed_rows_count_as_non_improving() {
        let mut monitor = EarlyStopMonitor::new(vec![Some(0.0)], Some(2), None);

        monitor.observe(&row(&[1.0]));
        monitor.observe(&None);
        monitor.observe(&None);
        assert!(monitor.should_stop());
    }

    #[test]
    fn test_time_patience_fires_after_quiet_period() {
        let mut monitor = EarlyStopMonitor::new(vec![Some(0.0)], None, Some(0.0));

        monitor.observe(&row(&[1.0]));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(monitor.should_stop());
    }
}
