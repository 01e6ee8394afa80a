//! # Population store
//!
//! The [`PopulationStore`] is the authoritative, append-only table of every
//! individual the run has evaluated: scores, lineage (parents and the
//! variation operator that produced them), generation, budget, pareto rank,
//! and wall-clock timestamps. It is owned and mutated exclusively by the
//! evolver's control loop; every other component sees read-only views.
//!
//! Pareto bookkeeping is incremental during the run (the rank-0 frontier is
//! kept exact on every insert) and exhaustive at termination
//! ([`PopulationStore::assign_fronts`] performs a full non-dominated sort).

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{EvolveError, Result};
use crate::objective::ObjectiveValue;
use crate::selection::dominance::{row_dominates, weighted_rows, WeightedRow};
use crate::selection::fast_non_dominated_sort;
use crate::variation::VariationOperator;

/// Identifier of one row in the population store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    /// The row index behind this id.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One row of the population store: an evaluated individual with its scores
/// and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord<I> {
    /// Row id; stable for the lifetime of the run (and across warm starts).
    pub id: RecordId,
    /// The evaluated individual. Immutable once recorded.
    pub individual: I,
    /// One cell per objective; failure markers are retained for audit.
    pub scores: Vec<ObjectiveValue>,
    /// Record ids of the parents, empty for generated individuals.
    pub parents: Vec<RecordId>,
    /// The variation operator that produced this individual, if any.
    pub variation: Option<VariationOperator>,
    /// Lineage depth: 0 for the initial population, one more than the
    /// deepest parent otherwise.
    pub generation: u64,
    /// Non-dominated front index. `Some(0)` marks the exact frontier; deeper
    /// ranks are only assigned by the full sort at termination.
    pub pareto_front: Option<usize>,
    /// The budget stamped at creation time, if a budget schedule is active.
    pub budget: Option<f64>,
    /// Wall-clock time at which the evaluation started.
    pub started_at: SystemTime,
    /// Wall-clock time at which the evaluation finished (or was given up on).
    pub finished_at: SystemTime,
    /// Captured diagnostic for `Invalid` rows.
    pub error: Option<String>,
}

impl<I> ScoreRecord<I> {
    /// Whether any score cell is a failure marker.
    pub fn is_failure(&self) -> bool {
        self.scores.iter().any(|s| s.is_failure())
    }

    /// The weighted (maximize-everything) score row, `None` for failures.
    pub fn weighted_row(&self, weights: &[f64]) -> WeightedRow {
        self.scores
            .iter()
            .zip(weights)
            .map(|(value, weight)| value.score().map(|s| s * weight))
            .collect()
    }
}

/// A new row about to be inserted, before the store assigns its id.
#[derive(Debug)]
pub struct NewRecord<I> {
    pub individual: I,
    pub scores: Vec<ObjectiveValue>,
    pub parents: Vec<RecordId>,
    pub variation: Option<VariationOperator>,
    pub generation: u64,
    pub budget: Option<f64>,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub error: Option<String>,
}

/// Append-only table of all evaluated individuals.
#[derive(Debug, Clone)]
pub struct PopulationStore<I> {
    n_objectives: usize,
    records: Vec<ScoreRecord<I>>,
    front_zero: Vec<RecordId>,
}

impl<I> PopulationStore<I> {
    /// Creates an empty store expecting `n_objectives` score cells per row.
    pub fn new(n_objectives: usize) -> Self {
        Self {
            n_objectives,
            records: Vec::new(),
            front_zero: Vec::new(),
        }
    }

    /// Rebuilds a store from previously checkpointed records.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Checkpoint` if any record's score length does
    /// not match `n_objectives` or ids are not dense row indexes.
    pub fn from_records(n_objectives: usize, records: Vec<ScoreRecord<I>>) -> Result<Self> {
        for (row, record) in records.iter().enumerate() {
            if record.scores.len() != n_objectives {
                return Err(EvolveError::Checkpoint(format!(
                    "record {} has {} scores, expected {}",
                    row,
                    record.scores.len(),
                    n_objectives
                )));
            }
            if record.id.index() != row {
                return Err(EvolveError::Checkpoint(format!(
                    "record id {} does not match row {}",
                    record.id.index(),
                    row
                )));
            }
        }
        let front_zero = records
            .iter()
            .filter(|r| r.pareto_front == Some(0))
            .map(|r| r.id)
            .collect();
        Ok(Self {
            n_objectives,
            records,
            front_zero,
        })
    }

    /// Appends a record, assigning its id and updating the rank-0 frontier.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` if the score vector length does
    /// not match the configured objective count.
    pub fn push(&mut self, record: NewRecord<I>, weights: &[f64]) -> Result<RecordId> {
        if record.scores.len() != self.n_objectives {
            return Err(EvolveError::Configuration(format!(
                "score vector has {} cells but {} objectives are configured",
                record.scores.len(),
                self.n_objectives
            )));
        }

        let id = RecordId(self.records.len() as u64);
        self.records.push(ScoreRecord {
            id,
            individual: record.individual,
            scores: record.scores,
            parents: record.parents,
            variation: record.variation,
            generation: record.generation,
            pareto_front: None,
            budget: record.budget,
            started_at: record.started_at,
            finished_at: record.finished_at,
            error: record.error,
        });
        self.update_front_zero(id, weights);
        Ok(id)
    }

    /// Incrementally maintains the exact rank-0 frontier after inserting
    /// `id`. Failed rows never join the frontier.
    fn update_front_zero(&mut self, id: RecordId, weights: &[f64]) {
        let candidate = self.records[id.index()].weighted_row(weights);
        if candidate.is_none() {
            return;
        }

        // Dominated by any current frontier member: not on the frontier.
        for &member in &self.front_zero {
            let member_row = self.records[member.index()].weighted_row(weights);
            if row_dominates(&member_row, &candidate) {
                return;
            }
        }

        // The candidate joins; members it dominates fall off.
        let mut displaced = Vec::new();
        self.front_zero.retain(|&member| {
            let member_row = self.records[member.index()].weighted_row(weights);
            if row_dominates(&candidate, &member_row) {
                displaced.push(member);
                false
            } else {
                true
            }
        });
        for member in displaced {
            self.records[member.index()].pareto_front = None;
        }
        self.records[id.index()].pareto_front = Some(0);
        self.front_zero.push(id);
    }

    /// Performs a full non-dominated sort over every valid record, assigning
    /// exact front indexes. Failed rows keep `pareto_front = None`.
    ///
    /// Called at termination so that rank 0 (and every deeper rank) is exact
    /// over the whole history.
    pub fn assign_fronts(&mut self, weights: &[f64]) {
        let scores: Vec<&[ObjectiveValue]> =
            self.records.iter().map(|r| r.scores.as_slice()).collect();
        let rows = weighted_rows(&scores, weights);
        let valid: Vec<usize> = (0..rows.len()).filter(|&i| rows[i].is_some()).collect();

        for record in &mut self.records {
            record.pareto_front = None;
        }
        self.front_zero.clear();

        for (rank, front) in fast_non_dominated_sort(&rows, &valid).into_iter().enumerate() {
            for index in front {
                self.records[index].pareto_front = Some(rank);
                if rank == 0 {
                    self.front_zero.push(self.records[index].id);
                }
            }
        }
    }

    /// All records, including failures, in completion order.
    pub fn records(&self) -> &[ScoreRecord<I>] {
        &self.records
    }

    /// Looks up one record.
    pub fn get(&self, id: RecordId) -> Option<&ScoreRecord<I>> {
        self.records.get(id.index())
    }

    /// The current rank-0 pareto front.
    pub fn pareto_front(&self) -> Vec<&ScoreRecord<I>> {
        self.front_zero
            .iter()
            .map(|id| &self.records[id.index()])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the store, returning its records (checkpointing).
    pub fn into_records(self) -> Vec<ScoreRecord<I>> {
        self.records
    }

    /// Ids of all valid records ordered best-first by their weighted score
    /// vectors (lexicographic, descending).
    pub fn best_order(&self, weights: &[f64]) -> Vec<RecordId> {
        let mut valid: Vec<(RecordId, Vec<f64>)> = self
            .records
            .iter()
            .filter_map(|r| r.weighted_row(weights).map(|row| (r.id, row)))
            .collect();
        valid.sort_by(|(_, a), (_, b)| {
            b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal)
        });
        valid.into_iter().map(|(id, _)| id).collect()
    }

    /// Ordered fallback search: walks `candidates` in order, applies `fit`,
    /// and returns the first success.
    ///
    /// This is how a surrounding system should pick its final pipeline: try
    /// the pareto candidates best-first and fall through on fit failures
    /// instead of treating the first failure as fatal.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::NoViableIndividual` when every candidate fails
    /// (or the candidate list is empty).
    pub fn first_viable<T, F>(
        &self,
        candidates: impl IntoIterator<Item = RecordId>,
        mut fit: F,
    ) -> Result<(RecordId, T)>
    where
        F: FnMut(&ScoreRecord<I>) -> std::result::Result<T, String>,
    {
        let mut attempts = 0usize;
        let mut last_error = None;
        for id in candidates {
            let record = self.get(id).ok_or_else(|| {
                EvolveError::Selection(format!("unknown record id {}", id.index()))
            })?;
            attempts += 1;
            match fit(record) {
                Ok(value) => return Ok((id, value)),
                Err(e) => last_error = Some(e),
            }
        }
        Err(EvolveError::NoViableIndividual(match last_error {
            Some(e) => format!("all {} candidate(s) failed, last error: {}", attempts, e),
            None => "no candidates to try".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(scores: &[f64]) -> NewRecord<u32> {
        let now = SystemTime::now();
        NewRecord {
            individual: 0,
            scores: scores.iter().map(|&s| ObjectiveValue::Score(s)).collect(),
            parents: Vec::new(),
            variation: None,
            generation: 0,
            budget: None,
            started_at: now,
            finished_at: now,
            error: None,
        }
    }

    fn failed_record() -> NewRecord<u32> {
        let mut r = record(&[0.0, 0.0]);
        r.scores = vec![ObjectiveValue::Timeout, ObjectiveValue::Timeout];
        r
    }

    const W2: [f64; 2] = [1.0, 1.0];

    #[test]
    fn test_mutually_nondominated_rows_all_get_front_zero() {
        let mut store = PopulationStore::new(2);
        for scores in [[1.0, 5.0], [2.0, 4.0], [3.0, 3.0], [4.0, 2.0]] {
            store.push(record(&scores), &W2).unwrap();
        }
        store.assign_fronts(&W2);

        for row in store.records() {
            assert_eq!(row.pareto_front, Some(0));
        }
        assert_eq!(store.pareto_front().len(), 4);
    }

    #[test]
    fn test_incremental_frontier_displaces_dominated_members() {
        let mut store = PopulationStore::new(2);
        let first = store.push(record(&[1.0, 1.0]), &W2).unwrap();
        assert_eq!(store.get(first).unwrap().pareto_front, Some(0));

        let second = store.push(record(&[2.0, 2.0]), &W2).unwrap();
        assert_eq!(store.get(first).unwrap().pareto_front, None);
        assert_eq!(store.get(second).unwrap().pareto_front, Some(0));

        // A dominated insert never joins.
        let third = store.push(record(&[0.5, 0.5]), &W2).unwrap();
        assert_eq!(store.get(third).unwrap().pareto_front, None);
        assert_eq!(store.pareto_front().len(), 1);
    }

    #[test]
    fn test_failed_rows_are_kept_but_never_on_the_frontier() {
        let mut store = PopulationStore::new(2);
        store.push(failed_record(), &W2).unwrap();
        store.push(record(&[1.0, 1.0]), &W2).unwrap();
        store.assign_fronts(&W2);

        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].pareto_front, None);
        assert_eq!(store.records()[1].pareto_front, Some(0));
    }

    #[test]
    fn test_score_length_invariant_is_enforced() {
        let mut store: PopulationStore<u32> = PopulationStore::new(3);
        assert!(store.push(record(&[1.0, 2.0]), &W2).is_err());
    }

    #[test]
    fn test_best_order_sorts_by_weighted_scores() {
        let mut store = PopulationStore::new(2);
        let low = store.push(record(&[1.0, 1.0]), &W2).unwrap();
        let high = store.push(record(&[5.0, 5.0]), &W2).unwrap();
        store.push(failed_record(), &W2).unwrap();

        // Negative weights flip the direction.
        assert_eq!(store.best_order(&[1.0, 1.0]), vec![high, low]);
        assert_eq!(store.best_order(&[-1.0, -1.0]), vec![low, high]);
    }

    #[test]
    fn test_first_viable_returns_first_success() {
        let mut store = PopulationStore::new(2);
        let a = store.push(record(&[5.0, 5.0]), &W2).unwrap();
        let b = store.push(record(&[4.0, 4.0]), &W2).unwrap();

        let (chosen, value) = store
            .first_viable([a, b], |r| {
                if r.id == a {
                    Err("refit failed".to_string())
                } else {
                    Ok("fitted")
                }
            })
            .unwrap();
        assert_eq!(chosen, b);
        assert_eq!(value, "fitted");
    }

    #[test]
    fn test_first_viable_reports_exhaustion() {
        let mut store = PopulationStore::new(2);
        let a = store.push(record(&[5.0, 5.0]), &W2).unwrap();

        let result = store.first_viable([a], |_| -> std::result::Result<(), String> {
            Err("nope".to_string())
        });
        assert!(matches!(result, Err(EvolveError::NoViableIndividual(_))));
    }

    #[test]
    fn test_round_trip_through_records() {
        let mut store = PopulationStore::new(2);
        store.push(record(&[1.0, 5.0]), &W2).unwrap();
        store.push(record(&[2.0, 4.0]), &W2).unwrap();
        store.push(failed_record(), &W2).unwrap();

        let rebuilt =
            PopulationStore::from_records(2, store.clone().into_records()).unwrap();
        assert_eq!(rebuilt.len(), 3);
        assert_eq!(rebuilt.pareto_front().len(), store.pareto_front().len());
    }
}
