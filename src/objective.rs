//! # Objectives
//!
//! An [`Objective`] is the scoring collaborator of the engine: a function
//! evaluated on worker threads that maps an individual (plus the shared
//! dataset and the budget in force when the individual was created) to one or
//! more scalar scores. An [`ObjectiveSet`] wraps the user's objectives into a
//! single fixed-length score vector with a name per column.
//!
//! Evaluation failures are captured as [`ObjectiveValue`] markers rather than
//! propagated: a crashed or non-finite evaluation yields `Invalid`, an
//! evaluation that exceeds its deadline yields `Timeout` (enforced by the
//! dispatcher, not by the objective itself). Failed rows are retained in the
//! population store for audit but excluded from numeric ranking.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One scalar cell of a score vector.
///
/// `Timeout` and `Invalid` are data, not errors: they mark the whole row as
/// maximally unfit while keeping it queryable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ObjectiveValue {
    /// A finite score produced by an objective function.
    Score(f64),
    /// The evaluation exceeded its per-evaluation deadline.
    Timeout,
    /// The evaluation crashed, returned an error, a non-finite value, or a
    /// score vector of the wrong length.
    Invalid,
}

impl ObjectiveValue {
    /// Returns the numeric score, or `None` for a failure marker.
    pub fn score(&self) -> Option<f64> {
        match self {
            ObjectiveValue::Score(s) => Some(*s),
            _ => None,
        }
    }

    /// Returns `true` for `Timeout` and `Invalid` markers.
    pub fn is_failure(&self) -> bool {
        !matches!(self, ObjectiveValue::Score(_))
    }
}

/// Trait for objective functions evaluated on worker threads.
///
/// Implementations must be safe to run off the control loop: they receive the
/// individual and the broadcast dataset by shared reference and must not rely
/// on shared mutable state with the caller.
pub trait Objective<I, D>: Send + Sync + 'static {
    /// Scores one individual.
    ///
    /// # Arguments
    ///
    /// * `individual` - The candidate to score.
    /// * `data` - The dataset published once to the worker pool.
    /// * `budget` - The resource budget stamped on the individual at creation
    ///   time, or `None` when no budget schedule is configured.
    ///
    /// # Returns
    ///
    /// One or more scores. The total across the objective set must match the
    /// configured objective names; a mismatch marks the row `Invalid`.
    fn evaluate(&self, individual: &I, data: &D, budget: Option<f64>) -> Result<Vec<f64>>;
}

impl<I, D, F> Objective<I, D> for F
where
    F: Fn(&I, &D, Option<f64>) -> Result<Vec<f64>> + Send + Sync + 'static,
{
    fn evaluate(&self, individual: &I, data: &D, budget: Option<f64>) -> Result<Vec<f64>> {
        self(individual, data, budget)
    }
}

/// An ordered collection of objectives producing one fixed-length score
/// vector per individual.
pub struct ObjectiveSet<I, D> {
    objectives: Vec<Box<dyn Objective<I, D>>>,
    names: Vec<String>,
}

impl<I, D> Debug for ObjectiveSet<I, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectiveSet")
            .field("names", &self.names)
            .finish()
    }
}

impl<I: 'static, D: 'static> ObjectiveSet<I, D> {
    /// Creates an objective set with one name per score column.
    pub fn new(names: Vec<String>) -> Self {
        Self {
            objectives: Vec::new(),
            names,
        }
    }

    /// Appends an objective. Objectives are evaluated in insertion order and
    /// their score vectors concatenated.
    pub fn add_objective(mut self, objective: impl Objective<I, D>) -> Self {
        self.objectives.push(Box::new(objective));
        self
    }

    /// The score column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of score columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` when no objective names are configured.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Evaluates every objective against one individual, concatenating the
    /// score vectors.
    ///
    /// Returns `Err` with a diagnostic message when any objective fails,
    /// returns a non-finite value, or the concatenated length does not match
    /// the configured names. The caller records the row as `Invalid`; the
    /// error never escapes the worker.
    pub fn evaluate(
        &self,
        individual: &I,
        data: &D,
        budget: Option<f64>,
    ) -> std::result::Result<Vec<f64>, String> {
        let mut scores = Vec::with_capacity(self.names.len());
        for objective in &self.objectives {
            match objective.evaluate(individual, data, budget) {
                Ok(values) => scores.extend(values),
                Err(e) => return Err(e.to_string()),
            }
        }

        if scores.len() != self.names.len() {
            return Err(format!(
                "objective set produced {} scores but {} objective names are configured",
                scores.len(),
                self.names.len()
            ));
        }

        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(format!("non-finite score encountered: {}", bad));
        }

        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_value_accessors() {
        assert_eq!(ObjectiveValue::Score(1.5).score(), Some(1.5));
        assert_eq!(ObjectiveValue::Timeout.score(), None);
        assert!(ObjectiveValue::Invalid.is_failure());
        assert!(!ObjectiveValue::Score(0.0).is_failure());
    }

    #[test]
    fn test_objective_set_concatenates_scores() {
        let set: ObjectiveSet<u32, ()> =
            ObjectiveSet::new(vec!["accuracy".into(), "complexity".into()])
                .add_objective(|ind: &u32, _data: &(), _budget: Option<f64>| {
                    Ok(vec![*ind as f64])
                })
                .add_objective(|ind: &u32, _data: &(), _budget: Option<f64>| {
                    Ok(vec![-(*ind as f64)])
                });

        let scores = set.evaluate(&3, &(), None).unwrap();
        assert_eq!(scores, vec![3.0, -3.0]);
    }

    #[test]
    fn test_objective_set_rejects_length_mismatch() {
        let set: ObjectiveSet<u32, ()> = ObjectiveSet::new(vec!["accuracy".into()])
            .add_objective(|_: &u32, _: &(), _: Option<f64>| Ok(vec![1.0, 2.0]));

        let err = set.evaluate(&0, &(), None).unwrap_err();
        assert!(err.contains("objective names"));
    }

    #[test]
    fn test_objective_set_rejects_non_finite() {
        let set: ObjectiveSet<u32, ()> = ObjectiveSet::new(vec!["accuracy".into()])
            .add_objective(|_: &u32, _: &(), _: Option<f64>| Ok(vec![f64::NAN]));

        assert!(set.evaluate(&0, &(), None).is_err());
    }
}
