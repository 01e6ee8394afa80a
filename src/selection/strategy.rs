use std::fmt::Debug;

use crate::error::Result;
use crate::rng::RandomNumberGenerator;
use crate::selection::dominance::WeightedRow;

/// Trait for parent selection strategies.
///
/// Parent selection chooses which eligible individuals are varied next. It is
/// a pure function of the weighted score matrix: implementations receive one
/// row per eligible individual (`None` for rows whose evaluation failed) and
/// return indexes into that matrix.
///
/// # Examples
///
/// ```
/// use pipevolve::selection::{DominatedTournament, ParentSelector};
/// use pipevolve::rng::RandomNumberGenerator;
///
/// let rows = vec![
///     Some(vec![1.0, 5.0]),
///     Some(vec![4.0, 2.0]),
///     None, // failed evaluation
/// ];
/// let mut rng = RandomNumberGenerator::from_seed(42);
/// let selector = DominatedTournament::default();
/// let parents = selector.select(&rows, 2, &mut rng).unwrap();
/// assert_eq!(parents.len(), 2);
/// ```
pub trait ParentSelector: Debug + Send + Sync {
    /// Selects `num_to_select` parent indexes from the weighted score matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix is empty or the strategy cannot produce
    /// a selection.
    fn select(
        &self,
        rows: &[WeightedRow],
        num_to_select: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>>;
}

/// Trait for survival selection strategies.
///
/// Survival selection trims the current population back to its target size.
/// Implementations must never return more indexes than requested, and must
/// prefer earlier pareto fronts: every returned individual's front index is
/// less than or equal to every excluded individual's front index.
pub trait SurvivalSelector: Debug + Send + Sync {
    /// Selects up to `num_to_select` surviving indexes from the weighted
    /// score matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix is empty.
    fn select(
        &self,
        rows: &[WeightedRow],
        num_to_select: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>>;
}
