use crate::error::{EvolveError, Result};
use crate::rng::RandomNumberGenerator;
use crate::selection::dominance::{row_dominates, WeightedRow};
use crate::selection::strategy::ParentSelector;

/// A parent selection strategy that selects individuals through
/// dominance-based tournaments.
///
/// Each tournament samples `tournament_size` individuals uniformly from the
/// eligible population and returns the one that pareto-dominates the most
/// others in the sample; ties are broken by a uniform random draw. Failed
/// rows are dominated by everything and dominate nothing, so they can only
/// win a tournament when no valid row exists at all.
///
/// Smaller tournaments select more randomly; larger tournaments concentrate
/// on the current front.
///
/// # Examples
///
/// ```
/// use pipevolve::selection::{DominatedTournament, ParentSelector};
/// use pipevolve::rng::RandomNumberGenerator;
///
/// let rows = vec![
///     Some(vec![1.0, 5.0]),
///     Some(vec![2.0, 4.0]),
///     Some(vec![0.5, 0.5]),
/// ];
/// let mut rng = RandomNumberGenerator::from_seed(7);
///
/// let selection = DominatedTournament::default();
/// let parents = selection.select(&rows, 2, &mut rng).unwrap();
/// assert_eq!(parents.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct DominatedTournament {
    tournament_size: usize,
}

impl DominatedTournament {
    /// Creates a new tournament strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if `tournament_size` is 0.
    pub fn new(tournament_size: usize) -> Result<Self> {
        if tournament_size < 1 {
            return Err(EvolveError::Configuration(
                "Tournament size must be at least 1".to_string(),
            ));
        }
        Ok(Self { tournament_size })
    }

    /// Runs a single tournament over `eligible` and returns the winning
    /// index.
    fn run_tournament(
        &self,
        rows: &[WeightedRow],
        eligible: &[usize],
        rng: &mut RandomNumberGenerator,
    ) -> usize {
        let mut participants = Vec::with_capacity(self.tournament_size);
        for _ in 0..self.tournament_size {
            participants.push(eligible[rng.index(eligible.len())]);
        }

        // Count, for each participant, how many others in the sample it
        // dominates.
        let mut best: Vec<usize> = Vec::new();
        let mut best_count = 0usize;
        for &i in &participants {
            let count = participants
                .iter()
                .filter(|&&j| j != i && row_dominates(&rows[i], &rows[j]))
                .count();
            if best.is_empty() || count > best_count {
                best.clear();
                best.push(i);
                best_count = count;
            } else if count == best_count && !best.contains(&i) {
                best.push(i);
            }
        }

        if best.len() == 1 {
            best[0]
        } else {
            best[rng.index(best.len())]
        }
    }
}

impl Default for DominatedTournament {
    fn default() -> Self {
        // Safe to unwrap because the default size is valid
        Self::new(2).unwrap()
    }
}

impl ParentSelector for DominatedTournament {
    fn select(
        &self,
        rows: &[WeightedRow],
        num_to_select: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>> {
        if rows.is_empty() {
            return Err(EvolveError::EmptyPopulation);
        }

        // Failed rows only become eligible when nothing valid exists.
        let valid: Vec<usize> = (0..rows.len()).filter(|&i| rows[i].is_some()).collect();
        let eligible: Vec<usize> = if valid.is_empty() {
            (0..rows.len()).collect()
        } else {
            valid
        };

        let mut selected = Vec::with_capacity(num_to_select);
        for _ in 0..num_to_select {
            selected.push(self.run_tournament(rows, &eligible, rng));
        }
        Ok(selected)
    }
}
