//! # Variation
//!
//! The engine owns only the probability distribution over variation
//! operators; the operators themselves are the [`Individual`] trait's
//! `mutate` and `crossover`. A [`VariationSchedule`] validates and normalizes
//! the four operator probabilities and samples one operator per offspring.

use serde::{Deserialize, Serialize};

use crate::error::{EvolveError, Result};
use crate::individual::Individual;
use crate::rng::RandomNumberGenerator;

/// The variation operator used to produce an offspring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariationOperator {
    /// Mutate a single parent.
    Mutate,
    /// Cross two parents.
    Crossover,
    /// Mutate both parents, then cross the mutants.
    MutateThenCrossover,
    /// Cross two parents, then mutate the child.
    CrossoverThenMutate,
}

impl VariationOperator {
    /// Whether this operator consumes two parents.
    pub fn requires_two_parents(&self) -> bool {
        !matches!(self, VariationOperator::Mutate)
    }

    /// Applies this operator to the given parents, producing one offspring.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Selection` if the parent count does not match
    /// the operator's arity.
    pub fn apply<I: Individual>(
        &self,
        parents: &[I],
        rng: &mut RandomNumberGenerator,
    ) -> Result<I> {
        let required = if self.requires_two_parents() { 2 } else { 1 };
        if parents.len() < required {
            return Err(EvolveError::Selection(format!(
                "{:?} requires {} parent(s), got {}",
                self,
                required,
                parents.len()
            )));
        }

        let child = match self {
            VariationOperator::Mutate => parents[0].mutate(rng),
            VariationOperator::Crossover => parents[0].crossover(&parents[1], rng),
            VariationOperator::MutateThenCrossover => {
                let a = parents[0].mutate(rng);
                let b = parents[1].mutate(rng);
                a.crossover(&b, rng)
            }
            VariationOperator::CrossoverThenMutate => {
                parents[0].crossover(&parents[1], rng).mutate(rng)
            }
        };
        Ok(child)
    }
}

/// A validated, normalized probability distribution over the four variation
/// operators.
#[derive(Debug, Clone)]
pub struct VariationSchedule {
    // Cumulative distribution in operator declaration order.
    cumulative: [f64; 4],
}

/// Operator declaration order used by the cumulative distribution.
const OPERATORS: [VariationOperator; 4] = [
    VariationOperator::Mutate,
    VariationOperator::Crossover,
    VariationOperator::MutateThenCrossover,
    VariationOperator::CrossoverThenMutate,
];

impl VariationSchedule {
    /// Builds a schedule from the four operator probabilities.
    ///
    /// Probabilities must be finite and non-negative with a positive sum;
    /// they are normalized to sum to one.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` when any probability is negative
    /// or non-finite, or when all four are zero.
    pub fn new(
        mutate: f64,
        crossover: f64,
        mutate_then_crossover: f64,
        crossover_then_mutate: f64,
    ) -> Result<Self> {
        let probabilities = [
            mutate,
            crossover,
            mutate_then_crossover,
            crossover_then_mutate,
        ];

        if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(EvolveError::Configuration(
                "Variation probabilities must be finite and non-negative".to_string(),
            ));
        }

        let total: f64 = probabilities.iter().sum();
        if total <= 0.0 {
            return Err(EvolveError::Configuration(
                "At least one variation probability must be positive".to_string(),
            ));
        }

        let mut cumulative = [0.0; 4];
        let mut acc = 0.0;
        for (slot, p) in cumulative.iter_mut().zip(probabilities) {
            acc += p / total;
            *slot = acc;
        }
        // Guard the top of the distribution against rounding.
        cumulative[3] = 1.0;

        Ok(Self { cumulative })
    }

    /// Samples one operator according to the configured distribution.
    pub fn sample(&self, rng: &mut RandomNumberGenerator) -> VariationOperator {
        let draw = rng.uniform();
        for (op, bound) in OPERATORS.iter().zip(self.cumulative) {
            if draw < bound {
                return *op;
            }
        }
        OPERATORS[3]
    }
}

impl Default for VariationSchedule {
    fn default() -> Self {
        // Mutate-heavy defaults suit steady-state search.
        Self::new(0.7, 0.2, 0.05, 0.05).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative_probability() {
        assert!(VariationSchedule::new(-0.1, 0.5, 0.3, 0.3).is_err());
    }

    #[test]
    fn test_rejects_all_zero() {
        assert!(VariationSchedule::new(0.0, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_degenerate_distribution_always_samples_that_operator() {
        let schedule = VariationSchedule::new(0.0, 1.0, 0.0, 0.0).unwrap();
        let mut rng = RandomNumberGenerator::from_seed(3);
        for _ in 0..50 {
            assert_eq!(schedule.sample(&mut rng), VariationOperator::Crossover);
        }
    }

    #[test]
    fn test_unnormalized_probabilities_are_accepted() {
        // 7:2:0.5:0.5 normalizes the same way as 0.7:0.2:0.05:0.05.
        let schedule = VariationSchedule::new(7.0, 2.0, 0.5, 0.5).unwrap();
        let mut rng = RandomNumberGenerator::from_seed(11);
        let mut saw_mutate = false;
        for _ in 0..100 {
            if schedule.sample(&mut rng) == VariationOperator::Mutate {
                saw_mutate = true;
            }
        }
        assert!(saw_mutate);
    }

    #[test]
    fn test_operator_arity() {
        assert!(!VariationOperator::Mutate.requires_two_parents());
        assert!(VariationOperator::Crossover.requires_two_parents());
        assert!(VariationOperator::MutateThenCrossover.requires_two_parents());
        assert!(VariationOperator::CrossoverThenMutate.requires_two_parents());
    }
}
