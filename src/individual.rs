//! # Individual Trait
//!
//! The `Individual` trait defines the interface for types that represent
//! candidate pipelines in the evolutionary search. It provides methods for
//! crossover and mutation, both of which return a *new* individual; the
//! engine never mutates an individual in place after creation.
//!
//! The concrete representation (a graph pipeline, a linear pipeline, or any
//! future encoding) lives outside this crate. The engine schedules, varies,
//! and ranks individuals without inspecting them.
//!
//! ## Example
//!
//! ```rust
//! use pipevolve::individual::Individual;
//! use pipevolve::rng::RandomNumberGenerator;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! struct MyPipeline {
//!     depth: u32,
//! }
//!
//! impl Individual for MyPipeline {
//!     fn mutate(&self, rng: &mut RandomNumberGenerator) -> Self {
//!         let delta = rng.index(3) as u32;
//!         MyPipeline { depth: self.depth + delta }
//!     }
//!
//!     fn crossover(&self, other: &Self, _rng: &mut RandomNumberGenerator) -> Self {
//!         MyPipeline { depth: (self.depth + other.depth) / 2 }
//!     }
//! }
//! ```

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::rng::RandomNumberGenerator;

/// Trait for types that represent candidate pipelines in the evolutionary
/// search.
///
/// Variation operators take their inputs by shared reference and return a
/// fresh individual. Implementations must not mutate `self` or `other`; the
/// population store relies on evaluated individuals being immutable.
///
/// The `Serialize`/`DeserializeOwned` bounds exist so that the population
/// store can be checkpointed to durable storage and resumed with warm start.
/// `Send + Sync` enable evaluation on worker threads.
pub trait Individual:
    Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Produces a mutated copy of this individual.
    ///
    /// # Arguments
    ///
    /// * `rng` - The control-loop random number generator. Implementations
    ///   must take all randomness from it so that seeded runs are
    ///   reproducible.
    fn mutate(&self, rng: &mut RandomNumberGenerator) -> Self;

    /// Produces a new individual by combining this individual with `other`.
    ///
    /// Neither parent is modified.
    fn crossover(&self, other: &Self, rng: &mut RandomNumberGenerator) -> Self;
}

/// Source of freshly generated individuals for the initial population.
///
/// Generators are infinite and restartable: the engine calls `generate` as
/// many times as the initial population (and any retry) requires, and a
/// generator constructed from the same seed state must yield the same
/// sequence.
pub trait IndividualGenerator<I: Individual>: Send {
    /// Generates one new individual.
    fn generate(&mut self, rng: &mut RandomNumberGenerator) -> I;
}

impl<I, F> IndividualGenerator<I> for F
where
    I: Individual,
    F: FnMut(&mut RandomNumberGenerator) -> I + Send,
{
    fn generate(&mut self, rng: &mut RandomNumberGenerator) -> I {
        self(rng)
    }
}
