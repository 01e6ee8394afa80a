//! # Selection
//!
//! Multi-objective selection over weighted score matrices. Two independent,
//! pluggable policies drive the steady-state loop: parent selection (which
//! individuals are varied next) and survival selection (which individuals
//! remain eligible as parents). Both operate on weighted objective vectors so
//! that per-objective weights and the global optimization direction are the
//! only places direction is controlled.

pub mod dominance;
pub mod nsga2;
pub mod strategy;
pub mod tournament;

pub use dominance::{dominates, weighted_rows, WeightedRow};
pub use nsga2::{fast_non_dominated_sort, NsgaIISurvival};
pub use strategy::{ParentSelector, SurvivalSelector};
pub use tournament::DominatedTournament;
