pub mod budget;
pub mod dispatch;
pub mod early_stop;
pub mod error;
pub mod evolver;
pub mod individual;
pub mod objective;
pub mod population;
pub mod rng;
pub mod selection;
pub mod variation;

// Re-export commonly used types for convenience
pub use error::{EvolveError, OptionExt, Result, ResultExt};
pub use evolver::{EvolverConfig, SteadyStateEvolver};
pub use individual::{Individual, IndividualGenerator};
pub use objective::{Objective, ObjectiveSet, ObjectiveValue};
