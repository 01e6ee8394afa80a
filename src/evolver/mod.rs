pub mod checkpoint;
pub mod config;
pub mod steady_state;

pub use config::{EvolverConfig, EvolverConfigBuilder, ResolvedConfig, ToleranceSpec};
pub use steady_state::{CancellationToken, EvolverState, SteadyStateEvolver};
