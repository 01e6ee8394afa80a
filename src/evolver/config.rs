//! # EvolverConfig
//!
//! Configuration for the steady-state evolver, built in two phases: a plain
//! [`EvolverConfig`] struct (with a fluent [`EvolverConfigBuilder`]) holding
//! exactly what the caller asked for, and a [`validate`](EvolverConfig::validate)
//! step producing an immutable [`ResolvedConfig`] with the derived fields
//! (direction-adjusted weights, per-objective tolerances, normalized
//! variation probabilities, budget schedule). Validation failures are
//! `EvolveError::Configuration` and are raised before any evaluation starts.
//!
//! ## Example
//!
//! ```rust
//! use pipevolve::evolver::config::EvolverConfig;
//!
//! let config = EvolverConfig::builder()
//!     .objective_weights(vec![1.0, -0.25])
//!     .population_size(20)
//!     .n_workers(4)
//!     .early_stop(10)
//!     .seed(42)
//!     .build();
//!
//! let resolved = config.validate(2).unwrap();
//! assert_eq!(resolved.weights, vec![1.0, -0.25]);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::budget::BudgetSchedule;
use crate::error::{EvolveError, Result};
use crate::variation::VariationSchedule;

/// Per-objective early-stop tolerance specification.
///
/// A uniform scalar broadcasts to every objective; a per-objective list is
/// used as-is. `None` entries exclude that objective from early stopping.
#[derive(Debug, Clone)]
pub enum ToleranceSpec {
    Uniform(Option<f64>),
    PerObjective(Vec<Option<f64>>),
}

impl Default for ToleranceSpec {
    fn default() -> Self {
        ToleranceSpec::Uniform(Some(0.001))
    }
}

/// Raw configuration surface of the steady-state evolver.
///
/// All recognized options; see the builder methods for their effects.
#[derive(Debug, Clone)]
pub struct EvolverConfig {
    /// One weight per objective; negative weights flip that objective's
    /// direction.
    pub objective_weights: Vec<f64>,
    /// Global direction: `false` negates every weighted objective.
    pub bigger_is_better: bool,
    /// Target size of the parent-eligible population.
    pub population_size: usize,
    /// Size of the initial population; `None` uses `population_size`.
    pub initial_population_size: Option<usize>,
    /// Stop after this many evaluated individuals.
    pub max_evaluated_individuals: Option<u64>,
    /// Early-stop patience in evaluated individuals.
    pub early_stop: Option<u64>,
    /// Early-stop patience in minutes.
    pub early_stop_mins: Option<f64>,
    /// Improvement tolerances for early stopping.
    pub early_stop_tol: ToleranceSpec,
    /// Wall-clock limit for the whole run, in minutes.
    pub max_time_mins: Option<f64>,
    /// Hard per-evaluation limit, in minutes.
    pub max_eval_time_mins: Option<f64>,
    /// Worker-pool size; also the steady-state in-flight target.
    pub n_workers: usize,
    /// Probability of producing an offspring by mutation alone.
    pub mutate_probability: f64,
    /// Probability of producing an offspring by crossover alone.
    pub crossover_probability: f64,
    /// Probability of mutating both parents before crossover.
    pub mutate_then_crossover_probability: f64,
    /// Probability of mutating the child of a crossover.
    pub crossover_then_mutate_probability: f64,
    /// Starting and ending evaluation budget; `None` disables budgeting.
    pub budget_range: Option<(f64, f64)>,
    /// Exponent shaping the budget interpolation.
    pub budget_scaling: f64,
    /// Submitted individuals until the budget freezes at its end value.
    pub individuals_until_end_budget: u64,
    /// Number of staircase plateaus in the budget interpolation.
    pub stepwise_steps: u32,
    /// Offspring submitted per completion; 1 is strict steady state.
    pub replacements_per_completion: usize,
    /// Folder for periodic population snapshots; `None` disables them.
    pub checkpoint_folder: Option<PathBuf>,
    /// Completions between snapshots.
    pub checkpoint_interval: u64,
    /// Resume from the last snapshot instead of re-initializing.
    pub warm_start: bool,
    /// Grace period for in-flight evaluations at termination, in seconds.
    pub drain_grace_secs: f64,
    /// Random seed; `None` draws one from the system entropy.
    pub seed: Option<u64>,
}

impl Default for EvolverConfig {
    fn default() -> Self {
        Self {
            objective_weights: vec![1.0],
            bigger_is_better: true,
            population_size: 50,
            initial_population_size: None,
            max_evaluated_individuals: None,
            early_stop: None,
            early_stop_mins: None,
            early_stop_tol: ToleranceSpec::default(),
            max_time_mins: None,
            max_eval_time_mins: Some(10.0),
            n_workers: 1,
            mutate_probability: 0.7,
            crossover_probability: 0.2,
            mutate_then_crossover_probability: 0.05,
            crossover_then_mutate_probability: 0.05,
            budget_range: None,
            budget_scaling: 0.5,
            individuals_until_end_budget: 1,
            stepwise_steps: 5,
            replacements_per_completion: 1,
            checkpoint_folder: None,
            checkpoint_interval: 30,
            warm_start: false,
            drain_grace_secs: 30.0,
            seed: None,
        }
    }
}

impl EvolverConfig {
    /// Returns a builder with the default configuration.
    pub fn builder() -> EvolverConfigBuilder {
        EvolverConfigBuilder::default()
    }

    /// Validates the configuration against the number of objectives and
    /// derives the immutable resolved form.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` for any malformed parameter. No
    /// evaluation is ever started from an invalid configuration.
    pub fn validate(&self, n_objectives: usize) -> Result<ResolvedConfig> {
        if n_objectives == 0 {
            return Err(EvolveError::Configuration(
                "At least one objective is required".to_string(),
            ));
        }
        if self.objective_weights.len() != n_objectives {
            return Err(EvolveError::Configuration(format!(
                "{} objective weight(s) configured for {} objective(s)",
                self.objective_weights.len(),
                n_objectives
            )));
        }
        if self.objective_weights.iter().any(|w| !w.is_finite()) {
            return Err(EvolveError::Configuration(
                "Objective weights must be finite".to_string(),
            ));
        }
        if self.population_size == 0 {
            return Err(EvolveError::Configuration(
                "Population size cannot be zero".to_string(),
            ));
        }
        let initial_population_size =
            self.initial_population_size.unwrap_or(self.population_size);
        if initial_population_size == 0 {
            return Err(EvolveError::Configuration(
                "Initial population size cannot be zero".to_string(),
            ));
        }
        if self.n_workers == 0 {
            return Err(EvolveError::Configuration(
                "Worker count cannot be zero".to_string(),
            ));
        }
        if self.replacements_per_completion == 0 {
            return Err(EvolveError::Configuration(
                "replacements_per_completion cannot be zero".to_string(),
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(EvolveError::Configuration(
                "checkpoint_interval cannot be zero".to_string(),
            ));
        }

        let max_time = positive_minutes("max_time_mins", self.max_time_mins)?;
        let max_eval_time = positive_minutes("max_eval_time_mins", self.max_eval_time_mins)?;
        if let Some(mins) = self.early_stop_mins {
            if !mins.is_finite() || mins <= 0.0 {
                return Err(EvolveError::Configuration(
                    "early_stop_mins must be a positive finite number".to_string(),
                ));
            }
        }
        if !self.drain_grace_secs.is_finite() || self.drain_grace_secs < 0.0 {
            return Err(EvolveError::Configuration(
                "drain_grace_secs must be non-negative and finite".to_string(),
            ));
        }

        let direction = if self.bigger_is_better { 1.0 } else { -1.0 };
        let weights: Vec<f64> = self
            .objective_weights
            .iter()
            .map(|w| w * direction)
            .collect();

        let tolerances = match &self.early_stop_tol {
            ToleranceSpec::Uniform(tol) => vec![*tol; n_objectives],
            ToleranceSpec::PerObjective(tols) => {
                if tols.len() != n_objectives {
                    return Err(EvolveError::Configuration(format!(
                        "{} early-stop tolerance(s) configured for {} objective(s)",
                        tols.len(),
                        n_objectives
                    )));
                }
                tols.clone()
            }
        };
        for tol in tolerances.iter().flatten() {
            if !tol.is_finite() || *tol < 0.0 {
                return Err(EvolveError::Configuration(
                    "Early-stop tolerances must be non-negative and finite".to_string(),
                ));
            }
        }

        let variation = VariationSchedule::new(
            self.mutate_probability,
            self.crossover_probability,
            self.mutate_then_crossover_probability,
            self.crossover_then_mutate_probability,
        )?;

        let budget = match self.budget_range {
            Some(range) => Some(BudgetSchedule::new(
                range,
                self.budget_scaling,
                self.individuals_until_end_budget,
                self.stepwise_steps,
            )?),
            None => None,
        };

        let seed = match self.seed {
            Some(seed) => seed,
            None => StdRng::from_entropy().gen(),
        };

        Ok(ResolvedConfig {
            weights,
            tolerances,
            population_size: self.population_size,
            initial_population_size,
            max_evaluated_individuals: self.max_evaluated_individuals,
            early_stop: self.early_stop,
            early_stop_mins: self.early_stop_mins,
            max_time,
            max_eval_time,
            n_workers: self.n_workers,
            variation,
            budget,
            replacements_per_completion: self.replacements_per_completion,
            checkpoint_folder: self.checkpoint_folder.clone(),
            checkpoint_interval: self.checkpoint_interval,
            warm_start: self.warm_start,
            drain_grace: Duration::from_secs_f64(self.drain_grace_secs),
            seed,
        })
    }
}

fn positive_minutes(name: &str, minutes: Option<f64>) -> Result<Option<Duration>> {
    match minutes {
        None => Ok(None),
        Some(m) if m.is_finite() && m > 0.0 => Ok(Some(Duration::from_secs_f64(m * 60.0))),
        Some(_) => Err(EvolveError::Configuration(format!(
            "{} must be a positive finite number",
            name
        ))),
    }
}

/// Immutable derived configuration produced by [`EvolverConfig::validate`].
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Direction-adjusted objective weights (maximize-everything space).
    pub weights: Vec<f64>,
    /// Resolved per-objective early-stop tolerances.
    pub tolerances: Vec<Option<f64>>,
    pub population_size: usize,
    pub initial_population_size: usize,
    pub max_evaluated_individuals: Option<u64>,
    pub early_stop: Option<u64>,
    pub early_stop_mins: Option<f64>,
    pub max_time: Option<Duration>,
    pub max_eval_time: Option<Duration>,
    pub n_workers: usize,
    pub variation: VariationSchedule,
    pub budget: Option<BudgetSchedule>,
    pub replacements_per_completion: usize,
    pub checkpoint_folder: Option<PathBuf>,
    pub checkpoint_interval: u64,
    pub warm_start: bool,
    pub drain_grace: Duration,
    /// The seed actually in use (drawn from entropy when none was given).
    pub seed: u64,
}

/// Builder for [`EvolverConfig`].
///
/// Provides a fluent interface; unset options keep their defaults.
#[derive(Debug, Clone, Default)]
pub struct EvolverConfigBuilder {
    config: EvolverConfig,
}

impl EvolverConfigBuilder {
    /// Sets one weight per objective.
    pub fn objective_weights(mut self, weights: Vec<f64>) -> Self {
        self.config.objective_weights = weights;
        self
    }

    /// Sets the global optimization direction.
    pub fn bigger_is_better(mut self, value: bool) -> Self {
        self.config.bigger_is_better = value;
        self
    }

    /// Sets the target population size.
    pub fn population_size(mut self, value: usize) -> Self {
        self.config.population_size = value;
        self
    }

    /// Sets the initial population size.
    pub fn initial_population_size(mut self, value: usize) -> Self {
        self.config.initial_population_size = Some(value);
        self
    }

    /// Stops the run after this many evaluated individuals.
    pub fn max_evaluated_individuals(mut self, value: u64) -> Self {
        self.config.max_evaluated_individuals = Some(value);
        self
    }

    /// Sets the early-stop patience in evaluated individuals.
    pub fn early_stop(mut self, value: u64) -> Self {
        self.config.early_stop = Some(value);
        self
    }

    /// Sets the early-stop patience in minutes.
    pub fn early_stop_mins(mut self, value: f64) -> Self {
        self.config.early_stop_mins = Some(value);
        self
    }

    /// Sets one uniform early-stop tolerance for every objective.
    pub fn early_stop_tol(mut self, value: f64) -> Self {
        self.config.early_stop_tol = ToleranceSpec::Uniform(Some(value));
        self
    }

    /// Sets per-objective early-stop tolerances; `None` entries exclude that
    /// objective from early stopping.
    pub fn early_stop_tols(mut self, values: Vec<Option<f64>>) -> Self {
        self.config.early_stop_tol = ToleranceSpec::PerObjective(values);
        self
    }

    /// Sets the wall-clock limit for the whole run, in minutes.
    pub fn max_time_mins(mut self, value: f64) -> Self {
        self.config.max_time_mins = Some(value);
        self
    }

    /// Sets the hard per-evaluation limit, in minutes.
    pub fn max_eval_time_mins(mut self, value: f64) -> Self {
        self.config.max_eval_time_mins = Some(value);
        self
    }

    /// Disables the per-evaluation limit.
    pub fn no_eval_time_limit(mut self) -> Self {
        self.config.max_eval_time_mins = None;
        self
    }

    /// Sets the worker-pool size.
    pub fn n_workers(mut self, value: usize) -> Self {
        self.config.n_workers = value;
        self
    }

    /// Sets the four variation-operator probabilities (mutate, crossover,
    /// mutate-then-crossover, crossover-then-mutate).
    pub fn variation_probabilities(
        mut self,
        mutate: f64,
        crossover: f64,
        mutate_then_crossover: f64,
        crossover_then_mutate: f64,
    ) -> Self {
        self.config.mutate_probability = mutate;
        self.config.crossover_probability = crossover;
        self.config.mutate_then_crossover_probability = mutate_then_crossover;
        self.config.crossover_then_mutate_probability = crossover_then_mutate;
        self
    }

    /// Enables the budget schedule over the given range.
    pub fn budget_range(mut self, start: f64, end: f64) -> Self {
        self.config.budget_range = Some((start, end));
        self
    }

    /// Sets the budget interpolation exponent.
    pub fn budget_scaling(mut self, value: f64) -> Self {
        self.config.budget_scaling = value;
        self
    }

    /// Sets the submitted-individual count at which the budget freezes.
    pub fn individuals_until_end_budget(mut self, value: u64) -> Self {
        self.config.individuals_until_end_budget = value;
        self
    }

    /// Sets the number of budget staircase plateaus.
    pub fn stepwise_steps(mut self, value: u32) -> Self {
        self.config.stepwise_steps = value;
        self
    }

    /// Sets the number of offspring submitted per completion.
    pub fn replacements_per_completion(mut self, value: usize) -> Self {
        self.config.replacements_per_completion = value;
        self
    }

    /// Enables periodic snapshots into the given folder.
    pub fn checkpoint_folder(mut self, value: impl Into<PathBuf>) -> Self {
        self.config.checkpoint_folder = Some(value.into());
        self
    }

    /// Sets the number of completions between snapshots.
    pub fn checkpoint_interval(mut self, value: u64) -> Self {
        self.config.checkpoint_interval = value;
        self
    }

    /// Resumes from the last snapshot instead of re-initializing.
    pub fn warm_start(mut self, value: bool) -> Self {
        self.config.warm_start = value;
        self
    }

    /// Sets the drain grace period at termination, in seconds.
    pub fn drain_grace_secs(mut self, value: f64) -> Self {
        self.config.drain_grace_secs = value;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, value: u64) -> Self {
        self.config.seed = Some(value);
        self
    }

    /// Builds the `EvolverConfig` instance.
    pub fn build(self) -> EvolverConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let resolved = EvolverConfig::default().validate(1).unwrap();
        assert_eq!(resolved.weights, vec![1.0]);
        assert_eq!(resolved.tolerances, vec![Some(0.001)]);
        assert_eq!(resolved.initial_population_size, 50);
    }

    #[test]
    fn test_weight_count_must_match_objectives() {
        let config = EvolverConfig::builder()
            .objective_weights(vec![1.0])
            .build();
        assert!(config.validate(2).is_err());
    }

    #[test]
    fn test_bigger_is_better_flips_weights() {
        let config = EvolverConfig::builder()
            .objective_weights(vec![1.0, -0.5])
            .bigger_is_better(false)
            .build();
        let resolved = config.validate(2).unwrap();
        assert_eq!(resolved.weights, vec![-1.0, 0.5]);
    }

    #[test]
    fn test_invalid_probabilities_are_rejected() {
        let config = EvolverConfig::builder()
            .objective_weights(vec![1.0])
            .variation_probabilities(-0.5, 0.5, 0.0, 0.0)
            .build();
        assert!(config.validate(1).is_err());
    }

    #[test]
    fn test_zero_population_is_rejected() {
        let config = EvolverConfig::builder().population_size(0).build();
        assert!(config.validate(1).is_err());
    }

    #[test]
    fn test_per_objective_tolerances_must_match_count() {
        let config = EvolverConfig::builder()
            .objective_weights(vec![1.0, 1.0])
            .early_stop_tols(vec![Some(0.1)])
            .build();
        assert!(config.validate(2).is_err());
    }

    #[test]
    fn test_negative_time_limits_are_rejected() {
        let config = EvolverConfig::builder().max_time_mins(-1.0).build();
        assert!(config.validate(1).is_err());
    }

    #[test]
    fn test_budget_range_produces_schedule() {
        let config = EvolverConfig::builder()
            .budget_range(2.0, 10.0)
            .individuals_until_end_budget(100)
            .build();
        let resolved = config.validate(1).unwrap();
        let schedule = resolved.budget.unwrap();
        assert_eq!(schedule.budget_for(0), 2.0);
        assert_eq!(schedule.budget_for(100), 10.0);
    }
}
