//! # Steady-state evolver
//!
//! The orchestrator of the whole engine. It keeps a constant number of
//! evaluations in flight against the worker pool and, on every completion,
//! records the result, updates the pareto frontier and early-stop state,
//! checks the termination predicates, and submits the next offspring —
//! exactly one submission per completion by default, never batched by
//! generation.
//!
//! State machine: `Init → Warmup → Steady → Draining → Done`. Warmup submits
//! the freshly generated initial population up to the worker-pool concurrency
//! limit; Steady is the one-in-one-out replacement loop; Draining stops
//! submitting and collects in-flight results for a bounded grace period.
//!
//! ## Determinism
//!
//! Every random draw (generation, parent selection, operator choice, tie
//! breaking) comes from a single seeded generator consumed strictly in
//! completion order. With a fixed seed the search trajectory is reproducible
//! *given the same completion order*; true wall-clock concurrency makes that
//! order nondeterministic, so callers requiring bit-identical runs must pin
//! `n_workers` to 1. Warm-started runs re-seed from the configured seed plus
//! the restored submission counter, so determinism holds within a single
//! process run, not across a checkpoint resume.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::dispatch::{Completion, DispatchConfig, EvalOutcome, EvaluationDispatcher, JobHandle};
use crate::early_stop::EarlyStopMonitor;
use crate::error::{EvolveError, Result};
use crate::evolver::checkpoint::{self, CheckpointSnapshot};
use crate::evolver::config::{EvolverConfig, ResolvedConfig};
use crate::individual::{Individual, IndividualGenerator};
use crate::objective::{ObjectiveSet, ObjectiveValue};
use crate::population::{NewRecord, PopulationStore, RecordId, ScoreRecord};
use crate::rng::RandomNumberGenerator;
use crate::selection::dominance::WeightedRow;
use crate::selection::{DominatedTournament, NsgaIISurvival, ParentSelector, SurvivalSelector};
use crate::variation::VariationOperator;

/// Phases of one optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolverState {
    Init,
    Warmup,
    Steady,
    Draining,
    Done,
}

/// Why the loop stopped submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TerminationReason {
    MaxTime,
    MaxEvaluatedIndividuals,
    EarlyStop,
    Cancelled,
}

/// Run-level cancellation signal, shareable across threads.
///
/// Cancelling causes in-flight evaluations to be abandoned (their results
/// discarded if they still arrive) rather than awaited, bounded by the drain
/// grace period.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Provenance of a submitted evaluation, held until its completion arrives.
struct PendingJob<I> {
    individual: I,
    parents: Vec<RecordId>,
    variation: Option<VariationOperator>,
    generation: u64,
    budget: Option<f64>,
}

/// The steady-state evolutionary search engine.
///
/// Construction validates the configuration (two-phase build) and stands up
/// the worker pool; [`optimize`](SteadyStateEvolver::optimize) drives the
/// loop. The full population store — all records, including failures — and
/// the rank-0 pareto front remain readable after the run, including after an
/// abnormal termination.
pub struct SteadyStateEvolver<I, D, G>
where
    I: Individual,
    D: Send + Sync + 'static,
    G: IndividualGenerator<I>,
{
    resolved: ResolvedConfig,
    generator: G,
    dispatcher: EvaluationDispatcher<I, D>,
    store: PopulationStore<I>,
    population: Vec<RecordId>,
    parent_selector: Box<dyn ParentSelector>,
    survival_selector: Box<dyn SurvivalSelector>,
    rng: RandomNumberGenerator,
    cancel: CancellationToken,
    state: EvolverState,
    submitted: u64,
    pending: HashMap<JobHandle, PendingJob<I>>,
}

impl<I, D, G> SteadyStateEvolver<I, D, G>
where
    I: Individual,
    D: Send + Sync + 'static,
    G: IndividualGenerator<I>,
{
    /// Validates `config` against the objective set and builds the engine.
    ///
    /// # Arguments
    ///
    /// * `config` - The raw configuration surface.
    /// * `objectives` - The objective set evaluated per individual.
    /// * `data` - The dataset, published once to the worker pool and
    ///   referenced by every evaluation.
    /// * `generator` - The initial population source.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` for malformed parameters and
    /// `EvolveError::WorkerPool` when the pool cannot be built. No
    /// evaluation starts before both checks pass.
    pub fn new(
        config: EvolverConfig,
        objectives: ObjectiveSet<I, D>,
        data: D,
        generator: G,
    ) -> Result<Self> {
        let resolved = config.validate(objectives.len())?;
        let n_objectives = objectives.len();

        let dispatcher = EvaluationDispatcher::new(
            DispatchConfig {
                n_workers: resolved.n_workers,
                max_eval_time: resolved.max_eval_time,
            },
            objectives,
            data,
        )?;

        let rng = RandomNumberGenerator::from_seed(resolved.seed);
        Ok(Self {
            resolved,
            generator,
            dispatcher,
            store: PopulationStore::new(n_objectives),
            population: Vec::new(),
            parent_selector: Box::new(DominatedTournament::default()),
            survival_selector: Box::new(NsgaIISurvival::new()),
            rng,
            cancel: CancellationToken::default(),
            state: EvolverState::Init,
            submitted: 0,
            pending: HashMap::new(),
        })
    }

    /// Replaces the default dominated-tournament parent selection.
    pub fn with_parent_selector(mut self, selector: impl ParentSelector + 'static) -> Self {
        self.parent_selector = Box::new(selector);
        self
    }

    /// Replaces the default NSGA-II survival selection.
    pub fn with_survival_selector(mut self, selector: impl SurvivalSelector + 'static) -> Self {
        self.survival_selector = Box::new(selector);
        self
    }

    /// A token that cancels the run from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current phase of the run.
    pub fn state(&self) -> EvolverState {
        self.state
    }

    /// Read-only view of every evaluated individual, including failures.
    pub fn population_store(&self) -> &PopulationStore<I> {
        &self.store
    }

    /// The rank-0 pareto front of the store.
    pub fn pareto_front(&self) -> Vec<&ScoreRecord<I>> {
        self.store.pareto_front()
    }

    /// The resolved configuration in force (derived weights, schedules,
    /// the seed actually used).
    pub fn resolved_config(&self) -> &ResolvedConfig {
        &self.resolved
    }

    /// Runs the optimization until a termination predicate fires.
    ///
    /// Re-invocation resets all state unless `warm_start` is enabled, in
    /// which case the run resumes from the last checkpoint snapshot (row
    /// count preserved, no duplication of prior rows).
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::WorkerPool` if the execution substrate is lost
    /// mid-run and `EvolveError::Checkpoint` for an unreadable warm-start
    /// snapshot. The population store stays consistent and queryable in
    /// every error case.
    pub fn optimize(&mut self) -> Result<()> {
        let fresh = self.reset_or_resume()?;
        let started = Instant::now();
        let mut early_stop = EarlyStopMonitor::new(
            self.resolved.tolerances.clone(),
            self.resolved.early_stop,
            self.resolved.early_stop_mins,
        );

        info!(
            seed = self.resolved.seed,
            population_size = self.resolved.population_size,
            n_workers = self.resolved.n_workers,
            resumed = !fresh,
            "starting optimization"
        );

        // A resumed store may already satisfy a termination predicate.
        let mut remaining_initial = 0usize;
        let pre_terminated = self.check_termination(started, &early_stop);
        if pre_terminated.is_none() {
            if fresh {
                self.state = EvolverState::Warmup;
                remaining_initial = self.resolved.initial_population_size;
                while remaining_initial > 0
                    && self.dispatcher.in_flight() < self.resolved.n_workers
                {
                    self.submit_generated();
                    remaining_initial -= 1;
                }
                if remaining_initial == 0 {
                    self.state = EvolverState::Steady;
                }
            } else {
                // Prime the pump: steady-state submissions are otherwise
                // completion-driven.
                self.state = EvolverState::Steady;
                for _ in 0..self.resolved.n_workers {
                    self.submit_offspring()?;
                }
            }
        }

        let outcome = match pre_terminated {
            Some(reason) => Ok(reason),
            None => self.run_loop(started, &mut early_stop, remaining_initial),
        };

        match outcome {
            Ok(reason) => {
                info!(?reason, evaluated = self.store.len(), "terminating");
                self.state = EvolverState::Draining;
                let stragglers = self.dispatcher.drain(self.resolved.drain_grace);
                for completion in stragglers {
                    if let Err(e) = self.absorb(completion, &mut early_stop) {
                        warn!(error = %e, "failed to record straggler result");
                    }
                }
                self.finalize();
                Ok(())
            }
            Err(e) => {
                // Abort, preserving everything evaluated so far.
                warn!(error = %e, "run aborted");
                self.pending.clear();
                self.finalize();
                Err(e)
            }
        }
    }

    /// The completion-driven control loop. Never blocks on an individual
    /// evaluation: it polls for arbitrary completions and processes them in
    /// arrival order, so slow individuals do not head-of-line-block faster
    /// ones.
    fn run_loop(
        &mut self,
        started: Instant,
        early_stop: &mut EarlyStopMonitor,
        mut remaining_initial: usize,
    ) -> Result<TerminationReason> {
        'steady: loop {
            let completions = self.dispatcher.poll_completed()?;

            if completions.is_empty() {
                // Wall clock and cancellation fire even while idle.
                if let Some(reason) = self.check_time_or_cancel(started) {
                    return Ok(reason);
                }
                if self.dispatcher.in_flight() == 0 && remaining_initial == 0 {
                    return Err(EvolveError::WorkerPool(
                        "no evaluations in flight and none left to submit".to_string(),
                    ));
                }
                std::thread::sleep(Duration::from_millis(2));
                continue;
            }

            // Results that arrived in the same batch as a termination
            // trigger are still recorded; only submissions stop.
            let mut terminated = None;
            for completion in completions {
                self.absorb(completion, early_stop)?;
                self.maybe_checkpoint();

                if terminated.is_some() {
                    continue;
                }
                if let Some(reason) = self.check_termination(started, early_stop) {
                    terminated = Some(reason);
                    continue;
                }

                // One submission per completion keeps the in-flight count
                // pinned at the concurrency limit.
                if remaining_initial > 0 {
                    self.submit_generated();
                    remaining_initial -= 1;
                    if remaining_initial == 0 {
                        self.state = EvolverState::Steady;
                    }
                } else {
                    for _ in 0..self.resolved.replacements_per_completion {
                        self.submit_offspring()?;
                    }
                }
            }
            if let Some(reason) = terminated {
                break 'steady Ok(reason);
            }
        }
    }

    /// Records one completion: appends the score record, refreshes the
    /// frontier and early-stop state, and trims the eligible population back
    /// to its target size.
    fn absorb(&mut self, completion: Completion, early_stop: &mut EarlyStopMonitor) -> Result<()> {
        let Some(job) = self.pending.remove(&completion.handle) else {
            warn!(handle = ?completion.handle, "completion for unknown job; dropping");
            return Ok(());
        };

        let n = self.resolved.weights.len();
        let (scores, error) = match completion.outcome {
            EvalOutcome::Scores(values) => {
                (values.into_iter().map(ObjectiveValue::Score).collect(), None)
            }
            EvalOutcome::Timeout => (vec![ObjectiveValue::Timeout; n], None),
            EvalOutcome::Invalid(diagnostic) => {
                (vec![ObjectiveValue::Invalid; n], Some(diagnostic))
            }
        };

        let id = self.store.push(
            NewRecord {
                individual: job.individual,
                scores,
                parents: job.parents,
                variation: job.variation,
                generation: job.generation,
                budget: job.budget,
                started_at: completion.started_at,
                finished_at: completion.finished_at,
                error,
            },
            &self.resolved.weights,
        )?;

        let record = self.store.get(id).expect("record just inserted");
        let row = record.weighted_row(&self.resolved.weights);
        debug!(
            id = id.index(),
            generation = record.generation,
            failed = record.is_failure(),
            "recorded evaluation"
        );
        early_stop.observe(&row);

        self.population.push(id);
        if self.population.len() > self.resolved.population_size {
            self.trim_population()?;
        }
        Ok(())
    }

    /// Survival selection back down to the target population size.
    fn trim_population(&mut self) -> Result<()> {
        let rows: Vec<WeightedRow> = self
            .population
            .iter()
            .map(|id| {
                self.store
                    .get(*id)
                    .expect("population ids are valid")
                    .weighted_row(&self.resolved.weights)
            })
            .collect();
        let survivors = self.survival_selector.select(
            &rows,
            self.resolved.population_size,
            &mut self.rng,
        )?;
        let next: Vec<RecordId> = survivors.into_iter().map(|i| self.population[i]).collect();
        self.population = next;
        Ok(())
    }

    /// Submits one freshly generated individual (warmup).
    fn submit_generated(&mut self) {
        let individual = self.generator.generate(&mut self.rng);
        self.submit_job(individual, Vec::new(), None, 0);
    }

    /// Selects parents, applies one variation operator, and submits the
    /// offspring.
    fn submit_offspring(&mut self) -> Result<()> {
        let operator = self.resolved.variation.sample(&mut self.rng);
        let n_parents = if operator.requires_two_parents() { 2 } else { 1 };

        let rows: Vec<WeightedRow> = self
            .population
            .iter()
            .map(|id| {
                self.store
                    .get(*id)
                    .expect("population ids are valid")
                    .weighted_row(&self.resolved.weights)
            })
            .collect();
        let picks = self
            .parent_selector
            .select(&rows, n_parents, &mut self.rng)?;

        let parent_ids: Vec<RecordId> = picks.iter().map(|&i| self.population[i]).collect();
        let parents: Vec<I> = parent_ids
            .iter()
            .map(|id| {
                self.store
                    .get(*id)
                    .expect("population ids are valid")
                    .individual
                    .clone()
            })
            .collect();
        let generation = 1 + parent_ids
            .iter()
            .map(|id| self.store.get(*id).expect("population ids are valid").generation)
            .max()
            .unwrap_or(0);

        let child = operator.apply(&parents, &mut self.rng)?;
        self.submit_job(child, parent_ids, Some(operator), generation);
        Ok(())
    }

    fn submit_job(
        &mut self,
        individual: I,
        parents: Vec<RecordId>,
        variation: Option<VariationOperator>,
        generation: u64,
    ) {
        let budget = self
            .resolved
            .budget
            .as_ref()
            .map(|schedule| schedule.budget_for(self.submitted));
        let handle = self.dispatcher.submit(individual.clone(), budget);
        self.pending.insert(
            handle,
            PendingJob {
                individual,
                parents,
                variation,
                generation,
                budget,
            },
        );
        self.submitted += 1;
    }

    /// Termination predicates in first-true-wins order, checked on every
    /// completion.
    fn check_termination(
        &self,
        started: Instant,
        early_stop: &EarlyStopMonitor,
    ) -> Option<TerminationReason> {
        if let Some(limit) = self.resolved.max_time {
            if started.elapsed() >= limit {
                return Some(TerminationReason::MaxTime);
            }
        }
        if let Some(limit) = self.resolved.max_evaluated_individuals {
            if self.store.len() as u64 >= limit {
                return Some(TerminationReason::MaxEvaluatedIndividuals);
            }
        }
        if early_stop.should_stop() {
            return Some(TerminationReason::EarlyStop);
        }
        if self.cancel.is_cancelled() {
            return Some(TerminationReason::Cancelled);
        }
        None
    }

    /// The subset of predicates that can fire without a completion.
    fn check_time_or_cancel(&self, started: Instant) -> Option<TerminationReason> {
        if let Some(limit) = self.resolved.max_time {
            if started.elapsed() >= limit {
                return Some(TerminationReason::MaxTime);
            }
        }
        if self.cancel.is_cancelled() {
            return Some(TerminationReason::Cancelled);
        }
        None
    }

    /// Periodic snapshot on the configured cadence. Write failures lose no
    /// evaluated rows (the next cadence retries), so they only warn.
    fn maybe_checkpoint(&self) {
        let Some(folder) = &self.resolved.checkpoint_folder else {
            return;
        };
        if self.store.len() as u64 % self.resolved.checkpoint_interval != 0 {
            return;
        }
        let snapshot = CheckpointSnapshot {
            records: self.store.records().to_vec(),
            submitted: self.submitted,
        };
        if let Err(e) = checkpoint::save(folder, &snapshot) {
            warn!(error = %e, "periodic checkpoint failed");
        }
    }

    /// Exact pareto ranking over the whole history, plus a final snapshot.
    fn finalize(&mut self) {
        self.store.assign_fronts(&self.resolved.weights);
        if let Some(folder) = &self.resolved.checkpoint_folder {
            let snapshot = CheckpointSnapshot {
                records: self.store.records().to_vec(),
                submitted: self.submitted,
            };
            if let Err(e) = checkpoint::save(folder, &snapshot) {
                warn!(error = %e, "final checkpoint failed");
            }
        }
        self.state = EvolverState::Done;
        info!(
            evaluated = self.store.len(),
            frontier = self.store.pareto_front().len(),
            "optimization finished"
        );
    }

    /// Re-initializes run state, or restores it from the last snapshot when
    /// warm start is enabled.
    fn reset_or_resume(&mut self) -> Result<bool> {
        self.state = EvolverState::Init;
        self.pending.clear();
        // Abandon stragglers from a previous invocation of optimize().
        if self.dispatcher.in_flight() > 0 {
            self.dispatcher.drain(Duration::ZERO);
        }

        let n_objectives = self.resolved.weights.len();
        if self.resolved.warm_start {
            if let Some(folder) = self.resolved.checkpoint_folder.clone() {
                if let Some(snapshot) = checkpoint::load::<I>(&folder)? {
                    if !snapshot.records.is_empty() {
                        let store = PopulationStore::from_records(n_objectives, snapshot.records)?;
                        self.submitted = snapshot.submitted.max(store.len() as u64);
                        self.rng = RandomNumberGenerator::from_seed(
                            self.resolved.seed.wrapping_add(self.submitted),
                        );
                        self.store = store;
                        self.restore_population()?;
                        info!(
                            restored = self.store.len(),
                            submitted = self.submitted,
                            "warm start from checkpoint"
                        );
                        return Ok(false);
                    }
                }
            }
        }

        self.store = PopulationStore::new(n_objectives);
        self.population.clear();
        self.submitted = 0;
        self.rng = RandomNumberGenerator::from_seed(self.resolved.seed);
        Ok(true)
    }

    /// Rebuilds the parent-eligible population from a restored store.
    fn restore_population(&mut self) -> Result<()> {
        let rows: Vec<WeightedRow> = self
            .store
            .records()
            .iter()
            .map(|r| r.weighted_row(&self.resolved.weights))
            .collect();
        let survivors = self.survival_selector.select(
            &rows,
            self.resolved.population_size,
            &mut self.rng,
        )?;
        self.population = survivors
            .into_iter()
            .map(|i| self.store.records()[i].id)
            .collect();
        Ok(())
    }
}
