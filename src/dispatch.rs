//! # Evaluation dispatch
//!
//! The [`EvaluationDispatcher`] owns the worker pool: it submits evaluation
//! jobs, tracks in-flight work, enforces the per-evaluation hard timeout, and
//! surfaces completions in arrival order (not submission order) through a
//! non-blocking [`poll_completed`](EvaluationDispatcher::poll_completed).
//!
//! The dataset needed by the objectives is published once to the pool as a
//! shared read-only handle at construction time and referenced by every
//! evaluation (broadcast-once, reference-many). Worker failures never
//! propagate: a panicking or erroring objective resolves to an `Invalid`
//! outcome with its diagnostic captured, and an evaluation that outlives its
//! deadline resolves to `Timeout` while its eventual result is discarded.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::warn;

use crate::error::{EvolveError, Result};
use crate::objective::ObjectiveSet;

/// Worker-pool settings, passed explicitly to the dispatcher constructor.
/// There is no process-global execution state to mutate.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of worker threads; also the steady-state in-flight target.
    pub n_workers: usize,
    /// Hard per-evaluation deadline. `None` disables the timeout.
    pub max_eval_time: Option<Duration>,
}

/// Handle identifying one submitted evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(u64);

/// Terminal state of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// The objective set produced a full score vector.
    Scores(Vec<f64>),
    /// The evaluation exceeded its deadline.
    Timeout,
    /// The evaluation errored or panicked; the diagnostic is captured.
    Invalid(String),
}

/// One completed evaluation, in arrival order.
#[derive(Debug, Clone)]
pub struct Completion {
    pub handle: JobHandle,
    pub outcome: EvalOutcome,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
}

struct WorkerMessage {
    handle: JobHandle,
    result: std::result::Result<Vec<f64>, String>,
    started_at: SystemTime,
    finished_at: SystemTime,
}

struct InFlightJob {
    submitted_at: SystemTime,
    deadline: Option<Instant>,
}

/// Dispatches evaluations to a rayon worker pool and collects completions.
pub struct EvaluationDispatcher<I, D> {
    pool: rayon::ThreadPool,
    objectives: Arc<ObjectiveSet<I, D>>,
    data: Arc<D>,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    in_flight: HashMap<JobHandle, InFlightJob>,
    max_eval_time: Option<Duration>,
    next_handle: u64,
}

impl<I, D> EvaluationDispatcher<I, D>
where
    I: Send + 'static,
    D: Send + Sync + 'static,
{
    /// Builds the worker pool and publishes the dataset to it.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Configuration` for a zero-sized pool and
    /// `EvolveError::WorkerPool` if the thread pool cannot be created.
    pub fn new(config: DispatchConfig, objectives: ObjectiveSet<I, D>, data: D) -> Result<Self> {
        if config.n_workers == 0 {
            return Err(EvolveError::Configuration(
                "Worker pool size must be at least 1".to_string(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_workers)
            .build()
            .map_err(|e| EvolveError::WorkerPool(format!("failed to build worker pool: {}", e)))?;

        let (tx, rx) = channel();
        Ok(Self {
            pool,
            objectives: Arc::new(objectives),
            data: Arc::new(data),
            tx,
            rx,
            in_flight: HashMap::new(),
            max_eval_time: config.max_eval_time,
            next_handle: 0,
        })
    }

    /// Submits one individual for evaluation and returns its handle.
    ///
    /// The individual is stamped with `budget` for the lifetime of the job.
    /// The call never blocks: if every worker is busy the job queues inside
    /// the pool.
    pub fn submit(&mut self, individual: I, budget: Option<f64>) -> JobHandle {
        let handle = JobHandle(self.next_handle);
        self.next_handle += 1;

        self.in_flight.insert(
            handle,
            InFlightJob {
                submitted_at: SystemTime::now(),
                deadline: self.max_eval_time.map(|limit| Instant::now() + limit),
            },
        );

        let objectives = Arc::clone(&self.objectives);
        let data = Arc::clone(&self.data);
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let started_at = SystemTime::now();
            let result = catch_unwind(AssertUnwindSafe(|| {
                objectives.evaluate(&individual, &data, budget)
            }))
            .unwrap_or_else(|panic| Err(panic_message(&*panic)));
            let finished_at = SystemTime::now();
            // The receiver may be gone during teardown; nothing to do then.
            let _ = tx.send(WorkerMessage {
                handle,
                result,
                started_at,
                finished_at,
            });
        });

        handle
    }

    /// Number of submitted evaluations not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Collects every completion that has arrived since the last poll, in
    /// arrival order, then resolves expired jobs to `Timeout`. Non-blocking.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::WorkerPool` if the result channel is lost while
    /// evaluations are still in flight.
    pub fn poll_completed(&mut self) -> Result<Vec<Completion>> {
        let mut completions = Vec::new();

        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    let Some(job) = self.in_flight.remove(&message.handle) else {
                        // Already resolved as a timeout or abandoned in a
                        // drain; the worker's late result is dropped.
                        warn!(handle = ?message.handle, "discarding late evaluation result");
                        continue;
                    };
                    let expired = job
                        .deadline
                        .map(|deadline| Instant::now() > deadline)
                        .unwrap_or(false);
                    let outcome = if expired {
                        warn!(handle = ?message.handle, "evaluation exceeded its deadline");
                        EvalOutcome::Timeout
                    } else {
                        match message.result {
                            Ok(scores) => EvalOutcome::Scores(scores),
                            Err(diagnostic) => EvalOutcome::Invalid(diagnostic),
                        }
                    };
                    completions.push(Completion {
                        handle: message.handle,
                        outcome,
                        started_at: message.started_at,
                        finished_at: message.finished_at,
                    });
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.in_flight.is_empty() {
                        break;
                    }
                    return Err(EvolveError::WorkerPool(
                        "result channel disconnected with evaluations in flight".to_string(),
                    ));
                }
            }
        }

        // Expired jobs resolve to Timeout without waiting for the worker.
        let now = Instant::now();
        let expired: Vec<JobHandle> = self
            .in_flight
            .iter()
            .filter(|(_, job)| job.deadline.map(|d| now > d).unwrap_or(false))
            .map(|(&handle, _)| handle)
            .collect();
        for handle in expired {
            let job = self.in_flight.remove(&handle).expect("job tracked as expired");
            warn!(handle = ?handle, "evaluation timed out");
            completions.push(Completion {
                handle,
                outcome: EvalOutcome::Timeout,
                started_at: job.submitted_at,
                finished_at: SystemTime::now(),
            });
        }

        Ok(completions)
    }

    /// Waits up to `grace` for in-flight evaluations, collecting whatever
    /// arrives. Jobs still unresolved afterwards are abandoned: their results
    /// will be discarded if they ever arrive.
    pub fn drain(&mut self, grace: Duration) -> Vec<Completion> {
        let deadline = Instant::now() + grace;
        let mut completions = Vec::new();

        while !self.in_flight.is_empty() && Instant::now() < deadline {
            match self.poll_completed() {
                Ok(batch) => completions.extend(batch),
                Err(_) => break,
            }
            if !self.in_flight.is_empty() {
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        if !self.in_flight.is_empty() {
            warn!(
                abandoned = self.in_flight.len(),
                "drain grace period elapsed; abandoning in-flight evaluations"
            );
            self.in_flight.clear();
        }

        completions
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("objective panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("objective panicked: {}", message)
    } else {
        "objective panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvolveError;

    fn dispatcher_with<F>(
        n_workers: usize,
        max_eval_time: Option<Duration>,
        objective: F,
    ) -> EvaluationDispatcher<u32, ()>
    where
        F: Fn(&u32, &(), Option<f64>) -> Result<Vec<f64>> + Send + Sync + 'static,
    {
        let objectives = ObjectiveSet::new(vec!["score".into()]).add_objective(objective);
        EvaluationDispatcher::new(
            DispatchConfig {
                n_workers,
                max_eval_time,
            },
            objectives,
            (),
        )
        .unwrap()
    }

    fn wait_for_completions(
        dispatcher: &mut EvaluationDispatcher<u32, ()>,
        expected: usize,
    ) -> Vec<Completion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut completions = Vec::new();
        while completions.len() < expected && Instant::now() < deadline {
            completions.extend(dispatcher.poll_completed().unwrap());
            std::thread::sleep(Duration::from_millis(2));
        }
        completions
    }

    #[test]
    fn test_submit_and_poll_round_trip() {
        let mut dispatcher =
            dispatcher_with(2, None, |ind: &u32, _: &(), _| Ok(vec![*ind as f64]));

        dispatcher.submit(7, None);
        let completions = wait_for_completions(&mut dispatcher, 1);

        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].outcome, EvalOutcome::Scores(vec![7.0]));
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn test_erroring_objective_resolves_to_invalid() {
        let mut dispatcher = dispatcher_with(1, None, |_: &u32, _: &(), _| {
            Err(EvolveError::Other("bad pipeline".to_string()))
        });

        dispatcher.submit(0, None);
        let completions = wait_for_completions(&mut dispatcher, 1);

        match &completions[0].outcome {
            EvalOutcome::Invalid(message) => assert!(message.contains("bad pipeline")),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_panicking_objective_resolves_to_invalid() {
        let mut dispatcher =
            dispatcher_with(1, None, |_: &u32, _: &(), _| panic!("worker exploded"));

        dispatcher.submit(0, None);
        let completions = wait_for_completions(&mut dispatcher, 1);

        match &completions[0].outcome {
            EvalOutcome::Invalid(message) => assert!(message.contains("worker exploded")),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_slow_evaluation_resolves_to_timeout() {
        let mut dispatcher =
            dispatcher_with(1, Some(Duration::from_millis(10)), |_: &u32, _: &(), _| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(vec![1.0])
            });

        dispatcher.submit(0, None);
        std::thread::sleep(Duration::from_millis(30));
        let completions = dispatcher.poll_completed().unwrap();

        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].outcome, EvalOutcome::Timeout);
        assert_eq!(dispatcher.in_flight(), 0);

        // The worker's late result must be discarded, not resurface.
        std::thread::sleep(Duration::from_millis(250));
        assert!(dispatcher.poll_completed().unwrap().is_empty());
    }

    #[test]
    fn test_completions_surface_in_arrival_order() {
        let mut dispatcher = dispatcher_with(2, None, |ind: &u32, _: &(), _| {
            if *ind == 0 {
                std::thread::sleep(Duration::from_millis(100));
            }
            Ok(vec![*ind as f64])
        });

        // The slow job is submitted first but must complete last.
        dispatcher.submit(0, None);
        dispatcher.submit(1, None);
        let completions = wait_for_completions(&mut dispatcher, 2);

        assert_eq!(completions[0].outcome, EvalOutcome::Scores(vec![1.0]));
        assert_eq!(completions[1].outcome, EvalOutcome::Scores(vec![0.0]));
    }

    #[test]
    fn test_drain_abandons_unfinished_work() {
        let mut dispatcher = dispatcher_with(1, None, |_: &u32, _: &(), _| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(vec![1.0])
        });

        dispatcher.submit(0, None);
        let completions = dispatcher.drain(Duration::from_millis(20));

        assert!(completions.is_empty());
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let objectives: ObjectiveSet<u32, ()> = ObjectiveSet::new(vec!["score".into()]);
        let result = EvaluationDispatcher::new(
            DispatchConfig {
                n_workers: 0,
                max_eval_time: None,
            },
            objectives,
            (),
        );
        assert!(matches!(result, Err(EvolveError::Configuration(_))));
    }
}
