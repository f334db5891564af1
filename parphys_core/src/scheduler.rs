//! Worker pool and frame scheduler.
//!
//! A fixed set of worker threads is spawned once and fed batches over a
//! shared job channel. Each frame gets its own event channel; the driver
//! collects per-object results until every batch is terminal or the
//! deadline passes, so a frame never blocks indefinitely. Results that
//! arrive after the driver has returned are dropped with the channel.
//!
//! ```text
//!   run_frame ──jobs──► [worker 0] [worker 1] ... [worker N-1]
//!       ▲                   │          │               │
//!       └──────events───────┴──────────┴───────────────┘
//! ```

use crate::batcher::{check_disjoint, Batch};
use crate::error::{EngineError, PartitionError, UpdateError};
use crate::state::{Frame, ObjectId, PhysicsObject};
use crate::update::{execute_update, ObjectUpdate, UpdateFn};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Extra time the driver waits past the deadline for workers to report.
pub const DEADLINE_GRACE: Duration = Duration::from_millis(50);

/// How long dropping the pool waits for workers to exit.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run-level cancellation signal shared with every worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops workers from starting further object updates.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one batch within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Dispatched,
    Running,
    /// Every object updated successfully
    Completed,
    /// Ran to the end with at least one failed object
    Failed,
    /// Deadline reached before every object was processed
    TimedOut,
    /// Run cancelled before every object was processed
    Cancelled,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchState::Dispatched | BatchState::Running)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BatchState::Dispatched => "dispatched",
            BatchState::Running => "running",
            BatchState::Completed => "completed",
            BatchState::Failed => "failed",
            BatchState::TimedOut => "timed_out",
            BatchState::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one object in one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Updated(ObjectUpdate),
    Failed { error: UpdateError, prior: PhysicsObject },
    TimedOut { prior: PhysicsObject },
    Cancelled { prior: PhysicsObject },
}

impl FrameOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FrameOutcome::Updated(_))
    }
}

/// Per-object result consumed by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub id: ObjectId,
    pub batch: usize,
    pub outcome: FrameOutcome,
}

/// Terminal summary of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub state: BatchState,
    pub object_count: usize,
    /// Objects with a completed (successful or failed) update
    pub processed: usize,
    pub predicted_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_us: Option<u64>,
}

/// Everything the scheduler produced for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameExecution {
    pub results: Vec<FrameResult>,
    pub batches: Vec<BatchOutcome>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Deadline,
    Cancelled,
}

enum WorkerEvent {
    Started {
        batch: usize,
        worker: usize,
    },
    Object(FrameResult),
    Finished {
        batch: usize,
        stop: Option<StopReason>,
        elapsed: Duration,
    },
}

struct Job {
    frame: Arc<Frame>,
    batch: Batch,
    dt: f64,
    /// `None` when the deadline is too far out to represent
    deadline: Option<Instant>,
    cancel: CancelToken,
    events: Sender<WorkerEvent>,
}

/// Fixed-size pool of long-lived worker threads.
pub struct WorkerPool {
    worker_count: usize,
    update_name: String,
    jobs: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers sharing `update_fn`.
    pub fn new(worker_count: usize, update_fn: Arc<dyn UpdateFn>) -> Result<Self, EngineError> {
        if worker_count == 0 {
            return Err(crate::error::ConfigError::ZeroWorkers.into());
        }

        let (jobs_tx, jobs_rx) = channel::unbounded::<Job>();
        let update_name = update_fn.name().to_string();
        let mut handles = Vec::with_capacity(worker_count);

        for worker in 0..worker_count {
            let jobs = jobs_rx.clone();
            let update_fn = Arc::clone(&update_fn);
            let handle = thread::Builder::new()
                .name(format!("parphys-worker-{}", worker))
                .spawn(move || worker_loop(worker, jobs, update_fn))
                .map_err(|source| EngineError::WorkerSpawn { worker, source })?;
            handles.push(handle);
        }

        debug!(worker_count, update = %update_name, "worker pool started");

        Ok(Self {
            worker_count,
            update_name,
            jobs: Some(jobs_tx),
            handles,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn update_name(&self) -> &str {
        &self.update_name
    }

    /// Executes one frame's batches and waits at the frame barrier.
    ///
    /// Returns once every batch is terminal, or once `deadline` (plus
    /// [`DEADLINE_GRACE`]) has elapsed. A deadline too large to add to the
    /// current instant, such as [`Duration::MAX`], never expires. Objects
    /// without a reported result at that point are returned as timed out
    /// (or cancelled, if `cancel` fired) with their prior state.
    ///
    /// Batches must be disjoint and reference active objects of `frame`;
    /// anything else is [`EngineError::InvalidBatchPartition`].
    pub fn run_frame(
        &self,
        frame: &Arc<Frame>,
        batches: &[Batch],
        dt: f64,
        deadline: Duration,
        cancel: &CancelToken,
    ) -> Result<FrameExecution, EngineError> {
        check_disjoint(batches)?;
        for id in batches.iter().flat_map(|b| b.object_ids.iter()) {
            if !frame.object(*id).is_some_and(PhysicsObject::is_active) {
                return Err(PartitionError::Unknown(*id).into());
            }
        }

        let started = Instant::now();
        if batches.is_empty() {
            return Ok(FrameExecution::default());
        }

        let jobs = self.jobs.as_ref().ok_or(EngineError::PoolShutDown)?;
        let deadline_at = started.checked_add(deadline);
        let wait_until = deadline_at.and_then(|at| at.checked_add(DEADLINE_GRACE));
        let (events_tx, events_rx) = channel::unbounded();

        for batch in batches {
            let job = Job {
                frame: Arc::clone(frame),
                batch: batch.clone(),
                dt,
                deadline: deadline_at,
                cancel: cancel.clone(),
                events: events_tx.clone(),
            };
            jobs.send(job).map_err(|_| EngineError::PoolShutDown)?;
        }
        drop(events_tx);

        let mut outcomes: Vec<BatchOutcome> = batches
            .iter()
            .map(|b| BatchOutcome {
                index: b.index,
                state: BatchState::Dispatched,
                object_count: b.len(),
                processed: 0,
                predicted_cost: b.predicted_cost,
                worker: None,
                elapsed_us: None,
            })
            .collect();
        let mut stops: Vec<Option<StopReason>> = vec![None; batches.len()];
        let mut had_failure = vec![false; batches.len()];
        let mut reported = BTreeSet::new();
        let mut results = Vec::with_capacity(batches.iter().map(Batch::len).sum());
        let mut pending = batches.len();

        let slot = |batch: usize| batches.iter().position(|b| b.index == batch);

        while pending > 0 {
            let received = match wait_until {
                Some(at) => events_rx.recv_deadline(at),
                None => events_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            let event = match received {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("workers dropped their event channels mid-frame");
                    break;
                }
            };

            match event {
                WorkerEvent::Started { batch, worker } => {
                    if let Some(i) = slot(batch) {
                        outcomes[i].state = BatchState::Running;
                        outcomes[i].worker = Some(worker);
                    }
                }
                WorkerEvent::Object(result) => {
                    if let Some(i) = slot(result.batch) {
                        outcomes[i].processed += 1;
                        had_failure[i] |= !result.outcome.is_success();
                    }
                    reported.insert(result.id);
                    results.push(result);
                }
                WorkerEvent::Finished {
                    batch,
                    stop,
                    elapsed,
                } => {
                    if let Some(i) = slot(batch) {
                        stops[i] = stop;
                        outcomes[i].elapsed_us = Some(elapsed.as_micros() as u64);
                        outcomes[i].state = match stop {
                            Some(StopReason::Deadline) => BatchState::TimedOut,
                            Some(StopReason::Cancelled) => BatchState::Cancelled,
                            None if had_failure[i] => BatchState::Failed,
                            None => BatchState::Completed,
                        };
                        pending -= 1;
                    }
                }
            }
        }

        for (i, batch) in batches.iter().enumerate() {
            if !outcomes[i].state.is_terminal() {
                let reason = if cancel.is_cancelled() {
                    StopReason::Cancelled
                } else {
                    StopReason::Deadline
                };
                stops[i] = Some(reason);
                outcomes[i].state = match reason {
                    StopReason::Cancelled => BatchState::Cancelled,
                    StopReason::Deadline => BatchState::TimedOut,
                };
                warn!(
                    batch = batch.index,
                    processed = outcomes[i].processed,
                    objects = batch.len(),
                    "batch did not finish before the deadline"
                );
            }

            let reason = stops[i].unwrap_or(StopReason::Deadline);
            for id in batch.object_ids.iter().filter(|id| !reported.contains(*id)) {
                let Some(prior) = frame.object(*id).cloned() else {
                    continue;
                };
                let outcome = match reason {
                    StopReason::Deadline => FrameOutcome::TimedOut { prior },
                    StopReason::Cancelled => FrameOutcome::Cancelled { prior },
                };
                results.push(FrameResult {
                    id: *id,
                    batch: batch.index,
                    outcome,
                });
            }
        }

        Ok(FrameExecution {
            results,
            batches: outcomes,
            elapsed: started.elapsed(),
        })
    }

    /// Stops accepting work and waits up to `timeout` for workers to exit.
    ///
    /// Workers stuck inside an update are detached rather than joined.
    pub fn shutdown(&mut self, timeout: Duration) {
        self.jobs.take();
        let give_up = Instant::now() + timeout;

        for handle in self.handles.drain(..) {
            while !handle.is_finished() && Instant::now() < give_up {
                thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("worker thread exited with a panic");
                }
            } else {
                warn!(
                    thread = handle.thread().name().unwrap_or("worker"),
                    "worker still busy at shutdown; detaching"
                );
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(SHUTDOWN_TIMEOUT);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("update", &self.update_name)
            .field("running", &self.jobs.is_some())
            .finish()
    }
}

fn worker_loop(worker: usize, jobs: Receiver<Job>, update_fn: Arc<dyn UpdateFn>) {
    while let Ok(job) = jobs.recv() {
        run_batch(worker, job, update_fn.as_ref());
    }
}

fn run_batch(worker: usize, job: Job, update_fn: &dyn UpdateFn) {
    let started = Instant::now();
    let batch = job.batch.index;
    if job.events.send(WorkerEvent::Started { batch, worker }).is_err() {
        return;
    }

    let mut stop = None;
    for id in &job.batch.object_ids {
        if job.cancel.is_cancelled() {
            stop = Some(StopReason::Cancelled);
            break;
        }
        if job.deadline.is_some_and(|at| Instant::now() >= at) {
            stop = Some(StopReason::Deadline);
            break;
        }
        let Some(object) = job.frame.object(*id) else {
            continue;
        };

        let outcome = match execute_update(update_fn, object, job.dt, job.frame.field()) {
            Ok(update) => FrameOutcome::Updated(update),
            Err(error) => {
                debug!(object = %id, error = %error, "object update failed");
                FrameOutcome::Failed {
                    error,
                    prior: object.clone(),
                }
            }
        };

        let result = FrameResult {
            id: *id,
            batch,
            outcome,
        };
        if job.events.send(WorkerEvent::Object(result)).is_err() {
            // driver already moved on
            return;
        }
    }

    let _ = job.events.send(WorkerEvent::Finished {
        batch,
        stop,
        elapsed: started.elapsed(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateErrorKind;
    use crate::formulas::QuantumPhysicsUpdate;
    use crate::state::{FieldGrid, GridSpec};
    use crate::update::FieldRegion;
    use nalgebra::Vector3;
    use std::sync::Mutex;

    fn frame(n: u64) -> Arc<Frame> {
        let objects = (0..n)
            .map(|i| {
                PhysicsObject::new(
                    ObjectId(i),
                    Vector3::new(i as f64, 5.0, 5.0),
                    Vector3::new(1.0, 0.0, 0.0),
                    1.0,
                    10.0,
                )
            })
            .collect();
        let grid = FieldGrid::new(GridSpec::default()).unwrap();
        Arc::new(Frame::genesis(objects, grid).unwrap())
    }

    fn batch(index: usize, ids: &[u64]) -> Batch {
        Batch {
            index,
            object_ids: ids.iter().copied().map(ObjectId).collect(),
            predicted_cost: ids.len() as f64,
        }
    }

    struct FailOn(u64);

    impl UpdateFn for FailOn {
        fn apply(
            &self,
            object: &PhysicsObject,
            dt: f64,
            region: &mut FieldRegion<'_>,
        ) -> Result<PhysicsObject, UpdateError> {
            if object.id() == ObjectId(self.0) {
                return Err(UpdateError::rejected("injected"));
            }
            QuantumPhysicsUpdate.apply(object, dt, region)
        }
    }

    struct Slow(Duration);

    impl UpdateFn for Slow {
        fn apply(
            &self,
            object: &PhysicsObject,
            _dt: f64,
            _region: &mut FieldRegion<'_>,
        ) -> Result<PhysicsObject, UpdateError> {
            thread::sleep(self.0);
            Ok(object.clone())
        }
    }

    /// Blocks until the test releases it.
    struct Stuck(Mutex<Receiver<()>>);

    impl UpdateFn for Stuck {
        fn apply(
            &self,
            object: &PhysicsObject,
            _dt: f64,
            _region: &mut FieldRegion<'_>,
        ) -> Result<PhysicsObject, UpdateError> {
            if let Ok(rx) = self.0.lock() {
                let _ = rx.recv();
            }
            Ok(object.clone())
        }
    }

    struct RecordThreads(Mutex<BTreeSet<String>>);

    impl UpdateFn for RecordThreads {
        fn apply(
            &self,
            object: &PhysicsObject,
            _dt: f64,
            _region: &mut FieldRegion<'_>,
        ) -> Result<PhysicsObject, UpdateError> {
            let name = thread::current().name().unwrap_or("unnamed").to_string();
            self.0.lock().unwrap().insert(name);
            Ok(object.clone())
        }
    }

    #[test]
    fn test_all_batches_complete() {
        let pool = WorkerPool::new(3, Arc::new(QuantumPhysicsUpdate)).unwrap();
        let frame = frame(9);
        let batches = vec![batch(0, &[0, 3, 6]), batch(1, &[1, 4, 7]), batch(2, &[2, 5, 8])];

        let execution = pool
            .run_frame(&frame, &batches, 0.1, Duration::from_secs(5), &CancelToken::new())
            .unwrap();

        assert_eq!(execution.results.len(), 9);
        assert!(execution.results.iter().all(|r| r.outcome.is_success()));
        assert!(execution.batches.iter().all(|b| b.state == BatchState::Completed));
        assert!(execution.batches.iter().all(|b| b.processed == 3 && b.worker.is_some()));
    }

    #[test]
    fn test_failure_is_isolated_to_one_object() {
        let pool = WorkerPool::new(2, Arc::new(FailOn(2))).unwrap();
        let frame = frame(6);
        let batches = vec![batch(0, &[0, 1, 2, 3]), batch(1, &[4, 5])];

        let execution = pool
            .run_frame(&frame, &batches, 0.1, Duration::from_secs(5), &CancelToken::new())
            .unwrap();

        let failed: Vec<&FrameResult> = execution
            .results
            .iter()
            .filter(|r| !r.outcome.is_success())
            .collect();
        assert_eq!(failed.len(), 1);
        match &failed[0].outcome {
            FrameOutcome::Failed { error, prior } => {
                assert_eq!(error.kind(), UpdateErrorKind::Rejected);
                assert_eq!(prior, frame.object(ObjectId(2)).unwrap());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(execution.results.len(), 6);
        assert_eq!(execution.batches[0].state, BatchState::Failed);
        assert_eq!(execution.batches[1].state, BatchState::Completed);
    }

    #[test]
    fn test_overlapping_batches_are_fatal() {
        let pool = WorkerPool::new(2, Arc::new(QuantumPhysicsUpdate)).unwrap();
        let batches = vec![batch(0, &[0, 1]), batch(1, &[1, 2])];

        let err = pool
            .run_frame(&frame(3), &batches, 0.1, Duration::from_secs(1), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidBatchPartition(PartitionError::Duplicate(ObjectId(1)))
        ));
    }

    #[test]
    fn test_unknown_object_is_fatal() {
        let pool = WorkerPool::new(1, Arc::new(QuantumPhysicsUpdate)).unwrap();
        let err = pool
            .run_frame(&frame(2), &[batch(0, &[0, 7])], 0.1, Duration::from_secs(1), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidBatchPartition(_)));
    }

    #[test]
    fn test_empty_frame_completes_trivially() {
        let pool = WorkerPool::new(2, Arc::new(QuantumPhysicsUpdate)).unwrap();
        let execution = pool
            .run_frame(&frame(0), &[], 0.1, Duration::from_secs(1), &CancelToken::new())
            .unwrap();
        assert!(execution.results.is_empty());
        assert!(execution.batches.is_empty());
    }

    #[test]
    fn test_deadline_times_out_remaining_objects() {
        let pool = WorkerPool::new(1, Arc::new(Slow(Duration::from_millis(100)))).unwrap();
        let frame = frame(10);
        let ids: Vec<u64> = (0..10).collect();

        let execution = pool
            .run_frame(&frame, &[batch(0, &ids)], 0.1, Duration::from_millis(250), &CancelToken::new())
            .unwrap();

        assert_eq!(execution.results.len(), 10);
        assert_eq!(execution.batches[0].state, BatchState::TimedOut);

        let mut ordered = execution.results.clone();
        ordered.sort_by_key(|r| r.id);
        let timed_out = ordered
            .iter()
            .filter(|r| matches!(r.outcome, FrameOutcome::TimedOut { .. }))
            .count();
        assert!(timed_out >= 1);
        // processed objects form a prefix of the batch order
        let first_timeout = ordered
            .iter()
            .position(|r| matches!(r.outcome, FrameOutcome::TimedOut { .. }))
            .unwrap();
        assert!(ordered[first_timeout..]
            .iter()
            .all(|r| matches!(r.outcome, FrameOutcome::TimedOut { .. })));
        assert!(execution.elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_stuck_worker_does_not_block_frame() {
        let (release_tx, release_rx) = channel::unbounded();
        let pool = WorkerPool::new(1, Arc::new(Stuck(Mutex::new(release_rx)))).unwrap();
        let frame = frame(3);

        let execution = pool
            .run_frame(&frame, &[batch(0, &[0, 1, 2])], 0.1, Duration::from_millis(100), &CancelToken::new())
            .unwrap();

        assert!(execution.elapsed < Duration::from_secs(2));
        assert_eq!(execution.batches[0].state, BatchState::TimedOut);
        assert_eq!(execution.results.len(), 3);
        assert!(execution
            .results
            .iter()
            .all(|r| matches!(r.outcome, FrameOutcome::TimedOut { .. })));

        drop(release_tx);
    }

    #[test]
    fn test_cancelled_run_returns_partial_results() {
        let pool = WorkerPool::new(2, Arc::new(QuantumPhysicsUpdate)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let execution = pool
            .run_frame(&frame(4), &[batch(0, &[0, 1]), batch(1, &[2, 3])], 0.1, Duration::from_secs(5), &cancel)
            .unwrap();

        assert_eq!(execution.results.len(), 4);
        assert!(execution
            .results
            .iter()
            .all(|r| matches!(r.outcome, FrameOutcome::Cancelled { .. })));
        assert!(execution.batches.iter().all(|b| b.state == BatchState::Cancelled));
    }

    #[test]
    fn test_cancel_mid_frame_keeps_started_updates() {
        let pool = WorkerPool::new(1, Arc::new(Slow(Duration::from_millis(50)))).unwrap();
        let frame = frame(10);
        let ids: Vec<u64> = (0..10).collect();
        let cancel = CancelToken::new();

        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(120));
            trigger.cancel();
        });

        let execution = pool
            .run_frame(&frame, &[batch(0, &ids)], 0.1, Duration::from_secs(30), &cancel)
            .unwrap();
        canceller.join().unwrap();

        assert!(execution.elapsed < Duration::from_secs(5));
        assert_eq!(execution.batches[0].state, BatchState::Cancelled);
        assert_eq!(execution.results.len(), 10);

        let mut ordered = execution.results.clone();
        ordered.sort_by_key(|r| r.id);
        let updated = ordered.iter().filter(|r| r.outcome.is_success()).count();
        assert!(updated >= 1 && updated < 10, "updated={}", updated);
        assert_eq!(execution.batches[0].processed, updated);
        // updates that started before the cancel form a prefix of the batch
        assert!(ordered[..updated].iter().all(|r| r.outcome.is_success()));
        assert!(ordered[updated..]
            .iter()
            .all(|r| matches!(r.outcome, FrameOutcome::Cancelled { .. })));
    }

    #[test]
    fn test_unbounded_deadline_runs_to_completion() {
        let pool = WorkerPool::new(2, Arc::new(QuantumPhysicsUpdate)).unwrap();
        let batches = vec![batch(0, &[0, 1]), batch(1, &[2, 3])];

        let execution = pool
            .run_frame(&frame(4), &batches, 0.1, Duration::MAX, &CancelToken::new())
            .unwrap();

        assert_eq!(execution.results.len(), 4);
        assert!(execution.results.iter().all(|r| r.outcome.is_success()));
        assert!(execution.batches.iter().all(|b| b.state == BatchState::Completed));
    }

    #[test]
    fn test_pool_threads_are_reused_across_frames() {
        let recorder = Arc::new(RecordThreads(Mutex::new(BTreeSet::new())));
        let pool = WorkerPool::new(2, recorder.clone()).unwrap();
        let frame = frame(8);
        let batches = vec![batch(0, &[0, 1, 2, 3]), batch(1, &[4, 5, 6, 7])];

        for _ in 0..10 {
            pool.run_frame(&frame, &batches, 0.1, Duration::from_secs(5), &CancelToken::new())
                .unwrap();
        }

        let names = recorder.0.lock().unwrap();
        assert!(names.len() <= 2);
        assert!(names.iter().all(|n| n.starts_with("parphys-worker-")));
    }

    #[test]
    fn test_shutdown_pool_rejects_frames() {
        let mut pool = WorkerPool::new(1, Arc::new(QuantumPhysicsUpdate)).unwrap();
        pool.shutdown(Duration::from_secs(1));

        let err = pool
            .run_frame(&frame(1), &[batch(0, &[0])], 0.1, Duration::from_secs(1), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::PoolShutDown));
    }
}
