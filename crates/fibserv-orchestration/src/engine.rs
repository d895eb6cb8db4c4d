//! The engine: turns algorithm requests into executions.
//!
//! One engine owns the cooperative scheduler, the unlimited result
//! cache, and the worker configuration. Decomposable algorithms are
//! registered on the scheduler; opaque ones go to a thread or process
//! worker; the memoized recurrence fans out over cached dependency
//! tasks.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use num_bigint::BigUint;
use parking_lot::Mutex;
use tracing::{info, trace};

use fibserv_core::algorithms::binet;
use fibserv_core::algorithms::doubling::DoublingSequence;
use fibserv_core::algorithms::iterative::IterativeSequence;
use fibserv_core::{Algorithm, FibError, StepSequence, YieldPolicy};

use crate::cache::ResultCache;
use crate::scheduler::StepScheduler;
use crate::task::{ExecHandle, Task, TaskKey, TaskOutcome, Waiter, WaiterId};
use crate::worker::{ProcessWorker, ThreadWorker};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Requested cooperative yield interval for decomposable sequences.
    /// The per-sequence effective interval is derived from it (see
    /// [`YieldPolicy`]).
    pub yield_interval: u64,
    /// Executable re-invoked as `<exe> worker <algorithm> <n>` for
    /// process-isolated algorithms. `None` resolves to the current
    /// executable image at spawn time.
    pub worker_exe: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            yield_interval: 1_000,
            worker_exe: None,
        }
    }
}

pub struct Engine {
    scheduler: StepScheduler,
    cache: ResultCache,
    config: EngineConfig,
    shut_down: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> std::io::Result<Self> {
        Ok(Self {
            scheduler: StepScheduler::spawn()?,
            cache: ResultCache::new(),
            config,
            shut_down: AtomicBool::new(false),
        })
    }

    /// The result cache, for inspection.
    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Submit a request and register `waiter` for its outcome.
    ///
    /// Retries internally when it loses the race against a concurrent
    /// last-waiter cancellation of the same key.
    pub fn request(
        &self,
        algorithm: Algorithm,
        n: u64,
        waiter: Waiter,
    ) -> Result<(Arc<Task>, WaiterId), FibError> {
        let mut waiter = waiter;
        loop {
            if self.shut_down.load(Ordering::Relaxed) {
                return Err(FibError::Execution("engine is shut down".into()));
            }
            let task = self.submit(algorithm, n);
            match task.subscribe(waiter) {
                Ok(id) => return Ok((task, id)),
                // Lost to a concurrent cancellation; fetch a fresh task.
                Err(returned) => waiter = returned,
            }
        }
    }

    /// Channel-backed convenience around [`Engine::request`].
    pub fn request_channel(
        &self,
        algorithm: Algorithm,
        n: u64,
    ) -> Result<(Arc<Task>, WaiterId, Receiver<TaskOutcome>), FibError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let waiter: Waiter = Box::new(move |outcome: &TaskOutcome| {
            let _ = tx.send(outcome.clone());
        });
        let (task, id) = self.request(algorithm, n, waiter)?;
        Ok((task, id, rx))
    }

    /// The shared task for `(algorithm, n)`, starting its execution when
    /// this call is the one that created it.
    pub fn submit(&self, algorithm: Algorithm, n: u64) -> Arc<Task> {
        let key = TaskKey { algorithm, n };
        let (task, created) = self.cache.get_or_create(key);
        if created {
            self.start(&task, algorithm, n);
        }
        task
    }

    /// Cancel every live task and stop the scheduler. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("engine shutting down");
        for task in self.cache.drain() {
            task.cancel();
        }
        self.scheduler.shutdown();
    }

    fn start(&self, task: &Arc<Task>, algorithm: Algorithm, n: u64) {
        match algorithm {
            Algorithm::Iterative => {
                let sequence = IterativeSequence::new(n);
                let policy = sequence.policy(self.config.yield_interval);
                self.start_stepped(task, Box::new(sequence), policy);
            }
            Algorithm::Doubling => {
                let sequence = DoublingSequence::new(n);
                let policy = sequence.policy();
                self.start_stepped(task, Box::new(sequence), policy);
            }
            Algorithm::Binet => {
                task.mark_running();
                let done = Arc::clone(task);
                let spawned = ThreadWorker::spawn(
                    move |token| {
                        token.check_cancelled()?;
                        binet::nth(n)
                    },
                    Box::new(move |result| done.finish(result)),
                );
                match spawned {
                    Ok(handle) => task.attach_exec(ExecHandle::Worker(handle)),
                    Err(e) => task.finish(Err(FibError::Execution(format!(
                        "spawning worker thread: {e}"
                    )))),
                }
            }
            Algorithm::Naive => self.start_process(task, Algorithm::Naive, n),
            // Re-invokes the closed form in a fresh process image.
            Algorithm::BinetProcess => self.start_process(task, Algorithm::Binet, n),
            Algorithm::Memoized => self.start_memoized(task, n),
        }
    }

    fn start_stepped(
        &self,
        task: &Arc<Task>,
        sequence: Box<dyn StepSequence>,
        policy: YieldPolicy,
    ) {
        task.mark_running();
        let key = task.key();
        let done = Arc::clone(task);
        let id = self.scheduler.register(
            sequence,
            policy,
            Box::new(move |checkpoint: Option<&BigUint>| {
                if let Some(value) = checkpoint {
                    trace!(task = %key, bits = value.bits(), "checkpoint");
                }
            }),
            Box::new(move |result| done.finish(result)),
        );
        task.attach_exec(ExecHandle::Sequence {
            scheduler: self.scheduler.clone(),
            id,
        });
    }

    fn start_process(&self, task: &Arc<Task>, target: Algorithm, n: u64) {
        task.mark_running();
        let exe = match &self.config.worker_exe {
            Some(path) => path.clone(),
            None => match std::env::current_exe() {
                Ok(path) => path,
                Err(e) => {
                    task.finish(Err(FibError::Execution(format!(
                        "resolving worker executable: {e}"
                    ))));
                    return;
                }
            },
        };
        let mut command = Command::new(exe);
        command.arg("worker").arg(target.name()).arg(n.to_string());
        let done = Arc::clone(task);
        match ProcessWorker::spawn(command, Box::new(move |result| done.finish(result))) {
            Ok(handle) => task.attach_exec(ExecHandle::Worker(handle)),
            Err(e) => task.finish(Err(FibError::Execution(format!(
                "spawning worker process: {e}"
            )))),
        }
    }

    /// Wire `f(n) = f(n-2) + f(n-1)` over shared cached tasks.
    ///
    /// Dependencies are created with an explicit worklist walking down
    /// to the first already-cached index, then wired bottom-up, so
    /// request depth never becomes stack depth and already-terminal
    /// sub-terms resolve their parents during this walk.
    fn start_memoized(&self, task: &Arc<Task>, n: u64) {
        let mut to_wire: Vec<(u64, Arc<Task>)> = Vec::new();
        let mut stack: Vec<(u64, Arc<Task>)> = vec![(n, Arc::clone(task))];
        while let Some((m, current)) = stack.pop() {
            if m < 2 {
                current.finish(Ok(BigUint::from(m)));
                continue;
            }
            current.mark_running();
            for dep in [m - 1, m - 2] {
                let (dep_task, created) = self.cache.get_or_create(TaskKey {
                    algorithm: Algorithm::Memoized,
                    n: dep,
                });
                if created {
                    stack.push((dep, dep_task));
                }
            }
            to_wire.push((m, current));
        }
        to_wire.sort_unstable_by_key(|(m, _)| *m);
        for (m, current) in to_wire {
            self.wire_sum(&current, m);
        }
    }

    fn wire_sum(&self, task: &Arc<Task>, m: u64) {
        let combiner = SumCombiner::new(Arc::clone(task));
        let mut deps = Vec::with_capacity(2);
        for (slot, dep_n) in [(0, m - 1), (1, m - 2)] {
            deps.push(self.subscribe_dep(dep_n, combiner.waiter(slot)));
        }
        task.attach_exec(ExecHandle::Deps(deps));
    }

    /// Subscribe to a memoized dependency, re-fetching if a concurrent
    /// cancellation got there first.
    fn subscribe_dep(&self, dep_n: u64, waiter: Waiter) -> (Arc<Task>, WaiterId) {
        let mut waiter = waiter;
        loop {
            let dep = self.submit(Algorithm::Memoized, dep_n);
            match dep.subscribe(waiter) {
                Ok(id) => return (dep, id),
                Err(returned) => waiter = returned,
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Completes a memoized task once both dependency values have arrived.
struct SumCombiner {
    task: Arc<Task>,
    slots: Mutex<[Option<Arc<BigUint>>; 2]>,
}

impl SumCombiner {
    fn new(task: Arc<Task>) -> Arc<Self> {
        Arc::new(Self {
            task,
            slots: Mutex::new([None, None]),
        })
    }

    fn waiter(self: &Arc<Self>, slot: usize) -> Waiter {
        let combiner = Arc::clone(self);
        Box::new(move |outcome: &TaskOutcome| combiner.accept(slot, outcome))
    }

    fn accept(&self, slot: usize, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Value(value) => {
                let sum = {
                    let mut slots = self.slots.lock();
                    slots[slot] = Some(Arc::clone(value));
                    match (&slots[0], &slots[1]) {
                        (Some(a), Some(b)) => Some(&**a + &**b),
                        _ => None,
                    }
                };
                if let Some(sum) = sum {
                    self.task.finish(Ok(sum));
                }
            }
            TaskOutcome::Failed(error) => self.task.finish(Err(error.clone())),
            TaskOutcome::Cancelled => self.task.finish(Err(FibError::Cancelled)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;
    use std::time::Duration;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    fn expect_value(rx: &Receiver<TaskOutcome>) -> String {
        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            TaskOutcome::Value(value) => value.to_string(),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn iterative_through_scheduler() {
        let engine = engine();
        let (_task, _id, rx) = engine.request_channel(Algorithm::Iterative, 10).unwrap();
        assert_eq!(expect_value(&rx), "55");
    }

    #[test]
    fn doubling_through_scheduler() {
        let engine = engine();
        let (_task, _id, rx) = engine.request_channel(Algorithm::Doubling, 100).unwrap();
        assert_eq!(expect_value(&rx), "354224848179261915075");
    }

    #[test]
    fn binet_on_thread_worker() {
        let engine = engine();
        let (_task, _id, rx) = engine.request_channel(Algorithm::Binet, 100).unwrap();
        assert_eq!(expect_value(&rx), "354224848179261915075");
    }

    #[test]
    fn concurrent_requests_share_one_task() {
        let engine = engine();
        let (task_a, _id_a, rx_a) = engine.request_channel(Algorithm::Iterative, 40).unwrap();
        let (task_b, _id_b, rx_b) = engine.request_channel(Algorithm::Iterative, 40).unwrap();
        assert!(Arc::ptr_eq(&task_a, &task_b));
        assert_eq!(expect_value(&rx_a), "102334155");
        assert_eq!(expect_value(&rx_b), "102334155");
        assert_eq!(engine.cache().len(), 1);
    }

    #[test]
    fn memoized_collapses_to_shared_subterms() {
        let engine = engine();
        let (_task, _id, rx) = engine.request_channel(Algorithm::Memoized, 30).unwrap();
        assert_eq!(expect_value(&rx), "832040");
        // One task per unique n in the call tree: 0..=30.
        assert_eq!(engine.cache().len(), 31);
    }

    #[test]
    fn overlapping_memoized_trees_share_tasks() {
        let engine = engine();
        let (_t30, _i30, rx30) = engine.request_channel(Algorithm::Memoized, 30).unwrap();
        let (_t29, _i29, rx29) = engine.request_channel(Algorithm::Memoized, 29).unwrap();
        assert_eq!(expect_value(&rx30), "832040");
        assert_eq!(expect_value(&rx29), "514229");
        // f(29)'s entire tree is shared with f(30)'s; nothing is recomputed.
        assert_eq!(engine.cache().len(), 31);
    }

    #[test]
    fn sole_waiter_withdrawal_cancels_execution() {
        let engine = engine();
        // Large enough that it cannot complete before the unsubscribe.
        let (task, id, _rx) = engine
            .request_channel(Algorithm::Iterative, 500_000_000)
            .unwrap();
        task.unsubscribe(id);
        assert!(matches!(task.state(), TaskState::Cancelled));

        // The key is usable again afterwards.
        let fresh = engine.submit(Algorithm::Iterative, 500_000_000);
        assert!(!Arc::ptr_eq(&task, &fresh));
        assert!(!fresh.state().is_terminal());
        engine.shutdown();
    }

    #[test]
    fn failed_tasks_are_cached() {
        let engine = engine();
        // The digit estimate for this n overflows the supported working
        // precision, failing fast without computing anything.
        let (_task, _id, rx) = engine.request_channel(Algorithm::Binet, u64::MAX).unwrap();
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(10)).unwrap(),
            TaskOutcome::Failed(_)
        ));

        let (_task2, _id2, rx2) = engine.request_channel(Algorithm::Binet, u64::MAX).unwrap();
        assert!(matches!(
            rx2.recv_timeout(Duration::from_secs(10)).unwrap(),
            TaskOutcome::Failed(_)
        ));
        assert_eq!(engine.cache().len(), 1);
    }

    #[test]
    fn shutdown_cancels_live_tasks() {
        let engine = engine();
        let (_task, _id, rx) = engine
            .request_channel(Algorithm::Iterative, 500_000_000)
            .unwrap();
        engine.shutdown();
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(10)).unwrap(),
            TaskOutcome::Cancelled
        ));
    }

    #[test]
    fn request_after_shutdown_is_refused() {
        let engine = engine();
        engine.shutdown();
        assert!(engine.request_channel(Algorithm::Iterative, 10).is_err());
    }
}
