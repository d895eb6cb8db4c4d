//! Shared cancellable tasks: the single source of truth for one
//! computation's outcome.
//!
//! A task is created by the cache on the first request for its key and
//! shared by every concurrent caller. Waiters accumulate while the task
//! is live; completion fans the one outcome out to all of them. When the
//! last waiter withdraws before completion, the task cancels its
//! underlying execution and transitions to `Cancelled`.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigUint;
use parking_lot::Mutex;
use tracing::{debug, warn};

use fibserv_core::{Algorithm, FibError};

use crate::scheduler::{SequenceId, StepScheduler};
use crate::worker::WorkerHandle;

/// Identity of one cacheable computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub algorithm: Algorithm,
    pub n: u64,
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.algorithm, self.n)
    }
}

/// Lifecycle state. `Completed`, `Failed`, and `Cancelled` are terminal;
/// there is no transition out of them.
#[derive(Debug, Clone)]
pub enum TaskState {
    Pending,
    Running,
    Completed(Arc<BigUint>),
    Failed(FibError),
    Cancelled,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed(_) | TaskState::Failed(_) | TaskState::Cancelled
        )
    }
}

/// The value fanned out to every waiter on completion.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Value(Arc<BigUint>),
    Failed(FibError),
    Cancelled,
}

/// Callback registered for a task's outcome. Invoked exactly once, off
/// the task's lock, on whichever thread completes the task.
pub type Waiter = Box<dyn FnOnce(&TaskOutcome) + Send>;

/// Handle for withdrawing one registered waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

/// Handle to the underlying execution, held only for teardown.
pub(crate) enum ExecHandle {
    /// Registered on the cooperative scheduler.
    Sequence {
        scheduler: StepScheduler,
        id: SequenceId,
    },
    /// Running on an isolated worker (thread or process).
    Worker(WorkerHandle),
    /// Memoized combine: subscriptions held on dependency tasks.
    Deps(Vec<(Arc<Task>, WaiterId)>),
}

struct TaskInner {
    state: TaskState,
    waiters: HashMap<u64, Waiter>,
    exec: Option<ExecHandle>,
    next_waiter: u64,
}

pub struct Task {
    key: TaskKey,
    inner: Mutex<TaskInner>,
}

impl Task {
    pub(crate) fn new(key: TaskKey) -> Arc<Self> {
        Arc::new(Self {
            key,
            inner: Mutex::new(TaskInner {
                state: TaskState::Pending,
                waiters: HashMap::new(),
                exec: None,
                next_waiter: 0,
            }),
        })
    }

    #[must_use]
    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state.clone()
    }

    /// Register interest in the outcome.
    ///
    /// An already-`Completed` or `Failed` task delivers immediately. An
    /// already-`Cancelled` task refuses and hands the waiter back: the
    /// caller should fetch a fresh task for the key and retry.
    pub fn subscribe(&self, waiter: Waiter) -> Result<WaiterId, Waiter> {
        let mut inner = self.inner.lock();
        let TaskInner {
            state,
            waiters,
            next_waiter,
            ..
        } = &mut *inner;
        let id = WaiterId(*next_waiter);
        *next_waiter += 1;
        let outcome = match state {
            TaskState::Pending | TaskState::Running => {
                waiters.insert(id.0, waiter);
                return Ok(id);
            }
            TaskState::Cancelled => return Err(waiter),
            TaskState::Completed(value) => TaskOutcome::Value(Arc::clone(value)),
            TaskState::Failed(error) => TaskOutcome::Failed(error.clone()),
        };
        drop(inner);
        waiter(&outcome);
        Ok(id)
    }

    /// Withdraw interest. Idempotent. Removing the last waiter of a
    /// non-terminal task cancels it and tears down its execution.
    pub fn unsubscribe(&self, id: WaiterId) {
        if let Some(exec) = self.unsubscribe_collect(id) {
            teardown(exec);
        }
    }

    /// Like [`Task::unsubscribe`], but hands any resulting teardown back
    /// to the caller so dependency chains unwind on a worklist instead of
    /// the call stack.
    fn unsubscribe_collect(&self, id: WaiterId) -> Option<ExecHandle> {
        let mut inner = self.inner.lock();
        inner.waiters.remove(&id.0)?;
        if !inner.waiters.is_empty() || inner.state.is_terminal() {
            return None;
        }
        debug!(task = %self.key, "last waiter withdrew; cancelling");
        inner.state = TaskState::Cancelled;
        inner.exec.take()
    }

    /// Unconditional cancellation regardless of remaining waiters, for
    /// administrative shutdown. Idempotent; a no-op once terminal.
    pub fn cancel(&self) {
        let (exec, waiters) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.state = TaskState::Cancelled;
            (inner.exec.take(), std::mem::take(&mut inner.waiters))
        };
        let outcome = TaskOutcome::Cancelled;
        for waiter in waiters.into_values() {
            waiter(&outcome);
        }
        if let Some(exec) = exec {
            teardown(exec);
        }
    }

    /// Record that the execution has been handed off.
    pub(crate) fn mark_running(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, TaskState::Pending) {
            inner.state = TaskState::Running;
        }
    }

    /// Attach the execution handle used for teardown. If the task was
    /// cancelled before the handle arrived, tear it down now.
    pub(crate) fn attach_exec(&self, exec: ExecHandle) {
        let leftover = {
            let mut inner = self.inner.lock();
            match inner.state {
                TaskState::Pending | TaskState::Running => {
                    inner.exec = Some(exec);
                    None
                }
                TaskState::Cancelled => Some(exec),
                // Finished before the handle arrived; nothing to tear down.
                TaskState::Completed(_) | TaskState::Failed(_) => {
                    drop(exec);
                    None
                }
            }
        };
        if let Some(exec) = leftover {
            teardown(exec);
        }
    }

    /// Deliver the execution's result, fanning out to every waiter. A
    /// no-op if the task already reached a terminal state (e.g. a thread
    /// worker finishing after advisory termination).
    pub(crate) fn finish(&self, result: Result<BigUint, FibError>) {
        let outcome = match result {
            Ok(value) => TaskOutcome::Value(Arc::new(value)),
            Err(FibError::Cancelled) => TaskOutcome::Cancelled,
            Err(error) => TaskOutcome::Failed(error),
        };
        let waiters = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                debug!(task = %self.key, "discarding outcome for terminal task");
                return;
            }
            inner.state = match &outcome {
                TaskOutcome::Value(value) => TaskState::Completed(Arc::clone(value)),
                TaskOutcome::Failed(error) => TaskState::Failed(error.clone()),
                TaskOutcome::Cancelled => TaskState::Cancelled,
            };
            inner.exec = None;
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters.into_values() {
            waiter(&outcome);
        }
    }
}

/// Tear down an execution handle, cascading through memoized dependency
/// chains with an explicit worklist.
pub(crate) fn teardown(exec: ExecHandle) {
    let mut stack = vec![exec];
    while let Some(exec) = stack.pop() {
        match exec {
            ExecHandle::Sequence { scheduler, id } => scheduler.unregister(id),
            ExecHandle::Worker(handle) => {
                if let Err(error) = handle.terminate() {
                    warn!(error = %error, "isolated worker refused termination");
                }
            }
            ExecHandle::Deps(deps) => {
                for (task, id) in deps {
                    if let Some(next) = task.unsubscribe_collect(id) {
                        stack.push(next);
                    }
                }
            }
        }
    }
}
