//! Cooperative step scheduler: one thread advancing many sequences.
//!
//! Registered sequences are served round-robin. Each turn advances one
//! sequence by a slice of `policy.effective()` micro-steps, then moves
//! on, so for N live sequences the latency any one of them adds to the
//! others is bounded by N slices, never by total cost. Relative step
//! order is deterministic for a given registration order; wall-clock
//! completion order depends on per-step cost.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use num_bigint::BigUint;
use parking_lot::Mutex;
use tracing::{debug, warn};

use fibserv_core::{FibError, Step, StepSequence, YieldPolicy};

/// Identifier for one registered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceId(u64);

/// Hook invoked after every slice with the latest surfaced checkpoint.
/// Exists as the scheduler's yield boundary; most callers pass a no-op.
pub type StepHook = Box<dyn FnMut(Option<&BigUint>) + Send>;

/// Invoked exactly once with the sequence's final result. Never invoked
/// for a sequence that was unregistered first.
pub type DoneHook = Box<dyn FnOnce(Result<BigUint, FibError>) + Send>;

struct Registration {
    id: SequenceId,
    sequence: Box<dyn StepSequence>,
    policy: YieldPolicy,
    on_step: StepHook,
    on_done: DoneHook,
}

enum Command {
    Register(Registration),
    Unregister(SequenceId),
    Shutdown,
}

/// Handle to the scheduler thread. Cloneable; all clones drive the same
/// thread.
#[derive(Clone)]
pub struct StepScheduler {
    commands: Sender<Command>,
    next_id: Arc<AtomicU64>,
    thread: Arc<Mutex<Option<std::thread::JoinHandle<()>>>>,
}

impl StepScheduler {
    /// Spawn the scheduler thread.
    pub fn spawn() -> std::io::Result<Self> {
        let (commands, receiver) = unbounded();
        let thread = std::thread::Builder::new()
            .name("step-scheduler".into())
            .spawn(move || run_loop(&receiver))?;
        Ok(Self {
            commands,
            next_id: Arc::new(AtomicU64::new(0)),
            thread: Arc::new(Mutex::new(Some(thread))),
        })
    }

    /// Register a sequence for cooperative advancement.
    ///
    /// If the scheduler has already shut down, `on_done` is invoked
    /// immediately with an execution error.
    pub fn register(
        &self,
        sequence: Box<dyn StepSequence>,
        policy: YieldPolicy,
        on_step: StepHook,
        on_done: DoneHook,
    ) -> SequenceId {
        let id = SequenceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Registration {
            id,
            sequence,
            policy,
            on_step,
            on_done,
        };
        if let Err(refused) = self.commands.send(Command::Register(registration)) {
            if let Command::Register(registration) = refused.0 {
                (registration.on_done)(Err(FibError::Execution(
                    "scheduler is shut down".into(),
                )));
            }
        }
        id
    }

    /// Drop a sequence without further stepping. Idempotent; its
    /// `on_done` is never invoked.
    pub fn unregister(&self, id: SequenceId) {
        let _ = self.commands.send(Command::Unregister(id));
    }

    /// Stop the scheduler thread, dropping any still-live sequences.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}

fn run_loop(commands: &Receiver<Command>) {
    let mut live: VecDeque<Registration> = VecDeque::new();
    loop {
        // Idle until work arrives; otherwise only drain what is queued.
        if live.is_empty() {
            match commands.recv() {
                Ok(command) => {
                    if !apply(command, &mut live) {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    if !apply(command, &mut live) {
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
        if let Some(active) = live.pop_front() {
            if let Some(active) = run_slice(active) {
                live.push_back(active);
            }
        }
    }
}

fn apply(command: Command, live: &mut VecDeque<Registration>) -> bool {
    match command {
        Command::Register(registration) => {
            debug!(
                sequence = registration.id.0,
                total_steps = registration.policy.total_steps(),
                slice = registration.policy.effective(),
                "sequence registered"
            );
            live.push_back(registration);
            true
        }
        Command::Unregister(id) => {
            live.retain(|r| r.id != id);
            true
        }
        Command::Shutdown => {
            debug!(live = live.len(), "scheduler shutting down");
            false
        }
    }
}

/// Advance one sequence by one slice. Returns it if still live.
fn run_slice(mut active: Registration) -> Option<Registration> {
    let slice = active.policy.effective();
    let mut checkpoint: Option<BigUint> = None;
    let mut finished: Option<Result<BigUint, FibError>> = None;

    let unwound = catch_unwind(AssertUnwindSafe(|| {
        for _ in 0..slice {
            match active.sequence.advance() {
                Ok(Step::Yielded(surfaced)) => {
                    if surfaced.is_some() {
                        checkpoint = surfaced;
                    }
                }
                Ok(Step::Complete(value)) => {
                    finished = Some(Ok(value));
                    break;
                }
                Err(error) => {
                    finished = Some(Err(error));
                    break;
                }
            }
        }
    }));

    if let Err(panic) = unwound {
        let message = panic_message(&panic);
        warn!(sequence = active.id.0, "sequence panicked: {message}");
        (active.on_done)(Err(FibError::Execution(format!(
            "sequence panicked: {message}"
        ))));
        return None;
    }

    (active.on_step)(checkpoint.as_ref());
    match finished {
        Some(result) => {
            debug!(sequence = active.id.0, ok = result.is_ok(), "sequence finished");
            (active.on_done)(result);
            None
        }
        None => Some(active),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "opaque panic payload"
    }
}
