//! # fibserv-orchestration
//!
//! The computation-scheduling and cancellation layer: a cooperative
//! [`StepScheduler`] advancing many step sequences on one thread, shared
//! cancellable [`Task`]s with waiter fan-out, an unlimited [`ResultCache`]
//! deduplicating concurrent identical requests, isolated workers (thread
//! and subprocess) for opaque algorithms, and the [`Engine`] tying them
//! together.

pub mod cache;
pub mod engine;
pub mod scheduler;
pub mod task;
pub mod worker;

// Re-exports
pub use cache::ResultCache;
pub use engine::{Engine, EngineConfig};
pub use scheduler::{SequenceId, StepScheduler};
pub use task::{Task, TaskKey, TaskOutcome, TaskState, Waiter, WaiterId};
pub use worker::{ProcessWorker, ThreadWorker, WorkerHandle};
