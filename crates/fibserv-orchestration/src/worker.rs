//! Isolated workers: thread- and process-backed execution for opaque
//! algorithms, outside the cooperative scheduler.
//!
//! A thread worker keeps the work in-process; terminating it is
//! advisory only. A process worker re-invokes a fresh process image and
//! can be killed reliably, so its failure or death never touches the
//! parent's scheduler.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::Arc;

use num_bigint::BigUint;
use parking_lot::Mutex;
use tracing::debug;

use fibserv_core::{CancellationToken, FibError};

/// Invoked exactly once with the worker's natural result. A result
/// arriving after termination was requested is still delivered; the
/// terminal task discards it.
pub type FinishHook = Box<dyn FnOnce(Result<BigUint, FibError>) + Send>;

/// Handle to one isolated worker execution.
pub struct WorkerHandle {
    inner: WorkerInner,
}

enum WorkerInner {
    Thread { token: CancellationToken },
    Process { child: Arc<Mutex<Child>> },
}

impl WorkerHandle {
    /// Request termination.
    ///
    /// For a process worker this sends a kill signal and is reliable.
    /// For a thread worker it only raises the cancellation token:
    /// cancellation of in-process opaque work is advisory only, and the
    /// thread may run to completion regardless.
    pub fn terminate(&self) -> Result<(), FibError> {
        match &self.inner {
            WorkerInner::Thread { token } => {
                debug!("advisory termination of thread worker");
                token.cancel();
                Ok(())
            }
            WorkerInner::Process { child } => {
                let mut child = child.lock();
                match child.kill() {
                    Ok(()) => Ok(()),
                    // Already exited; nothing left to kill.
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
                    Err(e) => Err(FibError::WorkerTermination(e.to_string())),
                }
            }
        }
    }
}

/// Thread-backed worker for opaque in-process computations.
pub struct ThreadWorker;

impl ThreadWorker {
    /// Run `f` on a fresh thread; `on_finish` receives its result.
    ///
    /// `f` gets the handle's cancellation token and may consult it at
    /// coarse entry points, but is not required to.
    pub fn spawn<F>(f: F, on_finish: FinishHook) -> std::io::Result<WorkerHandle>
    where
        F: FnOnce(&CancellationToken) -> Result<BigUint, FibError> + Send + 'static,
    {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        std::thread::Builder::new()
            .name("opaque-worker".into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| f(&worker_token)))
                    .unwrap_or_else(|_| Err(FibError::Execution("worker thread panicked".into())));
                on_finish(result);
            })?;
        Ok(WorkerHandle {
            inner: WorkerInner::Thread { token },
        })
    }
}

/// Process-backed worker: runs a command whose stdout is one decimal
/// term and which can be killed reliably.
pub struct ProcessWorker;

impl ProcessWorker {
    /// Spawn `command`; a monitor thread collects its output and exit
    /// status and hands `on_finish` the parsed term.
    pub fn spawn(mut command: Command, on_finish: FinishHook) -> std::io::Result<WorkerHandle> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));

        let monitor_child = Arc::clone(&child);
        std::thread::Builder::new()
            .name("process-worker".into())
            .spawn(move || {
                on_finish(collect(&monitor_child, stdout, stderr));
            })?;

        Ok(WorkerHandle {
            inner: WorkerInner::Process { child },
        })
    }
}

/// Block until the child exits (naturally or killed), then parse its
/// stdout as the computed term.
fn collect(
    child: &Mutex<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> Result<BigUint, FibError> {
    let mut out = String::new();
    if let Some(mut pipe) = stdout {
        // Reaches EOF when the child exits or is killed.
        let _ = pipe.read_to_string(&mut out);
    }
    let mut err_text = String::new();
    if let Some(mut pipe) = stderr {
        let _ = pipe.read_to_string(&mut err_text);
    }
    let status = child
        .lock()
        .wait()
        .map_err(|e| FibError::Execution(format!("waiting for worker: {e}")))?;
    if !status.success() {
        let detail = if err_text.trim().is_empty() {
            status.to_string()
        } else {
            err_text.trim().to_string()
        };
        return Err(FibError::Execution(format!("worker failed: {detail}")));
    }
    let text = out.trim();
    text.parse::<BigUint>()
        .map_err(|e| FibError::Execution(format!("unparsable worker output {text:?}: {e}")))
}
