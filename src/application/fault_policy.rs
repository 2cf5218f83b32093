//! Process-wide fault policy
//!
//! Background work that fails with an error is an isolated failure: it is
//! logged and the process keeps serving calls. A panic that escapes every
//! scope means process state can no longer be trusted: it is logged and the
//! process exits with [`FAULT_EXIT_CODE`] so an external supervisor restarts
//! it. Panics inside the supervision boundary are contained there and never
//! reach this policy.

use super::supervisor::{in_supervision, panic_message};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Exit status used when the process gives up
pub const FAULT_EXIT_CODE: i32 = 1;

pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

static PANIC_HOOK: Once = Once::new();

#[derive(Clone)]
pub struct FaultPolicy {
    exit: ExitFn,
}

impl FaultPolicy {
    pub fn new(exit: ExitFn) -> Self {
        Self { exit }
    }

    /// Policy that really terminates the process
    pub fn process() -> Self {
        Self::new(Arc::new(|code| std::process::exit(code)))
    }

    /// Route escaping panics through tracing. Installed at most once per
    /// process; later calls are no-ops.
    pub fn install_panic_hook(&self) {
        PANIC_HOOK.call_once(|| {
            std::panic::set_hook(Box::new(|info| {
                if in_supervision() {
                    return;
                }
                let location = info
                    .location()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                error!(
                    location = %location,
                    panic = %panic_message(info.payload()),
                    "Uncaught panic"
                );
            }));
        });
    }

    /// A background task failed with an error; the process survives
    pub fn on_async_rejection(&self, task: &str, err: &anyhow::Error) {
        error!(task, error = %format!("{:#}", err), "Unhandled failure in background task");
    }

    /// Something escaped every scope; terminate
    pub fn on_uncaught(&self, task: &str, cause: &str) {
        error!(task, cause, exit_code = FAULT_EXIT_CODE, "Uncaught fault, terminating");
        (self.exit)(FAULT_EXIT_CODE);
    }

    /// Spawn background work under this policy.
    ///
    /// The returned handle completes once the task has ended and its outcome
    /// has been applied.
    pub fn spawn<F>(&self, task: &'static str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let policy = self.clone();
        let inner = tokio::spawn(future);
        tokio::spawn(async move {
            match inner.await {
                Ok(Ok(())) => debug!(task, "Background task finished"),
                Ok(Err(err)) => policy.on_async_rejection(task, &err),
                Err(join_err) if join_err.is_panic() => {
                    let payload = join_err.into_panic();
                    policy.on_uncaught(task, &panic_message(payload.as_ref()));
                }
                Err(_) => debug!(task, "Background task cancelled"),
            }
        })
    }

    /// Spawn work whose panic must not be swallowed by the runtime.
    ///
    /// The task's own value is passed through. A panic is reported as
    /// uncaught, then resumed so the handle still observes it.
    pub fn spawn_guarded<F, T>(&self, task: &'static str, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let policy = self.clone();
        tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(value) => value,
                Err(payload) => {
                    policy.on_uncaught(task, &panic_message(payload.as_ref()));
                    std::panic::resume_unwind(payload)
                }
            }
        })
    }

    /// Drive the top-level future. A startup error or an escaping panic
    /// terminates through the exit function; `None` is returned only when
    /// the exit function did not actually exit.
    pub async fn run_guarded<F, T>(&self, task: &'static str, future: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                error!(task, error = %format!("{:#}", err), "Fatal error");
                (self.exit)(FAULT_EXIT_CODE);
                None
            }
            Err(payload) => {
                self.on_uncaught(task, &panic_message(payload.as_ref()));
                None
            }
        }
    }
}

impl std::fmt::Debug for FaultPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultPolicy").finish_non_exhaustive()
    }
}
