//! Deadline-bounded execution of network operations.
//!
//! Each operation runs as its own tokio task. The caller waits up to a
//! deadline for the task's result; if the deadline wins, the task is aborted
//! at its current await point. Aborting drops the operation's future, and
//! with it any socket the operation owns, so the peer observes the close and
//! nothing keeps running detached.
//!
//! ```text
//! caller ──spawn──► TimedOperation ──wait(deadline)──► Completed(T)
//!                                                 ├──► Failed(err)
//!                                                 └──► TimedOut ─► cancel + abort + join
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, BridgeResult};

/// Observed state of a timed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationState {
    /// Still executing.
    Running = 0,
    /// Finished with a result before the deadline.
    Completed = 1,
    /// Deadline elapsed; the operation was stopped.
    TimedOut = 2,
    /// Finished with an error, panicked, or was cancelled.
    Failed = 3,
}

impl From<u8> for OperationState {
    fn from(value: u8) -> Self {
        match value {
            0 => OperationState::Running,
            1 => OperationState::Completed,
            2 => OperationState::TimedOut,
            _ => OperationState::Failed,
        }
    }
}

/// A pending unit of work spawned by [`TimedExecutor`].
///
/// Dropping an unfinished `TimedOperation` stops the work.
pub struct TimedOperation<T> {
    label: String,
    handle: JoinHandle<BridgeResult<T>>,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
    started: Instant,
}

impl<T> std::fmt::Debug for TimedOperation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedOperation")
            .field("label", &self.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T> TimedOperation<T> {
    /// Current state.
    pub fn state(&self) -> OperationState {
        OperationState::from(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: OperationState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Wait up to `timeout` for the operation to finish.
    ///
    /// On timeout the operation is cancelled and aborted, and this returns
    /// only after its task has been torn down.
    pub async fn wait(mut self, timeout: Duration) -> BridgeResult<T> {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(Ok(value))) => {
                self.set_state(OperationState::Completed);
                log::debug!(
                    "[Executor] {} completed in {}ms",
                    self.label,
                    self.started.elapsed().as_millis()
                );
                Ok(value)
            }
            Ok(Ok(Err(e))) => {
                self.set_state(OperationState::Failed);
                log::debug!("[Executor] {} failed: {e}", self.label);
                Err(e)
            }
            Ok(Err(join_err)) => {
                self.set_state(OperationState::Failed);
                log::error!("[Executor] {} task failed: {join_err}", self.label);
                Err(BridgeError::TaskFailed(join_err.to_string()))
            }
            Err(_elapsed) => {
                self.set_state(OperationState::TimedOut);
                log::warn!(
                    "[Executor] {} exceeded {}ms deadline, stopping it",
                    self.label,
                    timeout.as_millis()
                );
                self.cancel.cancel();
                self.handle.abort();
                // Join so the operation's resources are released before we return.
                if let Err(e) = (&mut self.handle).await {
                    if !e.is_cancelled() {
                        log::error!("[Executor] {} failed while stopping: {e}", self.label);
                    }
                }
                Err(BridgeError::Timeout)
            }
        }
    }
}

impl<T> Drop for TimedOperation<T> {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.cancel.cancel();
            self.handle.abort();
        }
    }
}

/// Spawns operations as independent tasks and bounds them with deadlines.
///
/// Every operation is tied to the executor's shutdown token: cancelling it
/// stops all in-flight operations.
#[derive(Debug, Clone)]
pub struct TimedExecutor {
    shutdown: CancellationToken,
}

impl TimedExecutor {
    /// Creates an executor whose operations stop when `shutdown` is cancelled.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    /// Start `operation` as an independent task.
    pub fn spawn<T, F>(&self, label: impl Into<String>, operation: F) -> TimedOperation<T>
    where
        T: Send + 'static,
        F: Future<Output = BridgeResult<T>> + Send + 'static,
    {
        let cancel = self.shutdown.child_token();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = task_cancel.cancelled() => Err(BridgeError::Cancelled),
                result = operation => result,
            }
        });

        TimedOperation {
            label: label.into(),
            handle,
            cancel,
            state: Arc::new(AtomicU8::new(OperationState::Running as u8)),
            started: Instant::now(),
        }
    }

    /// Run `operation` and wait at most `timeout` for its result.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if the deadline elapses first, or the
    /// operation's own error.
    pub async fn run_with_deadline<T, F>(
        &self,
        label: impl Into<String>,
        timeout: Duration,
        operation: F,
    ) -> BridgeResult<T>
    where
        T: Send + 'static,
        F: Future<Output = BridgeResult<T>> + Send + 'static,
    {
        self.spawn(label, operation).wait(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Sets its flag when dropped, standing in for a socket being closed.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_completes_before_deadline() {
        let executor = TimedExecutor::new(CancellationToken::new());
        let op = executor.spawn("quick", async { Ok(42) });
        assert_eq!(op.wait(Duration::from_secs(1)).await, Ok(42));
    }

    #[tokio::test]
    async fn test_operation_error_is_returned() {
        let executor = TimedExecutor::new(CancellationToken::new());
        let result: BridgeResult<()> = executor
            .run_with_deadline("failing", Duration::from_secs(1), async {
                Err(BridgeError::Io("boom".to_string()))
            })
            .await;
        assert_eq!(result, Err(BridgeError::Io("boom".to_string())));
    }

    #[tokio::test]
    async fn test_timeout_stops_operation_and_releases_resources() {
        let executor = TimedExecutor::new(CancellationToken::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let guard = DropFlag(Arc::clone(&dropped));
        let finished_flag = Arc::clone(&finished);
        let started = Instant::now();
        let result: BridgeResult<()> = executor
            .run_with_deadline("slow", Duration::from_millis(100), async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(5)).await;
                finished_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(result, Err(BridgeError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(dropped.load(Ordering::SeqCst), "operation resources must be released");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!finished.load(Ordering::SeqCst), "operation must not keep running");
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let executor = TimedExecutor::new(CancellationToken::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let op = executor.spawn("gated", async move {
            let _ = rx.await;
            Ok(())
        });
        assert_eq!(op.state(), OperationState::Running);
        drop(tx);
        let state = Arc::clone(&op.state);
        op.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(OperationState::from(state.load(Ordering::Relaxed)), OperationState::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_operations() {
        let shutdown = CancellationToken::new();
        let executor = TimedExecutor::new(shutdown.clone());
        let op = executor.spawn("long", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        shutdown.cancel();
        assert_eq!(op.wait(Duration::from_secs(1)).await, Err(BridgeError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropping_operation_stops_it() {
        let executor = TimedExecutor::new(CancellationToken::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(Arc::clone(&dropped));
        let op = executor.spawn("abandoned", async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        drop(op);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("abandoned operation was not stopped");
    }
}
