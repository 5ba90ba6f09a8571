// ── One-shot asynchronous calls ──
//
// An `AsyncCall` pairs a unit of work with two optional continuations.
// `start` consumes the call, so it can only ever run once; the spawned
// task resolves exactly one continuation, even if the work panics.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::IpadError;

type SuccessFn<T> = Box<dyn FnOnce(T) + Send + 'static>;
type FailureFn = Box<dyn FnOnce(IpadError) + Send + 'static>;

/// Lifecycle of a started call.
///
/// An `AsyncCall` that has not been started yet is the configured state;
/// it has no handle to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Running,
    Succeeded,
    Failed,
}

// ── DeliveryLane ─────────────────────────────────────────────────

/// Serializes continuation invocation for every call sharing the lane.
///
/// A facade hands the same lane to all calls it creates so that two
/// completions never run their continuations concurrently.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLane {
    lock: Arc<Mutex<()>>,
}

// ── AsyncCall ────────────────────────────────────────────────────

/// A single pending unit of asynchronous work.
///
/// ```ignore
/// service
///     .list_all_entities()
///     .on_success(|entities| println!("{} entities", entities.len()))
///     .on_failure(|err| eprintln!("{err}"))
///     .start();
/// ```
///
/// Unset continuations silently drop their outcome. Completion is always
/// delivered from a spawned Tokio task, never from inside `start`, so
/// `start` must be called within a Tokio runtime.
#[must_use = "an AsyncCall does nothing until `start` is called"]
pub struct AsyncCall<T> {
    label: &'static str,
    work: BoxFuture<'static, Result<T, IpadError>>,
    on_success: Option<SuccessFn<T>>,
    on_failure: Option<FailureFn>,
    lane: DeliveryLane,
}

impl<T: Send + 'static> AsyncCall<T> {
    /// Wrap a future as an unstarted call with its own delivery lane.
    pub fn new<F>(work: F) -> Self
    where
        F: Future<Output = Result<T, IpadError>> + Send + 'static,
    {
        Self::with_lane("call", work, DeliveryLane::default())
    }

    /// Wrap a future as an unstarted call delivering on `lane`.
    pub fn with_lane<F>(label: &'static str, work: F, lane: DeliveryLane) -> Self
    where
        F: Future<Output = Result<T, IpadError>> + Send + 'static,
    {
        Self {
            label,
            work: work.boxed(),
            on_success: None,
            on_failure: None,
            lane,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Builder-style variant of [`set_on_success`](Self::set_on_success).
    pub fn on_success(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.set_on_success(f);
        self
    }

    /// Builder-style variant of [`set_on_failure`](Self::set_on_failure).
    pub fn on_failure(mut self, f: impl FnOnce(IpadError) + Send + 'static) -> Self {
        self.set_on_failure(f);
        self
    }

    /// Replace the success continuation.
    pub fn set_on_success(&mut self, f: impl FnOnce(T) + Send + 'static) {
        self.on_success = Some(Box::new(f));
    }

    /// Replace the failure continuation.
    pub fn set_on_failure(&mut self, f: impl FnOnce(IpadError) + Send + 'static) {
        self.on_failure = Some(Box::new(f));
    }

    /// Spawn the work and return immediately.
    ///
    /// Exactly one continuation runs once the work finishes. A panic in
    /// the work is reported as [`IpadError::Internal`].
    pub fn start(self) -> CallHandle {
        let Self {
            label,
            work,
            on_success,
            on_failure,
            lane,
        } = self;
        let (state_tx, state_rx) = watch::channel(CallState::Running);

        debug!(call = label, "starting call");
        let join = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(IpadError::Internal(format!(
                    "{label} panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };

            let _delivery = lane.lock.lock().await;
            match outcome {
                Ok(value) => {
                    state_tx.send_replace(CallState::Succeeded);
                    trace!(call = label, "call succeeded");
                    if let Some(f) = on_success {
                        f(value);
                    }
                }
                Err(err) => {
                    state_tx.send_replace(CallState::Failed);
                    debug!(call = label, error = %err, "call failed");
                    if let Some(f) = on_failure {
                        f(err);
                    }
                }
            }
        });

        CallHandle {
            label,
            state: state_rx,
            join,
        }
    }

    /// Start the call and resolve to its outcome.
    ///
    /// Any continuations set before are replaced.
    pub async fn outcome(mut self) -> Result<T, IpadError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ok_tx = tx.clone();
        self.set_on_success(move |value| {
            let _ = ok_tx.send(Ok(value));
        });
        self.set_on_failure(move |err| {
            let _ = tx.send(Err(err));
        });

        let label = self.label;
        let _handle = self.start();
        rx.recv().await.unwrap_or_else(|| {
            Err(IpadError::Internal(format!(
                "{label} ended without delivering a result"
            )))
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

// ── CallHandle ───────────────────────────────────────────────────

/// Observer for a started call.
///
/// Dropping the handle does not cancel the call.
#[derive(Debug)]
pub struct CallHandle {
    label: &'static str,
    state: watch::Receiver<CallState>,
    join: JoinHandle<()>,
}

impl CallHandle {
    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// Wait until the continuation (if any) has returned.
    pub async fn finished(self) -> CallState {
        if let Err(e) = self.join.await {
            warn!(call = self.label, error = %e, "continuation did not complete");
        }
        *self.state.borrow()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn counters() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
    }

    #[tokio::test]
    async fn unset_continuations_are_dropped_silently() {
        let handle = AsyncCall::new(async { Ok::<_, IpadError>(7) }).start();
        assert_eq!(handle.finished().await, CallState::Succeeded);

        let handle = AsyncCall::<()>::new(async { Err(IpadError::AuthenticationRequired) }).start();
        assert_eq!(handle.finished().await, CallState::Failed);
    }

    #[tokio::test]
    async fn success_fires_only_the_success_continuation() {
        let (ok, failed) = counters();
        let (ok2, failed2) = (Arc::clone(&ok), Arc::clone(&failed));

        let state = AsyncCall::new(async { Ok::<_, IpadError>("done") })
            .on_success(move |v| {
                assert_eq!(v, "done");
                ok2.fetch_add(1, Ordering::SeqCst);
            })
            .on_failure(move |_| {
                failed2.fetch_add(1, Ordering::SeqCst);
            })
            .start()
            .finished()
            .await;

        assert_eq!(state, CallState::Succeeded);
        assert_eq!(ok.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_fires_only_the_failure_continuation() {
        let (ok, failed) = counters();
        let (ok2, failed2) = (Arc::clone(&ok), Arc::clone(&failed));

        let mut call = AsyncCall::<u32>::new(async { Err(IpadError::NoIpadServiceAvailable) });
        call.set_on_success(move |_| {
            ok2.fetch_add(1, Ordering::SeqCst);
        });
        call.set_on_failure(move |err| {
            assert!(matches!(err, IpadError::NoIpadServiceAvailable));
            failed2.fetch_add(1, Ordering::SeqCst);
        });
        call.start().finished().await;

        assert_eq!(ok.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completion_never_runs_inside_start() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);

        let handle = AsyncCall::new(async { Ok::<_, IpadError>(()) })
            .on_success(move |()| fired2.store(true, Ordering::SeqCst))
            .start();

        // Current-thread runtime: nothing else runs until we yield.
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(handle.state(), CallState::Running);

        handle.finished().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    fn explode() -> u32 {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn panicking_work_is_delivered_as_internal_error() {
        let result = AsyncCall::new(async { Ok::<_, IpadError>(explode()) })
            .outcome()
            .await;

        match result {
            Err(IpadError::Internal(msg)) => assert!(msg.contains("kaboom"), "{msg}"),
            other => panic!("expected Internal error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn outcome_resolves_to_the_work_result() {
        let value = AsyncCall::new(async { Ok::<_, IpadError>(vec![1, 2, 3]) })
            .outcome()
            .await;
        assert_eq!(tokio_test::assert_ok!(value), vec![1, 2, 3]);

        let err = AsyncCall::<()>::new(async { Err(IpadError::LoginInProgress) })
            .outcome()
            .await;
        assert!(tokio_test::assert_err!(err).is_retryable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn calls_sharing_a_lane_never_overlap_delivery() {
        let lane = DeliveryLane::default();
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<CallHandle> = (0..8)
            .map(|i| {
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                AsyncCall::with_lane("lane-test", async move { Ok::<_, IpadError>(i) }, lane.clone())
                    .on_success(move |_| {
                        if inside.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::sleep(Duration::from_millis(5));
                        inside.store(false, Ordering::SeqCst);
                    })
                    .start()
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.finished().await, CallState::Succeeded);
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
