//! The stateful lock session driving acquire, heartbeat, and release.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use mindgraph_core::locking::{AcquireOutcome, RefreshOutcome, HEARTBEAT_INTERVAL_SECS};
use mindgraph_core::session::{transition, SessionEvent, SessionStatus};
use mindgraph_core::types::DbId;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{ClientError, LockApi, SaveOk};

/// Callback invoked when the session discovers it lost the lock, so the
/// editing surface can be disabled before any further local mutation is
/// queued for save.
pub type LockLostCallback = Arc<dyn Fn() + Send + Sync>;

/// Session tuning knobs.
#[derive(Clone, Default)]
pub struct SessionOptions {
    /// Heartbeat cadence. Defaults to [`HEARTBEAT_INTERVAL_SECS`];
    /// overridable for tests.
    pub heartbeat_interval: Option<Duration>,
    /// Invoked once when a refresh reports the lock lost.
    pub on_lock_lost: Option<LockLostCallback>,
}

struct Inner {
    api: Arc<dyn LockApi>,
    document_id: DbId,
    options: SessionOptions,
    /// Source of truth for the session state; all transitions happen while
    /// holding this lock so a slow response cannot interleave with a newer
    /// one.
    state: Mutex<SessionStatus>,
    status_tx: watch::Sender<SessionStatus>,
    heartbeat: StdMutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Apply an event under the state lock and publish the result.
    async fn apply(&self, event: SessionEvent) -> SessionStatus {
        let mut state = self.state.lock().await;
        let next = transition(&state, &event);
        if next != *state {
            *state = next.clone();
            // Receivers may all be gone; that's fine.
            let _ = self.status_tx.send(next.clone());
        }
        next
    }

    fn stop_heartbeat(&self) {
        if let Ok(mut slot) = self.heartbeat.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// A client lock session for one document.
///
/// Created on editor attach, destroyed on detach. Exposes its state through
/// a watch channel so the editing surface can gate itself reactively, and
/// re-exposes the manual operations for the explicit recovery flow after a
/// `Lost` or `Error` state.
pub struct LockSession {
    inner: Arc<Inner>,
    status_rx: watch::Receiver<SessionStatus>,
}

impl LockSession {
    pub fn new(api: Arc<dyn LockApi>, document_id: DbId, options: SessionOptions) -> Self {
        let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                api,
                document_id,
                options,
                state: Mutex::new(SessionStatus::Idle),
                status_tx,
                heartbeat: StdMutex::new(None),
            }),
            status_rx,
        }
    }

    /// Attach: acquire the lock and, on success, start heartbeating.
    pub async fn attach(&self) -> SessionStatus {
        self.acquire().await
    }

    /// Acquire (or manually re-acquire) the lock.
    ///
    /// Guarded against duplicate concurrent calls: if an acquire is already
    /// in flight (or the lock is already held) this returns the current
    /// state without issuing a second round trip.
    pub async fn acquire(&self) -> SessionStatus {
        {
            let mut state = self.inner.state.lock().await;
            if !state.can_start_acquire() {
                tracing::debug!(
                    document_id = self.inner.document_id,
                    state = ?*state,
                    "Skipping duplicate acquire"
                );
                return state.clone();
            }
            let next = transition(&state, &SessionEvent::AcquireStarted);
            *state = next.clone();
            let _ = self.inner.status_tx.send(next);
        }

        let result = self.inner.api.acquire(self.inner.document_id).await;

        let status = match result {
            Ok(AcquireOutcome::Acquired { was_stolen }) => {
                tracing::info!(
                    document_id = self.inner.document_id,
                    was_stolen,
                    "Lock acquired"
                );
                self.inner.apply(SessionEvent::AcquireGranted).await
            }
            Ok(AcquireOutcome::ReadOnly {
                locked_by_user_id,
                locked_by_user_name,
            }) => {
                self.inner
                    .apply(SessionEvent::AcquireDenied {
                        holder_id: locked_by_user_id,
                        holder_name: locked_by_user_name,
                    })
                    .await
            }
            Err(err) => {
                tracing::warn!(
                    document_id = self.inner.document_id,
                    error = %err,
                    "Acquire failed"
                );
                self.inner.apply(SessionEvent::AcquireFailed).await
            }
        };

        if status == SessionStatus::Held {
            self.start_heartbeat();
        }
        status
    }

    /// Spawn the repeating heartbeat task.
    ///
    /// Refreshes run strictly sequentially: the loop awaits each refresh
    /// before the next tick is taken, so a slow response never overlaps the
    /// following one -- the interval is the steady-state cadence, not a
    /// non-overlap guarantee.
    fn start_heartbeat(&self) {
        let inner = Arc::clone(&self.inner);
        let period = inner
            .options
            .heartbeat_interval
            .unwrap_or(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it, we just acquired.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match inner.api.refresh(inner.document_id).await {
                    Ok(RefreshOutcome::Ok { .. }) => {
                        inner.apply(SessionEvent::RefreshOk).await;
                    }
                    Ok(RefreshOutcome::LockLost) => {
                        tracing::warn!(
                            document_id = inner.document_id,
                            "Lock lost: stolen or released elsewhere"
                        );
                        inner.apply(SessionEvent::RefreshLost).await;
                        if let Some(cb) = &inner.options.on_lock_lost {
                            cb();
                        }
                        break;
                    }
                    Err(err) => {
                        // Unknown, not lost: the store may just be
                        // unreachable. Keep the session alive and retry on
                        // the next tick.
                        tracing::warn!(
                            document_id = inner.document_id,
                            error = %err,
                            "Heartbeat failed, will retry"
                        );
                        inner.apply(SessionEvent::RefreshErrored).await;
                    }
                }
            }
        });

        if let Ok(mut slot) = self.inner.heartbeat.lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    /// Manual heartbeat, exposed for the UI's recovery path.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ClientError> {
        let outcome = self.inner.api.refresh(self.inner.document_id).await?;
        match &outcome {
            RefreshOutcome::Ok { .. } => {
                self.inner.apply(SessionEvent::RefreshOk).await;
            }
            RefreshOutcome::LockLost => {
                self.inner.stop_heartbeat();
                self.inner.apply(SessionEvent::RefreshLost).await;
            }
        }
        Ok(outcome)
    }

    /// Detach: stop heartbeating and release best-effort.
    ///
    /// Release failures are logged, not surfaced -- detach must never block
    /// navigation on the lock being cleanly returned (a missed release is
    /// recovered server-side by staleness).
    pub async fn detach(&self) {
        self.inner.stop_heartbeat();

        let was_held = { self.inner.state.lock().await.can_edit() };
        if was_held {
            match self.inner.api.release(self.inner.document_id).await {
                Ok(released) => {
                    tracing::debug!(
                        document_id = self.inner.document_id,
                        released,
                        "Lock released on detach"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        document_id = self.inner.document_id,
                        error = %err,
                        "Release on detach failed"
                    );
                }
            }
        }
        self.inner.apply(SessionEvent::Released).await;
    }

    /// Abrupt-teardown release: fire-and-forget, never awaited.
    pub fn beacon_release(&self) {
        self.inner.stop_heartbeat();
        self.inner.api.release_beacon(self.inner.document_id);
    }

    /// Save the document body read at `version`.
    ///
    /// Refused locally once the session can no longer edit, so edits made
    /// after a detected loss cannot be queued for save.
    pub async fn save(
        &self,
        body: &serde_json::Value,
        version: i64,
    ) -> Result<SaveOk, ClientError> {
        if !self.current_status().can_edit() {
            return Err(ClientError::LockNotHeld { holder_id: None });
        }
        self.inner.api.save(self.inner.document_id, body, version).await
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// The current session state.
    pub fn current_status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }
}

impl Drop for LockSession {
    fn drop(&mut self) {
        // The heartbeat task holds an Arc<Inner>; without this it would
        // keep refreshing a lock nobody can use anymore.
        self.inner.stop_heartbeat();
    }
}
