//! Client lock-session state machine.
//!
//! The editor client tracks its editing rights as an explicit finite state
//! machine rather than ad hoc boolean flags, so the legal transitions are
//! exhaustively checkable. The async driver (heartbeat task, HTTP calls)
//! lives in `mindgraph-client`; this module is the pure transition function
//! it applies.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// The session's editing rights at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Not attached to a document.
    Idle,
    /// An acquire call is in flight. No second acquire may start.
    Acquiring,
    /// Caller holds the lock and may edit.
    Held,
    /// Another user holds the lock; editing is disabled. Terminal until a
    /// manual re-acquire.
    ReadOnly {
        holder_id: DbId,
        holder_name: String,
    },
    /// A refresh discovered the lock was stolen or released from under us.
    /// Terminal until the user goes through the explicit reload flow.
    Lost,
    /// The acquire itself failed (transport or server error).
    Error,
}

impl SessionStatus {
    /// `true` while the session may submit saves.
    pub fn can_edit(&self) -> bool {
        matches!(self, SessionStatus::Held)
    }

    /// `true` when an acquire call may be started.
    ///
    /// Guards against a duplicate acquire racing the heartbeat setup: the
    /// server-side acquire is idempotent for the same user, but a second
    /// in-flight call is wasted work.
    pub fn can_start_acquire(&self) -> bool {
        !matches!(self, SessionStatus::Acquiring | SessionStatus::Held)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Observable results of lock calls, fed into [`transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An acquire call was dispatched.
    AcquireStarted,
    /// Acquire returned `Acquired`.
    AcquireGranted,
    /// Acquire returned `ReadOnly` naming the current holder.
    AcquireDenied {
        holder_id: DbId,
        holder_name: String,
    },
    /// Acquire failed outright (transport or server error).
    AcquireFailed,
    /// A heartbeat refresh succeeded.
    RefreshOk,
    /// A heartbeat refresh returned `LockLost`.
    RefreshLost,
    /// A heartbeat refresh failed transiently. Store-unreachable is not
    /// lock-lost: the state is unchanged and the next tick retries.
    RefreshErrored,
    /// The session released the lock (detach).
    Released,
}

// ---------------------------------------------------------------------------
// Transition function
// ---------------------------------------------------------------------------

/// Apply an event to a state, returning the next state.
///
/// Events that make no sense in the current state leave it unchanged; the
/// driver never has to reason about "impossible" combinations racing in from
/// a slow response.
pub fn transition(state: &SessionStatus, event: &SessionEvent) -> SessionStatus {
    use SessionEvent as E;
    use SessionStatus as S;

    match (state, event) {
        (s, E::AcquireStarted) if s.can_start_acquire() => S::Acquiring,

        (S::Acquiring, E::AcquireGranted) => S::Held,
        (
            S::Acquiring,
            E::AcquireDenied {
                holder_id,
                holder_name,
            },
        ) => S::ReadOnly {
            holder_id: *holder_id,
            holder_name: holder_name.clone(),
        },
        (S::Acquiring, E::AcquireFailed) => S::Error,

        (S::Held, E::RefreshOk) => S::Held,
        (S::Held, E::RefreshLost) => S::Lost,
        // Transient heartbeat failure: keep editing, retry next tick.
        (S::Held, E::RefreshErrored) => S::Held,
        (S::Held, E::Released) => S::Idle,

        (current, _) => current.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
