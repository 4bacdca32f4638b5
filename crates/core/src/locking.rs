//! Document lock policy: constants, staleness, and acquire decision logic.
//!
//! This module lives in `core` (zero internal deps) so the repository layer,
//! the HTTP handlers, and the editor client all share the same thresholds and
//! the same answer to "who may hold this lock right now". The persistence
//! layer is responsible for applying a decision atomically (conditional
//! UPDATE); the decision itself is pure and fully unit-testable here.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// A lock whose heartbeat is older than this many seconds is stale and may
/// be stolen by another user.
pub const LOCK_STALE_SECS: i64 = 60;

/// Client heartbeat cadence in seconds.
///
/// Must stay at or below half of [`LOCK_STALE_SECS`] so at least one missed
/// heartbeat can be absorbed before the lock becomes stealable. The
/// worst-case window in which a disconnected holder can be dispossessed is
/// therefore 60-90s.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

const _: () = assert!(HEARTBEAT_INTERVAL_SECS as i64 * 2 <= LOCK_STALE_SECS);

// ---------------------------------------------------------------------------
// Lock snapshot
// ---------------------------------------------------------------------------

/// A point-in-time view of a document's lock fields, as read from the store.
///
/// Invariant (enforced by the schema): `locked_by` and `heartbeat_at` are
/// both `Some` exactly when the document is locked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockSnapshot {
    pub locked_by: Option<DbId>,
    pub heartbeat_at: Option<Timestamp>,
}

impl LockSnapshot {
    /// An unlocked document.
    pub fn unlocked() -> Self {
        Self {
            locked_by: None,
            heartbeat_at: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }
}

/// Returns `true` if a heartbeat is older than [`LOCK_STALE_SECS`].
pub fn is_stale(heartbeat_at: Timestamp, now: Timestamp) -> bool {
    (now - heartbeat_at).num_seconds() > LOCK_STALE_SECS
}

// ---------------------------------------------------------------------------
// Acquire decision
// ---------------------------------------------------------------------------

/// What an acquire attempt should do, given an observed lock snapshot.
///
/// The store must apply `Grant`, `Reenter`, and `Steal` as conditional
/// writes keyed on the exact snapshot that produced the decision; a failed
/// condition means another caller won the race and the snapshot must be
/// re-read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcquireDecision {
    /// Document is unlocked: take the lock.
    Grant,
    /// Caller already holds the lock: refresh the heartbeat (idempotent).
    Reenter,
    /// Another user holds a stale lock: take it from them.
    Steal { previous_holder: DbId },
    /// Another user holds a fresh lock: do not mutate.
    Deny { holder: DbId },
}

/// Decide what an acquire by `user_id` at `now` should do.
pub fn decide_acquire(snapshot: &LockSnapshot, user_id: DbId, now: Timestamp) -> AcquireDecision {
    match (snapshot.locked_by, snapshot.heartbeat_at) {
        (None, _) => AcquireDecision::Grant,
        (Some(holder), _) if holder == user_id => AcquireDecision::Reenter,
        (Some(holder), Some(heartbeat)) if is_stale(heartbeat, now) => AcquireDecision::Steal {
            previous_holder: holder,
        },
        (Some(holder), _) => AcquireDecision::Deny { holder },
    }
}

// ---------------------------------------------------------------------------
// Operation outcomes (wire-visible)
// ---------------------------------------------------------------------------

/// Result of an acquire call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AcquireOutcome {
    /// Caller now holds the lock. `was_stolen` is `true` when a stale lock
    /// was taken from another user.
    Acquired { was_stolen: bool },
    /// Another user holds a fresh lock; caller gets read-only access.
    ReadOnly {
        locked_by_user_id: DbId,
        locked_by_user_name: String,
    },
}

/// Result of a heartbeat refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Caller still holds the lock; heartbeat advanced.
    Ok { heartbeat_at: Timestamp },
    /// The lock was released or stolen from under the caller.
    LockLost,
}

/// Result of a save attempt, classified from the store's conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The body was committed and the version advanced by exactly 1.
    Saved { version: i64, updated_at: Timestamp },
    /// Caller does not hold the lock. Checked before the version, since
    /// holding the lock is the more fundamental precondition.
    LockNotHeld { holder_id: Option<DbId> },
    /// The stored version moved since the caller's read.
    VersionConflict { actual: i64, expected: i64 },
}

/// Read-only projection of a document's lock fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockStatus {
    pub is_locked: bool,
    pub locked_by_user_id: Option<DbId>,
    pub locked_by_user_name: Option<String>,
    pub is_locked_by_current_user: bool,
    pub lock_heartbeat_at: Option<Timestamp>,
    /// `true` when the heartbeat is older than [`LOCK_STALE_SECS`], i.e. the
    /// lock is eligible for theft.
    pub is_stale: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
