//! Transport abstraction for the lock/save RPC surface.

use async_trait::async_trait;
use mindgraph_core::locking::{AcquireOutcome, LockStatus, RefreshOutcome};
use mindgraph_core::types::{DbId, Timestamp};
use serde::Deserialize;

/// Errors surfaced to the session and the editor UI.
///
/// Typed server rejections (`LockNotHeld`, `VersionConflict`) are distinct
/// from transport failures: a heartbeat that fails with [`Transport`] means
/// "unknown", not "lost", and must be retried rather than treated as loss.
///
/// [`Transport`]: ClientError::Transport
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("document not found")]
    NotFound,

    #[error("not authenticated")]
    Unauthorized,

    #[error("edit lock not held")]
    LockNotHeld { holder_id: Option<DbId> },

    #[error("version conflict: document is at {actual}, save expected {expected}")]
    VersionConflict { actual: i64, expected: i64 },

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// Body of a successful save.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SaveOk {
    pub version: i64,
    pub updated_at: Timestamp,
}

/// The lock/save operations the session drives.
///
/// Implemented over HTTP by [`crate::http::HttpLockApi`]; tests substitute
/// an in-memory coordinator.
#[async_trait]
pub trait LockApi: Send + Sync + 'static {
    async fn acquire(&self, document_id: DbId) -> Result<AcquireOutcome, ClientError>;

    async fn refresh(&self, document_id: DbId) -> Result<RefreshOutcome, ClientError>;

    async fn release(&self, document_id: DbId) -> Result<bool, ClientError>;

    /// Fire-and-forget release for abrupt teardown. Initiates the request
    /// and returns without waiting for (or reporting) the result; it must
    /// never block the caller's shutdown path.
    fn release_beacon(&self, document_id: DbId);

    async fn status(&self, document_id: DbId) -> Result<LockStatus, ClientError>;

    async fn save(
        &self,
        document_id: DbId,
        body: &serde_json::Value,
        version: i64,
    ) -> Result<SaveOk, ClientError>;
}
