//! Document model and DTOs.

use mindgraph_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `documents` table.
///
/// The `body` payload is an opaque mind-map graph the concurrency core never
/// interprets. The lock fields mutate only through `DocumentLockRepo`; the
/// `body`/`version` pair mutates only through `DocumentRepo::save`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Document {
    pub id: DbId,
    pub org_id: DbId,
    pub title: String,
    pub body: serde_json::Value,
    pub version: i64,
    pub is_locked: bool,
    pub locked_by_user_id: Option<DbId>,
    pub lock_heartbeat_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a document.
#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// DTO for saving a document body.
///
/// `version` is the version the client read the document at; the save is
/// rejected with a version conflict if it no longer matches.
#[derive(Debug, Deserialize)]
pub struct SaveDocumentRequest {
    pub body: serde_json::Value,
    pub version: i64,
}

/// DTO for renaming a document.
#[derive(Debug, Deserialize)]
pub struct RenameDocumentRequest {
    pub title: String,
}
