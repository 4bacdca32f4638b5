use crate::types::DbId;

/// Domain-level error taxonomy shared by all crates.
///
/// Lock and version violations are expected, recoverable conditions: they are
/// returned as typed values and callers branch on them. Nothing in this crate
/// panics across the core boundary.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A save/rename/delete was attempted without holding the document lock.
    #[error("Lock not held on document {document_id}")]
    LockNotHeld {
        document_id: DbId,
        holder_id: Option<DbId>,
    },

    /// A save carried a version that no longer matches the stored one.
    #[error("Version conflict on document {document_id}: expected {expected}, found {actual}")]
    VersionConflict {
        document_id: DbId,
        expected: i64,
        actual: i64,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
