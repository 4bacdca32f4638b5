//! Repository for the `documents` table: CRUD plus the optimistic save path.
//!
//! `save` is the one place the body/version pair mutates. The version check
//! and the write are a single conditional UPDATE (increment-if-version-
//! matches), because the caller's read and this write are separated by
//! serialization and network time; a plain read-then-write would let a
//! second writer interleave.

use mindgraph_core::locking::SaveOutcome;
use mindgraph_core::types::DbId;
use sqlx::PgPool;

use crate::models::document::Document;

/// Column list for `documents` queries.
const COLUMNS: &str = "id, org_id, title, body, version, is_locked, \
                       locked_by_user_id, lock_heartbeat_at, created_at, updated_at";

/// Outcome of a rename or delete, which borrow the lock precondition from
/// the save path.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedWriteOutcome {
    Ok,
    /// The write was rejected because another user holds the lock.
    LockedByOther { holder_id: Option<DbId> },
}

pub struct DocumentRepo;

impl DocumentRepo {
    /// Create a document. New documents start at version 1, unlocked.
    pub async fn create(
        pool: &PgPool,
        org_id: DbId,
        title: &str,
        body: &serde_json::Value,
    ) -> Result<Document, sqlx::Error> {
        let query = format!(
            "INSERT INTO documents (org_id, title, body) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(org_id)
            .bind(title)
            .bind(body)
            .fetch_one(pool)
            .await
    }

    /// Find a document within an org.
    pub async fn find_by_id(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
    ) -> Result<Option<Document>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM documents WHERE id = $1 AND org_id = $2");
        sqlx::query_as::<_, Document>(&query)
            .bind(document_id)
            .bind(org_id)
            .fetch_optional(pool)
            .await
    }

    /// List all documents in an org, most recently updated first.
    pub async fn list_by_org(pool: &PgPool, org_id: DbId) -> Result<Vec<Document>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM documents WHERE org_id = $1 ORDER BY updated_at DESC"
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(org_id)
            .fetch_all(pool)
            .await
    }

    /// Commit a new body if the caller holds the lock and `expected_version`
    /// still matches.
    ///
    /// Returns `None` if the document is not visible in the org. The UPDATE
    /// checks lock ownership and version atomically against the same row
    /// image it writes; a zero-row result is classified afterwards with one
    /// diagnostic read (lock ownership first -- it is the more fundamental
    /// precondition).
    pub async fn save(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
        user_id: DbId,
        body: &serde_json::Value,
        expected_version: i64,
    ) -> Result<Option<SaveOutcome>, sqlx::Error> {
        let query = format!(
            "UPDATE documents \
             SET body = $4, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND org_id = $2 \
               AND is_locked = TRUE AND locked_by_user_id = $3 \
               AND version = $5 \
             RETURNING {COLUMNS}"
        );
        let saved: Option<Document> = sqlx::query_as(&query)
            .bind(document_id)
            .bind(org_id)
            .bind(user_id)
            .bind(body)
            .bind(expected_version)
            .fetch_optional(pool)
            .await?;

        if let Some(doc) = saved {
            return Ok(Some(SaveOutcome::Saved {
                version: doc.version,
                updated_at: doc.updated_at,
            }));
        }

        let Some(doc) = Self::find_by_id(pool, org_id, document_id).await? else {
            return Ok(None);
        };

        if !doc.is_locked || doc.locked_by_user_id != Some(user_id) {
            return Ok(Some(SaveOutcome::LockNotHeld {
                holder_id: doc.locked_by_user_id,
            }));
        }

        Ok(Some(SaveOutcome::VersionConflict {
            actual: doc.version,
            expected: expected_version,
        }))
    }

    /// Rename a document. Requires the caller to hold the lock.
    pub async fn rename(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
        user_id: DbId,
        title: &str,
    ) -> Result<Option<GuardedWriteOutcome>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE documents SET title = $4, updated_at = NOW() \
             WHERE id = $1 AND org_id = $2 \
               AND is_locked = TRUE AND locked_by_user_id = $3",
        )
        .bind(document_id)
        .bind(org_id)
        .bind(user_id)
        .bind(title)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(Some(GuardedWriteOutcome::Ok));
        }

        match Self::find_by_id(pool, org_id, document_id).await? {
            None => Ok(None),
            Some(doc) => Ok(Some(GuardedWriteOutcome::LockedByOther {
                holder_id: doc.locked_by_user_id,
            })),
        }
    }

    /// Delete a document. Permitted when the document is unlocked or locked
    /// by the caller; rejected when another user holds the lock.
    pub async fn delete(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
        user_id: DbId,
    ) -> Result<Option<GuardedWriteOutcome>, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM documents \
             WHERE id = $1 AND org_id = $2 \
               AND (locked_by_user_id IS NULL OR locked_by_user_id = $3)",
        )
        .bind(document_id)
        .bind(org_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(Some(GuardedWriteOutcome::Ok));
        }

        match Self::find_by_id(pool, org_id, document_id).await? {
            None => Ok(None),
            Some(doc) => Ok(Some(GuardedWriteOutcome::LockedByOther {
                holder_id: doc.locked_by_user_id,
            })),
        }
    }
}
