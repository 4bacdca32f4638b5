//! Repository for the document lock fields.
//!
//! The coordinator is stateless per call: each operation reads the lock
//! fields, decides via `mindgraph_core::locking`, and applies the decision
//! as a conditional UPDATE keyed on the exact values it observed. A failed
//! condition means another caller won the race, so the snapshot is re-read
//! and the decision re-evaluated. Staleness is judged against the database
//! clock (`NOW()`), never the application clock, so multiple API instances
//! with skewed clocks agree on what is stale.

use mindgraph_core::locking::{
    decide_acquire, is_stale, AcquireDecision, AcquireOutcome, LockSnapshot, LockStatus,
    RefreshOutcome,
};
use mindgraph_core::types::{DbId, Timestamp};
use sqlx::PgPool;

/// A lock snapshot read together with the database clock and the holder's
/// display name.
#[derive(Debug, sqlx::FromRow)]
struct LockRead {
    locked_by_user_id: Option<DbId>,
    lock_heartbeat_at: Option<Timestamp>,
    holder_name: Option<String>,
    db_now: Timestamp,
}

/// Lock transitions for a single document row.
pub struct DocumentLockRepo;

impl DocumentLockRepo {
    /// Read the current lock fields, the holder's name, and the DB clock.
    ///
    /// Returns `None` if the document does not exist within the org.
    async fn read(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
    ) -> Result<Option<LockRead>, sqlx::Error> {
        sqlx::query_as::<_, LockRead>(
            "SELECT d.locked_by_user_id, d.lock_heartbeat_at, \
                    u.display_name AS holder_name, NOW() AS db_now \
             FROM documents d \
             LEFT JOIN users u ON u.id = d.locked_by_user_id \
             WHERE d.id = $1 AND d.org_id = $2",
        )
        .bind(document_id)
        .bind(org_id)
        .fetch_optional(pool)
        .await
    }

    /// Attempt to acquire (or re-enter, or steal) the exclusive lock.
    ///
    /// Returns `None` if the document is not visible in the org. Otherwise
    /// loops read -> decide -> conditional write until one write lands or
    /// the decision is a deny; every retry means another caller made
    /// progress in between, so the loop terminates in practice after at
    /// most a couple of iterations.
    pub async fn acquire(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
        user_id: DbId,
    ) -> Result<Option<AcquireOutcome>, sqlx::Error> {
        loop {
            let Some(read) = Self::read(pool, org_id, document_id).await? else {
                return Ok(None);
            };

            let snapshot = LockSnapshot {
                locked_by: read.locked_by_user_id,
                heartbeat_at: read.lock_heartbeat_at,
            };

            match decide_acquire(&snapshot, user_id, read.db_now) {
                AcquireDecision::Grant => {
                    let result = sqlx::query(
                        "UPDATE documents \
                         SET is_locked = TRUE, locked_by_user_id = $3, lock_heartbeat_at = NOW() \
                         WHERE id = $1 AND org_id = $2 AND is_locked = FALSE",
                    )
                    .bind(document_id)
                    .bind(org_id)
                    .bind(user_id)
                    .execute(pool)
                    .await?;

                    if result.rows_affected() == 1 {
                        return Ok(Some(AcquireOutcome::Acquired { was_stolen: false }));
                    }
                }
                AcquireDecision::Reenter => {
                    let result = sqlx::query(
                        "UPDATE documents SET lock_heartbeat_at = NOW() \
                         WHERE id = $1 AND org_id = $2 AND locked_by_user_id = $3",
                    )
                    .bind(document_id)
                    .bind(org_id)
                    .bind(user_id)
                    .execute(pool)
                    .await?;

                    if result.rows_affected() == 1 {
                        return Ok(Some(AcquireOutcome::Acquired { was_stolen: false }));
                    }
                }
                AcquireDecision::Steal { previous_holder } => {
                    // CAS on the exact heartbeat we judged stale: if the
                    // holder heartbeats (or anyone else steals) in between,
                    // zero rows match and we re-evaluate.
                    let result = sqlx::query(
                        "UPDATE documents \
                         SET locked_by_user_id = $3, lock_heartbeat_at = NOW() \
                         WHERE id = $1 AND org_id = $2 \
                           AND locked_by_user_id = $4 AND lock_heartbeat_at = $5",
                    )
                    .bind(document_id)
                    .bind(org_id)
                    .bind(user_id)
                    .bind(previous_holder)
                    .bind(read.lock_heartbeat_at)
                    .execute(pool)
                    .await?;

                    if result.rows_affected() == 1 {
                        tracing::warn!(
                            document_id,
                            new_holder = user_id,
                            dispossessed = previous_holder,
                            "Stale lock stolen"
                        );
                        return Ok(Some(AcquireOutcome::Acquired { was_stolen: true }));
                    }
                }
                AcquireDecision::Deny { holder } => {
                    return Ok(Some(AcquireOutcome::ReadOnly {
                        locked_by_user_id: holder,
                        locked_by_user_name: read.holder_name.unwrap_or_default(),
                    }));
                }
            }

            tracing::debug!(document_id, user_id, "Acquire lost a write race, re-reading");
        }
    }

    /// Advance the holder's heartbeat.
    ///
    /// Returns `None` for a missing document, `LockLost` when the caller no
    /// longer holds the lock (stolen or released from under them).
    pub async fn refresh(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
        user_id: DbId,
    ) -> Result<Option<RefreshOutcome>, sqlx::Error> {
        let heartbeat: Option<(Timestamp,)> = sqlx::query_as(
            "UPDATE documents SET lock_heartbeat_at = NOW() \
             WHERE id = $1 AND org_id = $2 AND is_locked = TRUE AND locked_by_user_id = $3 \
             RETURNING lock_heartbeat_at",
        )
        .bind(document_id)
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        if let Some((heartbeat_at,)) = heartbeat {
            return Ok(Some(RefreshOutcome::Ok { heartbeat_at }));
        }

        // Distinguish "document gone" from "lock lost".
        match Self::read(pool, org_id, document_id).await? {
            None => Ok(None),
            Some(_) => Ok(Some(RefreshOutcome::LockLost)),
        }
    }

    /// Release the lock if (and only if) the caller holds it.
    ///
    /// Safe to call redundantly: releasing an already-released lock, or one
    /// now held by someone else, is a no-op returning `false`. Returns
    /// `None` for a missing document.
    pub async fn release(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
        user_id: DbId,
    ) -> Result<Option<bool>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE documents \
             SET is_locked = FALSE, locked_by_user_id = NULL, lock_heartbeat_at = NULL \
             WHERE id = $1 AND org_id = $2 AND locked_by_user_id = $3",
        )
        .bind(document_id)
        .bind(org_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(Some(true));
        }

        match Self::read(pool, org_id, document_id).await? {
            None => Ok(None),
            Some(_) => Ok(Some(false)),
        }
    }

    /// Read-only lock projection for display and read-only polling.
    pub async fn status(
        pool: &PgPool,
        org_id: DbId,
        document_id: DbId,
        current_user_id: DbId,
    ) -> Result<Option<LockStatus>, sqlx::Error> {
        let Some(read) = Self::read(pool, org_id, document_id).await? else {
            return Ok(None);
        };

        Ok(Some(LockStatus {
            is_locked: read.locked_by_user_id.is_some(),
            locked_by_user_id: read.locked_by_user_id,
            locked_by_user_name: read.holder_name,
            is_locked_by_current_user: read.locked_by_user_id == Some(current_user_id),
            lock_heartbeat_at: read.lock_heartbeat_at,
            is_stale: read
                .lock_heartbeat_at
                .map(|hb| is_stale(hb, read.db_now))
                .unwrap_or(false),
        }))
    }

    /// Make a held lock stale by backdating its heartbeat.
    ///
    /// Test/tooling helper: simulates a holder that stopped heartbeating
    /// without waiting out the real staleness window.
    pub async fn backdate_heartbeat(
        pool: &PgPool,
        document_id: DbId,
        age_secs: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE documents \
             SET lock_heartbeat_at = NOW() - make_interval(secs => $2) \
             WHERE id = $1 AND is_locked = TRUE",
        )
        .bind(document_id)
        .bind(age_secs as f64)
        .execute(pool)
        .await?;
        Ok(())
    }
}
