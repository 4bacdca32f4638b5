//! Integration tests for the lock coordinator and the optimistic save path.
//!
//! Exercises the repository layer against a real database: acquire/steal/
//! refresh/release transitions, version-checked saves, guarded rename and
//! delete, tenant isolation, and the two write races (concurrent acquire,
//! concurrent save) that must be resolved by the store's conditional
//! updates.

use assert_matches::assert_matches;
use mindgraph_core::locking::{AcquireOutcome, RefreshOutcome, SaveOutcome, LOCK_STALE_SECS};
use mindgraph_db::models::document::Document;
use mindgraph_db::repositories::{
    DocumentLockRepo, DocumentRepo, GuardedWriteOutcome, UserRepo,
};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    org_id: i64,
    alice: i64,
    bob: i64,
    doc: Document,
}

async fn fixture(pool: &PgPool) -> Fixture {
    let org_id = UserRepo::create_org(pool, "acme").await.unwrap();
    let alice = UserRepo::create(pool, org_id, "Alice", "alice@acme.test")
        .await
        .unwrap()
        .id;
    let bob = UserRepo::create(pool, org_id, "Bob", "bob@acme.test")
        .await
        .unwrap()
        .id;
    let doc = DocumentRepo::create(pool, org_id, "Roadmap", &json!({"nodes": []}))
        .await
        .unwrap();
    Fixture {
        org_id,
        alice,
        bob,
        doc,
    }
}

async fn acquire(pool: &PgPool, f: &Fixture, user: i64) -> AcquireOutcome {
    DocumentLockRepo::acquire(pool, f.org_id, f.doc.id, user)
        .await
        .unwrap()
        .expect("document should exist")
}

// ---------------------------------------------------------------------------
// Acquire / refresh / release
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn new_document_starts_unlocked_at_version_one(pool: PgPool) {
    let f = fixture(&pool).await;
    assert_eq!(f.doc.version, 1);
    assert!(!f.doc.is_locked);
    assert_eq!(f.doc.locked_by_user_id, None);
    assert_eq!(f.doc.lock_heartbeat_at, None);
}

#[sqlx::test(migrations = "./migrations")]
async fn acquire_unlocked_grants(pool: PgPool) {
    let f = fixture(&pool).await;
    assert_eq!(
        acquire(&pool, &f, f.alice).await,
        AcquireOutcome::Acquired { was_stolen: false }
    );

    let doc = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap();
    assert!(doc.is_locked);
    assert_eq!(doc.locked_by_user_id, Some(f.alice));
    assert!(doc.lock_heartbeat_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn acquire_by_holder_is_idempotent_and_refreshes_heartbeat(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;

    let first = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap()
        .lock_heartbeat_at
        .unwrap();

    // Repeated acquires by the holder keep returning Acquired(stolen=false).
    for _ in 0..3 {
        assert_eq!(
            acquire(&pool, &f, f.alice).await,
            AcquireOutcome::Acquired { was_stolen: false }
        );
    }

    let after = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap()
        .lock_heartbeat_at
        .unwrap();
    assert!(after >= first, "re-entry must not move the heartbeat backwards");
}

#[sqlx::test(migrations = "./migrations")]
async fn acquire_against_fresh_lock_is_read_only(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;

    let outcome = acquire(&pool, &f, f.bob).await;
    assert_eq!(
        outcome,
        AcquireOutcome::ReadOnly {
            locked_by_user_id: f.alice,
            locked_by_user_name: "Alice".to_string(),
        }
    );

    // Denial mutates nothing.
    let doc = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.locked_by_user_id, Some(f.alice));
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_lock_is_stolen_and_old_holder_loses(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;

    // Alice goes quiet past the staleness threshold.
    DocumentLockRepo::backdate_heartbeat(&pool, f.doc.id, LOCK_STALE_SECS + 1)
        .await
        .unwrap();

    assert_eq!(
        acquire(&pool, &f, f.bob).await,
        AcquireOutcome::Acquired { was_stolen: true }
    );

    // Alice's next heartbeat discovers the theft.
    assert_matches!(
        DocumentLockRepo::refresh(&pool, f.org_id, f.doc.id, f.alice)
            .await
            .unwrap(),
        Some(RefreshOutcome::LockLost)
    );

    // Bob's heartbeat works.
    assert_matches!(
        DocumentLockRepo::refresh(&pool, f.org_id, f.doc.id, f.bob)
            .await
            .unwrap(),
        Some(RefreshOutcome::Ok { .. })
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn lock_at_exact_threshold_is_not_stolen(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;
    DocumentLockRepo::backdate_heartbeat(&pool, f.doc.id, LOCK_STALE_SECS - 1)
        .await
        .unwrap();

    assert_matches!(
        acquire(&pool, &f, f.bob).await,
        AcquireOutcome::ReadOnly { .. }
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn release_is_idempotent_and_holder_only(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;

    // Non-holder release is a no-op, not an error.
    assert_eq!(
        DocumentLockRepo::release(&pool, f.org_id, f.doc.id, f.bob)
            .await
            .unwrap(),
        Some(false)
    );

    // Holder release clears all lock fields.
    assert_eq!(
        DocumentLockRepo::release(&pool, f.org_id, f.doc.id, f.alice)
            .await
            .unwrap(),
        Some(true)
    );
    let doc = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!doc.is_locked);
    assert_eq!(doc.locked_by_user_id, None);
    assert_eq!(doc.lock_heartbeat_at, None);

    // Second release is also a clean no-op.
    assert_eq!(
        DocumentLockRepo::release(&pool, f.org_id, f.doc.id, f.alice)
            .await
            .unwrap(),
        Some(false)
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn refresh_without_lock_reports_lock_lost(pool: PgPool) {
    let f = fixture(&pool).await;
    assert_matches!(
        DocumentLockRepo::refresh(&pool, f.org_id, f.doc.id, f.alice)
            .await
            .unwrap(),
        Some(RefreshOutcome::LockLost)
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn status_reports_holder_and_staleness(pool: PgPool) {
    let f = fixture(&pool).await;

    let status = DocumentLockRepo::status(&pool, f.org_id, f.doc.id, f.bob)
        .await
        .unwrap()
        .unwrap();
    assert!(!status.is_locked);
    assert!(!status.is_stale);

    acquire(&pool, &f, f.alice).await;
    let status = DocumentLockRepo::status(&pool, f.org_id, f.doc.id, f.bob)
        .await
        .unwrap()
        .unwrap();
    assert!(status.is_locked);
    assert_eq!(status.locked_by_user_id, Some(f.alice));
    assert_eq!(status.locked_by_user_name.as_deref(), Some("Alice"));
    assert!(!status.is_locked_by_current_user);
    assert!(!status.is_stale);

    let status = DocumentLockRepo::status(&pool, f.org_id, f.doc.id, f.alice)
        .await
        .unwrap()
        .unwrap();
    assert!(status.is_locked_by_current_user);

    DocumentLockRepo::backdate_heartbeat(&pool, f.doc.id, LOCK_STALE_SECS + 5)
        .await
        .unwrap();
    let status = DocumentLockRepo::status(&pool, f.org_id, f.doc.id, f.bob)
        .await
        .unwrap()
        .unwrap();
    assert!(status.is_stale);
}

// ---------------------------------------------------------------------------
// Save path
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn save_with_lock_and_matching_version_increments_by_one(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;

    let outcome = DocumentRepo::save(
        &pool,
        f.org_id,
        f.doc.id,
        f.alice,
        &json!({"nodes": [{"id": 1}]}),
        1,
    )
    .await
    .unwrap()
    .unwrap();
    assert_matches!(outcome, SaveOutcome::Saved { version: 2, .. });

    let doc = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.version, 2);
    assert_eq!(doc.body, json!({"nodes": [{"id": 1}]}));
}

#[sqlx::test(migrations = "./migrations")]
async fn save_with_stale_version_conflicts_and_mutates_nothing(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;
    DocumentRepo::save(&pool, f.org_id, f.doc.id, f.alice, &json!({"v": 2}), 1)
        .await
        .unwrap();

    let outcome = DocumentRepo::save(&pool, f.org_id, f.doc.id, f.alice, &json!({"v": "x"}), 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        outcome,
        SaveOutcome::VersionConflict {
            actual: 2,
            expected: 1,
        }
    );

    let doc = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.version, 2);
    assert_eq!(doc.body, json!({"v": 2}));
}

#[sqlx::test(migrations = "./migrations")]
async fn save_without_lock_is_rejected_regardless_of_version(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;

    // Bob has the right version but not the lock.
    let outcome = DocumentRepo::save(&pool, f.org_id, f.doc.id, f.bob, &json!({}), 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        outcome,
        SaveOutcome::LockNotHeld {
            holder_id: Some(f.alice),
        }
    );

    // Nobody holds the lock at all.
    DocumentLockRepo::release(&pool, f.org_id, f.doc.id, f.alice)
        .await
        .unwrap();
    let outcome = DocumentRepo::save(&pool, f.org_id, f.doc.id, f.alice, &json!({}), 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, SaveOutcome::LockNotHeld { holder_id: None });

    let doc = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.version, 1, "rejected saves must not bump the version");
}

// ---------------------------------------------------------------------------
// Guarded rename / delete
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn rename_requires_holding_the_lock(pool: PgPool) {
    let f = fixture(&pool).await;

    // Unlocked: rename is rejected (the lock is the edit permission).
    assert_eq!(
        DocumentRepo::rename(&pool, f.org_id, f.doc.id, f.alice, "Renamed")
            .await
            .unwrap(),
        Some(GuardedWriteOutcome::LockedByOther { holder_id: None })
    );

    acquire(&pool, &f, f.alice).await;
    assert_eq!(
        DocumentRepo::rename(&pool, f.org_id, f.doc.id, f.alice, "Renamed")
            .await
            .unwrap(),
        Some(GuardedWriteOutcome::Ok)
    );
    assert_eq!(
        DocumentRepo::rename(&pool, f.org_id, f.doc.id, f.bob, "Hijacked")
            .await
            .unwrap(),
        Some(GuardedWriteOutcome::LockedByOther {
            holder_id: Some(f.alice),
        })
    );

    let doc = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.title, "Renamed");
}

#[sqlx::test(migrations = "./migrations")]
async fn delete_rejected_when_locked_by_other(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;

    assert_eq!(
        DocumentRepo::delete(&pool, f.org_id, f.doc.id, f.bob)
            .await
            .unwrap(),
        Some(GuardedWriteOutcome::LockedByOther {
            holder_id: Some(f.alice),
        })
    );

    // The holder may delete.
    assert_eq!(
        DocumentRepo::delete(&pool, f.org_id, f.doc.id, f.alice)
            .await
            .unwrap(),
        Some(GuardedWriteOutcome::Ok)
    );
    assert!(DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn delete_allowed_when_unlocked(pool: PgPool) {
    let f = fixture(&pool).await;
    assert_eq!(
        DocumentRepo::delete(&pool, f.org_id, f.doc.id, f.bob)
            .await
            .unwrap(),
        Some(GuardedWriteOutcome::Ok)
    );
}

// ---------------------------------------------------------------------------
// Tenant isolation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn operations_outside_the_org_report_not_found(pool: PgPool) {
    let f = fixture(&pool).await;
    let other_org = UserRepo::create_org(&pool, "rival").await.unwrap();

    assert!(DocumentRepo::find_by_id(&pool, other_org, f.doc.id)
        .await
        .unwrap()
        .is_none());
    assert!(
        DocumentLockRepo::acquire(&pool, other_org, f.doc.id, f.alice)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        DocumentLockRepo::refresh(&pool, other_org, f.doc.id, f.alice)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        DocumentLockRepo::release(&pool, other_org, f.doc.id, f.alice)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        DocumentRepo::save(&pool, other_org, f.doc.id, f.alice, &json!({}), 1)
            .await
            .unwrap()
            .is_none()
    );
    assert!(DocumentRepo::delete(&pool, other_org, f.doc.id, f.alice)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Write races
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_acquires_grant_exactly_one(pool: PgPool) {
    let f = fixture(&pool).await;

    let (a, b) = tokio::join!(
        DocumentLockRepo::acquire(&pool, f.org_id, f.doc.id, f.alice),
        DocumentLockRepo::acquire(&pool, f.org_id, f.doc.id, f.bob),
    );
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    let grants = [&a, &b]
        .iter()
        .filter(|o| matches!(o, AcquireOutcome::Acquired { was_stolen: false }))
        .count();
    let denials = [&a, &b]
        .iter()
        .filter(|o| matches!(o, AcquireOutcome::ReadOnly { .. }))
        .count();
    assert_eq!((grants, denials), (1, 1), "got {a:?} and {b:?}");
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_saves_with_same_version_commit_exactly_one(pool: PgPool) {
    let f = fixture(&pool).await;
    acquire(&pool, &f, f.alice).await;

    // Same holder, two racing saves from the same read (e.g. a double-fire
    // in the editor): the version CAS must serialize them.
    let body_a = json!({"w": "a"});
    let body_b = json!({"w": "b"});
    let (a, b) = tokio::join!(
        DocumentRepo::save(&pool, f.org_id, f.doc.id, f.alice, &body_a, 1),
        DocumentRepo::save(&pool, f.org_id, f.doc.id, f.alice, &body_b, 1),
    );
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    let saved = [&a, &b]
        .iter()
        .filter(|o| matches!(o, SaveOutcome::Saved { version: 2, .. }))
        .count();
    let conflicted = [&a, &b]
        .iter()
        .filter(|o| {
            matches!(
                o,
                SaveOutcome::VersionConflict {
                    actual: 2,
                    expected: 1,
                }
            )
        })
        .count();
    assert_eq!((saved, conflicted), (1, 1), "got {a:?} and {b:?}");

    let doc = DocumentRepo::find_by_id(&pool, f.org_id, f.doc.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.version, 2);
}

// ---------------------------------------------------------------------------
// Full lifecycle scenario
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn full_lock_and_save_lifecycle(pool: PgPool) {
    let f = fixture(&pool).await;

    // A acquires and saves at version 1.
    assert_eq!(
        acquire(&pool, &f, f.alice).await,
        AcquireOutcome::Acquired { was_stolen: false }
    );
    assert_matches!(
        DocumentRepo::save(&pool, f.org_id, f.doc.id, f.alice, &json!({"s": 1}), 1)
            .await
            .unwrap()
            .unwrap(),
        SaveOutcome::Saved { version: 2, .. }
    );

    // B is read-only while A is fresh.
    assert_matches!(
        acquire(&pool, &f, f.bob).await,
        AcquireOutcome::ReadOnly { locked_by_user_id, .. } if locked_by_user_id == f.alice
    );

    // A goes silent past the staleness window; B steals.
    DocumentLockRepo::backdate_heartbeat(&pool, f.doc.id, LOCK_STALE_SECS + 1)
        .await
        .unwrap();
    assert_eq!(
        acquire(&pool, &f, f.bob).await,
        AcquireOutcome::Acquired { was_stolen: true }
    );

    // A's next refresh reports the loss; a late save from A is rejected.
    assert_matches!(
        DocumentLockRepo::refresh(&pool, f.org_id, f.doc.id, f.alice)
            .await
            .unwrap(),
        Some(RefreshOutcome::LockLost)
    );
    assert_eq!(
        DocumentRepo::save(&pool, f.org_id, f.doc.id, f.alice, &json!({"s": "late"}), 2)
            .await
            .unwrap()
            .unwrap(),
        SaveOutcome::LockNotHeld {
            holder_id: Some(f.bob),
        }
    );

    // B saves from the current version and the chain continues.
    assert_matches!(
        DocumentRepo::save(&pool, f.org_id, f.doc.id, f.bob, &json!({"s": 2}), 2)
            .await
            .unwrap()
            .unwrap(),
        SaveOutcome::Saved { version: 3, .. }
    );
}
