//! Handlers for the document lock coordinator: acquire, refresh, release,
//! status, and the unload-beacon release path.
//!
//! The coordinator itself is stateless per call; every transition is a
//! conditional update executed by `DocumentLockRepo`. Handlers only resolve
//! the authenticated principal, branch on the typed outcome, and log.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use mindgraph_core::error::CoreError;
use mindgraph_core::locking::{AcquireOutcome, RefreshOutcome};
use mindgraph_core::types::DbId;
use mindgraph_db::repositories::DocumentLockRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/documents/{id}/lock/acquire
///
/// Acquire the exclusive edit lock. Idempotent for the current holder;
/// steals a stale lock; otherwise reports read-only with the holder's
/// identity.
pub async fn acquire_lock(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcome = DocumentLockRepo::acquire(&state.pool, auth.org_id, document_id, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "document",
            id: document_id,
        }))?;

    match &outcome {
        AcquireOutcome::Acquired { was_stolen } => {
            tracing::info!(
                user_id = auth.user_id,
                document_id,
                was_stolen,
                "Lock acquired"
            );
        }
        AcquireOutcome::ReadOnly {
            locked_by_user_id, ..
        } => {
            tracing::debug!(
                user_id = auth.user_id,
                document_id,
                holder = locked_by_user_id,
                "Lock denied, read-only"
            );
        }
    }

    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/documents/{id}/lock/refresh
///
/// Heartbeat. Returns `{status: "ok"}` with the new heartbeat, or
/// `{status: "lock_lost"}` when the lock was stolen or released from under
/// the caller. Loss is an expected, typed result the client branches on,
/// not an error status.
pub async fn refresh_lock(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcome = DocumentLockRepo::refresh(&state.pool, auth.org_id, document_id, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "document",
            id: document_id,
        }))?;

    if outcome == RefreshOutcome::LockLost {
        tracing::info!(
            user_id = auth.user_id,
            document_id,
            "Heartbeat rejected: lock no longer held"
        );
    }

    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/documents/{id}/lock/release
///
/// Release a held lock. A no-op (`released: false`) when the caller is not
/// the holder; safe to call redundantly.
pub async fn release_lock(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let released = DocumentLockRepo::release(&state.pool, auth.org_id, document_id, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "document",
            id: document_id,
        }))?;

    if released {
        tracing::info!(user_id = auth.user_id, document_id, "Lock released");
    }

    Ok(Json(DataResponse {
        data: serde_json::json!({ "released": released }),
    }))
}

/// POST /api/v1/documents/{id}/lock/release-beacon
///
/// Fire-and-forget release for page unload. Runs the exact same release
/// logic but always answers 204 immediately -- the sender is gone and
/// cannot act on a failure anyway, so errors are logged and swallowed.
pub async fn release_lock_beacon(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
) -> StatusCode {
    match DocumentLockRepo::release(&state.pool, auth.org_id, document_id, auth.user_id).await {
        Ok(Some(true)) => {
            tracing::info!(user_id = auth.user_id, document_id, "Lock released via beacon");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(
                user_id = auth.user_id,
                document_id,
                error = %err,
                "Beacon release failed"
            );
        }
    }
    StatusCode::NO_CONTENT
}

/// GET /api/v1/documents/{id}/lock
///
/// Read-only lock projection, used for display and for read-only polling
/// by non-holders.
pub async fn get_lock_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let status = DocumentLockRepo::status(&state.pool, auth.org_id, document_id, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "document",
            id: document_id,
        }))?;

    Ok(Json(DataResponse { data: status }))
}
