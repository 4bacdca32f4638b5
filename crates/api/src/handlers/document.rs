//! Handlers for document CRUD and the version-checked save path.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use mindgraph_core::error::CoreError;
use mindgraph_core::locking::SaveOutcome;
use mindgraph_core::types::{DbId, Timestamp};
use mindgraph_db::models::document::{
    CreateDocumentRequest, RenameDocumentRequest, SaveDocumentRequest,
};
use mindgraph_db::repositories::{DocumentRepo, GuardedWriteOutcome};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(document_id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "document",
        id: document_id,
    })
}

/// POST /api/v1/documents
pub async fn create_document(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateDocumentRequest>,
) -> AppResult<impl IntoResponse> {
    if input.title.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Document title must not be empty".into(),
        )));
    }

    let body = input.body.unwrap_or_else(|| serde_json::json!({}));
    let doc = DocumentRepo::create(&state.pool, auth.org_id, input.title.trim(), &body).await?;

    tracing::info!(user_id = auth.user_id, document_id = doc.id, "Document created");
    Ok(Json(DataResponse { data: doc }))
}

/// GET /api/v1/documents
pub async fn list_documents(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let docs = DocumentRepo::list_by_org(&state.pool, auth.org_id).await?;
    Ok(Json(DataResponse { data: docs }))
}

/// GET /api/v1/documents/{id}
pub async fn get_document(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let doc = DocumentRepo::find_by_id(&state.pool, auth.org_id, document_id)
        .await?
        .ok_or_else(|| not_found(document_id))?;
    Ok(Json(DataResponse { data: doc }))
}

/// Body of a successful save response.
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub version: i64,
    pub updated_at: Timestamp,
}

/// PUT /api/v1/documents/{id}
///
/// Commit a new body. Requires the caller to hold the lock AND to supply
/// the version it read the document at; both are checked by the store in
/// the same atomic write. Rejections come back as typed errors
/// (`LOCK_NOT_HELD` / `VERSION_CONFLICT`) the client recovers from via an
/// explicit reload, never an automatic merge.
pub async fn save_document(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
    Json(input): Json<SaveDocumentRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = DocumentRepo::save(
        &state.pool,
        auth.org_id,
        document_id,
        auth.user_id,
        &input.body,
        input.version,
    )
    .await?
    .ok_or_else(|| not_found(document_id))?;

    match outcome {
        SaveOutcome::Saved {
            version,
            updated_at,
        } => {
            tracing::info!(
                user_id = auth.user_id,
                document_id,
                version,
                "Document saved"
            );
            Ok(Json(DataResponse {
                data: SaveResponse {
                    version,
                    updated_at,
                },
            }))
        }
        SaveOutcome::LockNotHeld { holder_id } => Err(AppError::Core(CoreError::LockNotHeld {
            document_id,
            holder_id,
        })),
        SaveOutcome::VersionConflict { actual, expected } => {
            tracing::info!(
                user_id = auth.user_id,
                document_id,
                actual,
                expected,
                "Save rejected: version conflict"
            );
            Err(AppError::Core(CoreError::VersionConflict {
                document_id,
                expected,
                actual,
            }))
        }
    }
}

/// PATCH /api/v1/documents/{id}/title
///
/// Rename. Borrows the save path's precondition: the caller must hold the
/// edit lock.
pub async fn rename_document(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
    Json(input): Json<RenameDocumentRequest>,
) -> AppResult<impl IntoResponse> {
    if input.title.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Document title must not be empty".into(),
        )));
    }

    let outcome = DocumentRepo::rename(
        &state.pool,
        auth.org_id,
        document_id,
        auth.user_id,
        input.title.trim(),
    )
    .await?
    .ok_or_else(|| not_found(document_id))?;

    match outcome {
        GuardedWriteOutcome::Ok => Ok(Json(DataResponse {
            data: serde_json::json!({ "renamed": true }),
        })),
        GuardedWriteOutcome::LockedByOther { holder_id } => {
            Err(AppError::Core(CoreError::LockNotHeld {
                document_id,
                holder_id,
            }))
        }
    }
}

/// DELETE /api/v1/documents/{id}
///
/// Permitted when the document is unlocked or locked by the caller.
pub async fn delete_document(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcome = DocumentRepo::delete(&state.pool, auth.org_id, document_id, auth.user_id)
        .await?
        .ok_or_else(|| not_found(document_id))?;

    match outcome {
        GuardedWriteOutcome::Ok => {
            tracing::info!(user_id = auth.user_id, document_id, "Document deleted");
            Ok(Json(DataResponse {
                data: serde_json::json!({ "deleted": true }),
            }))
        }
        GuardedWriteOutcome::LockedByOther { holder_id } => {
            Err(AppError::Core(CoreError::LockNotHeld {
                document_id,
                holder_id,
            }))
        }
    }
}
