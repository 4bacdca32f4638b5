//! Route definitions for documents and their locks.
//!
//! All endpoints require authentication via the `AuthUser` extractor.

use axum::routing::{delete, get, patch, post, put};
use axum::Router;

use crate::handlers::{document, lock};
use crate::state::AppState;

/// Document routes mounted at `/documents`.
///
/// ```text
/// POST   /                           -> create_document
/// GET    /                           -> list_documents
/// GET    /{id}                       -> get_document
/// PUT    /{id}                       -> save_document (version-checked)
/// PATCH  /{id}/title                 -> rename_document
/// DELETE /{id}                       -> delete_document
/// POST   /{id}/lock/acquire          -> acquire_lock
/// POST   /{id}/lock/refresh          -> refresh_lock
/// POST   /{id}/lock/release          -> release_lock
/// POST   /{id}/lock/release-beacon   -> release_lock_beacon (always 204)
/// GET    /{id}/lock                  -> get_lock_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(document::create_document))
        .route("/", get(document::list_documents))
        .route("/{id}", get(document::get_document))
        .route("/{id}", put(document::save_document))
        .route("/{id}/title", patch(document::rename_document))
        .route("/{id}", delete(document::delete_document))
        .route("/{id}/lock/acquire", post(lock::acquire_lock))
        .route("/{id}/lock/refresh", post(lock::refresh_lock))
        .route("/{id}/lock/release", post(lock::release_lock))
        .route("/{id}/lock/release-beacon", post(lock::release_lock_beacon))
        .route("/{id}/lock", get(lock::get_lock_status))
}
