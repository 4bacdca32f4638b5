//! User model. Identity management itself is an external concern; this
//! table exists so lock holders can be resolved to display names.

use mindgraph_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub org_id: DbId,
    pub display_name: String,
    pub email: String,
    pub created_at: Timestamp,
}
