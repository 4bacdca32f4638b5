//! Repository for the `users` table.

use mindgraph_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::User;

/// Column list for `users` queries.
const COLUMNS: &str = "id, org_id, display_name, email, created_at";

pub struct UserRepo;

impl UserRepo {
    /// Create a user within an org.
    pub async fn create(
        pool: &PgPool,
        org_id: DbId,
        display_name: &str,
        email: &str,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (org_id, display_name, email) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(org_id)
            .bind(display_name)
            .bind(email)
            .fetch_one(pool)
            .await
    }

    /// Find a user within an org.
    pub async fn find_by_id(
        pool: &PgPool,
        org_id: DbId,
        user_id: DbId,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1 AND org_id = $2");
        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(org_id)
            .fetch_optional(pool)
            .await
    }

    /// Create an org, returning its id. Tenancy bootstrap for tests and
    /// tooling; org management proper is out of scope.
    pub async fn create_org(pool: &PgPool, name: &str) -> Result<DbId, sqlx::Error> {
        let row: (DbId,) = sqlx::query_as("INSERT INTO orgs (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }
}
