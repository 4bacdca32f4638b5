use std::sync::Arc;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
/// The pool is the only persistence handle; it is constructed once at
/// bootstrap and injected here rather than living in a module-level global.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: mindgraph_db::DbPool,
    /// Server configuration (JWT secret, CORS, timeouts).
    pub config: Arc<ServerConfig>,
}
