//! Editor-side lock session for mindgraph documents.
//!
//! [`LockSession`] drives the full client lifecycle: acquire on attach,
//! periodic heartbeats, loss detection, and best-effort release on detach
//! (including the fire-and-forget beacon path for abrupt teardown). The
//! transport is abstracted behind [`api::LockApi`] so the session logic is
//! testable against an in-memory coordinator.

pub mod api;
pub mod http;
pub mod session;

pub use api::{ClientError, LockApi, SaveOk};
pub use session::{LockSession, SessionOptions};
