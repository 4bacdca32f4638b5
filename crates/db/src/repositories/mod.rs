//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Every query is scoped by org;
//! a document outside the caller's org is indistinguishable from a missing
//! one.

pub mod document_repo;
pub mod lock_repo;
pub mod user_repo;

pub use document_repo::{DocumentRepo, GuardedWriteOutcome};
pub use lock_repo::DocumentLockRepo;
pub use user_repo::UserRepo;
