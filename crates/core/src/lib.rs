//! Shared domain types for the mindgraph backend and client.
//!
//! This crate has zero internal dependencies so the persistence layer, the
//! HTTP service, and the editor client can all reference the same lock
//! policy, error taxonomy, and session state machine.

pub mod error;
pub mod locking;
pub mod session;
pub mod types;
