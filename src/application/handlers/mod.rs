//! Application handlers.
//!
//! Command handlers that orchestrate the session manager, reconciler and
//! identity provider for each auth operation.

pub mod auth;

pub use auth::*;
