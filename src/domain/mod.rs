//! Domain layer containing auth business rules and value types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps, validation, errors)
//! - `identity` - Local users, linked identities and remote profiles
//! - `session` - Token claims, session lifecycle and auth errors
//! - `team` - Teams, roles and the default-team naming rule

pub mod foundation;
pub mod identity;
pub mod session;
pub mod team;
