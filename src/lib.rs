//! Blueprint Auth - session lifecycle and identity linking
//!
//! Verifies provider-issued access tokens against a cached JWKS, keeps
//! cookie sessions alive through refresh, and reconciles every remote
//! identity onto exactly one local user.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
