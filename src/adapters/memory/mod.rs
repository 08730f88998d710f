//! In-memory adapters for tests and local development.

mod identity_store;

pub use identity_store::InMemoryIdentityStore;
