//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the auth domain and the outside world. Adapters implement these ports.
//!
//! - `TokenVerifier` - Access-token signature and claim validation
//! - `IdentityProvider` - Remote identity platform (grants, users, email flows)
//! - `IdentityStore` / `IdentityTransaction` - Local user and identity persistence

mod identity_provider;
mod identity_store;
mod token_verifier;

pub use identity_provider::{AuthorizationRequest, IdentityProvider, NewRemoteUser, ProviderError};
pub use identity_store::{IdentityStore, IdentityTransaction, StoreError, UniqueKey};
pub use token_verifier::TokenVerifier;
