//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, validation helpers and error types
//! that form the vocabulary of the auth domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;
mod validation;

pub use errors::{ErrorCode, ValidationError};
pub use ids::{IdentityId, TeamId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
pub use validation::{
    normalize_email, validate_email, validate_external_id, validate_optional_name,
    validate_password, PasswordPolicy,
};
