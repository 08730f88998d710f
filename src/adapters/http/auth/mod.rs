//! HTTP adapter for the auth endpoints.
//!
//! Sign-up, password and OAuth login, session refresh and logout, email
//! verification, password reset and email change.

pub mod dto;
pub mod handlers;
mod redirect;
pub mod routes;

pub use handlers::AuthHandlers;
pub use redirect::sanitize_redirect;
pub use routes::auth_routes;
