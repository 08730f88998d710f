//! Auth command handlers.

mod authenticate_request;
mod change_email;
mod email_verification;
mod password_reset;
mod refresh_session;
mod sign_in;
mod sign_out;
mod sign_up;

pub use authenticate_request::{AuthenticateRequestHandler, AuthenticatedRequest};
pub use change_email::{ChangeEmailCommand, ChangeEmailHandler};
pub use email_verification::{
    ConfirmVerificationCommand, ConfirmVerificationHandler, ConfirmVerificationResult,
    ResendVerificationHandler, ResendVerificationResult, SendVerificationHandler,
};
pub use password_reset::{
    ConfirmPasswordResetCommand, ConfirmPasswordResetHandler, RequestPasswordResetHandler,
};
pub use refresh_session::{RefreshSessionCommand, RefreshSessionHandler};
pub use sign_in::{SignInCommand, SignInHandler, SignedIn};
pub use sign_out::SignOutHandler;
pub use sign_up::{SignUpCommand, SignUpHandler, SignUpResult};
