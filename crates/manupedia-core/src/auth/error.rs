use thiserror::Error;

use crate::api::ApiError;
use crate::models::IdentityError;

pub const LOGIN_FAILED: &str = "Login failed";
pub const SIGNUP_FAILED: &str = "Signup failed";

#[derive(Error, Debug)]
pub enum AuthFailureCause {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Malformed auth response: {0}")]
    MalformedResponse(#[from] IdentityError),
}

/// A failed login or signup. `Display` yields the message meant for the user.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct AuthFailure {
    message: String,
    #[source]
    cause: AuthFailureCause,
}

impl AuthFailure {
    /// Use the backend's `message` when it sent one, otherwise `fallback`.
    pub fn new(cause: impl Into<AuthFailureCause>, fallback: &str) -> Self {
        let cause = cause.into();
        let message = match &cause {
            AuthFailureCause::Api(e) => e.payload_message().unwrap_or(fallback).to_string(),
            AuthFailureCause::MalformedResponse(_) => fallback.to_string(),
        };
        Self { message, cause }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> &AuthFailureCause {
        &self.cause
    }

    /// True when no response was received at all.
    pub fn is_network(&self) -> bool {
        matches!(self.cause, AuthFailureCause::Api(ApiError::NetworkError(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_payload() {
        let failure = AuthFailure::new(
            ApiError::BadRequest {
                status: 400,
                message: Some("Email taken".to_string()),
            },
            SIGNUP_FAILED,
        );
        assert_eq!(failure.message(), "Email taken");
        assert_eq!(failure.to_string(), "Email taken");
    }

    #[test]
    fn test_message_falls_back() {
        let failure = AuthFailure::new(ApiError::Unauthorized { message: None }, LOGIN_FAILED);
        assert_eq!(failure.message(), "Login failed");

        let failure = AuthFailure::new(
            ApiError::InvalidResponse("missing field `token`".to_string()),
            LOGIN_FAILED,
        );
        assert_eq!(failure.message(), "Login failed");
        assert!(!failure.is_network());

        let failure = AuthFailure::new(IdentityError::EmptyField("token"), SIGNUP_FAILED);
        assert_eq!(failure.message(), "Signup failed");
        assert!(matches!(failure.cause(), AuthFailureCause::MalformedResponse(_)));
    }
}
