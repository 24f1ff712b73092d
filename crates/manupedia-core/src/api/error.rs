use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {}", .message.as_deref().unwrap_or("token rejected"))]
    Unauthorized { message: Option<String> },

    #[error("Access denied: {}", .message.as_deref().unwrap_or("forbidden"))]
    AccessDenied { message: Option<String> },

    #[error("Resource not found: {}", .message.as_deref().unwrap_or("not found"))]
    NotFound { message: Option<String> },

    #[error("Request rejected ({status}): {}", .message.as_deref().unwrap_or("bad request"))]
    BadRequest { status: u16, message: Option<String> },

    #[error("Server error ({status}): {body}")]
    ServerError {
        status: u16,
        message: Option<String>,
        body: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error payload shape used by the backend: `{"message": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the `message` field out of a JSON error body, if there is one.
    fn extract_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorPayload>(body)
            .ok()
            .and_then(|p| p.message)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized { message },
            403 => ApiError::AccessDenied { message },
            404 => ApiError::NotFound { message },
            500..=599 => ApiError::ServerError {
                status: status.as_u16(),
                message,
                body: Self::truncate_body(body),
            },
            code => ApiError::BadRequest {
                status: code,
                message,
            },
        }
    }

    /// Human-readable message carried by the backend's error payload.
    pub fn payload_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { message }
            | ApiError::AccessDenied { message }
            | ApiError::NotFound { message }
            | ApiError::BadRequest { message, .. }
            | ApiError::ServerError { message, .. } => message.as_deref(),
            ApiError::NetworkError(_) | ApiError::InvalidResponse(_) => None,
        }
    }

    /// True when the backend signalled that the presented token is no longer valid.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }
}
