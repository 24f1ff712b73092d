//! REST API client module for the Manupedia backend.
//!
//! - `ApiClient`: connection pool, request building, response checking;
//!   implements `AuthApi` for the login and signup endpoints
//! - `AuthorizedClient`: authenticated requests that carry the session's
//!   bearer token and log the session out on a 401
//! - `ApiError`: status-mapped errors carrying the backend's `message`

pub mod authorized;
pub mod client;
pub mod error;

pub use authorized::AuthorizedClient;
pub use client::{ApiClient, AuthApi, DynAuthApi, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
