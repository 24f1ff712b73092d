//! Data models shared between the API client and the session manager.
//!
//! - `Identity`, `Role`: the authenticated user's profile snapshot
//! - `LoginRequest`, `SignupRequest`, `AuthResponse`: auth endpoint payloads

pub mod user;

pub use user::{AuthResponse, Identity, IdentityError, LoginRequest, Role, SignupRequest};
