//! Manupedia client core.
//!
//! The session manager owns who is logged in: it talks to the backend's
//! auth endpoints, persists the bearer token and identity, exposes
//! `is_authenticated`/`is_admin`, and notifies subscribers on every change.
//! Everything that needs a token goes through [`api::AuthorizedClient`].

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use access::{Access, QuickAccessItem, QUICK_ACCESS};
pub use api::{ApiClient, ApiError, AuthApi, AuthorizedClient};
pub use auth::{AuthFailure, AuthSession, SessionManager, SessionStore, SessionWatch};
pub use config::{Config, StorageBackend};
pub use models::{Identity, Role};
