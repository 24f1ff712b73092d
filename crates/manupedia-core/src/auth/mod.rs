//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionManager`: login/signup/logout, derived predicates, change
//!   notification, restoration at start-up
//! - `SessionStore`: durable key/value storage for the `token` and `user`
//!   keys, with file, keychain and in-memory backends
//! - `AuthFailure`: the user-facing result of a failed login or signup

pub mod credentials;
pub mod error;
pub mod session;
pub mod storage;

pub use credentials::KeychainStore;
pub use error::{AuthFailure, AuthFailureCause, LOGIN_FAILED, SIGNUP_FAILED};
pub use session::{AuthSession, SessionManager, SessionWatch};
pub use storage::{FileStore, MemoryStore, SessionStore, TOKEN_KEY, USER_KEY};
