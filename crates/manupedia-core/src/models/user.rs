use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse authorization tier assigned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity id must be a positive integer, got {0}")]
    InvalidId(i64),

    #[error("identity field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("identity record is not valid JSON: {0}")]
    Malformed(String),
}

/// Public profile snapshot of the logged-in user.
///
/// Serialized as `{id, email, name, role}`, which is both the backend's
/// profile shape and the persisted `user` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Identity {
    pub id: i64,
    pub email: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub role: Role,
}

impl Identity {
    /// Check the fields serde cannot: positive id, non-blank email and name.
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.id <= 0 {
            return Err(IdentityError::InvalidId(self.id));
        }
        if self.email.trim().is_empty() {
            return Err(IdentityError::EmptyField("email"));
        }
        if self.display_name.trim().is_empty() {
            return Err(IdentityError::EmptyField("name"));
        }
        Ok(())
    }

    /// Parse and validate a persisted `user` record.
    pub fn from_json(raw: &str) -> Result<Self, IdentityError> {
        let identity: Identity =
            serde_json::from_str(raw).map_err(|e| IdentityError::Malformed(e.to_string()))?;
        identity.validate()?;
        Ok(identity)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub phone: &'a str,
}

/// Success payload of the login and signup endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthResponse {
    /// Split into the bearer token and a validated identity.
    pub fn into_parts(self) -> Result<(String, Identity), IdentityError> {
        if self.token.trim().is_empty() {
            return Err(IdentityError::EmptyField("token"));
        }
        let identity = Identity {
            id: self.id,
            email: self.email,
            display_name: self.name,
            role: self.role,
        };
        identity.validate()?;
        Ok((self.token, identity))
    }
}
