//! JWT Claims Structure and Role Model
//!
//! This module defines the JwtClaims structure that is extracted from validated tokens
//! and stored in request extensions, plus the closed set of roles the policy table
//! is written against.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Roles an identity can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// JWT Claims extracted from validated tokens
///
/// Derived from crypto-core's `Claims` with the role parsed into [`Role`].
/// Cloneable so it can live in request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Username of the caller
    pub username: String,

    /// Role the token was issued for
    pub role: Role,

    /// Issued at timestamp (Unix timestamp)
    pub iat: i64,

    /// Expiration timestamp (Unix timestamp)
    pub exp: i64,
}

impl JwtClaims {
    /// Create JwtClaims from crypto-core's validated Claims
    ///
    /// ## Errors
    ///
    /// Returns `UnknownRole` if the `role` claim is outside the known set
    pub fn from_validated_claims(claims: &crypto_core::Claims) -> Result<Self, UnknownRole> {
        Ok(Self {
            username: claims.username.clone(),
            role: claims.role.parse()?,
            iat: claims.iat,
            exp: claims.exp,
        })
    }

    /// Check whether the caller holds any of `roles`
    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a Role>) -> bool {
        roles.into_iter().any(|role| *role == self.role)
    }
}
