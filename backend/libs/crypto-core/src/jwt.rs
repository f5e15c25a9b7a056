/// Shared JWT module for PCBook services
///
/// Issues and verifies access tokens signed with HS256 over a shared secret.
/// A token asserts `{username, role}` and expires a fixed duration after it
/// was issued. Tokens are never stored server-side and there is no revocation
/// list: a token that verifies and has not expired is always accepted.
///
/// ## Security Design
///
/// - **HS256 ONLY**: tokens carrying any other `alg` header are rejected
/// - **No leeway**: expiry is enforced to the second
/// - **Immutable**: the manager is built once at startup and shared by reference
///
/// ## Usage
///
/// ```rust
/// use crypto_core::jwt::JwtManager;
/// use std::time::Duration;
///
/// let manager = JwtManager::new("a-long-shared-secret-for-the-service", Duration::from_secs(900))
///     .expect("valid secret");
/// let token = manager.generate("admin1", "admin").expect("signing works");
/// let claims = manager.verify(&token).expect("fresh token verifies");
/// assert_eq!(claims.username, "admin1");
/// ```
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// JWT algorithm - every PCBook token is HS256
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Secrets shorter than this are accepted but logged as weak
const MIN_SECRET_LENGTH: usize = 32;

// ============================================================================
// Data Structures
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Username of the authenticated identity
    pub username: String,
    /// Role name ("admin", "user", ...)
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT secret must not be empty")]
    EmptySecret,

    #[error("token duration out of range: {0:?}")]
    InvalidDuration(Duration),

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

// ============================================================================
// Token Manager
// ============================================================================

/// Issues and verifies signed, expiring identity tokens.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_duration: chrono::Duration,
}

impl fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtManager")
            .field("algorithm", &JWT_ALGORITHM)
            .field("token_duration", &self.token_duration)
            .finish_non_exhaustive()
    }
}

impl JwtManager {
    /// Create a manager for the given shared secret and token lifetime.
    ///
    /// ## Errors
    ///
    /// - `TokenError::EmptySecret` if `secret` is empty
    /// - `TokenError::InvalidDuration` if `token_duration` overflows a timestamp
    pub fn new(secret: &str, token_duration: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        if secret.len() < MIN_SECRET_LENGTH {
            warn!(
                length = secret.len(),
                recommended = MIN_SECRET_LENGTH,
                "JWT secret is shorter than recommended"
            );
        }

        let chrono_duration = chrono::Duration::from_std(token_duration)
            .map_err(|_| TokenError::InvalidDuration(token_duration))?;

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            token_duration: chrono_duration,
        })
    }

    /// Lifetime of every token this manager issues
    pub fn token_duration(&self) -> Duration {
        self.token_duration.to_std().unwrap_or_default()
    }

    /// Generate a signed token for `username` with `role`.
    ///
    /// Expiry is `now + token_duration`. Fails only if signing fails.
    pub fn generate(&self, username: &str, role: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let expiry = now + self.token_duration;

        let claims = Claims {
            username: username.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: expiry.timestamp(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Verify a token and return its claims.
    ///
    /// ## Errors
    ///
    /// Returns `TokenError::Invalid` if:
    /// - the signature does not validate against the shared secret
    /// - the token was signed with any algorithm other than HS256
    /// - the token is expired
    /// - the token is malformed or a required claim is missing
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Token verification failed");
                TokenError::Invalid(e)
            })?;

        Ok(token_data.claims)
    }
}

// ============================================================================
// Tests
// ============================================================================
