//! JWT Authentication and Authorization for gRPC Services
//!
//! Wraps every RPC in the same authorization gate without handlers having to
//! re-implement it, and keeps clients supplied with a fresh token.
//!
//! ## Core Components
//!
//! - **JwtServerInterceptor**: tower layer that checks each call's method against an
//!   [`AccessPolicy`] (method → permitted roles) and verifies the bearer token
//! - **JwtClientInterceptor**: attaches the cached token to calls that need it
//! - **TokenRefresher**: background task re-running login on a fixed interval
//! - **JwtClaimsExt**: request extension trait for reading the verified claims
//!
//! ## Status Mapping
//!
//! - Unlisted method = allowed (or `PermissionDenied` with [`UnlistedMethods::Deny`])
//! - No token = `Status::unauthenticated`
//! - Invalid or expired token = `Status::unauthenticated`
//! - Valid token, role not permitted = `Status::permission_denied`

mod claims;
mod client;
mod extensions;
mod server;

pub use claims::{JwtClaims, Role, UnknownRole};
pub use client::{JwtClientInterceptor, TokenCache, TokenRefresher, TokenSource};
pub use extensions::JwtClaimsExt;
pub use server::{AccessPolicy, JwtAuthService, JwtServerInterceptor, UnlistedMethods, AUTHORIZATION_HEADER};

// Re-export tonic Status for convenience
pub use tonic::Status;
