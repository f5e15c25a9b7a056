//! Shared token primitives for PCBook services.
//!
//! The `jwt` module issues and verifies the signed, time-bound identity
//! assertions that every authenticated RPC carries.

pub mod jwt;

pub use jwt::{Claims, JwtManager, TokenError};
