/// Security module for laptop-service
///
/// Provides:
/// - Password hashing with Argon2id
pub mod password;

pub use password::{hash_password, verify_password};
