/// Laptop Service Library
///
/// Laptop catalog over gRPC: create, search, image upload and rating, behind a
/// role-based JWT auth layer, plus the login service issuing the tokens.
///
/// ## Modules
///
/// - `config`: Server and client configuration
/// - `context`: Per-call cancellation and deadline
/// - `error`: Error types
/// - `grpc`: Wire types, generated services and handlers
/// - `sample`: Random laptop generator
/// - `security`: Password hashing
/// - `server`: Router assembly and user seeding
/// - `store`: In-memory laptop, rating, image and user stores
pub mod config;
pub mod context;
pub mod error;
pub mod grpc;
pub mod sample;
pub mod security;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use error::{LaptopError, Result};
pub use grpc::{AuthServer, LaptopServer};
