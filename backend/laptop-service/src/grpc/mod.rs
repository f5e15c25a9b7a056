//! gRPC surface of the pcbook services
//!
//! - `pb`: message types
//! - `laptop_service_server` / `laptop_service_client`: generated LaptopService code
//! - `auth_service_server` / `auth_service_client`: generated AuthService code
//! - `LaptopServer` / `AuthServer`: handler implementations

use grpc_jwt_propagation::{AccessPolicy, Role, UnlistedMethods};

mod auth;
pub mod client;
mod laptop;
pub mod pb;

include!(concat!(env!("OUT_DIR"), "/pcbook.LaptopService.rs"));
include!(concat!(env!("OUT_DIR"), "/pcbook.AuthService.rs"));

pub use auth::AuthServer;
pub use auth_service_client::AuthServiceClient;
pub use auth_service_server::{AuthService, AuthServiceServer};
pub use client::AuthClient;
pub use laptop::{LaptopServer, MAX_IMAGE_SIZE};
pub use laptop_service_client::LaptopServiceClient;
pub use laptop_service_server::{LaptopService, LaptopServiceServer};

/// Fully-qualified method paths, as seen by interceptors
pub mod methods {
    pub const CREATE_LAPTOP: &str = "/pcbook.LaptopService/CreateLaptop";
    pub const SEARCH_LAPTOP: &str = "/pcbook.LaptopService/SearchLaptop";
    pub const UPLOAD_IMAGE: &str = "/pcbook.LaptopService/UploadImage";
    pub const RATE_LAPTOP: &str = "/pcbook.LaptopService/RateLaptop";
    pub const LOGIN: &str = "/pcbook.AuthService/Login";
}

/// Methods that require a credential
pub const AUTHENTICATED_METHODS: [&str; 3] = [
    methods::CREATE_LAPTOP,
    methods::UPLOAD_IMAGE,
    methods::RATE_LAPTOP,
];

/// Role table enforced by the server's auth layer
pub fn access_policy(unlisted: UnlistedMethods) -> AccessPolicy {
    AccessPolicy::new(unlisted)
        .allow(methods::CREATE_LAPTOP, [Role::Admin])
        .allow(methods::UPLOAD_IMAGE, [Role::Admin])
        .allow(methods::RATE_LAPTOP, [Role::Admin, Role::User])
}
