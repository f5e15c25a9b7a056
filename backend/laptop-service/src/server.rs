//! Server assembly shared by the binary and the end-to-end tests

use tonic::transport::server::Router;
use tonic::transport::Server;
use tower::layer::util::{Identity, Stack};
use tracing::info;

use grpc_jwt_propagation::{JwtServerInterceptor, Role};

use crate::config::SeedSettings;
use crate::error::Result;
use crate::grpc::{AuthServer, AuthServiceServer, LaptopServer, LaptopServiceServer};
use crate::store::{User, UserStore};

/// Router with the auth layer in front of every service
pub type AuthenticatedRouter = Router<Stack<JwtServerInterceptor, Identity>>;

/// Create the built-in `admin1` (admin) and `user1` (user) identities
pub fn seed_users(store: &UserStore, seed: &SeedSettings) -> Result<()> {
    let users = [
        ("admin1", seed.admin_password.as_str(), Role::Admin),
        ("user1", seed.user_password.as_str(), Role::User),
    ];

    for (username, password, role) in users {
        store.save(&User::new(username, password, role)?)?;
        info!(username, role = %role, "Seeded user");
    }

    Ok(())
}

/// Both pcbook services behind `auth`
pub fn router(auth: JwtServerInterceptor, laptop: LaptopServer, login: AuthServer) -> AuthenticatedRouter {
    Server::builder()
        .layer(auth)
        .add_service(LaptopServiceServer::new(laptop))
        .add_service(AuthServiceServer::new(login))
}
