use std::sync::Arc;

use crypto_core::JwtManager;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use super::auth_service_server::AuthService;
use super::pb::{LoginRequest, LoginResponse};
use crate::error::LaptopError;
use crate::store::UserStore;

/// AuthService handler: exchanges a username and password for an access token
#[derive(Clone)]
pub struct AuthServer {
    user_store: Arc<UserStore>,
    jwt: Arc<JwtManager>,
}

impl AuthServer {
    pub fn new(user_store: Arc<UserStore>, jwt: Arc<JwtManager>) -> Self {
        Self { user_store, jwt }
    }

    fn login_user(&self, request: &LoginRequest) -> crate::Result<String> {
        let user = self
            .user_store
            .find(&request.username)
            .ok_or(LaptopError::InvalidCredentials)?;

        if !user.is_correct_password(&request.password)? {
            return Err(LaptopError::InvalidCredentials);
        }

        let token = self.jwt.generate(&user.username, user.role.as_str())?;
        info!(username = %user.username, role = %user.role, "User logged in");

        Ok(token)
    }
}

#[tonic::async_trait]
impl AuthService for AuthServer {
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let request = request.into_inner();

        let access_token = self.login_user(&request).map_err(|err| {
            warn!(username = %request.username, error = %err, "Login failed");
            err
        })?;

        Ok(Response::new(LoginResponse { access_token }))
    }
}
