//! Login client used as the token source of the client-side auth interceptor

use async_trait::async_trait;
use grpc_jwt_propagation::TokenSource;
use tonic::transport::Channel;
use tonic::Status;
use tracing::debug;

use super::auth_service_client::AuthServiceClient;
use super::pb::LoginRequest;

/// Logs in with fixed credentials every time a token is requested
#[derive(Clone)]
pub struct AuthClient {
    service: AuthServiceClient<Channel>,
    username: String,
    password: String,
}

impl AuthClient {
    pub fn new(channel: Channel, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            service: AuthServiceClient::new(channel),
            username: username.into(),
            password: password.into(),
        }
    }

    pub async fn login(&self) -> Result<String, Status> {
        let request = LoginRequest {
            username: self.username.clone(),
            password: self.password.clone(),
        };

        // Generated clients take &mut self
        let response = self.service.clone().login(request).await?;
        debug!(username = %self.username, "Logged in");

        Ok(response.into_inner().access_token)
    }
}

#[async_trait]
impl TokenSource for AuthClient {
    async fn fetch_token(&self) -> Result<String, Status> {
        self.login().await
    }
}
