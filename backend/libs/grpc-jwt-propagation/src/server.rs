//! Server-side JWT Interceptor
//!
//! Authenticates and authorizes every inbound gRPC call against a method → roles
//! policy table before the call reaches its handler. Implemented as a tower
//! `Layer` around the tonic router, so unary and streaming calls pass through the
//! same gate exactly once, before the first message is delivered.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crypto_core::JwtManager;
use tonic::body::BoxBody;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::claims::{JwtClaims, Role};

/// Metadata key carrying the bearer token
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// What happens to calls whose method is not in the policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnlistedMethods {
    /// Reachable without a credential (login and other public RPCs rely on this)
    #[default]
    Allow,
    /// Rejected with `PermissionDenied`
    Deny,
}

/// Method → permitted roles table
///
/// Keys are fully-qualified gRPC paths, e.g. `/pcbook.LaptopService/CreateLaptop`.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: HashMap<String, HashSet<Role>>,
    unlisted: UnlistedMethods,
}

impl AccessPolicy {
    pub fn new(unlisted: UnlistedMethods) -> Self {
        Self {
            rules: HashMap::new(),
            unlisted,
        }
    }

    /// Permit `roles` on `method`, extending any roles already granted
    pub fn allow(mut self, method: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        self.rules.entry(method.into()).or_default().extend(roles);
        self
    }

    pub fn roles_for(&self, method: &str) -> Option<&HashSet<Role>> {
        self.rules.get(method)
    }

    pub fn unlisted(&self) -> UnlistedMethods {
        self.unlisted
    }

    /// Methods that require a credential
    pub fn protected_methods(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

/// Server-side interceptor that validates JWT tokens against an [`AccessPolicy`]
///
/// For a listed method:
/// 1. Extracts the `authorization` header (`Bearer <token>`)
/// 2. Verifies the token with the shared [`JwtManager`]
/// 3. Checks the token's role against the method's permitted roles
/// 4. Stores the claims in request extensions for handler access
///
/// Missing or invalid credentials fail with `Unauthenticated`; a valid credential
/// with the wrong role fails with `PermissionDenied`.
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_jwt_propagation::{AccessPolicy, JwtServerInterceptor, Role, UnlistedMethods};
/// use std::sync::Arc;
///
/// # fn example(jwt: Arc<crypto_core::JwtManager>) {
/// let policy = AccessPolicy::new(UnlistedMethods::Allow)
///     .allow("/pcbook.LaptopService/CreateLaptop", [Role::Admin]);
/// let layer = JwtServerInterceptor::new(jwt, policy);
/// // tonic::transport::Server::builder().layer(layer).add_service(...)
/// # }
/// ```
#[derive(Clone)]
pub struct JwtServerInterceptor {
    jwt: Arc<JwtManager>,
    policy: Arc<AccessPolicy>,
}

impl JwtServerInterceptor {
    pub fn new(jwt: Arc<JwtManager>, policy: AccessPolicy) -> Self {
        Self {
            jwt,
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Decide whether a call to `method` carrying `headers` may proceed.
    ///
    /// Returns the verified claims for listed methods, `None` for unlisted methods
    /// admitted by [`UnlistedMethods::Allow`].
    pub fn authorize(
        &self,
        method: &str,
        headers: &http::HeaderMap,
    ) -> Result<Option<JwtClaims>, Status> {
        let Some(permitted) = self.policy.roles_for(method) else {
            return match self.policy.unlisted() {
                UnlistedMethods::Allow => Ok(None),
                UnlistedMethods::Deny => {
                    warn!(method, "Call to unlisted method denied");
                    Err(Status::permission_denied("no permission to access this RPC"))
                }
            };
        };

        let claims = self.extract_and_validate_jwt(headers)?;

        if !claims.has_any_role(permitted) {
            warn!(
                method,
                username = %claims.username,
                role = %claims.role,
                "Role not permitted for method"
            );
            return Err(Status::permission_denied("no permission to access this RPC"));
        }

        debug!(
            method,
            username = %claims.username,
            role = %claims.role,
            "Call authorized"
        );
        Ok(Some(claims))
    }

    /// Extract and validate the bearer token from request headers
    ///
    /// ## Errors
    ///
    /// Returns `Status::unauthenticated` if:
    /// - Authorization header is missing
    /// - Authorization header format is invalid (not "Bearer {token}")
    /// - Token signature is invalid, the token is expired, or malformed
    /// - The role claim is not a known role
    fn extract_and_validate_jwt(&self, headers: &http::HeaderMap) -> Result<JwtClaims, Status> {
        let auth_header = headers.get(AUTHORIZATION_HEADER).ok_or_else(|| {
            warn!("Missing authorization header");
            Status::unauthenticated("Authorization token is not provided")
        })?;

        let auth_str = auth_header.to_str().map_err(|e| {
            warn!("Invalid authorization header encoding: {}", e);
            Status::unauthenticated("Invalid authorization header")
        })?;

        let token = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
            warn!("Invalid authorization format (expected 'Bearer <token>')");
            Status::unauthenticated("Invalid authorization format")
        })?;

        let validated = self.jwt.verify(token).map_err(|e| {
            warn!("JWT validation failed: {}", e);
            Status::unauthenticated(format!("Access token is invalid: {}", e))
        })?;

        JwtClaims::from_validated_claims(&validated).map_err(|e| {
            warn!("Failed to parse JWT claims: {}", e);
            Status::unauthenticated(format!("Access token is invalid: {}", e))
        })
    }
}

impl<S> Layer<S> for JwtServerInterceptor {
    type Service = JwtAuthService<S>;

    fn layer(&self, service: S) -> Self::Service {
        JwtAuthService {
            inner: service,
            interceptor: self.clone(),
        }
    }
}

/// Service produced by [`JwtServerInterceptor`]
#[derive(Clone)]
pub struct JwtAuthService<S> {
    inner: S,
    interceptor: JwtServerInterceptor,
}

impl<S, B> Service<http::Request<B>> for JwtAuthService<S>
where
    S: Service<http::Request<B>, Response = http::Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<B>) -> Self::Future {
        let method = request.uri().path().to_string();

        match self.interceptor.authorize(&method, request.headers()) {
            Ok(claims) => {
                if let Some(claims) = claims {
                    request.extensions_mut().insert(claims);
                }

                // The readied service handles this call; its clone takes its place
                let clone = self.inner.clone();
                let mut inner = std::mem::replace(&mut self.inner, clone);
                Box::pin(async move { inner.call(request).await })
            }
            Err(status) => {
                let response = status.into_http();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}
