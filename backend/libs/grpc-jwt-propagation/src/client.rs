//! Client-side JWT Interceptor
//!
//! Keeps one cached access token, refreshed on a fixed interval by a background
//! task, and injects it into outgoing calls whose method requires authentication.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{GrpcMethod, Request, Status};
use tracing::{debug, info, warn};

use crate::server::AUTHORIZATION_HEADER;

/// Something that can exchange credentials for a fresh access token
///
/// Implemented by the login client of the service being called.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch_token(&self) -> Result<String, Status>;
}

/// Shared, synchronized cell holding the current `Bearer {token}` header value
#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<AsciiMetadataValue>>>,
}

impl TokenCache {
    /// Replace the cached token
    ///
    /// ## Errors
    ///
    /// Returns `Status::internal` if the token is not valid header ASCII
    pub fn store(&self, token: &str) -> Result<(), Status> {
        let value = AsciiMetadataValue::try_from(format!("Bearer {}", token))
            .map_err(|_| Status::internal("Access token contains invalid header characters"))?;

        let mut guard = self
            .inner
            .write()
            .map_err(|_| Status::internal("Token cache lock poisoned"))?;
        *guard = Some(value);
        Ok(())
    }

    /// The cached `Bearer {token}` value, if a token has been fetched
    pub fn current(&self) -> Option<AsciiMetadataValue> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }
}

/// Background task that keeps a [`TokenCache`] fresh
///
/// The first token is fetched before [`TokenRefresher::start`] returns, so only
/// the very first call pays the login latency. Afterwards a timer re-runs the
/// login every `refresh_interval`, independently of in-flight calls. A failed
/// refresh keeps the previous token and is retried on the next tick.
///
/// The task stops when the refresher is shut down or dropped.
pub struct TokenRefresher {
    cache: TokenCache,
    handle: JoinHandle<()>,
}

impl TokenRefresher {
    pub async fn start<T: TokenSource>(source: T, refresh_interval: Duration) -> Result<Self, Status> {
        let source = Arc::new(source);
        let cache = TokenCache::default();

        let token = source.fetch_token().await?;
        cache.store(&token)?;
        info!(
            refresh_interval_ms = %refresh_interval.as_millis(),
            "Access token acquired, starting refresh loop"
        );

        let handle = tokio::spawn(refresh_loop(source, cache.clone(), refresh_interval));

        Ok(Self { cache, handle })
    }

    pub fn cache(&self) -> TokenCache {
        self.cache.clone()
    }

    /// Build an interceptor reading from this refresher's cache
    pub fn interceptor<I, M>(&self, auth_methods: I) -> JwtClientInterceptor
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        JwtClientInterceptor::new(self.cache(), auth_methods)
    }

    pub fn shutdown(self) {
        // Drop aborts the task
    }
}

impl Drop for TokenRefresher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn refresh_loop<T: TokenSource>(source: Arc<T>, cache: TokenCache, refresh_interval: Duration) {
    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; the startup fetch already covered it
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match source.fetch_token().await {
            Ok(token) => match cache.store(&token) {
                Ok(()) => debug!("Access token refreshed"),
                Err(status) => warn!(error = %status, "Failed to cache refreshed token"),
            },
            Err(status) => {
                warn!(code = ?status.code(), error = %status.message(), "Token refresh failed, keeping previous token");
            }
        }
    }
}

/// Client-side interceptor that injects the cached token into gRPC metadata
///
/// Only calls whose fully-qualified method (`/package.Service/Method`) is in
/// `auth_methods` are modified; every other call is sent unchanged.
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_jwt_propagation::{TokenRefresher, TokenSource};
/// use std::time::Duration;
///
/// # async fn example<T: TokenSource>(login: T) -> Result<(), tonic::Status> {
/// let refresher = TokenRefresher::start(login, Duration::from_secs(30)).await?;
/// let interceptor = refresher.interceptor(["/pcbook.LaptopService/CreateLaptop"]);
/// // let client = LaptopServiceClient::with_interceptor(channel, interceptor);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JwtClientInterceptor {
    cache: TokenCache,
    auth_methods: Arc<HashSet<String>>,
}

impl JwtClientInterceptor {
    pub fn new<I, M>(cache: TokenCache, auth_methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            cache,
            auth_methods: Arc::new(auth_methods.into_iter().map(Into::into).collect()),
        }
    }

    fn requires_auth(&self, method: &GrpcMethod) -> bool {
        let path = format!("/{}/{}", method.service(), method.method());
        self.auth_methods.contains(&path)
    }
}

impl Interceptor for JwtClientInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let requires_auth = request
            .extensions()
            .get::<GrpcMethod>()
            .is_some_and(|method| self.requires_auth(method));

        if requires_auth {
            let token = self
                .cache
                .current()
                .ok_or_else(|| Status::unauthenticated("No access token available"))?;
            request.metadata_mut().insert(AUTHORIZATION_HEADER, token);
        }

        Ok(request)
    }
}
