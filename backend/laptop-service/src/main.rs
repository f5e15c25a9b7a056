/// Laptop Service Main Entry Point
///
/// Starts the gRPC server with:
/// - LaptopService (create, search, upload image, rate)
/// - AuthService (login)
/// - JWT auth layer enforcing the role policy on every call
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use crypto_core::JwtManager;
use grpc_jwt_propagation::{JwtServerInterceptor, UnlistedMethods};
use laptop_service::{
    config::Settings,
    grpc::{access_policy, AuthServer, LaptopServer},
    server::{router, seed_users},
    store::{DiskImageStore, LaptopStore, RatingStore, UserStore},
};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "laptop_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Laptop Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let jwt = Arc::new(
        JwtManager::new(&settings.jwt.secret, settings.jwt.token_duration)
            .context("Failed to initialize JWT manager")?,
    );
    info!(
        token_duration_secs = settings.jwt.token_duration.as_secs(),
        "JWT manager initialized"
    );

    let user_store = Arc::new(UserStore::new());
    seed_users(&user_store, &settings.seed).context("Failed to seed users")?;

    let image_store = DiskImageStore::new(&settings.storage.image_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to open image directory {}",
                settings.storage.image_dir.display()
            )
        })?;
    info!(image_dir = %settings.storage.image_dir.display(), "Image store initialized");

    let laptop_server = LaptopServer::new(
        Arc::new(LaptopStore::new()),
        Arc::new(image_store),
        Arc::new(RatingStore::new()),
    );
    let auth_server = AuthServer::new(user_store, Arc::clone(&jwt));

    let unlisted = if settings.auth.deny_unlisted {
        UnlistedMethods::Deny
    } else {
        UnlistedMethods::Allow
    };
    if unlisted == UnlistedMethods::Deny {
        warn!("AUTH_DENY_UNLISTED is set: Login and SearchLaptop will be rejected");
    }
    let auth_layer = JwtServerInterceptor::new(jwt, access_policy(unlisted));

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("Starting gRPC server on {}", addr);

    router(auth_layer, laptop_server, auth_server)
        .serve_with_shutdown(addr, shutdown_signal())
        .await
        .context("gRPC server error")?;

    info!("Laptop service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
