//! Configuration management for laptop-service
//!
//! Loads settings from environment variables, with a `.env` file honoured in
//! debug builds.
//!
//! # Example
//!
//! ```no_run
//! use laptop_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Listening on {}:{}", settings.server.host, settings.server.port);
//!     Ok(())
//! }
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

fn load_dotenv() {
    if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
        info!("Loaded .env file for development");
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Server settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub jwt: JwtSettings,
    pub storage: StorageSettings,
    pub seed: SeedSettings,
    pub auth: AuthSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        load_dotenv();

        Ok(Settings {
            server: ServerSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            storage: StorageSettings::from_env(),
            seed: SeedSettings::from_env(),
            auth: AuthSettings::from_env()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: var_or("SERVER_HOST", "0.0.0.0"),
            port: var_or("SERVER_PORT", "8080")
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }
}

/// Token signing settings
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub token_duration: Duration,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let secs: u64 = var_or("JWT_TOKEN_DURATION_SECS", "900")
            .parse()
            .context("Invalid JWT_TOKEN_DURATION_SECS")?;

        if secs == 0 {
            bail!("JWT_TOKEN_DURATION_SECS must be greater than zero");
        }

        Ok(Self {
            secret,
            token_duration: Duration::from_secs(secs),
        })
    }
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("token_duration", &self.token_duration)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub image_dir: PathBuf,
}

impl StorageSettings {
    fn from_env() -> Self {
        Self {
            image_dir: PathBuf::from(var_or("IMAGE_DIR", "img")),
        }
    }
}

/// Passwords of the users created at startup
#[derive(Clone)]
pub struct SeedSettings {
    pub admin_password: String,
    pub user_password: String,
}

impl SeedSettings {
    fn from_env() -> Self {
        Self {
            admin_password: var_or("SEED_ADMIN_PASSWORD", "secret"),
            user_password: var_or("SEED_USER_PASSWORD", "secret"),
        }
    }
}

impl std::fmt::Debug for SeedSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedSettings").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Reject calls to methods missing from the access policy instead of admitting them
    pub deny_unlisted: bool,
}

impl AuthSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            deny_unlisted: var_or("AUTH_DENY_UNLISTED", "false")
                .parse()
                .context("Invalid AUTH_DENY_UNLISTED (expected true or false)")?,
        })
    }
}

/// Demo client settings
#[derive(Clone)]
pub struct ClientSettings {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub refresh_interval: Duration,
    pub upload_image_path: Option<PathBuf>,
}

impl ClientSettings {
    pub fn load() -> Result<Self> {
        load_dotenv();

        let refresh_secs: u64 = var_or("TOKEN_REFRESH_SECS", "30")
            .parse()
            .context("Invalid TOKEN_REFRESH_SECS")?;

        if refresh_secs == 0 {
            bail!("TOKEN_REFRESH_SECS must be greater than zero");
        }

        Ok(Self {
            server_url: var_or("LAPTOP_SERVICE_URL", "http://127.0.0.1:8080"),
            username: var_or("LAPTOP_CLIENT_USERNAME", "admin1"),
            password: var_or("LAPTOP_CLIENT_PASSWORD", "secret"),
            refresh_interval: Duration::from_secs(refresh_secs),
            upload_image_path: env::var("UPLOAD_IMAGE_PATH").ok().map(PathBuf::from),
        })
    }
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("refresh_interval", &self.refresh_interval)
            .field("upload_image_path", &self.upload_image_path)
            .finish_non_exhaustive()
    }
}
