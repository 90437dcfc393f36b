//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default suitable for local
//! development.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Secrets shipped in sample `.env` files. Starting with one of these is refused.
pub const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `NATTER_HOST`, default `0.0.0.0`
    pub host: IpAddr,

    /// Env: `NATTER_PORT`, default `5001`
    pub port: u16,

    /// Env: `NATTER_DB_PATH`, default `natter.db`
    pub db_path: PathBuf,

    /// Env: `NATTER_JWT_SECRET`. Empty until set.
    pub jwt_secret: String,

    /// Allowed browser origin. `*` allows any.
    /// Env: `NATTER_CORS_ORIGIN`, default `http://localhost:5173`
    pub cors_origin: String,

    /// Request body cap; inline images and audio count against it.
    /// Env: `NATTER_BODY_LIMIT_MB`, default `50`
    pub body_limit_bytes: usize,

    pub gemini: Option<GeminiConfig>,

    /// Env: `NATTER_BOT_TIMEOUT_SECS`, default `30`
    pub bot_timeout: Duration,

    pub cloudinary: Option<CloudinaryConfig>,
}

/// Enabled when `GEMINI_API_KEY` is set.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Env: `GEMINI_MODEL`, default `gemini-2.0-flash`
    pub model: String,
}

/// Enabled only when all three `CLOUDINARY_*` variables are set.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 5001,
            db_path: PathBuf::from("natter.db"),
            jwt_secret: String::new(),
            cors_origin: "http://localhost:5173".to_string(),
            body_limit_bytes: 50 * 1024 * 1024,
            gemini: None,
            bot_timeout: Duration::from_secs(30),
            cloudinary: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(host) = var("NATTER_HOST") {
            match host.parse::<IpAddr>() {
                Ok(parsed) => config.host = parsed,
                Err(_) => tracing::warn!(value = %host, "Invalid NATTER_HOST, using default"),
            }
        }

        if let Some(port) = var("NATTER_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) => config.port = parsed,
                Err(_) => tracing::warn!(value = %port, "Invalid NATTER_PORT, using default"),
            }
        }

        if let Some(path) = var("NATTER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(secret) = var("NATTER_JWT_SECRET") {
            config.jwt_secret = secret;
        }

        if let Some(origin) = var("NATTER_CORS_ORIGIN") {
            config.cors_origin = origin;
        }

        if let Some(limit) = var("NATTER_BODY_LIMIT_MB") {
            match limit
                .parse::<usize>()
                .ok()
                .filter(|mb| *mb > 0)
                .and_then(|mb| mb.checked_mul(1024 * 1024))
            {
                Some(bytes) => config.body_limit_bytes = bytes,
                None => tracing::warn!(value = %limit, "Invalid NATTER_BODY_LIMIT_MB, using default"),
            }
        }

        if let Some(secs) = var("NATTER_BOT_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(n) if n > 0 => config.bot_timeout = Duration::from_secs(n),
                _ => tracing::warn!(value = %secs, "Invalid NATTER_BOT_TIMEOUT_SECS, using default"),
            }
        }

        config.gemini = var("GEMINI_API_KEY").map(|api_key| GeminiConfig {
            api_key,
            model: var("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string()),
        });

        config.cloudinary = match (
            var("CLOUDINARY_CLOUD_NAME"),
            var("CLOUDINARY_API_KEY"),
            var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!("Cloudinary is partially configured, inline images will be stored as sent");
                None
            }
        };

        config
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The JWT secret is unset or one of the sample values.
    pub fn has_placeholder_secret(&self) -> bool {
        self.jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}
