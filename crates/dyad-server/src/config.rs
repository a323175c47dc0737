//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Secret used when `JWT_SECRET` is unset.  Tokens signed with it are
/// worthless outside local development.
const DEV_JWT_SECRET: &str = "dyad-dev-secret";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DATABASE_PATH`
    /// Default: `./dyad.db`
    pub database_path: PathBuf,

    /// HMAC secret for signing identity tokens.
    /// Env: `JWT_SECRET`
    /// Default: a development-only constant (warned about at startup).
    pub jwt_secret: String,

    /// Identity token lifetime in seconds.
    /// Env: `TOKEN_TTL_SECS`
    /// Default: `86400` (one day)
    pub token_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from("./dyad.db"),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_secs: 86_400,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                config.jwt_secret = secret;
            }
        }
        if config.jwt_secret == DEV_JWT_SECRET {
            tracing::warn!("JWT_SECRET not set, using development secret");
        }

        if let Ok(val) = std::env::var("TOKEN_TTL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.token_ttl_secs = n;
            } else {
                tracing::warn!(value = %val, "Invalid TOKEN_TTL_SECS, using default");
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.token_ttl_secs, 86_400);
        assert_eq!(config.database_path, PathBuf::from("./dyad.db"));
    }
}
