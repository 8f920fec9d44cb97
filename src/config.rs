//! Environment-driven configuration, loaded the way the teacher loads its
//! `.env` file at process start (`dotenvy`) into a typed struct instead of
//! scattering `std::env::var` calls through the codebase.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub env: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub access_token_duration: Duration,
    pub refresh_token_duration: Duration,
    /// Raw 32-byte AES-256 key, decoded from `ENCRYPTION_KEY` (base64).
    pub encryption_key: [u8; 32],
    /// Raw 32-byte AES-256 key, decoded from `PROVIDER_ENCRYPTION_KEY` (base64).
    /// Independent of `encryption_key` by construction (Open Question #1 in DESIGN.md).
    pub provider_encryption_key: [u8; 32],
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub github_redirect_url: Option<String>,
    pub model_file_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Config {
    /// Load configuration from the process environment, applying `.env` first
    /// (best-effort, matching the teacher's `dotenv`/`dotenvy` usage).
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let port = env_or("PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?;
        let env = env_or("ENV", "development");
        let database_url = require("DATABASE_URL")?;
        let db_max_connections = env_or("DB_MAX_CONNECTIONS", "10")
            .parse::<u32>()
            .map_err(|e| ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                reason: e.to_string(),
            })?;
        let jwt_secret = require("JWT_SECRET")?;
        let access_token_duration = Duration::from_secs(
            parse_minutes("ACCESS_TOKEN_DURATION", "15")? * 60,
        );
        let refresh_token_duration = Duration::from_secs(
            parse_minutes("REFRESH_TOKEN_DURATION", "10080")? * 60,
        );

        let encryption_key = decode_key("ENCRYPTION_KEY")?;
        let provider_encryption_key = decode_key("PROVIDER_ENCRYPTION_KEY")?;

        let github_client_id = std::env::var("GITHUB_CLIENT_ID").ok();
        let github_client_secret = std::env::var("GITHUB_CLIENT_SECRET").ok();
        let github_redirect_url = std::env::var("GITHUB_REDIRECT_URL").ok();
        let model_file_path = env_or("MODEL_FILE_PATH", "model.conf");

        Ok(Config {
            port,
            env,
            database_url,
            db_max_connections,
            jwt_secret,
            access_token_duration,
            refresh_token_duration,
            encryption_key,
            provider_encryption_key,
            github_client_id,
            github_client_secret,
            github_redirect_url,
            model_file_path,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_minutes(name: &'static str, default: &str) -> Result<u64, ConfigError> {
    env_or(name, default)
        .parse::<u64>()
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

/// Decode a base64-encoded 32-byte key. A wrong length is a fatal
/// configuration error per spec §4.1 ("wrong length is a fatal configuration
/// error").
fn decode_key(name: &'static str) -> Result<[u8; 32], ConfigError> {
    use base64::Engine;
    let raw = require(name)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: format!("not valid base64: {e}"),
        })?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("expected 32 raw bytes, got {len}"),
    })
}
