//! Application configuration loaded from environment variables.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL, allowed as a CORS origin
    pub frontend_url: String,
    /// GCP project ID backing the Firestore database
    pub gcp_project_id: String,
    /// API server port
    pub port: u16,

    // --- Identity provider (opaque OIDC-style boundary) ---
    /// Expected `iss` claim of identity-provider ID tokens
    pub identity_issuer: String,
    /// Expected `aud` claim of identity-provider ID tokens
    pub identity_audience: String,
    /// JWKS endpoint publishing the provider's signing keys
    pub identity_jwks_url: String,

    // --- Secrets ---
    /// HS256 signing key for session tokens (raw bytes)
    pub session_signing_key: Vec<u8>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            identity_issuer: "https://identity.invalid/test-project".to_string(),
            identity_audience: "test-project".to_string(),
            identity_jwks_url: "https://identity.invalid/jwks".to_string(),
            session_signing_key: b"test_session_key_32_bytes_min!!".to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let gcp_project_id = env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string());

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            identity_issuer: env::var("IDENTITY_ISSUER")
                .map_err(|_| ConfigError::Missing("IDENTITY_ISSUER"))?,
            identity_audience: env::var("IDENTITY_AUDIENCE")
                .unwrap_or_else(|_| gcp_project_id.clone()),
            identity_jwks_url: env::var("IDENTITY_JWKS_URL")
                .map_err(|_| ConfigError::Missing("IDENTITY_JWKS_URL"))?,

            session_signing_key: env::var("SESSION_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("SESSION_SIGNING_KEY"))?
                .into_bytes(),

            gcp_project_id,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
