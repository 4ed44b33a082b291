//! Server Configuration

use connect_core::{ConnectError, Result};

/// Server configuration loaded from the environment
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind_addr: String,

    /// Public base URL return/refresh/success links are built from
    pub base_url: String,

    pub admin_username: String,
    pub admin_password: String,

    /// Shared secret for the Connect webhook endpoint
    pub webhook_secret: String,

    /// Creator store file path; in-memory when unset
    pub creators_db_path: Option<String>,
}

impl ServerConfig {
    /// Load from environment variables. `ADMIN_USERNAME`, `ADMIN_PASSWORD`
    /// and `STRIPE_CONNECT_WEBHOOK_SECRET` are required.
    pub fn from_env() -> Result<Self> {
        let require = |key: &str| {
            std::env::var(key).map_err(|_| ConnectError::Config(format!("{key} not set")))
        };

        let port = std::env::var("PORT").unwrap_or_else(|_| "3001".into());

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| format!("0.0.0.0:{port}")),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
            admin_username: require("ADMIN_USERNAME")?,
            admin_password: require("ADMIN_PASSWORD")?,
            webhook_secret: require("STRIPE_CONNECT_WEBHOOK_SECRET")?,
            creators_db_path: std::env::var("CREATORS_DB_PATH").ok(),
        })
    }
}
