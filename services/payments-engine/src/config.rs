//! Service configuration
//!
//! Built from defaults, an optional config file, `PAYMENTS_ENGINE__*`
//! environment overrides, and the well-known variables `DATABASE_URL`,
//! `PORT`, `FLUTTERWAVE_SECRET_HASH`, and `ENVIRONMENT`.

use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub settlement: SettlementConfig,
    pub webhooks: WebhookConfig,
    pub environment: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SettlementConfig {
    /// Hard cap on one settlement transaction, in seconds.
    pub transaction_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookConfig {
    pub flutterwave_secret_hash: Option<String>,
    /// Accept unverifiable signatures. Forced on in the development
    /// environment, must stay off everywhere else.
    pub allow_unverified: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "production".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("settlement.transaction_timeout_secs", 10)?
            .set_default("webhooks.allow_unverified", environment == "development")?
            .set_default("environment", environment)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("PAYMENTS_ENGINE")
                .separator("__")
                .list_separator(","),
        );

        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }
        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }
        if let Ok(secret) = env::var("FLUTTERWAVE_SECRET_HASH") {
            builder = builder.set_override("webhooks.flutterwave_secret_hash", secret)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }
        if self.database.url.is_empty() {
            return Err("DATABASE_URL is required".to_string());
        }
        if self.settlement.transaction_timeout_secs == 0 {
            return Err("Settlement timeout must be positive".to_string());
        }
        if !self.webhooks.allow_unverified && self.webhooks.flutterwave_secret_hash.is_none() {
            return Err(
                "FLUTTERWAVE_SECRET_HASH is required outside the development environment"
                    .to_string(),
            );
        }
        Ok(())
    }
}
