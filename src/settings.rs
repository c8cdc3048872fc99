// src/settings.rs
use crate::error::ConfigError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::net::SocketAddr;

/// The root configuration structure for the service.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub quotes: QuoteSettings,
    pub auth: AuthSettings,
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Path of the SQLite file, or `:memory:`.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteSettings {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// How long a valuation quote may be reused. 0 disables the cache.
    pub valuation_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// Cash credited to every newly registered account.
    pub starting_cash: Decimal,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Validation(format!("invalid server address: {}", e)))
    }
}

/// Loads settings from defaults, an optional `config.toml` and `LEDGER__*` variables.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_from(
        config::File::with_name("config").required(false),
        config::Environment::with_prefix("LEDGER").separator("__"),
        std::env::var("API_KEY").ok(),
    )
}

/// Layers `file` over the defaults and `env` over both. `api_key` is the
/// fallback for an unset `quotes.api_key`.
fn load_from<S>(
    file: S,
    env: config::Environment,
    api_key: Option<String>,
) -> Result<Settings, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let mut settings = builder()?
        .add_source(file)
        .add_source(env)
        .build()?
        .try_deserialize::<Settings>()?;
    if settings.quotes.api_key.trim().is_empty() {
        settings.quotes.api_key = api_key.unwrap_or_default();
    }
    validate(&settings)?;
    Ok(settings)
}

fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(config::Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 3030)?
        .set_default("database.path", "finance.db")?
        .set_default("quotes.base_url", "https://www.alphavantage.co")?
        .set_default("quotes.timeout_secs", 10)?
        .set_default("quotes.valuation_cache_ttl_secs", 0)?
        .set_default("auth.jwt_secret", "")?
        .set_default("auth.token_ttl_secs", 60 * 60 * 24)?
        .set_default("auth.bcrypt_cost", bcrypt::DEFAULT_COST)?
        .set_default("ledger.starting_cash", "10000")?)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.quotes.api_key.trim().is_empty() {
        return Err(ConfigError::Validation("API_KEY not set".to_string()));
    }
    if settings.auth.jwt_secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.jwt_secret must be set".to_string(),
        ));
    }
    if settings.ledger.starting_cash.is_sign_negative() {
        return Err(ConfigError::Validation(
            "ledger.starting_cash cannot be negative".to_string(),
        ));
    }
    if !(4..=31).contains(&settings.auth.bcrypt_cost) {
        return Err(ConfigError::Validation(format!(
            "auth.bcrypt_cost must be within 4..=31, got {}",
            settings.auth.bcrypt_cost
        )));
    }
    Ok(())
}
