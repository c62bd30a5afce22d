//! Process configuration, read once from the environment at startup.

use {
    crate::{
        adapters::truelayer::ProviderSettings, domain::money::Currency,
        services::retry::RetryPolicy,
    },
    std::{env, net::SocketAddr, str::FromStr, time::Duration},
    thiserror::Error,
};

pub const DEFAULT_API_URL: &str = "https://api.truelayer-sandbox.com";
pub const DEFAULT_AUTH_URL: &str = "https://auth.truelayer-sandbox.com";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderSettings,
    /// PEM-encoded P-521 key, with escaped newlines already restored.
    pub private_key_pem: String,
    pub key_id: String,
    pub merchant_currency: Currency,
    pub callback_url: Option<String>,
    pub results_url: String,
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let merchant_currency = {
            let raw = require("TRUELAYER_MERCHANT_CURRENCY")?;
            Currency::try_from(raw.as_str()).map_err(|e| ConfigError::Invalid {
                key: "TRUELAYER_MERCHANT_CURRENCY",
                reason: e.message().to_string(),
            })?
        };

        let bind_addr = parse(
            "BIND_ADDR",
            &get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        Ok(Self {
            provider: ProviderSettings {
                api_base_url: get("TRUELAYER_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                auth_base_url: get("TRUELAYER_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
                client_id: require("TRUELAYER_CLIENT_ID")?,
                client_secret: require("TRUELAYER_CLIENT_SECRET")?,
                merchant_account_id: require("TRUELAYER_MERCHANT_ACCOUNT_ID")?,
            },
            private_key_pem: require("TRUELAYER_PRIVATE_KEY")?.replace("\\n", "\n"),
            key_id: require("TRUELAYER_KID")?,
            merchant_currency,
            callback_url: get("TRUELAYER_CALLBACK_URL"),
            results_url: require("PAYMENT_RESULTS_URL")?,
            bind_addr,
            database_url: get("DATABASE_URL"),
            retry: retry_policy(&get)?,
        })
    }
}

fn retry_policy(get: &impl Fn(&str) -> Option<String>) -> Result<RetryPolicy, ConfigError> {
    let mut policy = RetryPolicy::new();

    if let Some(raw) = get("RETRY_MAX_ATTEMPTS") {
        let attempts: u32 = parse("RETRY_MAX_ATTEMPTS", &raw)?;
        if attempts == 0 {
            return Err(invalid("RETRY_MAX_ATTEMPTS", "must be at least 1"));
        }
        policy = policy.with_max_attempts(attempts);
    }
    if let Some(raw) = get("RETRY_INITIAL_DELAY_MS") {
        policy = policy.with_initial_delay(Duration::from_millis(parse("RETRY_INITIAL_DELAY_MS", &raw)?));
    }
    if let Some(raw) = get("RETRY_BACKOFF_MULTIPLIER") {
        let multiplier: f64 = parse("RETRY_BACKOFF_MULTIPLIER", &raw)?;
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(invalid("RETRY_BACKOFF_MULTIPLIER", "must be a positive number"));
        }
        policy = policy.with_backoff_multiplier(multiplier);
    }
    if let Some(raw) = get("RETRY_MAX_DELAY_MS") {
        policy = policy.with_max_delay(Duration::from_millis(parse("RETRY_MAX_DELAY_MS", &raw)?));
    }
    if let Some(raw) = get("RETRY_SHOULD_RETRY_ERRORS") {
        policy = policy.with_retry_errors(raw.trim().eq_ignore_ascii_case("true"));
    }

    Ok(policy)
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| invalid(key, e))
}

fn invalid(key: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}
