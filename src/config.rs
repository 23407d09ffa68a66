use std::{env, time::Duration};

use derive_more::Display;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Display)]
pub enum ConfigError {
    #[display(fmt = "missing environment variable '{}'", _0)]
    Missing(&'static str),

    #[display(fmt = "invalid value for '{}': {}", _0, _1)]
    Invalid(&'static str, String),
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    /// Applied to every processor request, pool acquire and SQL statement.
    pub upstream_timeout: Duration,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub webhook_tolerance_secs: i64,
    pub frontend_url: String,
    pub currency: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_max_connections = match optional("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|e| ConfigError::Invalid("DB_MAX_CONNECTIONS", e.to_string()))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let upstream_timeout_secs = match optional("UPSTREAM_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|e| ConfigError::Invalid("UPSTREAM_TIMEOUT_SECS", e.to_string()))?,
            None => DEFAULT_UPSTREAM_TIMEOUT_SECS,
        };
        if upstream_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "UPSTREAM_TIMEOUT_SECS",
                "must be greater than zero".to_string(),
            ));
        }
        let webhook_tolerance_secs = match optional("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Some(v) => v.parse::<i64>().map_err(|e| {
                ConfigError::Invalid("STRIPE_WEBHOOK_TOLERANCE_SECS", e.to_string())
            })?,
            None => DEFAULT_WEBHOOK_TOLERANCE_SECS,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            db_max_connections,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            jwt_secret: required("JWT_SECRET")?,
            jwt_audience: optional("JWT_AUDIENCE"),
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: optional("STRIPE_API_BASE")
                .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            webhook_tolerance_secs,
            frontend_url: required("FRONTEND_URL")?.trim_end_matches('/').to_string(),
            currency: optional("PAYMENT_CURRENCY")
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
                .to_lowercase(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/campus"),
            ("JWT_SECRET", "jwt-secret"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_123"),
            ("FRONTEND_URL", "http://localhost:3000/"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config = load(&base()).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert_eq!(config.stripe_api_base, "https://api.stripe.com");
        assert_eq!(config.frontend_url, "http://localhost:3000");
        assert_eq!(config.currency, "usd");
        assert!(config.jwt_audience.is_none());
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let mut vars = base();
        vars.remove("STRIPE_WEBHOOK_SECRET");
        let err = load(&vars).unwrap_err();
        assert_eq!(err.to_string(), "missing environment variable 'STRIPE_WEBHOOK_SECRET'");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut vars = base();
        vars.insert("UPSTREAM_TIMEOUT_SECS", "0");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid("UPSTREAM_TIMEOUT_SECS", _))
        ));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut vars = base();
        vars.insert("DB_MAX_CONNECTIONS", "many");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid("DB_MAX_CONNECTIONS", _))
        ));
    }
}
