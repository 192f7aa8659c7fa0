//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use fulfillment::FulfillmentSettings;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON log lines (default: plain text)
/// - `DATABASE_URL`: PostgreSQL for products and orders (default: in memory)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `REDIS_URL`: Redis for carts (default: in memory)
/// - `REDIS_KEY_PREFIX`: cart key namespace (default: `"shop"`)
/// - `STRIPE_API_KEY`: payment provider key (default: fake provider)
/// - `STRIPE_API_BASE`: provider base URL (default: `"https://api.stripe.com"`)
/// - `STRIPE_WEBHOOK_SECRET`: webhook signing secret
/// - `WEBHOOK_TOLERANCE_SECS`: accepted signature age (default: `300`)
/// - `FRONT_URL`: storefront URL for payment redirects
/// - `CURRENCY`: ISO currency code (default: `"eur"`)
/// - `PROVIDER_TIMEOUT_SECS`: payment provider deadline (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub stripe_api_key: Option<String>,
    pub stripe_api_base: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub front_url: String,
    pub currency: String,
    pub provider_timeout_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            redis_url: lookup("REDIS_URL").filter(|v| !v.is_empty()),
            redis_key_prefix: lookup("REDIS_KEY_PREFIX").unwrap_or(defaults.redis_key_prefix),
            stripe_api_key: lookup("STRIPE_API_KEY").filter(|v| !v.is_empty()),
            stripe_api_base: lookup("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            webhook_secret: lookup("STRIPE_WEBHOOK_SECRET").unwrap_or(defaults.webhook_secret),
            webhook_tolerance_secs: parse_var(&lookup, "WEBHOOK_TOLERANCE_SECS")
                .unwrap_or(defaults.webhook_tolerance_secs),
            front_url: lookup("FRONT_URL").unwrap_or(defaults.front_url),
            currency: lookup("CURRENCY").unwrap_or(defaults.currency),
            provider_timeout_secs: parse_var(&lookup, "PROVIDER_TIMEOUT_SECS")
                .unwrap_or(defaults.provider_timeout_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fulfillment tunables with the configured overrides applied.
    pub fn fulfillment_settings(&self) -> FulfillmentSettings {
        let mut front_url = self.front_url.clone();
        if !front_url.ends_with('/') {
            front_url.push('/');
        }
        FulfillmentSettings {
            front_url,
            currency: self.currency.clone(),
            provider_timeout: Duration::from_secs(self.provider_timeout_secs),
            ..FulfillmentSettings::default()
        }
    }

    pub fn webhook_tolerance(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.webhook_tolerance_secs)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            redis_key_prefix: "shop".to_string(),
            stripe_api_key: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            webhook_secret: "whsec_local".to_string(),
            webhook_tolerance_secs: 300,
            front_url: "http://localhost:4200/".to_string(),
            currency: "eur".to_string(),
            provider_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_lookup_overrides_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("REDIS_URL", ""),
            ("WEBHOOK_TOLERANCE_SECS", "60"),
        ]));
        assert_eq!(config.port, 8081);
        assert!(config.log_json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert!(config.redis_url.is_none());
        assert_eq!(config.webhook_tolerance(), chrono::Duration::seconds(60));
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "http"),
            ("PROVIDER_TIMEOUT_SECS", "-1"),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.provider_timeout_secs, 10);
    }

    #[test]
    fn test_front_url_gets_trailing_slash() {
        let config = Config::from_lookup(lookup_from(&[("FRONT_URL", "https://shop.test")]));
        assert_eq!(config.fulfillment_settings().front_url, "https://shop.test/");
    }
}
