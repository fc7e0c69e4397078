//! Server configuration read from the environment at start-up.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use outreach_dispatch::DispatchConfig;

use crate::error::AppError;

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// PostgreSQL URL; `None` runs on the in-memory event store.
    pub database_url: Option<String>,
    /// Connection pool size.
    pub database_max_connections: u32,
    /// Base URL of the channel driver webhook.
    pub channel_driver_url: String,
    /// OTLP/gRPC endpoint for trace export.
    pub otlp_endpoint: Option<String>,
    /// Dispatch engine tunables.
    pub dispatch: DispatchConfig,
}

impl ApiConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for missing required variables or values
    /// that do not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable or `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for missing required variables or values
    /// that do not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = DispatchConfig::default();
        let millis = |key: &str, default: Duration| -> Result<Duration, AppError> {
            let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
            parse_or(&lookup, key, default_ms).map(Duration::from_millis)
        };

        let dispatch = DispatchConfig {
            max_attempts: parse_or(&lookup, "DISPATCH_MAX_ATTEMPTS", defaults.max_attempts)?,
            busy_backoff: millis("DISPATCH_BUSY_BACKOFF_MS", defaults.busy_backoff)?,
            busy_backoff_max: millis("DISPATCH_BUSY_BACKOFF_MAX_MS", defaults.busy_backoff_max)?,
            exhausted_backoff: millis("DISPATCH_EXHAUSTED_BACKOFF_MS", defaults.exhausted_backoff)?,
            exhausted_retries: parse_or(
                &lookup,
                "DISPATCH_EXHAUSTED_RETRIES",
                defaults.exhausted_retries,
            )?,
            scheduler_poll: millis("SCHEDULER_POLL_MS", defaults.scheduler_poll)?,
        };
        if dispatch.max_attempts == 0 {
            return Err(AppError::Config(
                "DISPATCH_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        if dispatch.busy_backoff > dispatch.busy_backoff_max {
            return Err(AppError::Config(
                "DISPATCH_BUSY_BACKOFF_MS must not exceed DISPATCH_BUSY_BACKOFF_MAX_MS".into(),
            ));
        }

        let channel_driver_url = lookup("CHANNEL_DRIVER_URL").ok_or_else(|| {
            AppError::Config("CHANNEL_DRIVER_URL environment variable must be set".into())
        })?;

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            channel_driver_url,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .filter(|url| !url.trim().is_empty()),
            dispatch,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid ({raw:?}): {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ApiConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_driver_url_is_set() {
        // Act
        let config = config_from(&[("CHANNEL_DRIVER_URL", "http://driver:8080")]).unwrap();

        // Assert
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, None);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.otlp_endpoint, None);
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.dispatch.exhausted_retries, 30);
        assert_eq!(config.dispatch.busy_backoff, Duration::from_millis(50));
        assert_eq!(config.dispatch.scheduler_poll, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("CHANNEL_DRIVER_URL", "http://driver:8080"),
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://localhost/outreach"),
            ("DISPATCH_MAX_ATTEMPTS", "5"),
            ("DISPATCH_EXHAUSTED_BACKOFF_MS", "2500"),
            ("SCHEDULER_POLL_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/outreach"));
        assert_eq!(config.dispatch.max_attempts, 5);
        assert_eq!(config.dispatch.exhausted_backoff, Duration::from_millis(2_500));
        assert_eq!(config.dispatch.scheduler_poll, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_driver_url_is_a_config_error() {
        let result = config_from(&[]);

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("CHANNEL_DRIVER_URL")));
    }

    #[test]
    fn test_unparseable_port_is_a_config_error() {
        let result = config_from(&[("CHANNEL_DRIVER_URL", "http://driver"), ("PORT", "eighty")]);

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("PORT")));
    }

    #[test]
    fn test_inverted_busy_backoff_bounds_are_rejected() {
        let result = config_from(&[
            ("CHANNEL_DRIVER_URL", "http://driver"),
            ("DISPATCH_BUSY_BACKOFF_MS", "5000"),
            ("DISPATCH_BUSY_BACKOFF_MAX_MS", "100"),
        ]);

        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
