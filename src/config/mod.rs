//! Application configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;

use crate::lending::{DEFAULT_LOAN_PERIOD_DAYS, LendingConfig, MAX_LOAN_PERIOD_DAYS, RetryConfig};
use crate::services::AuthConfig;

const DEFAULT_DATABASE_URL: &str = "sqlite:./data/shelfmark.db";

/// Which document store backend to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local, lost on restart
    Memory,
    /// sqlx connection URL, always `sqlite:` prefixed
    Sqlite(String),
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Document store backend, from DATABASE_PATH or DATABASE_URL
    pub store: StoreBackend,

    pub database_max_connections: u32,

    /// JWT secret for signing and verifying tokens
    pub jwt_secret: String,

    /// True when JWT_SECRET was unset and a random one was generated
    pub jwt_secret_generated: bool,

    /// Access token lifetime in seconds
    pub access_token_lifetime: i64,

    pub bcrypt_cost: u32,

    pub loan_period_days: i64,

    /// Deadline applied to every GraphQL operation
    pub request_timeout: Duration,

    /// Attempts per unit of work on store conflicts
    pub store_max_attempts: u32,

    pub store_retry_initial: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let (jwt_secret, jwt_secret_generated) = match lookup("JWT_SECRET") {
            Some(secret) if !secret.trim().is_empty() => (secret.trim().to_string(), false),
            _ => (generate_dev_secret(), true),
        };

        let auth_defaults = AuthConfig::default();
        let retry_defaults = RetryConfig::default();

        let loan_period_days: i64 = parse_or(&lookup, "LOAN_PERIOD_DAYS", DEFAULT_LOAN_PERIOD_DAYS)?;
        if loan_period_days > MAX_LOAN_PERIOD_DAYS {
            bail!("LOAN_PERIOD_DAYS must be at most {MAX_LOAN_PERIOD_DAYS}, got {loan_period_days}");
        }
        let bcrypt_cost: u32 = parse_or(&lookup, "BCRYPT_COST", auth_defaults.bcrypt_cost)?;
        if !(4..=31).contains(&bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}");
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3001)?,
            store: parse_store(&database),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?.max(1),
            jwt_secret,
            jwt_secret_generated,
            access_token_lifetime: parse_or(
                &lookup,
                "ACCESS_TOKEN_LIFETIME",
                auth_defaults.access_token_lifetime,
            )?,
            bcrypt_cost,
            loan_period_days: loan_period_days.max(1),
            request_timeout: Duration::from_millis(parse_or(&lookup, "REQUEST_TIMEOUT_MS", 10_000u64)?),
            store_max_attempts: parse_or(&lookup, "STORE_MAX_ATTEMPTS", retry_defaults.max_attempts)?.max(1),
            store_retry_initial: Duration::from_millis(parse_or(&lookup, "STORE_RETRY_INITIAL_MS", 50u64)?),
        })
    }

    pub fn lending_config(&self) -> LendingConfig {
        LendingConfig {
            loan_period_days: self.loan_period_days,
            request_timeout: self.request_timeout,
            retry: RetryConfig {
                max_attempts: self.store_max_attempts,
                initial_interval: self.store_retry_initial,
                ..RetryConfig::default()
            },
        }
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            jwt_secret: self.jwt_secret.clone(),
            access_token_lifetime: self.access_token_lifetime,
            bcrypt_cost: self.bcrypt_cost,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}: '{raw}'")),
        None => Ok(default),
    }
}

fn parse_store(database: &str) -> StoreBackend {
    let database = database.trim();
    if database.eq_ignore_ascii_case("memory") {
        StoreBackend::Memory
    } else if database.starts_with("sqlite:") {
        StoreBackend::Sqlite(database.to_string())
    } else {
        StoreBackend::Sqlite(format!("sqlite:{database}"))
    }
}

/// Random secret for development; tokens stop verifying on restart
fn generate_dev_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.store, StoreBackend::Sqlite(DEFAULT_DATABASE_URL.to_string()));
        assert!(config.jwt_secret_generated);
        assert!(!config.jwt_secret.is_empty());
        assert_eq!(config.loan_period_days, DEFAULT_LOAN_PERIOD_DAYS);
        assert_eq!(config.request_timeout, Duration::from_secs(10));

        let lending = config.lending_config();
        assert_eq!(lending.retry.max_attempts, 3);
        assert_eq!(lending.retry.initial_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "./var/books.db"),
            ("JWT_SECRET", " s3cret "),
            ("LOAN_PERIOD_DAYS", "0"),
            ("STORE_MAX_ATTEMPTS", "7"),
            ("BCRYPT_COST", "6"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.store, StoreBackend::Sqlite("sqlite:./var/books.db".to_string()));
        assert_eq!(config.auth_config().jwt_secret, "s3cret");
        assert!(!config.jwt_secret_generated);
        assert_eq!(config.loan_period_days, 1);
        assert_eq!(config.lending_config().retry.max_attempts, 7);
        assert_eq!(config.auth_config().bcrypt_cost, 6);
    }

    #[test]
    fn test_memory_backend_and_bad_values() {
        let config_mem = config(&[("DATABASE_PATH", "memory")]).unwrap();
        assert_eq!(config_mem.store, StoreBackend::Memory);

        assert!(config(&[("PORT", "not-a-port")]).is_err());
        assert!(config(&[("BCRYPT_COST", "99")]).is_err());
        assert!(config(&[("LOAN_PERIOD_DAYS", "9223372036854775807")]).is_err());
        assert_eq!(
            config(&[("LOAN_PERIOD_DAYS", "3650")]).unwrap().loan_period_days,
            MAX_LOAN_PERIOD_DAYS
        );
    }
}
