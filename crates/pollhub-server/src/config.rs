use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing::warn;

/// Used when `RUST_LOG` is unset. Covers every workspace crate.
pub const DEFAULT_LOG_FILTER: &str =
    "pollhub=debug,pollhub_api=debug,pollhub_core=debug,pollhub_db=debug,tower_http=debug";

/// Placeholder JWT secrets that must not reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

/// Where polls and users live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Store {
    Sqlite(PathBuf),
    /// `POLLHUB_DB_PATH=:memory:`; everything is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store: Store,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub trust_proxy: bool,
    /// Empty means any origin is allowed.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup, so tests don't have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("POLLHUB_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            bail!("POLLHUB_JWT_SECRET is unset; set it in your .env file and restart");
        }
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            warn!("POLLHUB_JWT_SECRET is still a placeholder; tokens can be forged");
        }

        let db_path = lookup("POLLHUB_DB_PATH").unwrap_or_else(|| "pollhub.db".into());
        let store = if db_path == ":memory:" {
            Store::Memory
        } else {
            Store::Sqlite(PathBuf::from(db_path))
        };

        let ttl_secs: i64 = parse_or(&lookup, "POLLHUB_TOKEN_TTL_SECS", 3600)?;
        if ttl_secs <= 0 {
            bail!("POLLHUB_TOKEN_TTL_SECS must be positive, got {}", ttl_secs);
        }

        let cors_origins = lookup("POLLHUB_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: lookup("POLLHUB_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "POLLHUB_PORT", 5000)?,
            store,
            jwt_secret,
            token_ttl: chrono::Duration::seconds(ttl_secs),
            trust_proxy: parse_or(&lookup, "POLLHUB_TRUST_PROXY", false)?,
            cors_origins,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid {} value {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[("POLLHUB_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.store, Store::Sqlite(PathBuf::from("pollhub.db")));
        assert_eq!(config.token_ttl, chrono::Duration::hours(1));
        assert!(!config.trust_proxy);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn default_log_filter_covers_every_crate() {
        for target in ["pollhub", "pollhub_api", "pollhub_core", "pollhub_db", "tower_http"] {
            assert!(
                DEFAULT_LOG_FILTER
                    .split(',')
                    .any(|directive| directive.split('=').next() == Some(target)),
                "{target} missing from default filter"
            );
        }
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("POLLHUB_JWT_SECRET", "s3cr3t"),
            ("POLLHUB_PORT", "8080"),
            ("POLLHUB_DB_PATH", ":memory:"),
            ("POLLHUB_TOKEN_TTL_SECS", "60"),
            ("POLLHUB_TRUST_PROXY", "true"),
            ("POLLHUB_CORS_ORIGINS", "http://localhost:3000, https://polls.example ,"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.store, Store::Memory);
        assert_eq!(config.token_ttl, chrono::Duration::seconds(60));
        assert!(config.trust_proxy);
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "https://polls.example"]
        );
    }

    #[test]
    fn missing_secret_is_fatal() {
        assert!(config(&[]).is_err());
        assert!(config(&[("POLLHUB_JWT_SECRET", "")]).is_err());
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config(&[("POLLHUB_JWT_SECRET", "x"), ("POLLHUB_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("POLLHUB_PORT"));

        assert!(config(&[("POLLHUB_JWT_SECRET", "x"), ("POLLHUB_TOKEN_TTL_SECS", "0")]).is_err());
    }
}
