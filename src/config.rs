use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub cookie_secure: bool,
}

/// One year. Longer lifetimes push expiries toward the edge of the
/// representable calendar.
pub const MAX_SESSION_TTL_MINUTES: i64 = 60 * 24 * 365;

impl SessionConfig {
    pub fn new(ttl_minutes: i64, cookie_secure: bool) -> anyhow::Result<Self> {
        if ttl_minutes <= 0 {
            anyhow::bail!("SESSION_TTL_MINUTES must be positive");
        }
        if ttl_minutes > MAX_SESSION_TTL_MINUTES {
            anyhow::bail!(
                "SESSION_TTL_MINUTES must be at most {MAX_SESSION_TTL_MINUTES}, got {ttl_minutes}"
            );
        }
        Ok(Self {
            ttl_minutes,
            cookie_secure,
        })
    }

    pub fn ttl(&self) -> time::Duration {
        time::Duration::minutes(self.ttl_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    pub session: SessionConfig,
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".into())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        };
        let database_url = std::env::var("DATABASE_URL").ok();
        if backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required for the postgres store backend");
        }

        let session = SessionConfig::new(
            parsed("SESSION_TTL_MINUTES", 120i64)?,
            parsed("COOKIE_SECURE", false)?,
        )?;

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parsed("APP_PORT", 8080u16)?,
            store: StoreConfig {
                backend,
                database_url,
                max_connections: parsed("DB_MAX_CONNECTIONS", 10u32)?,
                timeout_secs: parsed("STORE_TIMEOUT_SECS", 5u64)?,
            },
            session,
        })
    }

    /// Defaults for an in-memory deployment.
    pub fn in_memory() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            store: StoreConfig {
                backend: StoreBackend::Memory,
                database_url: None,
                max_connections: 1,
                timeout_secs: 5,
            },
            session: SessionConfig {
                ttl_minutes: 120,
                cookie_secure: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_values() {
        let cfg = AppConfig::in_memory();
        assert_eq!(cfg.session.ttl(), time::Duration::minutes(120));
        assert_eq!(cfg.store.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn session_ttl_is_bounded() {
        assert!(SessionConfig::new(0, false).is_err());
        assert!(SessionConfig::new(-5, false).is_err());
        assert!(SessionConfig::new(MAX_SESSION_TTL_MINUTES + 1, false).is_err());
        assert!(SessionConfig::new(i64::MAX, false).is_err());

        let cfg = SessionConfig::new(MAX_SESSION_TTL_MINUTES, true).unwrap();
        assert_eq!(cfg.ttl(), time::Duration::days(365));
        assert!(cfg.cookie_secure);
    }

    #[test]
    fn parsed_falls_back_and_rejects_garbage() {
        assert_eq!(
            parsed("SESSIOND_TEST_UNSET_KEY", 7u64).unwrap(),
            7
        );
        std::env::set_var("SESSIOND_TEST_BAD_NUMBER", "seven");
        let err = parsed("SESSIOND_TEST_BAD_NUMBER", 7u64).unwrap_err();
        assert!(err.to_string().contains("SESSIOND_TEST_BAD_NUMBER"));
    }
}
