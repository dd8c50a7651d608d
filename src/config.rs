//! Process configuration, loaded once at startup from the environment.
//!
//! Validation happens eagerly in [`Config::load`] so that a bad value
//! fails the process before a socket is bound or a pool is opened,
//! rather than surfacing as a confusing runtime error later.

use std::env;
use std::fmt;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub db_ssl: bool,
    pub db_pool_min: u32,
    pub db_pool_max: u32,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,

    pub queue_concurrency: u32,
    pub queue_max_attempts: u32,

    pub wallet_address: String,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(ConfigError::Invalid {
                field: "LOG_LEVEL",
                reason: format!("unknown level `{other}`, expected error|warn|info|debug"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Config {{ port: {}, db: {}:{}/{}, redis: {}:{}, queue_concurrency: {}, queue_max_attempts: {}, log_level: {} }}",
            self.port,
            self.db_host,
            self.db_port,
            self.db_name,
            self.redis_host,
            self.redis_port,
            self.queue_concurrency,
            self.queue_max_attempts,
            self.log_level.as_str(),
        )
    }
}

fn env_var(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_or(key: &'static str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}

fn parse_bounded<T>(
    field: &'static str,
    raw: &str,
    min: T,
    max: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + fmt::Display + Copy,
{
    let value: T = raw.parse().map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("`{raw}` is not a valid number"),
    })?;
    if value < min || value > max {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside the allowed range {min}..={max}"),
        });
    }
    Ok(value)
}

impl Config {
    /// Load configuration from the process environment, failing fast on
    /// any invalid or missing-but-required value.
    pub fn load() -> Result<Self, ConfigError> {
        let port = parse_bounded("PORT", &env_or("PORT", "3000"), 1u16, u16::MAX)?;

        let db_pool_min = parse_bounded("DB_POOL_MIN", &env_or("DB_POOL_MIN", "2"), 1u32, 10u32)?;
        let db_pool_max = parse_bounded("DB_POOL_MAX", &env_or("DB_POOL_MAX", "10"), 1u32, 10u32)?;
        if db_pool_min > db_pool_max {
            return Err(ConfigError::Invalid {
                field: "DB_POOL_MIN",
                reason: "must not exceed DB_POOL_MAX".to_string(),
            });
        }

        let queue_concurrency = parse_bounded(
            "QUEUE_CONCURRENCY",
            &env_or("QUEUE_CONCURRENCY", "10"),
            1u32,
            50u32,
        )?;
        let queue_max_attempts = parse_bounded(
            "QUEUE_MAX_ATTEMPTS",
            &env_or("QUEUE_MAX_ATTEMPTS", "3"),
            1u32,
            10u32,
        )?;

        let wallet_address =
            env_var("WALLET_ADDRESS").ok_or(ConfigError::Missing("WALLET_ADDRESS"))?;

        let log_level = LogLevel::parse(&env_or("LOG_LEVEL", "info"))?;

        Ok(Self {
            port,
            db_host: env_or("DB_HOST", "localhost"),
            db_port: parse_bounded("DB_PORT", &env_or("DB_PORT", "5432"), 1u16, u16::MAX)?,
            db_user: env_or("DB_USER", "postgres"),
            db_password: env_or("DB_PASSWORD", ""),
            db_name: env_or("DB_NAME", "swaprail"),
            db_ssl: matches!(env_or("DB_SSL", "false").as_str(), "true" | "1"),
            db_pool_min,
            db_pool_max,
            redis_host: env_or("REDIS_HOST", "localhost"),
            redis_port: parse_bounded("REDIS_PORT", &env_or("REDIS_PORT", "6379"), 1u16, u16::MAX)?,
            redis_password: env_var("REDIS_PASSWORD"),
            queue_concurrency,
            queue_max_attempts,
            wallet_address,
            log_level,
        })
    }

    pub fn database_url(&self) -> String {
        let sslmode = if self.db_ssl { "require" } else { "disable" };
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name, sslmode
        )
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(pw) => format!("redis://:{}@{}:{}", pw, self.redis_host, self.redis_port),
            None => format!("redis://{}:{}", self.redis_host, self.redis_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_known_values() {
        assert_eq!(LogLevel::parse("INFO").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::parse("debug").unwrap(), LogLevel::Debug);
        assert!(LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn parse_bounded_rejects_out_of_range() {
        assert!(parse_bounded::<u32>("QUEUE_CONCURRENCY", "51", 1, 50).is_err());
        assert!(parse_bounded::<u32>("QUEUE_CONCURRENCY", "0", 1, 50).is_err());
        assert_eq!(parse_bounded::<u32>("QUEUE_CONCURRENCY", "10", 1, 50).unwrap(), 10);
    }

    #[test]
    fn database_url_reflects_ssl_mode() {
        let cfg = Config {
            port: 3000,
            db_host: "db".into(),
            db_port: 5432,
            db_user: "u".into(),
            db_password: "p".into(),
            db_name: "n".into(),
            db_ssl: true,
            db_pool_min: 2,
            db_pool_max: 10,
            redis_host: "r".into(),
            redis_port: 6379,
            redis_password: None,
            queue_concurrency: 10,
            queue_max_attempts: 3,
            wallet_address: "wallet".into(),
            log_level: LogLevel::Info,
        };
        assert!(cfg.database_url().ends_with("sslmode=require"));
    }
}
