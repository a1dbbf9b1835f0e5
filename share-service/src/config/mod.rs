use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct ShareConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub share: ShareLinkConfig,
    pub access_code: AccessCodeConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Where the reviewer-facing share links point.
#[derive(Debug, Clone, Deserialize)]
pub struct ShareLinkConfig {
    /// Origin prefixed to constructed share URLs, e.g. `https://review.example.com`.
    pub public_origin: String,
    /// Days an invitation link stays live before read-time expiry.
    pub invitation_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessCodeConfig {
    /// Validity window of an issued one-time code.
    pub expiry_minutes: i64,
    /// Max codes issued per recipient within the window below.
    pub send_limit: i64,
    pub send_window_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl ShareConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = ShareConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("share-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse_env("PORT", Some("9010"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            share: ShareLinkConfig {
                public_origin: get_env("SHARE_PUBLIC_ORIGIN", Some("http://localhost:3000"), is_prod)?,
                invitation_ttl_days: parse_env("INVITATION_TTL_DAYS", Some("30"), is_prod)?,
            },
            access_code: AccessCodeConfig {
                expiry_minutes: parse_env("ACCESS_CODE_EXPIRY_MINUTES", Some("30"), is_prod)?,
                send_limit: parse_env("ACCESS_CODE_SEND_LIMIT", Some("3"), is_prod)?,
                send_window_seconds: parse_env("ACCESS_CODE_SEND_WINDOW_SECONDS", Some("900"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        };

        Ok(config)
    }
}

/// Read an environment variable; in prod a missing value with no default is
/// a startup failure rather than a silent fallback.
fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => match default {
            Some(d) => {
                if is_prod {
                    tracing::warn!(key, "Using default value in prod");
                }
                Ok(d.to_string())
            }
            None => Err(AppError::ConfigError(anyhow::anyhow!(
                "Missing required environment variable: {key}"
            ))),
        },
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, default, is_prod)?;
    raw.parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Invalid value for {key}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_config_loads_with_defaults() {
        env::set_var("ENVIRONMENT", "dev");
        env::set_var("DATABASE_URL", "postgres://localhost/share_test");
        let config = ShareConfig::from_env().expect("config should load");
        assert_eq!(config.access_code.expiry_minutes, 30);
        assert_eq!(config.share.invitation_ttl_days, 30);
        assert_eq!(config.service_name, "share-service");
    }
}
