//! Environment-driven configuration.
//!
//! Every value has a development default; in production (`ENVIRONMENT=prod`)
//! secrets must be set explicitly and validation is stricter.

use std::env;

use serde::Deserialize;

use crate::utils::HashingConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub security: SecurityPolicy,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

/// Account-security policy knobs shared by the services.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityPolicy {
    pub max_login_attempts: u32,
    pub lockout_minutes: i64,
    /// Accepted clock-step skew for time-based codes, in steps of 30s.
    pub totp_skew: u8,
    pub totp_issuer: String,
    pub backup_code_count: usize,
    pub login_risk_threshold: u32,
    pub password_change_risk_threshold: u32,
    pub session_ttl_days: i64,
    #[serde(skip, default)]
    pub hashing: HashingConfig,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("auth-core"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            jwt: JwtConfig {
                access_secret: get_env("JWT_ACCESS_SECRET", Some("dev-access-secret"), is_prod)?,
                refresh_secret: get_env("JWT_REFRESH_SECRET", Some("dev-refresh-secret"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    "7",
                    is_prod,
                )?,
            },
            security: SecurityPolicy {
                max_login_attempts: parse_env("MAX_LOGIN_ATTEMPTS", "5", is_prod)?,
                lockout_minutes: parse_env("LOCKOUT_MINUTES", "30", is_prod)?,
                totp_skew: parse_env("TOTP_SKEW", "2", is_prod)?,
                totp_issuer: get_env("TOTP_ISSUER", Some("auth-core"), is_prod)?,
                backup_code_count: parse_env("BACKUP_CODE_COUNT", "10", is_prod)?,
                login_risk_threshold: parse_env("LOGIN_RISK_THRESHOLD", "50", is_prod)?,
                password_change_risk_threshold: parse_env(
                    "PASSWORD_CHANGE_RISK_THRESHOLD",
                    "40",
                    is_prod,
                )?,
                session_ttl_days: parse_env("SESSION_TTL_DAYS", "7", is_prod)?,
                hashing: HashingConfig {
                    memory_kib: parse_env("ARGON2_MEMORY_KIB", "19456", is_prod)?,
                    iterations: parse_env("ARGON2_ITERATIONS", "2", is_prod)?,
                    parallelism: parse_env("ARGON2_PARALLELISM", "1", is_prod)?,
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            ));
        }
        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            ));
        }
        if self.jwt.access_secret == self.jwt.refresh_secret {
            return Err(anyhow::anyhow!(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ"
            ));
        }
        if self.security.max_login_attempts == 0 {
            return Err(anyhow::anyhow!("MAX_LOGIN_ATTEMPTS must be positive"));
        }
        if self.security.lockout_minutes <= 0 {
            return Err(anyhow::anyhow!("LOCKOUT_MINUTES must be positive"));
        }
        if self.security.session_ttl_days <= 0 {
            return Err(anyhow::anyhow!("SESSION_TTL_DAYS must be positive"));
        }

        if self.environment == Environment::Prod {
            if self.jwt.access_secret.starts_with("dev-")
                || self.jwt.refresh_secret.starts_with("dev-")
            {
                return Err(anyhow::anyhow!(
                    "Development JWT secrets must not be used in production"
                ));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, anyhow::Error> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                ))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(anyhow::anyhow!("{} is required but not set", key))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e| anyhow::anyhow!("{}: {}", key, e))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
