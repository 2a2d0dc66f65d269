use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed, Environment};
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub smtp: SmtpConfig,
    pub otp: OtpConfig,
    pub tokens: TokenConfig,
    pub cache: CacheConfig,
    pub google: GoogleConfig,
    pub events: EventConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    /// When false, codes are logged at debug level instead of mailed.
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub expiry_seconds: i64,
    pub max_attempts: i32,
    /// Zero disables the background sweep of expired codes.
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub session_ttl_seconds: u64,
    pub permission_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub userinfo_url: String,
    pub default_role_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    pub topic: String,
    pub partitions: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub secure_cookies: bool,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: get_env_parsed("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: get_env_parsed("SMTP_PORT", Some("587"), is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("no-reply@localhost"), is_prod)?,
                enabled: get_env_parsed("SMTP_ENABLED", Some("false"), is_prod)?,
            },
            otp: OtpConfig {
                expiry_seconds: get_env_parsed("OTP_EXPIRY_SECONDS", Some("180"), is_prod)?,
                max_attempts: get_env_parsed("OTP_MAX_ATTEMPTS", Some("5"), is_prod)?,
                sweep_interval_seconds: get_env_parsed(
                    "OTP_SWEEP_INTERVAL_SECONDS",
                    Some("0"),
                    is_prod,
                )?,
            },
            tokens: TokenConfig {
                access_token_expiry_minutes: get_env_parsed(
                    "ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("120"),
                    is_prod,
                )?,
                refresh_token_expiry_days: get_env_parsed(
                    "REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("30"),
                    is_prod,
                )?,
            },
            cache: CacheConfig {
                session_ttl_seconds: get_env_parsed(
                    "SESSION_CACHE_TTL_SECONDS",
                    Some("43200"),
                    is_prod,
                )?,
                permission_ttl_seconds: get_env_parsed(
                    "PERMISSION_CACHE_TTL_SECONDS",
                    Some("43200"),
                    is_prod,
                )?,
            },
            google: GoogleConfig {
                userinfo_url: get_env(
                    "GOOGLE_USERINFO_URL",
                    Some("https://www.googleapis.com/oauth2/v3/userinfo"),
                    is_prod,
                )?,
                default_role_name: get_env("DEFAULT_ROLE_NAME", Some("user"), is_prod)?,
            },
            events: EventConfig {
                topic: get_env("EVENT_TOPIC", Some("notifications"), is_prod)?,
                partitions: get_env_parsed("EVENT_PARTITIONS", Some("8"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                secure_cookies: get_env_parsed("SECURE_COOKIES", Some("false"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.otp.expiry_seconds <= 0 || self.otp.max_attempts <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_EXPIRY_SECONDS and OTP_MAX_ATTEMPTS must be positive"
            )));
        }

        if self.tokens.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.tokens.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.cache.session_ttl_seconds == 0 || self.cache.permission_ttl_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Cache TTLs must be positive"
            )));
        }

        if self.events.partitions == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "EVENT_PARTITIONS must be positive"
            )));
        }

        if self.environment.is_prod() {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.security.secure_cookies {
                tracing::warn!("SECURE_COOKIES is disabled in production");
            }
        }

        Ok(())
    }

    /// Configuration for tests and local tooling. No environment is read.
    pub fn for_tests() -> Self {
        IdentityConfig {
            common: core_config::Config { port: 8080 },
            environment: Environment::Dev,
            service_name: "identity-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "error".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: "postgres://localhost/identity_test".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 587,
                user: String::new(),
                password: String::new(),
                from_email: "no-reply@localhost".to_string(),
                enabled: false,
            },
            otp: OtpConfig {
                expiry_seconds: 180,
                max_attempts: 5,
                sweep_interval_seconds: 0,
            },
            tokens: TokenConfig {
                access_token_expiry_minutes: 120,
                refresh_token_expiry_days: 30,
            },
            cache: CacheConfig {
                session_ttl_seconds: 43_200,
                permission_ttl_seconds: 43_200,
            },
            google: GoogleConfig {
                userinfo_url: "http://localhost/userinfo".to_string(),
                default_role_name: "user".to_string(),
            },
            events: EventConfig {
                topic: "notifications".to_string(),
                partitions: 8,
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
                secure_cookies: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_test_config_is_valid() {
        assert!(IdentityConfig::for_tests().validate().is_ok());
    }

    #[test]
    fn test_zero_partitions_rejected() {
        let mut config = IdentityConfig::for_tests();
        config.events.partitions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wildcard_origin_rejected_in_prod() {
        let mut config = IdentityConfig::for_tests();
        config.environment = Environment::Prod;
        config.security.allowed_origins = vec!["*".to_string()];
        assert!(config.validate().is_err());
    }
}
