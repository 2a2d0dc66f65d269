use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed, Environment};
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub redis: RedisConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Shared secret expected in `x-delivery-key` on the internal endpoint.
    pub api_key: String,
    /// Frames queued per connection before `send` reports the client as slow.
    pub outbound_buffer: usize,
}

impl RealtimeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        let config = RealtimeConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("realtime-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            delivery: DeliveryConfig {
                api_key: get_env("DELIVERY_API_KEY", None, is_prod)?,
                outbound_buffer: get_env_parsed("OUTBOUND_BUFFER", Some("64"), is_prod)?,
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

        if self.delivery.api_key.len() < 16 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DELIVERY_API_KEY must be at least 16 characters"
            )));
        }

        if self.delivery.outbound_buffer == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OUTBOUND_BUFFER must be positive"
            )));
        }

        Ok(())
    }

    pub fn for_tests() -> Self {
        RealtimeConfig {
            common: core_config::Config { port: 8081 },
            environment: Environment::Dev,
            service_name: "realtime-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "error".to_string(),
            otlp_endpoint: None,
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
            },
            delivery: DeliveryConfig {
                api_key: "test-delivery-key-0123456789".to_string(),
                outbound_buffer: 8,
            },
        }
    }
}
