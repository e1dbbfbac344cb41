use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub redis_url: String,
    pub pool_size: u32,
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl RedisConfig {
    /// Build from the centralized application config
    pub fn from_env() -> Self {
        Self::from(&crate::app_config::config().redis)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.redis_url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.pool_size == 0 {
            return Err("Pool size must be greater than 0".to_string());
        }
        if self.pool_size > 1000 {
            return Err("Pool size too large (max: 1000)".to_string());
        }
        if self.command_timeout.is_zero() {
            return Err("Command timeout must be greater than 0".to_string());
        }
        if self.retry_attempts == 0 {
            return Err("Retry attempts must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl From<&crate::app_config::RedisConfig> for RedisConfig {
    fn from(config: &crate::app_config::RedisConfig) -> Self {
        Self {
            redis_url: config.url.clone(),
            pool_size: config.pool_size,
            connection_timeout: Duration::from_secs(config.connection_timeout),
            command_timeout: Duration::from_secs(config.command_timeout),
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RedisConfig {
        RedisConfig {
            redis_url: "redis://localhost:6379".to_string(),
            pool_size: 4,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let config = RedisConfig {
            pool_size: 0,
            ..sample()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_url_rejected() {
        let config = RedisConfig {
            redis_url: String::new(),
            ..sample()
        };
        assert!(config.validate().is_err());
    }
}
