use rand::{thread_rng, Rng};
use redis::{aio::ConnectionManager, Client, RedisError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use super::redis_config::RedisConfig;

/// Maximum delay cap for exponential backoff
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Redis pool of multiplexed connection managers handed out round-robin.
///
/// A `ConnectionManager` reconnects on its own and can be cloned cheaply, so
/// the pool never blocks waiting for a connection to be returned.
#[derive(Clone)]
pub struct RedisPool {
    connections: Arc<Vec<ConnectionManager>>,
    next: Arc<AtomicUsize>,
    config: RedisConfig,
}

/// Health check status for Redis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisHealth {
    pub is_healthy: bool,
    pub latency_ms: u64,
    pub total_connections: u32,
    pub error: Option<String>,
}

impl RedisPool {
    /// Create a new Redis pool, retrying each connection with backoff
    #[instrument(skip(config))]
    pub async fn new(config: RedisConfig) -> Result<Self, RedisError> {
        config.validate().map_err(|e| {
            error!("Invalid Redis configuration: {}", e);
            RedisError::from((
                redis::ErrorKind::InvalidClientConfig,
                "Invalid configuration",
            ))
        })?;

        info!(
            "Initializing Redis pool at {} with {} connections",
            mask_redis_url(&config.redis_url),
            config.pool_size
        );

        let client = Client::open(config.redis_url.as_str())?;
        let mut connections = Vec::with_capacity(config.pool_size as usize);

        for i in 0..config.pool_size {
            match Self::connect_with_retry(&client, &config).await {
                Ok(conn) => connections.push(conn),
                Err(e) if connections.is_empty() => return Err(e),
                Err(e) => warn!("Failed to create Redis connection {}: {}", i, e),
            }
        }

        info!("Redis pool initialized with {} connections", connections.len());

        Ok(Self {
            connections: Arc::new(connections),
            next: Arc::new(AtomicUsize::new(0)),
            config,
        })
    }

    async fn connect_with_retry(
        client: &Client,
        config: &RedisConfig,
    ) -> Result<ConnectionManager, RedisError> {
        let mut attempt = 0;
        let mut delay = config.retry_delay;

        loop {
            match ConnectionManager::new(client.clone()).await {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt + 1 < config.retry_attempts => {
                    warn!(
                        "Failed to create Redis connection (attempt {}/{}): {}",
                        attempt + 1,
                        config.retry_attempts,
                        e
                    );
                    sleep(delay).await;

                    let jitter = thread_rng().gen_range(0..100);
                    delay =
                        std::cmp::min(delay * 2 + Duration::from_millis(jitter), MAX_RETRY_DELAY);
                    attempt += 1;
                },
                Err(e) => {
                    error!(
                        "Failed to create Redis connection after {} attempts",
                        config.retry_attempts
                    );
                    return Err(e);
                },
            }
        }
    }

    /// Get the next connection in round-robin order
    pub fn get_connection(&self) -> ConnectionManager {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index].clone()
    }

    /// Run a command future with the configured command timeout
    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, RedisError>
    where
        F: std::future::Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RedisError::from((
                redis::ErrorKind::IoError,
                "Redis command timed out",
            ))),
        }
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> RedisHealth {
        let start = Instant::now();
        let mut conn = self.get_connection();

        match self
            .with_timeout(redis::cmd("PING").query_async::<String>(&mut conn))
            .await
        {
            Ok(_) => RedisHealth {
                is_healthy: true,
                latency_ms: start.elapsed().as_millis() as u64,
                total_connections: self.connections.len() as u32,
                error: None,
            },
            Err(e) => {
                error!("Redis health check failed: {}", e);
                RedisHealth {
                    is_healthy: false,
                    latency_ms: start.elapsed().as_millis() as u64,
                    total_connections: self.connections.len() as u32,
                    error: Some(e.to_string()),
                }
            },
        }
    }

    /// Set a value with expiry time in seconds
    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        expiry_seconds: u64,
    ) -> Result<(), RedisError> {
        let mut conn = self.get_connection();
        self.with_timeout(
            redis::cmd("SETEX")
                .arg(key)
                .arg(expiry_seconds)
                .arg(value)
                .query_async::<()>(&mut conn),
        )
        .await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, RedisError> {
        let mut conn = self.get_connection();
        self.with_timeout(redis::cmd("EXISTS").arg(key).query_async::<bool>(&mut conn))
            .await
    }

    pub async fn del(&self, key: &str) -> Result<(), RedisError> {
        let mut conn = self.get_connection();
        self.with_timeout(redis::cmd("DEL").arg(key).query_async::<()>(&mut conn))
            .await
    }

    pub fn pool_size(&self) -> usize {
        self.connections.len()
    }
}

/// Mask Redis URL for logging
pub fn mask_redis_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let host = parsed.host_str().unwrap_or("***");
        let port = parsed.port().unwrap_or(6379);

        if !parsed.username().is_empty() || parsed.password().is_some() {
            format!("redis://***:***@{}:{}", host, port)
        } else {
            format!("redis://{}:{}", host, port)
        }
    } else {
        "redis://***:***@***:***".to_string()
    }
}
