// Redis sliding-window rate limiting with an in-process fallback

use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use serde::Serialize;
use std::{
    num::NonZeroU32,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::app_config::config;
use crate::db::RedisPool;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid rate limit key")]
    InvalidKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the time window
    pub max_requests: u32,

    pub window_seconds: u32,

    /// Block duration in seconds once the limit is hit
    pub block_duration: u32,
}

impl RateLimitConfig {
    /// Login attempts per client IP
    pub fn login() -> Self {
        let security = &config().security;
        Self {
            max_requests: security.login_rate_limit_per_ip,
            window_seconds: security.login_rate_limit_window_seconds,
            block_duration: security.login_rate_limit_window_seconds,
        }
    }

    /// Account creations per client IP
    pub fn register() -> Self {
        Self {
            max_requests: config().security.register_rate_limit_per_ip,
            window_seconds: 3600,
            block_duration: 3600,
        }
    }

    /// Password reset emails per client IP
    pub fn password_reset() -> Self {
        Self {
            max_requests: 5,
            window_seconds: 900,
            block_duration: 900,
        }
    }
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,

    /// Remaining requests in current window
    pub remaining: u32,

    /// Window reset time (Unix seconds)
    pub reset_time: u64,

    pub retry_after: Option<u32>,

    pub current_count: u32,
}

type LocalLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Keys held by a fallback limiter before stale ones are dropped
const LOCAL_PRUNE_THRESHOLD: usize = 10_000;

const SLIDING_WINDOW_SCRIPT: &str = r#"
    local key = KEYS[1]
    local now = tonumber(ARGV[1])
    local window_start = tonumber(ARGV[2])
    local max_requests = tonumber(ARGV[3])
    local window_seconds = tonumber(ARGV[4])
    local block_duration = tonumber(ARGV[5])

    redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start)
    local current_count = redis.call('ZCARD', key)

    local block_key = key .. ':blocked'
    if redis.call('EXISTS', block_key) == 1 then
        local block_ttl = redis.call('TTL', block_key)
        return {0, 0, now + (window_seconds * 1000), block_ttl > 0 and block_ttl or block_duration, current_count}
    end

    local allowed = current_count < max_requests
    if allowed then
        local request_id = now .. ':' .. math.random(1000000)
        redis.call('ZADD', key, now, request_id)
        current_count = current_count + 1
        redis.call('PEXPIREAT', key, now + (window_seconds * 1000))
    else
        redis.call('SETEX', block_key, block_duration, '1')
    end

    local remaining = math.max(0, max_requests - current_count)
    local retry_after = allowed and 0 or block_duration
    return {allowed and 1 or 0, remaining, now + (window_seconds * 1000), retry_after, current_count}
"#;

/// Sliding-window limiter backed by Redis.
///
/// When Redis cannot be reached the check falls back to a per-process
/// governor limiter with the same quota.
#[derive(Clone)]
pub struct RateLimitService {
    redis_pool: RedisPool,
    fallback: Arc<local::Limiters>,
}

mod local {
    use super::LocalLimiter;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// One keyed governor limiter per distinct quota
    #[derive(Default)]
    pub struct Limiters {
        inner: Mutex<HashMap<(u32, u32), Arc<LocalLimiter>>>,
    }

    impl Limiters {
        pub fn get_or_insert(
            &self,
            quota_key: (u32, u32),
            build: impl FnOnce() -> LocalLimiter,
        ) -> Arc<LocalLimiter> {
            let mut map = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.entry(quota_key)
                .or_insert_with(|| Arc::new(build()))
                .clone()
        }
    }
}

impl RateLimitService {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self {
            redis_pool,
            fallback: Arc::new(local::Limiters::default()),
        }
    }

    /// Check and record one request for `key`. Disabled limiting always allows.
    #[instrument(skip(self, config))]
    pub async fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        if !crate::app_config::config().features.enable_rate_limiting {
            return RateLimitResult {
                allowed: true,
                remaining: config.max_requests,
                reset_time: now_millis() / 1000,
                retry_after: None,
                current_count: 0,
            };
        }

        match self.sliding_window_check(key, config).await {
            Ok(result) => {
                if !result.allowed {
                    warn!(key = %key, count = result.current_count, "Rate limit exceeded");
                }
                result
            },
            Err(e) => {
                warn!("Redis rate limit check failed, using local limiter: {}", e);
                self.local_check(key, config)
            },
        }
    }

    async fn sliding_window_check(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        if key.is_empty() {
            return Err(RateLimitError::InvalidKey);
        }

        let mut conn = self.redis_pool.get_connection();
        let now = now_millis();
        let window_start = now.saturating_sub(config.window_seconds as u64 * 1000);
        let window_key = format!("rate_limit:{}", key);

        let result: Vec<u64> = redis::Script::new(SLIDING_WINDOW_SCRIPT)
            .key(&window_key)
            .arg(now)
            .arg(window_start)
            .arg(config.max_requests)
            .arg(config.window_seconds)
            .arg(config.block_duration)
            .invoke_async(&mut conn)
            .await?;

        Ok(parse_script_result(&result))
    }

    fn local_check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        let limiter = self
            .fallback
            .get_or_insert((config.max_requests, config.window_seconds), || {
                RateLimiter::keyed(local_quota(config))
            });
        prune_stale(&limiter, LOCAL_PRUNE_THRESHOLD);
        let reset_time = now_millis() / 1000 + config.window_seconds as u64;

        match limiter.check_key(&key.to_string()) {
            Ok(()) => RateLimitResult {
                allowed: true,
                remaining: 0,
                reset_time,
                retry_after: None,
                current_count: 0,
            },
            Err(_) => RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_time,
                retry_after: Some(config.block_duration),
                current_count: config.max_requests,
            },
        }
    }

    /// Clear rate limit state for a key
    pub async fn clear(&self, key: &str) -> Result<(), RateLimitError> {
        let window_key = format!("rate_limit:{}", key);
        self.redis_pool.del(&format!("{}:blocked", window_key)).await?;
        self.redis_pool.del(&window_key).await?;

        info!("Cleared rate limit for key: {}", key);
        Ok(())
    }
}

/// Drop keys whose budget has fully refilled once the limiter grows past
/// `threshold`
fn prune_stale(limiter: &LocalLimiter, threshold: usize) {
    if limiter.len() < threshold {
        return;
    }
    limiter.retain_recent();
    limiter.shrink_to_fit();
    info!(remaining = limiter.len(), "Pruned local rate limiter keys");
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn local_quota(config: &RateLimitConfig) -> Quota {
    let max = NonZeroU32::new(config.max_requests.max(1)).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_secs(config.window_seconds.max(1) as u64) / max.get();

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(max))
        .allow_burst(max)
}

fn parse_script_result(result: &[u64]) -> RateLimitResult {
    let field = |i: usize| result.get(i).copied().unwrap_or(0);

    RateLimitResult {
        allowed: field(0) == 1,
        remaining: field(1) as u32,
        reset_time: field(2) / 1000,
        retry_after: match field(3) {
            0 => None,
            secs => Some(secs as u32),
        },
        current_count: field(4) as u32,
    }
}
