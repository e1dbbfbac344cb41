// Centralized configuration for the marketplace backend
// Every environment variable is read once at startup

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("Failed to load configuration")
});

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub email: EmailConfig,
    pub stripe: StripeConfig,
    pub uploads: UploadConfig,
    pub features: FeatureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Externally visible base URL, used to build upload URLs
    pub public_base_url: String,
    pub rust_log: String,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
    pub max_lifetime: u64,
    pub disable_embedded_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: u32,
    pub connection_timeout: u64,
    pub command_timeout: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_expiry: u64,
    pub refresh_expiry: u64,
    pub audience: String,
    pub issuer: String,
    pub key_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_allowed_origins: Vec<String>,
    /// Salt mixed into refresh token JTI hashes
    pub jti_hash_salt: String,
    pub login_rate_limit_per_ip: u32,
    pub login_rate_limit_window_seconds: u32,
    pub register_rate_limit_per_ip: u32,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub provider: EmailProvider,
    pub resend_api_key: String,
    pub resend_api_url: String,
    pub from_email: String,
    pub from_name: String,
    pub support_email: String,
    /// Frontend URL used to build links in emails
    pub frontend_url: String,
}

/// Email delivery backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EmailProvider {
    Resend,
    /// Write rendered emails to the log instead of sending them
    Log,
}

impl From<String> for EmailProvider {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "log" | "console" => EmailProvider::Log,
            _ => EmailProvider::Resend,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_url: String,
    pub currency: String,
    /// Accepted clock skew for webhook signatures, in seconds
    pub webhook_tolerance_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub enable_metrics: bool,
    pub enable_rate_limiting: bool,
    pub enable_swagger_ui: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let get_required = |key: &str| -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        };

        let get_or_default = |key: &str, default: &str| -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let parse_or_default = |key: &str, default: &str| -> Result<u32, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u32".to_string())
            })
        };

        let parse_u64_or_default = |key: &str, default: &str| -> Result<u64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u64".to_string())
            })
        };

        let parse_bool_or_default = |key: &str, default: &str| -> bool {
            get_or_default(key, default).to_lowercase() == "true"
        };

        let require_secret = |key: &str| -> Result<String, ConfigError> {
            let secret = get_required(key)?;
            if secret.len() < 32 {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "Secret must be at least 32 characters long".to_string(),
                ));
            }
            Ok(secret)
        };

        let environment = Environment::from(get_or_default("ENVIRONMENT", "development"));

        let bind_address = get_or_default("BIND_ADDRESS", "0.0.0.0:8080");
        let port = bind_address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let server = ServerConfig {
            public_base_url: get_or_default(
                "PUBLIC_BASE_URL",
                &format!("http://localhost:{}", port),
            ),
            bind_address,
            port,
            rust_log: get_or_default("RUST_LOG", "info"),
        };

        let database = DatabaseConfig {
            url: get_required("DATABASE_URL")?,
            max_connections: parse_or_default("DATABASE_MAX_CONNECTIONS", "20")?,
            min_connections: parse_or_default("DATABASE_MIN_CONNECTIONS", "2")?,
            connect_timeout: parse_u64_or_default("DATABASE_CONNECT_TIMEOUT", "30")?,
            idle_timeout: parse_u64_or_default("DATABASE_IDLE_TIMEOUT", "600")?,
            max_lifetime: parse_u64_or_default("DATABASE_MAX_LIFETIME", "1800")?,
            disable_embedded_migrations: parse_bool_or_default(
                "DISABLE_EMBEDDED_MIGRATIONS",
                "false",
            ),
        };

        let redis = RedisConfig {
            url: get_or_default("REDIS_URL", "redis://localhost:6379"),
            pool_size: parse_or_default("REDIS_POOL_SIZE", "10")?,
            connection_timeout: parse_u64_or_default("REDIS_CONNECTION_TIMEOUT", "5")?,
            command_timeout: parse_u64_or_default("REDIS_COMMAND_TIMEOUT", "5")?,
            retry_attempts: parse_or_default("REDIS_RETRY_ATTEMPTS", "3")?,
            retry_delay_ms: parse_u64_or_default("REDIS_RETRY_DELAY_MS", "100")?,
        };

        let jwt = JwtConfig {
            access_secret: require_secret("JWT_ACCESS_SECRET")?,
            refresh_secret: require_secret("JWT_REFRESH_SECRET")?,
            access_expiry: parse_u64_or_default("JWT_ACCESS_EXPIRY", "3600")?,
            refresh_expiry: parse_u64_or_default("JWT_REFRESH_EXPIRY", "604800")?,
            audience: get_or_default("JWT_AUDIENCE", "activity-marketplace"),
            issuer: get_or_default("JWT_ISSUER", "activity-marketplace"),
            key_version: parse_or_default("JWT_KEY_VERSION", "1")?,
        };

        // Production must not fall back to the refresh secret as salt
        let jti_hash_salt = match env::var("JTI_HASH_SALT") {
            Ok(salt) if salt.len() >= 32 => salt,
            Ok(salt) => {
                return Err(ConfigError::InvalidValue(
                    "JTI_HASH_SALT".to_string(),
                    format!("Salt must be at least 32 bytes (current: {} bytes)", salt.len()),
                ))
            },
            Err(_) if environment == Environment::Production => {
                return Err(ConfigError::MissingVar("JTI_HASH_SALT".to_string()))
            },
            Err(_) => jwt.refresh_secret.clone(),
        };

        let security = SecurityConfig {
            cors_allowed_origins: get_or_default("CORS_ALLOWED_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            jti_hash_salt,
            login_rate_limit_per_ip: parse_or_default("LOGIN_RATE_LIMIT_PER_IP", "10")?,
            login_rate_limit_window_seconds: parse_or_default(
                "LOGIN_RATE_LIMIT_WINDOW_SECONDS",
                "60",
            )?,
            register_rate_limit_per_ip: parse_or_default("REGISTER_RATE_LIMIT_PER_IP", "5")?,
            secure_cookies: parse_bool_or_default(
                "SECURE_COOKIES",
                if environment == Environment::Production {
                    "true"
                } else {
                    "false"
                },
            ),
        };

        let email = EmailConfig {
            provider: get_or_default("EMAIL_PROVIDER", "resend").into(),
            resend_api_key: get_required("RESEND_API_KEY")?,
            resend_api_url: get_or_default("RESEND_API_URL", "https://api.resend.com/emails"),
            from_email: get_or_default("EMAIL_FROM_ADDRESS", "noreply@example.com"),
            from_name: get_or_default("EMAIL_FROM_NAME", "Activity Marketplace"),
            support_email: get_or_default("SUPPORT_EMAIL", "support@example.com"),
            frontend_url: get_or_default("FRONTEND_URL", "http://localhost:3000"),
        };

        let stripe = StripeConfig {
            secret_key: get_required("STRIPE_SECRET_KEY")?,
            webhook_secret: get_required("STRIPE_WEBHOOK_SECRET")?,
            api_url: get_or_default("STRIPE_API_URL", "https://api.stripe.com/v1"),
            currency: get_or_default("STRIPE_CURRENCY", "usd").to_lowercase(),
            webhook_tolerance_seconds: parse_u64_or_default("STRIPE_WEBHOOK_TOLERANCE", "300")?
                as i64,
        };

        let uploads = UploadConfig {
            dir: get_or_default("UPLOAD_DIR", "./uploads"),
            max_bytes: parse_u64_or_default("UPLOAD_MAX_BYTES", "5242880")? as usize,
        };

        let features = FeatureConfig {
            enable_metrics: parse_bool_or_default("ENABLE_METRICS", "true"),
            enable_rate_limiting: parse_bool_or_default("ENABLE_RATE_LIMITING", "true"),
            enable_swagger_ui: parse_bool_or_default("ENABLE_SWAGGER_UI", "false"),
        };

        Ok(Self {
            environment,
            server,
            database,
            redis,
            jwt,
            security,
            email,
            stripe,
            uploads,
            features,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Get the global configuration instance
pub fn config() -> &'static AppConfig {
    &CONFIG
}
