//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `STOREFRONT_BASE_URL` - Public URL of the storefront (used for gateway callbacks)
//! - `ADMIN_USERNAME` - Back-office login name
//! - `ADMIN_PASSWORD` - Back-office password (min 12 chars, high entropy)
//! - `PHONEPE_MERCHANT_ID` - PhonePe merchant id
//! - `PHONEPE_SALT_KEY` - PhonePe salt key used for `X-VERIFY` checksums
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `PHONEPE_SALT_INDEX` - Salt index (default: 1)
//! - `PHONEPE_ENV` - `sandbox` or `production` (default: sandbox)
//! - `PHONEPE_BASE_URL` - Override the gateway host (e.g. for a local stub)
//! - `PHONEPE_REDIRECT_URL` - Where the customer lands after paying
//!   (default: `{base_url}/checkout/result`)
//! - `SHIPPING_FEE` - Flat shipping fee in rupees (default: 0)
//! - `FREE_SHIPPING_THRESHOLD` - Subtotal from which shipping is free
//! - `RATE_LIMIT_ENABLED` - Rate limit login and payment endpoints (default: true)
//! - `CORS_ALLOWED_ORIGINS` - Comma-separated browser origins allowed to call the API
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use restwell_core::{Money, ShippingPolicy};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_ADMIN_PASSWORD_LENGTH: usize = 12;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "admin123",
    "xxx",
    "todo",
    "fixme",
];

const PHONEPE_SANDBOX_URL: &str = "https://api-preprod.phonepe.com/apis/pg-sandbox";
const PHONEPE_PRODUCTION_URL: &str = "https://api.phonepe.com/apis/hermes";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    /// Public base URL, without trailing slash
    pub base_url: String,
    pub admin: AdminCredentials,
    pub phonepe: PhonePeConfig,
    pub shipping: ShippingPolicy,
    pub rate_limit_enabled: bool,
    pub cors_allowed_origins: Vec<String>,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

/// Static back-office credentials.
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Which PhonePe environment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhonePeEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl PhonePeEnvironment {
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Sandbox => PHONEPE_SANDBOX_URL,
            Self::Production => PHONEPE_PRODUCTION_URL,
        }
    }
}

impl FromStr for PhonePeEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sandbox" | "uat" | "preprod" => Ok(Self::Sandbox),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("expected sandbox or production, got {other}")),
        }
    }
}

/// PhonePe payment gateway configuration.
///
/// Implements `Debug` manually to redact the salt key.
#[derive(Clone)]
pub struct PhonePeConfig {
    pub merchant_id: String,
    pub salt_key: SecretString,
    pub salt_index: u32,
    pub environment: PhonePeEnvironment,
    /// Gateway host, without trailing slash
    pub api_base_url: String,
    /// Browser redirect after payment
    pub redirect_url: String,
    /// Server-to-server callback target
    pub callback_url: String,
}

impl std::fmt::Debug for PhonePeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhonePeConfig")
            .field("merchant_id", &self.merchant_id)
            .field("salt_key", &"[REDACTED]")
            .field("salt_index", &self.salt_index)
            .field("environment", &self.environment)
            .field("api_base_url", &self.api_base_url)
            .field("redirect_url", &self.redirect_url)
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the admin password fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
        })?;

        let admin = AdminCredentials {
            username: get_required_env("ADMIN_USERNAME")?,
            password: get_validated_password("ADMIN_PASSWORD")?,
        };
        let phonepe = PhonePeConfig::from_env(&base_url)?;
        let shipping = ShippingPolicy {
            flat_fee: parse_money("SHIPPING_FEE")?.unwrap_or(Money::ZERO),
            free_above: parse_money("FREE_SHIPPING_THRESHOLD")?,
        };
        let rate_limit_enabled = parse_env("RATE_LIMIT_ENABLED", "true")?;
        let cors_allowed_origins = get_optional_env("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            admin,
            phonepe,
            shipping,
            rate_limit_enabled,
            cors_allowed_origins,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl PhonePeConfig {
    fn from_env(base_url: &str) -> Result<Self, ConfigError> {
        let environment: PhonePeEnvironment = parse_env("PHONEPE_ENV", "sandbox")?;
        let api_base_url = get_env_or_default("PHONEPE_BASE_URL", environment.default_base_url())
            .trim_end_matches('/')
            .to_owned();

        Ok(Self {
            merchant_id: get_required_env("PHONEPE_MERCHANT_ID")?,
            salt_key: get_required_secret("PHONEPE_SALT_KEY")?,
            salt_index: parse_env("PHONEPE_SALT_INDEX", "1")?,
            environment,
            api_base_url,
            redirect_url: get_optional_env("PHONEPE_REDIRECT_URL")
                .unwrap_or_else(|| format!("{base_url}/checkout/result")),
            callback_url: format!("{base_url}/api/payments/callback"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_money(key: &str) -> Result<Option<Money>, ConfigError> {
    get_optional_env(key)
        .map(|raw| {
            let amount = raw
                .trim()
                .parse::<Decimal>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
            Money::new(amount).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject short, placeholder-looking, or low-entropy passwords.
fn validate_password_strength(password: &str, var_name: &str) -> Result<(), ConfigError> {
    if password.chars().count() < MIN_ADMIN_PASSWORD_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("must be at least {MIN_ADMIN_PASSWORD_LENGTH} characters"),
        ));
    }

    let lower = password.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(password);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

fn get_validated_password(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_password_strength(&value, key)?;
    Ok(SecretString::from(value))
}
