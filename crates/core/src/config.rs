//! Gateway configuration
//!
//! Field names follow the flat key scheme the deployment surface exposes
//! (`token.ttl_seconds`, `vault.retry.initial_delay_ms`, ...). Durations are
//! stored in the unit the key names and converted through accessor methods,
//! so call sites never re-derive units.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Input document could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A field carries a value that cannot work at runtime
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// Flat key name of the offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Top-level configuration for the gateway core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Token issuance and validation settings
    pub token: TokenConfig,
    /// Cache TTLs and deadlines
    pub cache: CacheConfig,
    /// Vault endpoint, authentication, and retry policy
    pub vault: VaultConfig,
    /// Rotation windows and tick interval
    pub rotation: RotationConfig,
    /// Inbound request budget
    pub auth: AuthConfig,
}

impl GatewayConfig {
    /// Parses a TOML document into a configuration, filling omitted keys
    /// with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and the
    /// validation errors of [`GatewayConfig::validate`].
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot work at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.ttl_seconds == 0 {
            return Err(invalid("token.ttl_seconds", "must be positive"));
        }
        if self.token.issuer.trim().is_empty() {
            return Err(invalid("token.issuer", "must not be empty"));
        }
        if self.token.audience.trim().is_empty() {
            return Err(invalid("token.audience", "must not be empty"));
        }
        if self.token.algorithm != "HS256" {
            return Err(invalid(
                "token.algorithm",
                format!("'{}' is not supported (only HS256)", self.token.algorithm),
            ));
        }
        if self.cache.default_token_ttl == 0 {
            return Err(invalid("cache.default_token_ttl", "must be positive"));
        }
        if self.cache.default_credential_ttl == 0 {
            return Err(invalid("cache.default_credential_ttl", "must be positive"));
        }
        if !self.vault.url.is_empty()
            && !self.vault.url.starts_with("http://")
            && !self.vault.url.starts_with("https://")
        {
            return Err(invalid("vault.url", "must start with http:// or https://"));
        }
        if self.vault.retry.count == 0 {
            return Err(invalid("vault.retry.count", "must be at least 1"));
        }
        if self.vault.retry.multiplier < 1.0 {
            return Err(invalid("vault.retry.multiplier", "must be >= 1.0"));
        }
        if self.rotation.transition_period_seconds == 0 {
            return Err(invalid(
                "rotation.transition_period_seconds",
                "must be positive",
            ));
        }
        if self.rotation.deprecation_period_seconds == 0 {
            return Err(invalid(
                "rotation.deprecation_period_seconds",
                "must be positive",
            ));
        }
        if self.rotation.check_interval_seconds == 0 {
            return Err(invalid("rotation.check_interval_seconds", "must be positive"));
        }
        if self.auth.request_deadline_ms == 0 {
            return Err(invalid("auth.request_deadline_ms", "must be positive"));
        }
        Ok(())
    }
}

/// Token issuance and validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Issued token lifetime in seconds
    pub ttl_seconds: u64,

    /// `iss` claim stamped on issued tokens
    pub issuer: String,

    /// `aud` claim stamped on issued tokens and required on validation
    pub audience: String,

    /// Signature algorithm; only `HS256` is accepted
    pub algorithm: String,

    /// Issuers accepted during validation besides `issuer` itself
    pub accepted_issuers: Vec<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            issuer: "payguard".into(),
            audience: "payment-api".into(),
            algorithm: "HS256".into(),
            accepted_issuers: Vec::new(),
        }
    }
}

impl TokenConfig {
    /// Issued token lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// The full set of issuers validation accepts.
    pub fn issuer_set(&self) -> Vec<String> {
        let mut set = vec![self.issuer.clone()];
        for issuer in &self.accepted_issuers {
            if !set.contains(issuer) {
                set.push(issuer.clone());
            }
        }
        set
    }
}

/// Cache TTLs and deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fallback token entry TTL in seconds when a token carries no expiry
    pub default_token_ttl: u64,

    /// Credential entry TTL in seconds
    pub default_credential_ttl: u64,

    /// Per-operation deadline in milliseconds
    pub op_deadline_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_token_ttl: 3600,
            default_credential_ttl: 900,
            op_deadline_ms: 500,
        }
    }
}

impl CacheConfig {
    /// Fallback token TTL.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.default_token_ttl)
    }

    /// Credential entry TTL.
    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.default_credential_ttl)
    }

    /// Per-operation deadline.
    pub fn op_deadline(&self) -> Duration {
        Duration::from_millis(self.op_deadline_ms)
    }
}

/// Vault endpoint, authentication, and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault base URL
    pub url: String,

    /// Vault account (authentication namespace)
    pub account: String,

    /// Login identity used for the authentication handshake
    pub auth_login: String,

    /// Optional CA certificate path for TLS verification
    pub ssl_certificate_path: Option<String>,

    /// Read deadline in milliseconds
    pub read_deadline_ms: u64,

    /// Write deadline in milliseconds
    pub write_deadline_ms: u64,

    /// Retry policy for transient failures
    pub retry: RetryConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: "https://127.0.0.1:8200".into(),
            account: "payment".into(),
            auth_login: "payment-gateway".into(),
            ssl_certificate_path: None,
            read_deadline_ms: 3_000,
            write_deadline_ms: 5_000,
            retry: RetryConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Read deadline.
    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }

    /// Write deadline.
    pub fn write_deadline(&self) -> Duration {
        Duration::from_millis(self.write_deadline_ms)
    }
}

/// Bounded exponential backoff parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts (first try included)
    pub count: u32,

    /// Delay multiplier between attempts
    pub multiplier: f64,

    /// Delay before the second attempt in milliseconds
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            count: 3,
            multiplier: 1.5,
            initial_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Delay before the second attempt.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Rotation windows and tick interval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Minimum DUAL_ACTIVE duration in seconds
    pub transition_period_seconds: u64,

    /// Minimum OLD_DEPRECATED duration in seconds
    pub deprecation_period_seconds: u64,

    /// Controller tick interval in seconds
    pub check_interval_seconds: u64,

    /// Advisory lock TTL in seconds
    pub lock_ttl_seconds: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            transition_period_seconds: 86_400,
            deprecation_period_seconds: 86_400,
            check_interval_seconds: 300,
            lock_ttl_seconds: 30,
        }
    }
}

impl RotationConfig {
    /// Minimum DUAL_ACTIVE duration.
    pub fn transition_period(&self) -> Duration {
        Duration::from_secs(self.transition_period_seconds)
    }

    /// Minimum OLD_DEPRECATED duration.
    pub fn deprecation_period(&self) -> Duration {
        Duration::from_secs(self.deprecation_period_seconds)
    }

    /// Controller tick interval.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// Advisory lock TTL.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }
}

/// Inbound request budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Upper bound on inbound authenticate latency in milliseconds
    pub request_deadline_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            request_deadline_ms: 5_000,
        }
    }
}

impl AuthConfig {
    /// Inbound wall-clock budget.
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}
