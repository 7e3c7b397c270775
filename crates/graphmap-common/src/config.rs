use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use config::{Config, ConfigError, File, Environment};

// --- Constants for Default Configuration ---
pub const DEFAULT_PORT: u16 = 8182;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_MIME_TYPE: &str = "application/vnd.gremlin-v2.0+json";

pub const DEFAULT_TRANSACTION_CLEAR_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_RETRY_MAX: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Full endpoint URL; when set it wins over host/port/secure.
    #[serde(default)]
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// Request signing is handled by the connection layer; here it only forces `wss`.
    #[serde(default)]
    pub iam: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub mime_type: String,
}

impl ConnectionConfig {
    /// Resolves the websocket endpoint the connection layer should dial.
    pub fn endpoint(&self) -> String {
        if !self.iam {
            if let Some(url) = &self.url {
                return url.clone();
            }
        }
        let scheme = if self.iam || self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/gremlin", scheme, self.host, self.port)
    }

    /// Plain SASL credentials, only when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    pub clear_timeout_ms: u64,
}

impl TransactionConfig {
    pub fn clear_timeout(&self) -> Duration {
        Duration::from_millis(self.clear_timeout_ms)
    }
}

/// Fallback retry policy for models that do not declare their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub transaction: TransactionConfig,
    pub retry: RetryConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            secure: true,
            iam: false,
            user: None,
            password: None,
            mime_type: DEFAULT_MIME_TYPE.into(),
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            clear_timeout_ms: DEFAULT_TRANSACTION_CLEAR_TIMEOUT_MS,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_MAX,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            transaction: TransactionConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads `graphmap.toml` from the working directory (if present) plus environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Default settings
            .set_default("connection.host", DEFAULT_HOST)?
            .set_default("connection.port", DEFAULT_PORT as i64)?
            .set_default("connection.secure", true)?
            .set_default("connection.iam", false)?
            .set_default("connection.mime_type", DEFAULT_MIME_TYPE)?
            .set_default("transaction.clear_timeout_ms", DEFAULT_TRANSACTION_CLEAR_TIMEOUT_MS)?
            .set_default("retry.max_retries", DEFAULT_RETRY_MAX as i64)?
            .set_default("retry.delay_ms", DEFAULT_RETRY_DELAY_MS)?;

        builder = match path {
            Some(p) => builder.add_source(File::from(p).required(true)),
            // File: graphmap.toml
            None => builder.add_source(File::with_name("graphmap").required(false)),
        };

        let s = builder
            // Environment: GRAPHMAP__CONNECTION__HOST=db.local -> connection.host=db.local
            .add_source(Environment::with_prefix("GRAPHMAP").separator("__"))

            // Short-hand ENV overrides
            .set_override_option("connection.url", env::var("GRAPHMAP_URL").ok())?
            .set_override_option("connection.host", env::var("GRAPHMAP_HOST").ok())?
            .set_override_option("connection.port", env::var("GRAPHMAP_PORT").ok().and_then(|v| v.parse::<i64>().ok()))?

            .build()?;

        s.try_deserialize()
    }

    pub fn default_retry(&self) -> crate::RetryPolicy {
        crate::RetryPolicy {
            max_retries: self.retry.max_retries,
            delay_ms: self.retry.delay_ms,
        }
    }
}
