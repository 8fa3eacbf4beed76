//! Runtime configuration for the gateway.
//!
//! There is no config file: paths resolve from environment variables with
//! home-directory defaults, which keeps the vault location stable across
//! every process that shares the OS keychain entry.

use std::path::PathBuf;

use serde::Serialize;

/// Environment variable overriding the vault database path.
pub const VAULT_DB_PATH_ENV: &str = "VAULT_DB_PATH";

/// Environment variable overriding the audit log path.
pub const AUDIT_LOG_PATH_ENV: &str = "AUDIT_LOG_PATH";

/// Environment variable carrying a fallback proxy token for inbound
/// requests that embed none.
pub const PROXY_TOKEN_ENV: &str = "PINCER_PROXY_TOKEN";

/// Resolved gateway configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path of the vault database file.
    pub vault_db_path: PathBuf,
    /// Path of the append-only audit log.
    pub audit_log_path: PathBuf,
    /// Maximum outbound attempts per call (callers may override down).
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; attempt `n` sleeps `base * 2^n`.
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_db_path: pincer_dir().join("vault.db"),
            audit_log_path: pincer_dir().join("audit.jsonl"),
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl Config {
    /// Resolve the configuration from the environment, falling back to
    /// the `~/.pincer` defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = non_empty_env(VAULT_DB_PATH_ENV) {
            config.vault_db_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env(AUDIT_LOG_PATH_ENV) {
            config.audit_log_path = PathBuf::from(path);
        }
        config
    }
}

/// The `~/.pincer` state directory. Falls back to the current directory
/// when no home directory can be determined (containers, odd init setups).
pub fn pincer_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pincer")
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
