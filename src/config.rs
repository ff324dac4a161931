//! Runtime configuration.
//!
//! Every field has a serde default, so a partial JSON document or an empty
//! environment both produce a usable configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LedgerError, Result};

/// Longest run of leading zeros a SHA-256 hex digest can have.
pub const MAX_DIFFICULTY: usize = 64;

/// Ledger settings, fixed for the lifetime of a `Ledger`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Minimum leading zero hex digits in a sealed hash (default: 4)
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,

    /// Location of the chain document (default: "data/blockchain.json")
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

fn default_difficulty() -> usize {
    4
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data").join("blockchain.json")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            storage_path: default_storage_path(),
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(difficulty: usize) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    /// Reads `LEDGER_DIFFICULTY` and `LEDGER_STORAGE_PATH`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            difficulty: env_parse("LEDGER_DIFFICULTY", defaults.difficulty),
            storage_path: std::env::var("LEDGER_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::Config(format!(
                "difficulty {} exceeds the {MAX_DIFFICULTY} hex digits of a SHA-256 digest",
                self.difficulty
            )));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: "127.0.0.1")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Reads `LEDGER_HOST` and `LEDGER_PORT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("LEDGER_HOST").unwrap_or(defaults.host),
            port: env_parse("LEDGER_PORT", defaults.port),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses an environment variable, falling back to `default` when it is
/// unset or unparsable.
fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_config_defaults() {
        let config = LedgerConfig::default();

        assert_eq!(config.difficulty, 4);
        assert_eq!(config.storage_path, PathBuf::from("data/blockchain.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LedgerConfig = serde_json::from_str(r#"{"difficulty": 2}"#).unwrap();

        assert_eq!(config.difficulty, 2);
        assert_eq!(config.storage_path, default_storage_path());
    }

    #[test]
    fn test_difficulty_above_digest_width_is_rejected() {
        assert!(LedgerConfig::with_difficulty(64).validate().is_ok());
        let err = LedgerConfig::with_difficulty(65).validate().unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_env_parse_defaults_when_unset() {
        assert_eq!(env_parse("PROVENANCE_LEDGER_TEST_UNSET_VAR", 7u16), 7);
    }
}
