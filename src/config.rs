// ⚙️ Configuration
// Runtime settings from the environment, after loading `.env` if present
//
// DATABASE_PATH     fee_ledger.db
// SERVER_HOST       0.0.0.0
// SERVER_PORT       3000
// ALIAS_TABLE_PATH  built-in alias table when unset
// MAX_UPLOAD_BYTES  25 MiB

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::aliases::AliasTable;

pub const DEFAULT_DATABASE_PATH: &str = "fee_ledger.db";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub alias_table_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            alias_table_path: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any), then read the process environment
    pub fn from_env() -> Result<Self> {
        // A missing .env file is normal
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = AppConfig::default();

        Ok(AppConfig {
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            host: get("SERVER_HOST").unwrap_or(defaults.host),
            port: parse_var("SERVER_PORT", get("SERVER_PORT"))?.unwrap_or(defaults.port),
            alias_table_path: get("ALIAS_TABLE_PATH").map(PathBuf::from),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"))?
                .unwrap_or(defaults.max_upload_bytes),
        })
    }

    /// The configured alias table, or the built-in one
    pub fn alias_table(&self) -> Result<AliasTable> {
        match &self.alias_table_path {
            Some(path) => AliasTable::from_file(path),
            None => Ok(AliasTable::default()),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, v))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_PATH", "/tmp/fees.db"),
            ("SERVER_PORT", "8080"),
            ("SERVER_HOST", "127.0.0.1"),
            ("MAX_UPLOAD_BYTES", "1024"),
            ("ALIAS_TABLE_PATH", ""),
        ])
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/fees.db"));
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.max_upload_bytes, 1024);
        assert!(config.alias_table_path.is_none());
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        assert!(config_from(&[("SERVER_PORT", "eighty")]).is_err());
        assert!(config_from(&[("SERVER_PORT", "70000")]).is_err());
    }

    #[test]
    fn test_missing_alias_file_is_an_error() {
        let config = config_from(&[("ALIAS_TABLE_PATH", "/nonexistent/aliases.json")]).unwrap();
        assert!(config.alias_table().is_err());
    }
}
