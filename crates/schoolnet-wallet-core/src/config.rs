//! Client configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file
//! (`schoolnet.toml` in the working directory, or an explicit path), then
//! `SCHOOLNET_*` environment variables. Values are validated once here; the
//! rest of the crate treats them as trusted.
//!
//! Environment values are kept as strings and only converted when a numeric
//! field asks for it, so a key made of decimal digits is never read as a number.

use config::{Config, Environment, File, FileFormat};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroize;

pub const DEFAULT_CONFIG_FILE: &str = "schoolnet.toml";
pub const ENV_PREFIX: &str = "SCHOOLNET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub chain_id: u64,
    /// Hex-encoded secp256k1 key. Absent means read-only.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    #[serde(default = "default_finality_timeout_secs")]
    pub finality_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub history_from_block: u64,
}

fn default_confirmations() -> usize {
    1
}

fn default_finality_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl ClientConfig {
    /// Load from defaults, file, and process environment, then validate.
    ///
    /// With `path == None` the default file is optional; an explicit path
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Self::finish(settings)
    }

    /// Load from a TOML document and an explicit environment map instead of
    /// the process environment.
    pub fn from_toml_with_env(toml: &str, env: HashMap<String, String>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).source(Some(env)))
            .build()?;
        Self::finish(settings)
    }

    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::from_toml_with_env(toml, HashMap::new())
    }

    fn finish(settings: Config) -> Result<Self, ConfigError> {
        let config: ClientConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.rpc_url.trim();
        let host = match url.split_once("://") {
            Some(("http" | "https", rest)) => rest,
            _ => return Err(invalid("rpc_url", "expected an http:// or https:// endpoint")),
        };
        if host.is_empty() || host.starts_with('/') {
            return Err(invalid("rpc_url", "missing host"));
        }
        self.contract_address()?;
        if self.finality_timeout_secs == 0 {
            return Err(invalid("finality_timeout_secs", "must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be greater than zero"));
        }
        if self.private_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(invalid("private_key", "set but empty"));
        }
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        let text = self.contract_address.trim();
        let digits = text.strip_prefix("0x").unwrap_or(text);
        if digits.len() != 40 {
            return Err(invalid(
                "contract_address",
                format!("expected 20 bytes (40 hex digits), got {} digits", digits.len()),
            ));
        }
        Address::from_str(digits).map_err(|e| invalid("contract_address", e.to_string()))
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_secs(self.finality_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn has_signer(&self) -> bool {
        self.private_key.is_some()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("chain_id", &self.chain_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("confirmations", &self.confirmations)
            .field("finality_timeout_secs", &self.finality_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("history_from_block", &self.history_from_block)
            .finish()
    }
}

impl Drop for ClientConfig {
    fn drop(&mut self) {
        if let Some(key) = self.private_key.as_mut() {
            key.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        rpc_url = "http://127.0.0.1:8545"
        contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        chain_id = 31337
    "#;

    #[test]
    fn test_defaults_apply() {
        let config = ClientConfig::from_toml(BASE).unwrap();
        assert_eq!(config.confirmations, 1);
        assert_eq!(config.finality_timeout(), Duration::from_secs(120));
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.history_from_block, 0);
        assert!(!config.has_signer());
    }

    #[test]
    fn test_environment_overrides_file() {
        let env = HashMap::from([
            ("SCHOOLNET_CHAIN_ID".to_string(), "11155111".to_string()),
            ("SCHOOLNET_CONFIRMATIONS".to_string(), "3".to_string()),
        ]);
        let config = ClientConfig::from_toml_with_env(BASE, env).unwrap();
        assert_eq!(config.chain_id, 11_155_111);
        assert_eq!(config.confirmations, 3);
    }

    #[test]
    fn test_decimal_looking_key_from_environment_stays_verbatim() {
        let key = "1".repeat(64);
        let env = HashMap::from([("SCHOOLNET_PRIVATE_KEY".to_string(), key.clone())]);
        let config = ClientConfig::from_toml_with_env(BASE, env).unwrap();
        assert_eq!(config.private_key.as_deref(), Some(key.as_str()));
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let toml = BASE.replace("http://127.0.0.1:8545", "ws://127.0.0.1:8546");
        assert!(matches!(
            ClientConfig::from_toml(&toml),
            Err(ConfigError::Invalid { field: "rpc_url", .. })
        ));
    }

    #[test]
    fn test_rejects_short_contract_address() {
        let toml = BASE.replace("0x5FbDB2315678afecb367f032d93F642f64180aa3", "0x5FbDB231");
        assert!(matches!(
            ClientConfig::from_toml(&toml),
            Err(ConfigError::Invalid { field: "contract_address", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let toml = format!("{BASE}\nfinality_timeout_secs = 0\n");
        assert!(matches!(
            ClientConfig::from_toml(&toml),
            Err(ConfigError::Invalid { field: "finality_timeout_secs", .. })
        ));
    }

    #[test]
    fn test_missing_required_field_is_load_error() {
        assert!(matches!(
            ClientConfig::from_toml("chain_id = 1"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let toml = format!("{BASE}\nprivate_key = \"0xdeadbeef\"\n");
        let config = ClientConfig::from_toml(&toml).unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("deadbeef"));
        assert!(shown.contains("<redacted>"));
    }
}
