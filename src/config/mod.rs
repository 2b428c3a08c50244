//! Configuration for Arbiter.
//!
//! Settings are loaded with priority: env var > TOML config file > default.
//! Env vars may come from the process, `./.env`, or `~/.arbiter/.env`
//! (loaded via dotenvy early in startup).

pub(crate) mod helpers;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CHAIN_ID: u64 = 61999;
pub const DEFAULT_CHAIN_NAME: &str = "GenLayer Moderation Network";
pub const DEFAULT_CURRENCY_SYMBOL: &str = "GEN";
pub const DEFAULT_RPC_URL: &str = "https://studio.genlayer.com/api";
pub const DEFAULT_WALLET_POLL_INTERVAL_MS: u64 = 2_000;

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub wallet: WalletConfig,
    pub contract: ContractConfig,
    /// State directory (flag storage, `.env`, `config.toml`).
    pub home: PathBuf,
}

/// Target network the session expects the wallet to be on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub currency_symbol: String,
    pub rpc_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            chain_name: DEFAULT_CHAIN_NAME.to_string(),
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
        }
    }
}

/// Wallet provider endpoint.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// JSON-RPC endpoint acting as the wallet provider. `None` means no
    /// wallet is installed.
    pub rpc_url: Option<String>,
    /// How often the provider is polled for account/chain changes.
    pub poll_interval: Duration,
}

/// Arbitration contract settings.
#[derive(Debug, Clone, Default)]
pub struct ContractConfig {
    pub address: Option<String>,
}

impl ContractConfig {
    /// The contract address, or `MissingRequired` when unset.
    pub fn require_address(&self) -> Result<&str, ConfigError> {
        self.address
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "CONTRACT_ADDRESS".to_string(),
                hint: "Moderation contract address not configured in .env file.".to_string(),
            })
    }
}

/// Optional TOML overlay (`~/.arbiter/config.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub network: NetworkSection,
    pub wallet: WalletSection,
    pub contract: ContractSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub chain_id: Option<u64>,
    pub chain_name: Option<String>,
    pub currency_symbol: Option<String>,
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletSection {
    pub rpc_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContractSection {
    pub address: Option<String>,
}

impl ConfigFile {
    /// Default overlay path inside the state directory.
    pub fn default_path() -> PathBuf {
        crate::bootstrap::arbiter_home().join("config.toml")
    }

    /// Load a TOML file. Returns `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        toml::from_str(&raw)
            .map(Some)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }
}

impl NetworkConfig {
    pub(crate) fn resolve(file: &NetworkSection) -> Result<Self, ConfigError> {
        let chain_id = helpers::parse_u64_env("GENLAYER_CHAIN_ID", file.chain_id, DEFAULT_CHAIN_ID)?;
        if chain_id == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GENLAYER_CHAIN_ID".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let chain_name = helpers::optional_env("GENLAYER_CHAIN_NAME")?
            .or_else(|| file.chain_name.clone())
            .unwrap_or_else(|| DEFAULT_CHAIN_NAME.to_string());

        let currency_symbol = helpers::optional_env("GENLAYER_SYMBOL")?
            .or_else(|| file.currency_symbol.clone())
            .unwrap_or_else(|| DEFAULT_CURRENCY_SYMBOL.to_string());

        let rpc_url = helpers::optional_env("GENLAYER_RPC_URL")?
            .or_else(|| file.rpc_url.clone())
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        helpers::validate_http_url("GENLAYER_RPC_URL", &rpc_url)?;

        Ok(Self {
            chain_id,
            chain_name,
            currency_symbol,
            rpc_url,
        })
    }
}

impl WalletConfig {
    pub(crate) fn resolve(file: &WalletSection) -> Result<Self, ConfigError> {
        let rpc_url = helpers::optional_env("WALLET_RPC_URL")?.or_else(|| file.rpc_url.clone());
        if let Some(url) = &rpc_url {
            helpers::validate_http_url("WALLET_RPC_URL", url)?;
        }

        let poll_ms = helpers::parse_u64_env(
            "WALLET_POLL_INTERVAL_MS",
            file.poll_interval_ms,
            DEFAULT_WALLET_POLL_INTERVAL_MS,
        )?;
        if poll_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WALLET_POLL_INTERVAL_MS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            rpc_url,
            poll_interval: Duration::from_millis(poll_ms),
        })
    }
}

impl ContractConfig {
    pub(crate) fn resolve(file: &ContractSection) -> Result<Self, ConfigError> {
        let address = helpers::optional_env("CONTRACT_ADDRESS")?.or_else(|| file.address.clone());
        match &address {
            Some(value) => helpers::validate_address("CONTRACT_ADDRESS", value)?,
            None => tracing::warn!("Moderation contract address not found in environment"),
        }
        Ok(Self { address })
    }
}

impl Config {
    /// Load configuration from env vars and the default TOML overlay.
    ///
    /// Loads both `./.env` (higher priority) and `~/.arbiter/.env` via
    /// dotenvy, which never overwrites existing vars.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load from env with an optional TOML config file overlay.
    ///
    /// If `toml_path` is `Some`, the file must exist and parse. If `None`,
    /// the default path is tried and a missing file is ignored.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_arbiter_env();

        let file = Self::load_overlay(toml_path)?;
        Self::build(&file)
    }

    fn load_overlay(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(ConfigFile::default_path);

        match ConfigFile::load(&path) {
            Ok(Some(file)) => {
                tracing::debug!("Loaded TOML config from {}", path.display());
                Ok(file)
            }
            Ok(None) if explicit_path.is_some() => Err(ConfigError::ParseError(format!(
                "Config file not found: {}",
                path.display()
            ))),
            Ok(None) => Ok(ConfigFile::default()),
            Err(e) if explicit_path.is_some() => Err(e),
            Err(e) => {
                tracing::warn!("Failed to load default config file: {}", e);
                Ok(ConfigFile::default())
            }
        }
    }

    /// Build config from an overlay (env vars still win).
    pub fn build(file: &ConfigFile) -> Result<Self, ConfigError> {
        Ok(Self {
            network: NetworkConfig::resolve(&file.network)?,
            wallet: WalletConfig::resolve(&file.wallet)?,
            contract: ContractConfig::resolve(&file.contract)?,
            home: crate::bootstrap::arbiter_home(),
        })
    }
}
