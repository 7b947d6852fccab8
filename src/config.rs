//! Sub-wallet configuration
//!
//! Per-coin settings the wallet core consumes: chain kind, fee rate,
//! address mode and gap limits. Stored as JSON.

use crate::core::{DEFAULT_FEE_PER_KB, MAX_FEE_PER_KB};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Gap limit of the external (receive) chain
pub const DEFAULT_GAP_LIMIT_EXTERNAL: u32 = 10;

/// Gap limit of the internal (change) chain
pub const DEFAULT_GAP_LIMIT_INTERNAL: u32 = 5;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Which chain a sub-wallet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SubWalletType {
    #[default]
    Normal,
    Mainchain,
    Sidechain,
    Idchain,
}

impl SubWalletType {
    /// Whether withdrawals to another chain are possible
    pub fn supports_cross_chain(&self) -> bool {
        matches!(self, SubWalletType::Mainchain | SubWalletType::Sidechain | SubWalletType::Idchain)
    }
}

/// Settings for one sub-wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinConfig {
    pub chain_id: String,
    pub kind: SubWalletType,
    pub net_type: String,
    pub index: u32,
    /// Fee rate per kilobyte
    pub min_fee: u64,
    pub genesis_address: String,
    pub reconnect_seconds: u32,
    pub enable_p2p: bool,
    /// Receive and change on one fixed address
    pub single_address: bool,
    pub earliest_peer_time: u32,
    /// Highest address index known to be used
    pub used_max_address_index: u32,
    pub gap_limit_external: u32,
    pub gap_limit_internal: u32,
}

impl Default for CoinConfig {
    fn default() -> Self {
        Self {
            chain_id: "ELA".to_string(),
            kind: SubWalletType::Mainchain,
            net_type: "MainNet".to_string(),
            index: 0,
            min_fee: DEFAULT_FEE_PER_KB,
            genesis_address: String::new(),
            reconnect_seconds: 60,
            enable_p2p: true,
            single_address: false,
            earliest_peer_time: 0,
            used_max_address_index: 0,
            gap_limit_external: DEFAULT_GAP_LIMIT_EXTERNAL,
            gap_limit_internal: DEFAULT_GAP_LIMIT_INTERNAL,
        }
    }
}

impl CoinConfig {
    /// Config for a chain with default settings
    pub fn new(chain_id: &str, kind: SubWalletType) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            kind,
            ..Default::default()
        }
    }

    /// Reject values the wallet cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_fee > MAX_FEE_PER_KB {
            return Err(ConfigError::InvalidValue(format!(
                "min_fee {} exceeds {}",
                self.min_fee, MAX_FEE_PER_KB
            )));
        }
        if self.gap_limit_external == 0 || self.gap_limit_internal == 0 {
            return Err(ConfigError::InvalidValue("gap limit must be positive".to_string()));
        }
        if self.chain_id.is_empty() {
            return Err(ConfigError::InvalidValue("empty chain_id".to_string()));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = fs::File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to `path`, writing a temporary file first
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        let temp_path = path.with_extension("tmp");
        let file = fs::File::create(&temp_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;

        // Atomic rename
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}
