//! Node configuration: CLI flags, a JSON config file, and the environment
//! variables that carry key material, mirroring the layered config/env
//! resolution the rest of this stack uses.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use alloy_primitives::Address;
use clap::Parser;
use serde::Deserialize;
use settlement_types::{PeerConfig, SettlementError};

/// CLI arguments for the settlement node.
#[derive(Parser, Debug)]
#[command(name = "settlement-node")]
#[command(about = "Payment-channel settlement core")]
pub struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    pub config: PathBuf,
}

fn default_host() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn default_port() -> u16 {
    8090
}

fn default_sqlite_path() -> String {
    "settlement.sqlite".to_string()
}

fn default_evm_chain_id() -> u64 {
    1
}

fn default_initial_deposit_multiplier() -> u64 {
    3
}

fn default_min_deposit_threshold() -> f64 {
    0.5
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_retry_delay_ms() -> u64 {
    500
}

fn default_deposit_monitor_interval_secs() -> u64 {
    300
}

fn default_idle_sweep_interval_secs() -> u64 {
    3600
}

fn default_evm_idle_channel_timeout_secs() -> i64 {
    86_400
}

fn default_metrics_cleanup_interval_secs() -> u64 {
    300
}

/// Top-level node configuration, deserialized from the JSON file named by
/// [`CliArgs::config`].
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_evm_chain_id")]
    pub evm_chain_id: u64,
    #[serde(default)]
    pub evm_verifying_contract: Address,
    #[serde(default = "default_initial_deposit_multiplier")]
    pub initial_deposit_multiplier: u64,
    #[serde(default = "default_min_deposit_threshold")]
    pub min_deposit_threshold: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
    #[serde(default = "default_deposit_monitor_interval_secs")]
    pub deposit_monitor_interval_secs: u64,
    #[serde(default = "default_idle_sweep_interval_secs")]
    pub idle_sweep_interval_secs: u64,
    /// `now - last_activity` beyond which an open EVM channel is swept for
    /// cooperative-then-unilateral close.
    #[serde(default = "default_evm_idle_channel_timeout_secs")]
    pub evm_idle_channel_timeout_secs: i64,
    #[serde(default = "default_metrics_cleanup_interval_secs")]
    pub metrics_cleanup_interval_secs: u64,
    /// XRP source account this node settles from; paired with the signer
    /// key loaded from `XRP_SIGNING_KEY_HEX`.
    #[serde(default)]
    pub xrp_source_address: String,
    /// Peers this node is configured to settle with, keyed by `peer_id`.
    #[serde(default)]
    pub peers: HashMap<String, PeerConfig>,
}

impl Config {
    /// Loads config from the path named by CLI args (or its default),
    /// falling back to an empty configuration if the file does not exist
    /// so a fresh checkout can still boot for local experimentation.
    pub fn load() -> Result<Self, SettlementError> {
        let args = CliArgs::parse();
        Self::from_path(&args.config)
    }

    fn from_path(path: &PathBuf) -> Result<Self, SettlementError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => "{}".to_string(),
        };
        serde_json::from_str(&contents)
            .map_err(|e| SettlementError::InvalidInput(format!("invalid config at {path:?}: {e}")))
    }
}
