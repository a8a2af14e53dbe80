//! Per-peer settlement configuration.

use std::collections::HashSet;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;
use crate::token::TokenId;

/// Which ledger family (or families) a peer is willing to settle over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPreference {
    Evm,
    Xrp,
    Both,
}

impl SettlementPreference {
    pub fn allows_evm(self) -> bool {
        matches!(self, SettlementPreference::Evm | SettlementPreference::Both)
    }

    pub fn allows_xrp(self) -> bool {
        matches!(self, SettlementPreference::Xrp | SettlementPreference::Both)
    }
}

/// A single peer's settlement configuration.
///
/// `evm_address` is required when `settlement_preference` allows EVM;
/// `xrp_address` is required when it allows XRP. [`PeerConfig::validate`]
/// enforces this at construction so every other component can assume a
/// validated config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub peer_id: String,
    pub settlement_preference: SettlementPreference,
    pub settlement_tokens: HashSet<TokenId>,
    pub evm_address: Option<Address>,
    pub xrp_address: Option<String>,
}

impl PeerConfig {
    /// Validates that the addresses required by `settlement_preference` are present.
    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.settlement_preference.allows_evm() && self.evm_address.is_none() {
            return Err(SettlementError::MissingAddress);
        }
        if self.settlement_preference.allows_xrp() && self.xrp_address.is_none() {
            return Err(SettlementError::MissingAddress);
        }
        Ok(())
    }

    /// Whether this peer's preference is compatible with the ledger family
    /// implied by `token`.
    pub fn compatible_with(&self, token: &TokenId) -> bool {
        if token.is_xrp() {
            self.settlement_preference.allows_xrp()
        } else {
            self.settlement_preference.allows_evm()
        }
    }
}
