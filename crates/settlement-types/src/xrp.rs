//! XRP Ledger channel state and claim types.

use serde::{Deserialize, Serialize};

use crate::channel_id::ChannelId;
use crate::error::SettlementError;

/// Lifecycle status of an XRP payment channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XrpChannelStatus {
    Open,
    Closing,
    Closed,
}

/// A 33-byte ed25519 public key in its XRPL wire form: `ED` + 32 bytes hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrpPublicKey([u8; 32]);

impl XrpPublicKey {
    pub fn from_raw(bytes: [u8; 32]) -> Self {
        XrpPublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parses the `ED`-prefixed, 66-character hex wire form.
    pub fn parse(s: &str) -> Result<Self, SettlementError> {
        let hex_part = s
            .strip_prefix("ED")
            .ok_or_else(|| SettlementError::InvalidInput(format!("XRP public key missing ED prefix: {s:?}")))?;
        if hex_part.len() != 64 {
            return Err(SettlementError::InvalidInput(format!(
                "XRP public key must be ED + 64 hex chars, got {s:?}"
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|e| SettlementError::InvalidInput(format!("invalid XRP public key hex: {e}")))?;
        Ok(XrpPublicKey(bytes))
    }

    /// Renders the `ED`-prefixed wire form.
    pub fn to_wire_string(&self) -> String {
        format!("ED{}", hex::encode_upper(self.0))
    }
}

/// Cached XRP channel state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XrpChannelState {
    pub channel_id: ChannelId,
    pub source_address: String,
    pub destination_address: String,
    pub amount_drops: u64,
    pub balance_drops: u64,
    pub settle_delay_secs: u32,
    pub source_public_key: XrpPublicKey,
    pub cancel_after: Option<i64>,
    pub expiration: Option<i64>,
    pub status: XrpChannelStatus,
}

impl XrpChannelState {
    /// `balance <= amount` must hold at all times.
    pub fn check_invariants(&self) -> Result<(), SettlementError> {
        if self.balance_drops > self.amount_drops {
            return Err(SettlementError::InvalidInput(
                "balance exceeds channel capacity".into(),
            ));
        }
        Ok(())
    }

    /// Whether this channel has crossed into `closed`, given `now`: once
    /// `status = closing` with an `expiration`, the channel becomes closed
    /// strictly after `expiration + settle_delay`.
    pub fn is_closed_at(&self, now_unix_secs: i64) -> bool {
        match (self.status, self.expiration) {
            (XrpChannelStatus::Closed, _) => true,
            (XrpChannelStatus::Closing, Some(expiration)) => {
                now_unix_secs > expiration + self.settle_delay_secs as i64
            }
            _ => false,
        }
    }

    /// Applies a fund operation, enforcing that the new capacity is the old
    /// capacity plus the fund quantity.
    pub fn apply_fund(&mut self, additional_drops: u64) {
        self.amount_drops += additional_drops;
    }
}

/// A signed XRP claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub channel_id: ChannelId,
    pub cumulative_amount_drops: u64,
    pub signature: [u8; 64],
    pub public_key: XrpPublicKey,
}

impl Claim {
    /// The 4-byte message prefix used in the signed payload.
    pub const MESSAGE_PREFIX: &'static [u8; 4] = b"CLM\0";

    /// Builds the exact byte payload that gets ed25519-signed:
    /// `"CLM\0" ++ channel_id_bytes ++ amount_be`.
    pub fn signing_payload(channel_id: &ChannelId, amount_drops: u64) -> Vec<u8> {
        let mut payload = Vec::with_capacity(4 + 32 + 8);
        payload.extend_from_slice(Self::MESSAGE_PREFIX);
        payload.extend_from_slice(channel_id.as_bytes());
        payload.extend_from_slice(&amount_drops.to_be_bytes());
        payload
    }

    pub fn check_capacity(&self, channel_capacity_drops: u64) -> Result<(), SettlementError> {
        if self.cumulative_amount_drops > channel_capacity_drops {
            return Err(SettlementError::InvalidInput(
                "claim amount exceeds channel capacity".into(),
            ));
        }
        Ok(())
    }
}

/// A [`Claim`] plus the creation timestamp it was persisted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredClaim {
    pub claim: Claim,
    pub created_at_unix_millis: i64,
}
