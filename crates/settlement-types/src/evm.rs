//! EVM channel state and balance-proof types.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::channel_id::ChannelId;
use crate::error::SettlementError;

/// Lifecycle status of an EVM channel. Transitions are one-way:
/// `Opened -> Closed -> Settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvmChannelStatus {
    Opened,
    Closed,
    Settled,
}

/// Which side of the channel the local node occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Participant {
    A,
    B,
}

/// Cached EVM channel state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmChannelState {
    pub channel_id: ChannelId,
    pub participants: (Address, Address),
    pub self_index: Participant,
    pub self_deposit: U256,
    pub peer_deposit: U256,
    pub self_nonce: u64,
    pub peer_nonce: u64,
    pub self_transferred: U256,
    pub peer_transferred: U256,
    pub status: EvmChannelStatus,
    pub token_address: Address,
    pub channel_contract: Address,
    pub settlement_timeout_secs: u64,
    pub closed_at: Option<i64>,
}

impl EvmChannelState {
    /// `transferred_self <= deposit_self + transferred_peer` must hold at
    /// all times.
    pub fn check_invariants(&self) -> Result<(), SettlementError> {
        if self.self_transferred > self.self_deposit + self.peer_transferred {
            return Err(SettlementError::InvalidInput(
                "self_transferred exceeds self_deposit + peer_transferred".into(),
            ));
        }
        if self.settlement_timeout_secs == 0 {
            return Err(SettlementError::InvalidInput(
                "settlement_timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    /// True once the channel has left the `opened` state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, EvmChannelStatus::Opened)
    }

    pub fn self_address(&self) -> Address {
        match self.self_index {
            Participant::A => self.participants.0,
            Participant::B => self.participants.1,
        }
    }

    pub fn peer_address(&self) -> Address {
        match self.self_index {
            Participant::A => self.participants.1,
            Participant::B => self.participants.0,
        }
    }
}

/// A signed off-chain balance proof.
///
/// Signed under EIP-712 typed data with domain
/// `{name: "PaymentChannel", version: "1", chain_id, verifying_contract}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceProof {
    pub channel_id: ChannelId,
    pub nonce: u64,
    pub transferred: u128,
    pub locked: u128,
    pub locks_root: B256,
}

impl BalanceProof {
    /// A zero-locked balance proof for a plain (no-HTLC) transfer, as used
    /// by the single-chain Settlement Executor.
    pub fn plain(channel_id: ChannelId, nonce: u64, transferred: u128) -> Self {
        BalanceProof {
            channel_id,
            nonce,
            transferred,
            locked: 0,
            locks_root: B256::ZERO,
        }
    }

    /// Validates that this proof's nonce strictly exceeds `previous_nonce`,
    /// the monotonicity invariant accepted proofs must satisfy.
    pub fn check_nonce_monotonic(&self, previous_nonce: Option<u64>) -> Result<(), SettlementError> {
        if let Some(prev) = previous_nonce {
            if self.nonce <= prev {
                return Err(SettlementError::NonceNotIncreasing(format!(
                    "new nonce {} does not exceed previous nonce {}",
                    self.nonce, prev
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_channel() -> EvmChannelState {
        EvmChannelState {
            channel_id: ChannelId::parse(&"a".repeat(64)).unwrap(),
            participants: (Address::ZERO, Address::ZERO),
            self_index: Participant::A,
            self_deposit: U256::from(100u64),
            peer_deposit: U256::from(100u64),
            self_nonce: 0,
            peer_nonce: 0,
            self_transferred: U256::ZERO,
            peer_transferred: U256::ZERO,
            status: EvmChannelStatus::Opened,
            token_address: Address::ZERO,
            channel_contract: Address::ZERO,
            settlement_timeout_secs: 86_400,
            closed_at: None,
        }
    }

    #[test]
    fn invariant_rejects_overdrawn_transfer() {
        let mut state = sample_channel();
        state.self_transferred = U256::from(1000u64);
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn invariant_accepts_covered_transfer() {
        let mut state = sample_channel();
        state.self_transferred = U256::from(50u64);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn nonce_monotonicity_rejects_equal_or_lower() {
        let proof = BalanceProof::plain(ChannelId::parse(&"a".repeat(64)).unwrap(), 5, 100);
        assert!(proof.check_nonce_monotonic(Some(5)).is_err());
        assert!(proof.check_nonce_monotonic(Some(6)).is_err());
        assert!(proof.check_nonce_monotonic(Some(4)).is_ok());
        assert!(proof.check_nonce_monotonic(None).is_ok());
    }
}
