//! The narrow EVM ledger client interface.
//!
//! This trait is the only seam between this crate and an actual on-chain
//! SDK; no production implementation lives in this repository — wire
//! transport, gas estimation plumbing, and RPC/WebSocket
//! handling are external collaborators referenced only by interface.

use async_trait::async_trait;
use alloy_primitives::{Address, U256};
use settlement_types::{BalanceProof, ChannelId, EvmChannelState, SettlementError};

/// A confirmed on-chain event for an EVM payment channel, tagged with the
/// block number it was included in so the event processor can reorder
/// out-of-order delivery.
#[derive(Debug, Clone)]
pub enum EvmChannelEvent {
    ChannelOpened {
        channel_id: ChannelId,
        block_number: u64,
        participants: (Address, Address),
        token_address: Address,
    },
    ChannelDeposit {
        channel_id: ChannelId,
        block_number: u64,
        participant: Address,
        total_deposit: U256,
    },
    ChannelClosed {
        channel_id: ChannelId,
        block_number: u64,
        closed_at_unix_secs: i64,
    },
    ChannelSettled {
        channel_id: ChannelId,
        block_number: u64,
    },
}

impl EvmChannelEvent {
    pub fn channel_id(&self) -> ChannelId {
        match self {
            EvmChannelEvent::ChannelOpened { channel_id, .. }
            | EvmChannelEvent::ChannelDeposit { channel_id, .. }
            | EvmChannelEvent::ChannelClosed { channel_id, .. }
            | EvmChannelEvent::ChannelSettled { channel_id, .. } => *channel_id,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            EvmChannelEvent::ChannelOpened { block_number, .. }
            | EvmChannelEvent::ChannelDeposit { block_number, .. }
            | EvmChannelEvent::ChannelClosed { block_number, .. }
            | EvmChannelEvent::ChannelSettled { block_number, .. } => *block_number,
        }
    }
}

/// The operations the EVM Channel Lifecycle Manager needs from an on-chain
/// SDK.
#[async_trait]
pub trait EvmChannelClient: Send + Sync {
    async fn open_channel(
        &self,
        peer: Address,
        token_address: Address,
        settlement_timeout_secs: u64,
        initial_deposit: U256,
    ) -> Result<ChannelId, SettlementError>;

    async fn set_total_deposit(&self, channel_id: ChannelId, total_deposit: U256) -> Result<(), SettlementError>;

    async fn close_channel(
        &self,
        channel_id: ChannelId,
        final_proof: BalanceProof,
        signature: [u8; 65],
    ) -> Result<(), SettlementError>;

    async fn cooperative_settle(
        &self,
        channel_id: ChannelId,
        my_proof: BalanceProof,
        my_signature: [u8; 65],
        their_proof: BalanceProof,
        their_signature: [u8; 65],
    ) -> Result<(), SettlementError>;

    async fn settle_channel(&self, channel_id: ChannelId) -> Result<(), SettlementError>;

    async fn get_channel_state(&self, channel_id: ChannelId) -> Result<EvmChannelState, SettlementError>;

    async fn get_my_channels(&self) -> Result<Vec<ChannelId>, SettlementError>;

    /// Current gas price, made a first-class client method rather than a
    /// type-assertion reach-through into an SDK-private field.
    async fn gas_price(&self) -> Result<u128, SettlementError>;

    /// Returns events since `from_block`, in ascending block-number order
    /// where the client can guarantee it; the lifecycle manager still
    /// reorders defensively.
    async fn poll_events(&self, from_block: u64) -> Result<Vec<EvmChannelEvent>, SettlementError>;
}
