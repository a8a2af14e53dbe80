//! Wire-up points for the two ledger client interfaces this core consumes
//! but never implements.
//!
//! [`EvmChannelClient`] and [`XrpChannelClient`] are the seam a real
//! deployment crosses with an `alloy-contract` binding and an XRPL
//! JSON-RPC/websocket client respectively. The stand-ins here fail closed
//! with a clear, non-retryable error rather than silently doing nothing,
//! so a misconfigured node surfaces the gap immediately instead of
//! pretending to settle.

use async_trait::async_trait;
use alloy_primitives::{Address, U256};
use settlement_evm::{EvmChannelClient, EvmChannelEvent};
use settlement_types::{BalanceProof, ChannelId, EvmChannelState, SettlementError, XrpChannelState, XrpPublicKey};
use settlement_xrp::{AccountInfo, SubmitResult, XrpChannelClient};

fn unwired(client: &str) -> SettlementError {
    SettlementError::Unknown(format!("{client} ledger client is not wired up; replace node::wire_clients before production use"))
}

/// A fail-closed [`EvmChannelClient`] for nodes that have not yet wired a
/// real chain provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredEvmClient;

#[async_trait]
impl EvmChannelClient for UnconfiguredEvmClient {
    async fn open_channel(
        &self,
        _peer: Address,
        _token_address: Address,
        _settlement_timeout_secs: u64,
        _initial_deposit: U256,
    ) -> Result<ChannelId, SettlementError> {
        Err(unwired("evm"))
    }

    async fn set_total_deposit(&self, _channel_id: ChannelId, _total_deposit: U256) -> Result<(), SettlementError> {
        Err(unwired("evm"))
    }

    async fn close_channel(
        &self,
        _channel_id: ChannelId,
        _final_proof: BalanceProof,
        _signature: [u8; 65],
    ) -> Result<(), SettlementError> {
        Err(unwired("evm"))
    }

    async fn cooperative_settle(
        &self,
        _channel_id: ChannelId,
        _my_proof: BalanceProof,
        _my_signature: [u8; 65],
        _their_proof: BalanceProof,
        _their_signature: [u8; 65],
    ) -> Result<(), SettlementError> {
        Err(unwired("evm"))
    }

    async fn settle_channel(&self, _channel_id: ChannelId) -> Result<(), SettlementError> {
        Err(unwired("evm"))
    }

    async fn get_channel_state(&self, channel_id: ChannelId) -> Result<EvmChannelState, SettlementError> {
        Err(SettlementError::ChannelNotFound(channel_id.to_hex()))
    }

    async fn get_my_channels(&self) -> Result<Vec<ChannelId>, SettlementError> {
        Ok(Vec::new())
    }

    async fn gas_price(&self) -> Result<u128, SettlementError> {
        Err(unwired("evm"))
    }

    async fn poll_events(&self, _from_block: u64) -> Result<Vec<EvmChannelEvent>, SettlementError> {
        Ok(Vec::new())
    }
}

/// A fail-closed [`XrpChannelClient`] for nodes that have not yet wired a
/// real rippled JSON-RPC/websocket connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredXrpClient;

#[async_trait]
impl XrpChannelClient for UnconfiguredXrpClient {
    async fn submit_and_wait(&self, _tx_blob: &str) -> Result<SubmitResult, SettlementError> {
        Err(unwired("xrp"))
    }

    async fn get_ledger_entry(&self, channel_id: &str) -> Result<XrpChannelState, SettlementError> {
        Err(SettlementError::EntryNotFound(channel_id.to_string()))
    }

    async fn submit_claim(
        &self,
        _channel_id: &str,
        _amount_drops: u64,
        _signature: [u8; 64],
        _public_key: XrpPublicKey,
    ) -> Result<SubmitResult, SettlementError> {
        Err(unwired("xrp"))
    }

    async fn close_channel(&self, _channel_id: &str) -> Result<SubmitResult, SettlementError> {
        Err(unwired("xrp"))
    }

    async fn cancel_channel_close(&self, _channel_id: &str) -> Result<SubmitResult, SettlementError> {
        Err(unwired("xrp"))
    }

    async fn get_account_info(&self, address: &str) -> Result<AccountInfo, SettlementError> {
        Ok(AccountInfo {
            address: address.to_string(),
            balance_drops: 0,
            sequence: 0,
        })
    }

    async fn reconnect(&self) -> Result<(), SettlementError> {
        Err(unwired("xrp"))
    }

    async fn open_channel(
        &self,
        _destination: &str,
        _amount_drops: u64,
        _settle_delay_secs: u32,
        _source_public_key: XrpPublicKey,
    ) -> Result<String, SettlementError> {
        Err(unwired("xrp"))
    }

    async fn fund_channel(&self, _channel_id: &str, _additional_drops: u64) -> Result<SubmitResult, SettlementError> {
        Err(unwired("xrp"))
    }
}
