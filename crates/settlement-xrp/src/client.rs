//! The narrow XRP Ledger client interface.
//!
//! As with `EvmChannelClient`, this trait is a narrow interface only. No
//! production implementation lives in this repository — submission,
//! ledger-entry lookup, and websocket reconnection are external
//! collaborators referenced only by interface.

use async_trait::async_trait;
use settlement_types::{Claim, SettlementError, XrpChannelState, XrpPublicKey};

/// A submitted transaction's validated outcome, as returned by
/// `submit_and_wait` once the ledger has closed the ledger version
/// containing it.
#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub transaction_hash: String,
    pub ledger_index: u64,
    pub engine_result: String,
}

#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub address: String,
    pub balance_drops: u64,
    pub sequence: u32,
}

/// The operations the XRP Channel Lifecycle Manager needs from an XRP
/// Ledger SDK.
#[async_trait]
pub trait XrpChannelClient: Send + Sync {
    /// Submits a signed transaction blob and waits for ledger validation.
    async fn submit_and_wait(&self, tx_blob: &str) -> Result<SubmitResult, SettlementError>;

    /// Fetches the current on-ledger `PayChannel` entry.
    async fn get_ledger_entry(&self, channel_id: &str) -> Result<XrpChannelState, SettlementError>;

    /// Submits a claim on behalf of the destination, redeeming up to
    /// `amount_drops` from the channel.
    async fn submit_claim(
        &self,
        channel_id: &str,
        amount_drops: u64,
        signature: [u8; 64],
        public_key: XrpPublicKey,
    ) -> Result<SubmitResult, SettlementError>;

    /// Initiates (or idempotently re-requests) channel close.
    async fn close_channel(&self, channel_id: &str) -> Result<SubmitResult, SettlementError>;

    /// Cancels a pending close request before `expiration` elapses.
    async fn cancel_channel_close(&self, channel_id: &str) -> Result<SubmitResult, SettlementError>;

    async fn get_account_info(&self, address: &str) -> Result<AccountInfo, SettlementError>;

    /// Re-establishes the websocket connection after a disconnect.
    async fn reconnect(&self) -> Result<(), SettlementError>;

    /// Opens a new `PaymentChannelCreate` transaction and returns the
    /// resulting channel id.
    async fn open_channel(
        &self,
        destination: &str,
        amount_drops: u64,
        settle_delay_secs: u32,
        source_public_key: XrpPublicKey,
    ) -> Result<String, SettlementError>;

    /// Submits a `PaymentChannelFund` transaction, increasing capacity by
    /// `additional_drops`.
    async fn fund_channel(&self, channel_id: &str, additional_drops: u64) -> Result<SubmitResult, SettlementError>;
}

/// The unused-but-declared companion to `submit_claim`: bundles the claim
/// with the destination it authorizes a draw against, mirroring how the
/// executor hands a signed [`Claim`] to the delivery mechanism. The XRP
/// claim delivery mechanism to the peer is an external concern; the core
/// treats the signed claim as the output artifact.
#[derive(Debug, Clone)]
pub struct ClaimDelivery {
    pub claim: Claim,
    pub destination: String,
}
