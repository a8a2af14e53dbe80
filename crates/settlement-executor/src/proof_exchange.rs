//! Counterparty balance-proof exchange.
//!
//! The source this system was distilled from substituted the peer's
//! signature with the local node's own signature as a placeholder. That is
//! not reproduced here: a real cooperative close requires the counterparty's
//! actual signed proof, and fabricating one would silently corrupt the
//! on-chain settlement. Callers without a real exchange hook fall back to
//! the unilateral-close path.

use async_trait::async_trait;
use settlement_types::{BalanceProof, ChannelId, SettlementError};

/// Fetches the counterparty's last balance proof off-chain (e.g. over the
/// same channel the peer connector already uses for packet-level messages).
#[async_trait]
pub trait CounterpartyProofExchange: Send + Sync {
    async fn fetch_counterparty_proof(&self, channel_id: ChannelId) -> Result<BalanceProof, SettlementError>;
}

/// The production-safe default when no real exchange hook is wired up:
/// always reports the proof as unavailable rather than fabricating one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProofExchange;

#[async_trait]
impl CounterpartyProofExchange for NullProofExchange {
    async fn fetch_counterparty_proof(&self, _channel_id: ChannelId) -> Result<BalanceProof, SettlementError> {
        Err(SettlementError::ProofExchangeUnavailable)
    }
}
