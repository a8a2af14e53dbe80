//! Interfaces to components this core treats as opaque external
//! collaborators: the internal double-entry ledger and the
//! settlement-state sink the threshold monitor owns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;
use crate::events::SettlementState;
use crate::token::TokenId;

/// The internal double-entry ledger. The core treats it as an opaque sink:
/// `record_settlement` is expected to be idempotent-tolerant for
/// at-least-once delivery.
#[async_trait]
pub trait InternalLedger: Send + Sync {
    async fn record_settlement(
        &self,
        peer_id: &str,
        token_id: &TokenId,
        amount: SettledAmount,
    ) -> Result<(), SettlementError>;
}

/// A settled amount, carried as a decimal string to stay agnostic of which
/// ledger family produced it (EVM `U256` vs XRP `u64` drops).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledAmount(pub String);

impl SettledAmount {
    pub fn from_u128(amount: u128) -> Self {
        SettledAmount(amount.to_string())
    }

    pub fn from_u64(amount: u64) -> Self {
        SettledAmount(amount.to_string())
    }
}

/// The per-(peer, token) settlement state owned by the external threshold
/// monitor. The core transitions it to `IN_PROGRESS` on
/// accepting a `SettlementRequired` event and to `IDLE` only on success;
/// on failure it is left `IN_PROGRESS` for operator intervention.
#[async_trait]
pub trait SettlementStateSink: Send + Sync {
    async fn set_state(
        &self,
        peer_id: &str,
        token_id: &TokenId,
        state: SettlementState,
    ) -> Result<(), SettlementError>;

    async fn get_state(
        &self,
        peer_id: &str,
        token_id: &TokenId,
    ) -> Result<SettlementState, SettlementError>;
}
