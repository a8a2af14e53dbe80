//! Default implementations of the two opaque external collaborators the
//! settlement core treats as interfaces only: the internal double-entry
//! ledger and the settlement-state sink the threshold monitor owns. Real
//! deployments are expected to supply their own; these defaults make the
//! node binary runnable standalone.

use async_trait::async_trait;
use dashmap::DashMap;
use settlement_types::{InternalLedger, SettledAmount, SettlementError, SettlementState, SettlementStateSink, TokenId};
use tracing::info;

/// Records settlements by logging them. A real deployment wires this to
/// its own double-entry ledger's `record_settlement` RPC or table.
#[derive(Debug, Default)]
pub struct LoggingInternalLedger;

#[async_trait]
impl InternalLedger for LoggingInternalLedger {
    async fn record_settlement(
        &self,
        peer_id: &str,
        token_id: &TokenId,
        amount: SettledAmount,
    ) -> Result<(), SettlementError> {
        info!(peer_id, token_id = %token_id, amount = %amount.0, "settlement reconciled");
        Ok(())
    }
}

/// An in-memory settlement-state sink, keyed by `(peer_id, token_id)`. A
/// real deployment's threshold monitor owns this state; this default lets
/// the node track it locally when none is supplied.
#[derive(Debug, Default)]
pub struct InMemoryStateSink {
    states: DashMap<(String, String), SettlementState>,
}

impl InMemoryStateSink {
    pub fn new() -> Self {
        InMemoryStateSink::default()
    }

    fn key(peer_id: &str, token_id: &TokenId) -> (String, String) {
        (peer_id.to_string(), token_id.to_string())
    }
}

#[async_trait]
impl SettlementStateSink for InMemoryStateSink {
    async fn set_state(&self, peer_id: &str, token_id: &TokenId, state: SettlementState) -> Result<(), SettlementError> {
        self.states.insert(Self::key(peer_id, token_id), state);
        Ok(())
    }

    async fn get_state(&self, peer_id: &str, token_id: &TokenId) -> Result<SettlementState, SettlementError> {
        Ok(self
            .states
            .get(&Self::key(peer_id, token_id))
            .map(|entry| *entry.value())
            .unwrap_or(SettlementState::Idle))
    }
}
