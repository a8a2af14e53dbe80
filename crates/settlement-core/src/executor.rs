//! The Unified Settlement Executor: subscribes to
//! `SettlementRequired`, validates and routes each event to the EVM
//! executor or the XRP claim pipeline, and reconciles the internal ledger
//! only when the dispatched settlement succeeds.

use std::sync::Arc;

use alloy_primitives::U256;
use settlement_claims::ClaimSigner;
use settlement_claims::store::ClaimStore;
use settlement_evm::EvmChannelClient;
use settlement_executor::SettlementExecutor;
use settlement_telemetry::{SharedTelemetry, TelemetryEvent};
use settlement_types::{
    InternalLedger, PeerConfig, SettledAmount, SettlementError, SettlementMethod,
    SettlementRequired, SettlementState, SettlementStateSink, TokenId,
};
use settlement_xrp::{XrpChannelClient, XrpChannelLifecycle};
use tracing::{info, instrument};

use crate::event_bus::{EventBus, ListenerHandle, DEFAULT_BUS_CAPACITY};
use crate::registry::PeerRegistry;

/// Wires the Unified Settlement Executor's two backends, its peer
/// registry, and the `SettlementRequired` event bus together.
pub struct UnifiedSettlementExecutor<EC, XC, St, L, Si, R>
where
    EC: EvmChannelClient,
    XC: XrpChannelClient,
    St: ClaimStore,
    L: InternalLedger,
    Si: SettlementStateSink,
    R: PeerRegistry,
{
    evm_executor: Arc<SettlementExecutor<EC, St, L, Si>>,
    xrp_lifecycle: Arc<XrpChannelLifecycle<XC>>,
    signer: Arc<ClaimSigner<St>>,
    internal_ledger: Arc<L>,
    state_sink: Arc<Si>,
    registry: Arc<R>,
    telemetry: SharedTelemetry,
    bus: EventBus<SettlementRequired>,
}

impl<EC, XC, St, L, Si, R> UnifiedSettlementExecutor<EC, XC, St, L, Si, R>
where
    EC: EvmChannelClient,
    XC: XrpChannelClient,
    St: ClaimStore,
    L: InternalLedger,
    Si: SettlementStateSink,
    R: PeerRegistry,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        evm_executor: Arc<SettlementExecutor<EC, St, L, Si>>,
        xrp_lifecycle: Arc<XrpChannelLifecycle<XC>>,
        signer: Arc<ClaimSigner<St>>,
        internal_ledger: Arc<L>,
        state_sink: Arc<Si>,
        registry: Arc<R>,
        telemetry: SharedTelemetry,
    ) -> Self {
        UnifiedSettlementExecutor {
            evm_executor,
            xrp_lifecycle,
            signer,
            internal_ledger,
            state_sink,
            registry,
            telemetry,
            bus: EventBus::new(DEFAULT_BUS_CAPACITY),
        }
    }

    /// Registers a new subscription to this executor's `SettlementRequired`
    /// bus.
    pub fn start(&self) -> ListenerHandle<SettlementRequired> {
        self.bus.start()
    }

    /// Unregisters `handle`, captured at the matching `start()` call.
    pub fn stop(&self, handle: ListenerHandle<SettlementRequired>) {
        self.bus.stop(handle);
    }

    /// Publishes `event` to every current listener.
    pub fn publish(&self, event: SettlementRequired) {
        self.bus.publish(event);
    }

    /// Validates, resolves, and dispatches one `SettlementRequired` event
    ///.
    #[instrument(skip(self, event), fields(peer_id = %event.peer_id, token = %event.token_id))]
    pub async fn handle_event(&self, event: &SettlementRequired) -> Result<(), SettlementError> {
        let peer = self.registry.get(&event.peer_id).await?;

        if !peer.compatible_with(&event.token_id) {
            return Err(SettlementError::IncompatibleSettlementMethod);
        }

        if event.token_id.is_xrp() {
            self.settle_xrp(&event.peer_id, &peer, event).await
        } else {
            self.settle_evm(&event.peer_id, &peer, event).await
        }
    }

    async fn settle_evm(
        &self,
        peer_id: &str,
        peer: &PeerConfig,
        event: &SettlementRequired,
    ) -> Result<(), SettlementError> {
        let peer_address = peer.evm_address.ok_or(SettlementError::MissingAddress)?;
        let token_address = match &event.token_id {
            TokenId::ContractAddress(address) => *address,
            _ => {
                return Err(SettlementError::InvalidInput(
                    "EVM settlement requires a contract-address token id".into(),
                ));
            }
        };
        let amount = parse_u256(&event.balance)?;

        self.evm_executor
            .settle(peer_id, peer_address, &event.token_id, token_address, amount, event.timestamp)
            .await
    }

    async fn settle_xrp(
        &self,
        peer_id: &str,
        peer: &PeerConfig,
        event: &SettlementRequired,
    ) -> Result<(), SettlementError> {
        let destination = peer
            .xrp_address
            .as_deref()
            .ok_or(SettlementError::MissingAddress)?;
        let amount_drops = parse_u64(&event.balance)?;

        self.state_sink
            .set_state(peer_id, &event.token_id, SettlementState::InProgress)
            .await?;
        self.telemetry
            .emit(TelemetryEvent::SettlementStarted {
                peer_id: peer_id.to_string(),
                token_id: event.token_id.to_string(),
            })
            .await;

        match self.run_xrp_settlement(peer_id, destination, amount_drops, event.timestamp).await {
            Ok(()) => {
                self.internal_ledger
                    .record_settlement(peer_id, &event.token_id, SettledAmount::from_u64(amount_drops))
                    .await?;
                self.state_sink
                    .set_state(peer_id, &event.token_id, SettlementState::Idle)
                    .await?;
                self.telemetry
                    .emit(TelemetryEvent::SettlementCompleted {
                        peer_id: peer_id.to_string(),
                        token_id: event.token_id.to_string(),
                    })
                    .await;
                info!(peer_id = %peer_id, method = %SettlementMethod::Xrp, "settlement completed");
                Ok(())
            }
            Err(err) => {
                self.telemetry
                    .emit(TelemetryEvent::SettlementFailed {
                        peer_id: peer_id.to_string(),
                        token_id: event.token_id.to_string(),
                        reason: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn run_xrp_settlement(
        &self,
        peer_id: &str,
        destination: &str,
        amount_drops: u64,
        now_unix_secs: i64,
    ) -> Result<(), SettlementError> {
        let channel = self
            .xrp_lifecycle
            .get_or_create_channel(peer_id, destination, now_unix_secs)
            .await?;

        let new_cumulative = channel.balance_drops + amount_drops;
        self.signer.sign_claim(channel.channel_id, new_cumulative).await?;
        self.xrp_lifecycle.update_activity(peer_id, new_cumulative, now_unix_secs);
        self.telemetry
            .emit(TelemetryEvent::XrpChannelClaimed {
                channel_id: channel.channel_id.to_hex(),
                cumulative_amount_drops: new_cumulative,
            })
            .await;
        Ok(())
    }
}

fn parse_u256(balance: &str) -> Result<U256, SettlementError> {
    U256::from_str_radix(balance, 10)
        .map_err(|e| SettlementError::InvalidInput(format!("invalid EVM balance amount {balance:?}: {e}")))
}

fn parse_u64(balance: &str) -> Result<u64, SettlementError> {
    balance
        .parse::<u64>()
        .map_err(|e| SettlementError::InvalidInput(format!("invalid XRP drops amount {balance:?}: {e}")))
}
