//! The EVM Channel Lifecycle Manager: owns the local cache, the
//! event ingestion pipeline, and the open/deposit/close/settle driver.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use settlement_types::{
    BalanceProof, ChannelId, ChannelMetadata, ChannelMetadataStatus, EvmChannelState,
    EvmChannelStatus, Participant, SettlementError, TokenId,
};
use settlement_telemetry::{SharedTelemetry, TelemetryEvent};
use tracing::{info, instrument, warn};

use crate::cache::EvmChannelCache;
use crate::client::{EvmChannelClient, EvmChannelEvent};

/// Multiplier applied to the settlement amount owed when sizing the
/// initial on-chain deposit.
pub const INITIAL_DEPOSIT_MULTIPLIER: u64 = 3;

/// Cap on the initial deposit, expressed as a multiple of the settlement
/// amount owed (spec §4.C: "subject to a cap (default 100x threshold)").
pub const DEFAULT_DEPOSIT_CAP_MULTIPLIER: u64 = 100;

/// `remaining < initial_deposit * MIN_DEPOSIT_THRESHOLD` triggers a top-up
///.
pub const MIN_DEPOSIT_THRESHOLD: f64 = 0.5;

pub struct EvmChannelLifecycle<C: EvmChannelClient> {
    client: Arc<C>,
    cache: Arc<EvmChannelCache>,
    telemetry: SharedTelemetry,
    initial_deposit_multiplier: u64,
    deposit_cap_multiplier: u64,
}

impl<C: EvmChannelClient> EvmChannelLifecycle<C> {
    pub fn new(client: Arc<C>, telemetry: SharedTelemetry) -> Self {
        Self::with_multipliers(client, telemetry, INITIAL_DEPOSIT_MULTIPLIER, DEFAULT_DEPOSIT_CAP_MULTIPLIER)
    }

    /// Constructs with non-default initial-deposit / cap multipliers, for a
    /// token-specific override (spec §4.C: "subject to a cap ... and
    /// token-specific multiplier overrides").
    pub fn with_multipliers(
        client: Arc<C>,
        telemetry: SharedTelemetry,
        initial_deposit_multiplier: u64,
        deposit_cap_multiplier: u64,
    ) -> Self {
        Self {
            client,
            cache: Arc::new(EvmChannelCache::new()),
            telemetry,
            initial_deposit_multiplier,
            deposit_cap_multiplier,
        }
    }

    pub fn cache(&self) -> &EvmChannelCache {
        &self.cache
    }

    /// Returns the channel for `(peer, token)`, opening one on-chain with
    /// `initial = min(threshold_amount * multiplier, threshold_amount *
    /// cap_multiplier)` if none is cached.
    #[instrument(skip(self), fields(peer_id = %peer_id))]
    pub async fn ensure_channel(
        &self,
        peer_id: &str,
        peer_address: Address,
        token: &TokenId,
        token_address: Address,
        threshold_amount: U256,
        settlement_timeout_secs: u64,
        now_unix_secs: i64,
    ) -> Result<ChannelId, SettlementError> {
        let token_key = token_address.to_string();
        if let Some(existing) = self.cache.channel_for_peer_token(peer_id, &token_key) {
            return Ok(existing);
        }

        let uncapped = threshold_amount * U256::from(self.initial_deposit_multiplier);
        let cap = threshold_amount * U256::from(self.deposit_cap_multiplier);
        let initial_deposit = uncapped.min(cap);

        let channel_id = self
            .client
            .open_channel(peer_address, token_address, settlement_timeout_secs, initial_deposit)
            .await?;

        self.cache.bind_peer_token(peer_id, &token_key, channel_id);
        self.cache.set_metadata(ChannelMetadata {
            channel_id,
            peer_id: peer_id.to_string(),
            token_id: token.clone(),
            token_address: token_key,
            created_at_unix_secs: now_unix_secs,
            last_activity_at_unix_secs: now_unix_secs,
            status: ChannelMetadataStatus::Opening,
            initial_deposit,
        });

        let state = self.client.get_channel_state(channel_id).await?;
        self.cache.set_state(state);

        self.telemetry
            .emit(TelemetryEvent::PaymentChannelOpened {
                channel_id: channel_id.to_hex(),
                participants: (peer_address.to_string(), token_address.to_string()),
            })
            .await;

        info!(channel_id = %channel_id, "opened evm payment channel");
        Ok(channel_id)
    }

    /// Tops up `channel_id` so the final on-chain deposit covers at least
    /// `current_balance`").
    #[instrument(skip(self))]
    pub async fn deposit(&self, channel_id: ChannelId, current_balance: U256) -> Result<(), SettlementError> {
        let state = self
            .cache
            .get_state(channel_id)
            .ok_or_else(|| SettlementError::ChannelNotFound(channel_id.to_hex()))?;

        let target = state.self_deposit.max(current_balance);
        if target <= state.self_deposit {
            return Ok(());
        }

        self.client.set_total_deposit(channel_id, target).await?;
        let refreshed = self.client.get_channel_state(channel_id).await?;
        self.cache.set_state(refreshed);
        Ok(())
    }

    /// Unilaterally closes `channel_id` with the last balance proof this
    /// node holds. Used as the fallback path in the idle sweep.
    #[instrument(skip(self, signature))]
    pub async fn close(
        &self,
        channel_id: ChannelId,
        final_proof: BalanceProof,
        signature: [u8; 65],
    ) -> Result<(), SettlementError> {
        self.client.close_channel(channel_id, final_proof, signature).await?;
        if let Some(mut meta) = self.cache.get_metadata(channel_id) {
            meta.status = ChannelMetadataStatus::Closing;
            self.cache.set_metadata(meta);
        }
        Ok(())
    }

    /// Attempts a cooperative two-sided close.
    #[instrument(skip_all)]
    pub async fn cooperative_close(
        &self,
        channel_id: ChannelId,
        my_proof: BalanceProof,
        my_signature: [u8; 65],
        their_proof: BalanceProof,
        their_signature: [u8; 65],
    ) -> Result<(), SettlementError> {
        self.client
            .cooperative_settle(channel_id, my_proof, my_signature, their_proof, their_signature)
            .await?;
        if let Some(mut meta) = self.cache.get_metadata(channel_id) {
            meta.status = ChannelMetadataStatus::Settling;
            self.cache.set_metadata(meta);
        }
        Ok(())
    }

    /// Finalizes settlement once the challenge period has elapsed. Callers
    /// must have already confirmed the period expired; this method itself
    /// only forwards `ChallengeNotExpired` from the client.
    #[instrument(skip(self))]
    pub async fn settle(&self, channel_id: ChannelId) -> Result<(), SettlementError> {
        self.client.settle_channel(channel_id).await?;
        if let Some(mut meta) = self.cache.get_metadata(channel_id) {
            meta.status = ChannelMetadataStatus::Closed;
            self.cache.set_metadata(meta);
        }
        self.telemetry
            .emit(TelemetryEvent::PaymentChannelSettled {
                channel_id: channel_id.to_hex(),
            })
            .await;
        Ok(())
    }

    pub fn get_state(&self, channel_id: ChannelId) -> Option<EvmChannelState> {
        self.cache.get_state(channel_id)
    }

    /// Polls the client for new events and applies every event that is now
    /// contiguous, in block-number order.
    /// Events for channels with no cached metadata are dropped.
    #[instrument(skip(self))]
    pub async fn ingest_events(&self, from_block: u64) -> Result<u64, SettlementError> {
        let events = self.client.poll_events(from_block).await?;
        let mut max_block = from_block;
        for event in events {
            max_block = max_block.max(event.block_number());
            for ready in self.cache.admit_event(event) {
                self.apply_event(ready).await;
            }
        }
        Ok(max_block)
    }

    async fn apply_event(&self, event: EvmChannelEvent) {
        let channel_id = event.channel_id();
        if self.cache.get_metadata(channel_id).is_none() {
            warn!(channel_id = %channel_id, "ignoring event for unknown channel");
            return;
        }

        match event {
            EvmChannelEvent::ChannelOpened { .. } => {}
            EvmChannelEvent::ChannelDeposit { total_deposit, participant, .. } => {
                if let Some(mut state) = self.cache.get_state(channel_id) {
                    if participant == state.self_address() {
                        state.self_deposit = total_deposit;
                    } else {
                        state.peer_deposit = total_deposit;
                    }
                    self.cache.set_state(state);
                }
                self.telemetry
                    .emit(TelemetryEvent::PaymentChannelBalanceUpdate {
                        channel_id: channel_id.to_hex(),
                        self_transferred: "0".into(),
                        peer_transferred: "0".into(),
                    })
                    .await;
            }
            EvmChannelEvent::ChannelClosed { closed_at_unix_secs, .. } => {
                if let Some(mut state) = self.cache.get_state(channel_id) {
                    state.status = EvmChannelStatus::Closed;
                    state.closed_at = Some(closed_at_unix_secs);
                    self.cache.set_state(state);
                }
                if let Some(mut meta) = self.cache.get_metadata(channel_id) {
                    meta.status = ChannelMetadataStatus::Closing;
                    self.cache.set_metadata(meta);
                }
            }
            EvmChannelEvent::ChannelSettled { .. } => {
                if let Some(mut state) = self.cache.get_state(channel_id) {
                    state.status = EvmChannelStatus::Settled;
                    self.cache.set_state(state);
                }
                if let Some(mut meta) = self.cache.get_metadata(channel_id) {
                    meta.status = ChannelMetadataStatus::Closed;
                    self.cache.set_metadata(meta);
                }
                self.telemetry
                    .emit(TelemetryEvent::PaymentChannelSettled {
                        channel_id: channel_id.to_hex(),
                    })
                    .await;
            }
        }
    }

    /// Deposit-monitor sweep: restores any channel whose remaining margin
    /// has fallen below `initial_deposit * MIN_DEPOSIT_THRESHOLD` back to
    /// `initial_deposit`.
    #[instrument(skip(self))]
    pub async fn run_deposit_monitor_sweep(&self) {
        for meta in self.cache.all_metadata() {
            if meta.status != ChannelMetadataStatus::Active {
                continue;
            }
            let Some(state) = self.cache.get_state(meta.channel_id) else { continue };
            if state.is_terminal() {
                continue;
            }
            let remaining = state.self_deposit.saturating_sub(state.self_transferred);
            let threshold_f = meta.initial_deposit.to::<u128>() as f64 * MIN_DEPOSIT_THRESHOLD;
            if (remaining.to::<u128>() as f64) < threshold_f {
                if let Err(err) = self.deposit(meta.channel_id, meta.initial_deposit).await {
                    warn!(channel_id = %meta.channel_id, error = %err, "deposit monitor top-up failed");
                }
            }
        }
    }

    /// Idle-detection sweep: attempts a
    /// cooperative close for channels idle beyond `idle_timeout_secs`; the
    /// caller (the Unified Settlement Executor / scheduler) supplies the
    /// counterparty proof exchange and falls back to a unilateral `close`
    /// plus a scheduled `settle` when cooperation is unavailable.
    pub fn idle_channels(&self, now_unix_secs: i64, idle_timeout_secs: i64) -> Vec<ChannelId> {
        self.cache
            .all_metadata()
            .into_iter()
            .filter(|m| m.status == ChannelMetadataStatus::Active)
            .filter(|m| m.idle_for(now_unix_secs) >= idle_timeout_secs)
            .map(|m| m.channel_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use settlement_telemetry::{NonBlockingSink, TracingSink};
    use std::sync::Mutex;

    struct FakeClient {
        state: Mutex<EvmChannelState>,
        open_channel_id: ChannelId,
    }

    fn sample_state(channel_id: ChannelId) -> EvmChannelState {
        EvmChannelState {
            channel_id,
            participants: (Address::ZERO, Address::repeat_byte(1)),
            self_index: Participant::A,
            self_deposit: U256::from(900u64),
            peer_deposit: U256::from(900u64),
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

    #[async_trait]
    impl EvmChannelClient for FakeClient {
        async fn open_channel(
            &self,
            _peer: Address,
            _token_address: Address,
            _settlement_timeout_secs: u64,
            _initial_deposit: U256,
        ) -> Result<ChannelId, SettlementError> {
            Ok(self.open_channel_id)
        }

        async fn set_total_deposit(&self, _channel_id: ChannelId, total_deposit: U256) -> Result<(), SettlementError> {
            self.state.lock().unwrap().self_deposit = total_deposit;
            Ok(())
        }

        async fn close_channel(
            &self,
            _channel_id: ChannelId,
            _final_proof: BalanceProof,
            _signature: [u8; 65],
        ) -> Result<(), SettlementError> {
            Ok(())
        }

        async fn cooperative_settle(
            &self,
            _channel_id: ChannelId,
            _my_proof: BalanceProof,
            _my_signature: [u8; 65],
            _their_proof: BalanceProof,
            _their_signature: [u8; 65],
        ) -> Result<(), SettlementError> {
            Ok(())
        }

        async fn settle_channel(&self, _channel_id: ChannelId) -> Result<(), SettlementError> {
            Ok(())
        }

        async fn get_channel_state(&self, _channel_id: ChannelId) -> Result<EvmChannelState, SettlementError> {
            Ok(self.state.lock().unwrap().clone())
        }

        async fn get_my_channels(&self) -> Result<Vec<ChannelId>, SettlementError> {
            Ok(vec![self.open_channel_id])
        }

        async fn gas_price(&self) -> Result<u128, SettlementError> {
            Ok(1_000_000_000)
        }

        async fn poll_events(&self, _from_block: u64) -> Result<Vec<EvmChannelEvent>, SettlementError> {
            Ok(vec![])
        }
    }

    fn telemetry() -> SharedTelemetry {
        Arc::new(NonBlockingSink::new(TracingSink))
    }

    #[tokio::test]
    async fn ensure_channel_opens_once_and_caches() {
        let channel_id = ChannelId::parse(&"b".repeat(64)).unwrap();
        let client = Arc::new(FakeClient {
            state: Mutex::new(sample_state(channel_id)),
            open_channel_id: channel_id,
        });
        let lifecycle = EvmChannelLifecycle::new(client, telemetry());

        let first = lifecycle
            .ensure_channel(
                "peer-1",
                Address::repeat_byte(1),
                &TokenId::Xrp,
                Address::ZERO,
                U256::from(1_000u64),
                3600,
                1000,
            )
            .await
            .unwrap();
        let second = lifecycle
            .ensure_channel(
                "peer-1",
                Address::repeat_byte(1),
                &TokenId::Xrp,
                Address::ZERO,
                U256::from(1_000u64),
                3600,
                1000,
            )
            .await
            .unwrap();

        assert_eq!(first, channel_id);
        assert_eq!(first, second, "second call reuses cached channel instead of reopening");
    }

    #[tokio::test]
    async fn deposit_is_noop_when_target_not_higher() {
        let channel_id = ChannelId::parse(&"c".repeat(64)).unwrap();
        let client = Arc::new(FakeClient {
            state: Mutex::new(sample_state(channel_id)),
            open_channel_id: channel_id,
        });
        let lifecycle = EvmChannelLifecycle::new(client, telemetry());
        lifecycle
            .ensure_channel(
                "peer-1",
                Address::repeat_byte(1),
                &TokenId::Xrp,
                Address::ZERO,
                U256::from(1_000u64),
                3600,
                1000,
            )
            .await
            .unwrap();

        lifecycle.deposit(channel_id, U256::from(10u64)).await.unwrap();
        let state = lifecycle.get_state(channel_id).unwrap();
        assert_eq!(state.self_deposit, U256::from(900u64));
    }

    #[tokio::test]
    async fn idle_channels_respects_timeout() {
        let channel_id = ChannelId::parse(&"d".repeat(64)).unwrap();
        let client = Arc::new(FakeClient {
            state: Mutex::new(sample_state(channel_id)),
            open_channel_id: channel_id,
        });
        let lifecycle = EvmChannelLifecycle::new(client, telemetry());
        lifecycle
            .ensure_channel(
                "peer-1",
                Address::repeat_byte(1),
                &TokenId::Xrp,
                Address::ZERO,
                U256::from(1_000u64),
                3600,
                1000,
            )
            .await
            .unwrap();
        if let Some(mut meta) = lifecycle.cache().get_metadata(channel_id) {
            meta.status = ChannelMetadataStatus::Active;
            lifecycle.cache().set_metadata(meta);
        }

        assert!(lifecycle.idle_channels(1000, 3600).is_empty());
        assert_eq!(lifecycle.idle_channels(5000, 3600), vec![channel_id]);
    }
}
