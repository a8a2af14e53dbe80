//! The XRP Channel Lifecycle Manager: per-peer channel cache,
//! open/fund/close driver, and the idle/expiring sweeps.

use std::sync::Arc;

use settlement_types::{
    ChannelId, SettlementError, XrpChannelState, XrpChannelStatus, XrpPublicKey,
};
use settlement_telemetry::{SharedTelemetry, TelemetryEvent, XrpCloseReason};
use tracing::{info, instrument, warn};

use crate::cache::XrpChannelCache;
use crate::client::XrpChannelClient;

/// Default idle threshold.
pub const DEFAULT_IDLE_CHANNEL_THRESHOLD_SECS: i64 = 24 * 3600;
/// Default expiration-buffer.
pub const DEFAULT_EXPIRATION_BUFFER_SECS: i64 = 3600;
/// Default funding threshold.
pub const DEFAULT_MIN_BALANCE_THRESHOLD: f64 = 0.2;

/// Why a close was initiated, threaded through to telemetry as the
/// `XRP_CHANNEL_CLOSED` closure reason tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Idle,
    Expiration,
    Manual,
}

impl From<CloseReason> for XrpCloseReason {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Idle => XrpCloseReason::Idle,
            CloseReason::Expiration => XrpCloseReason::Expiration,
            CloseReason::Manual => XrpCloseReason::Manual,
        }
    }
}

pub struct XrpChannelLifecycleConfig {
    pub initial_channel_amount_drops: u64,
    pub default_settle_delay_secs: u32,
    pub min_balance_threshold: f64,
    pub idle_channel_threshold_secs: i64,
    pub expiration_buffer_secs: i64,
}

impl Default for XrpChannelLifecycleConfig {
    fn default() -> Self {
        XrpChannelLifecycleConfig {
            initial_channel_amount_drops: 10_000_000_000,
            default_settle_delay_secs: 86_400,
            min_balance_threshold: DEFAULT_MIN_BALANCE_THRESHOLD,
            idle_channel_threshold_secs: DEFAULT_IDLE_CHANNEL_THRESHOLD_SECS,
            expiration_buffer_secs: DEFAULT_EXPIRATION_BUFFER_SECS,
        }
    }
}

pub struct XrpChannelLifecycle<C: XrpChannelClient> {
    client: Arc<C>,
    cache: Arc<XrpChannelCache>,
    telemetry: SharedTelemetry,
    config: XrpChannelLifecycleConfig,
    source_address: String,
    source_public_key: XrpPublicKey,
}

impl<C: XrpChannelClient> XrpChannelLifecycle<C> {
    pub fn new(
        client: Arc<C>,
        telemetry: SharedTelemetry,
        config: XrpChannelLifecycleConfig,
        source_address: String,
        source_public_key: XrpPublicKey,
    ) -> Self {
        Self {
            client,
            cache: Arc::new(XrpChannelCache::new()),
            telemetry,
            config,
            source_address,
            source_public_key,
        }
    }

    pub fn cache(&self) -> &XrpChannelCache {
        &self.cache
    }

    /// Returns the cached channel for `peer_id`, opening a fresh one if
    /// none is cached or the cached entry is no longer `open`.
    #[instrument(skip(self), fields(peer_id = %peer_id))]
    pub async fn get_or_create_channel(
        &self,
        peer_id: &str,
        destination: &str,
        now_unix_secs: i64,
    ) -> Result<XrpChannelState, SettlementError> {
        if self.cache.has_open_channel(peer_id) {
            return Ok(self.cache.get(peer_id).expect("has_open_channel implies present"));
        }

        let channel_id_str = self
            .client
            .open_channel(
                destination,
                self.config.initial_channel_amount_drops,
                self.config.default_settle_delay_secs,
                self.source_public_key,
            )
            .await?;
        let channel_id = ChannelId::parse(&channel_id_str)?;

        let state = XrpChannelState {
            channel_id,
            source_address: self.source_address.clone(),
            destination_address: destination.to_string(),
            amount_drops: self.config.initial_channel_amount_drops,
            balance_drops: 0,
            settle_delay_secs: self.config.default_settle_delay_secs,
            source_public_key: self.source_public_key,
            cancel_after: None,
            expiration: None,
            status: XrpChannelStatus::Open,
        };
        self.cache.set(peer_id, state.clone());
        self.cache.touch(peer_id, now_unix_secs);

        self.telemetry
            .emit(TelemetryEvent::XrpChannelOpened {
                channel_id: channel_id.to_hex(),
                destination: destination.to_string(),
            })
            .await;
        info!(channel_id = %channel_id, peer_id = %peer_id, "opened xrp payment channel");
        Ok(state)
    }

    /// Updates `balance` and `last_activity_at` for `peer_id`.
    pub fn update_activity(&self, peer_id: &str, new_cumulative_claim_amount: u64, now_unix_secs: i64) {
        if let Some(mut state) = self.cache.get(peer_id) {
            state.balance_drops = new_cumulative_claim_amount;
            self.cache.set(peer_id, state);
        }
        self.cache.touch(peer_id, now_unix_secs);
    }

    /// True when `(amount - balance) < amount * min_balance_threshold`
    ///.
    pub fn needs_funding(&self, peer_id: &str) -> bool {
        let Some(state) = self.cache.get(peer_id) else { return false };
        let remaining = state.amount_drops.saturating_sub(state.balance_drops) as f64;
        remaining < state.amount_drops as f64 * self.config.min_balance_threshold
    }

    /// Submits `PaymentChannelFund` and increments the cached `amount`
    ///.
    #[instrument(skip(self))]
    pub async fn fund_channel(&self, peer_id: &str, additional_drops: u64) -> Result<(), SettlementError> {
        let state = self
            .cache
            .get(peer_id)
            .ok_or_else(|| SettlementError::ChannelNotFound(peer_id.to_string()))?;
        self.client
            .fund_channel(&state.channel_id.to_hex(), additional_drops)
            .await?;

        let mut updated = state;
        updated.apply_fund(additional_drops);
        self.cache.set(peer_id, updated);
        Ok(())
    }

    /// Idempotently transitions the peer's channel to `closing`.
    #[instrument(skip(self))]
    pub async fn close_channel(&self, peer_id: &str, reason: CloseReason) -> Result<(), SettlementError> {
        let Some(mut state) = self.cache.get(peer_id) else {
            return Ok(());
        };
        if state.status != XrpChannelStatus::Open {
            return Ok(());
        }

        self.client.close_channel(&state.channel_id.to_hex()).await?;
        state.status = XrpChannelStatus::Closing;
        let channel_id = state.channel_id;
        self.cache.set(peer_id, state);

        self.telemetry
            .emit(TelemetryEvent::XrpChannelClosed {
                channel_id: channel_id.to_hex(),
                reason: reason.into(),
            })
            .await;
        Ok(())
    }

    /// Idle sweep:
    /// closes any `open` channel idle beyond `idle_channel_threshold_secs`.
    #[instrument(skip(self))]
    pub async fn run_idle_sweep(&self, now_unix_secs: i64) {
        for (peer_id, state) in self.cache.all() {
            if state.status != XrpChannelStatus::Open {
                continue;
            }
            let idle_for = self
                .cache
                .last_activity_at(&peer_id)
                .map(|t| now_unix_secs - t)
                .unwrap_or(i64::MAX);
            if idle_for > self.config.idle_channel_threshold_secs {
                if let Err(err) = self.close_channel(&peer_id, CloseReason::Idle).await {
                    warn!(peer_id = %peer_id, error = %err, "idle sweep close failed");
                }
            }
        }
    }

    /// Expiring sweep: closes any channel
    /// whose `cancel_after` is within `expiration_buffer_secs`.
    #[instrument(skip(self))]
    pub async fn run_expiring_sweep(&self, now_unix_secs: i64) {
        for (peer_id, state) in self.cache.all() {
            if state.status != XrpChannelStatus::Open {
                continue;
            }
            let Some(cancel_after) = state.cancel_after else { continue };
            if cancel_after - now_unix_secs <= self.config.expiration_buffer_secs {
                if let Err(err) = self.close_channel(&peer_id, CloseReason::Expiration).await {
                    warn!(peer_id = %peer_id, error = %err, "expiring sweep close failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use settlement_telemetry::{NonBlockingSink, TracingSink};
    use crate::client::{AccountInfo, SubmitResult};

    struct FakeClient;

    #[async_trait]
    impl XrpChannelClient for FakeClient {
        async fn submit_and_wait(&self, _tx_blob: &str) -> Result<SubmitResult, SettlementError> {
            unimplemented!()
        }
        async fn get_ledger_entry(&self, _channel_id: &str) -> Result<XrpChannelState, SettlementError> {
            unimplemented!()
        }
        async fn submit_claim(
            &self,
            _channel_id: &str,
            _amount_drops: u64,
            _signature: [u8; 64],
            _public_key: XrpPublicKey,
        ) -> Result<SubmitResult, SettlementError> {
            unimplemented!()
        }
        async fn close_channel(&self, _channel_id: &str) -> Result<SubmitResult, SettlementError> {
            Ok(SubmitResult {
                transaction_hash: "deadbeef".into(),
                ledger_index: 1,
                engine_result: "tesSUCCESS".into(),
            })
        }
        async fn cancel_channel_close(&self, _channel_id: &str) -> Result<SubmitResult, SettlementError> {
            unimplemented!()
        }
        async fn get_account_info(&self, address: &str) -> Result<AccountInfo, SettlementError> {
            Ok(AccountInfo {
                address: address.to_string(),
                balance_drops: 0,
                sequence: 0,
            })
        }
        async fn reconnect(&self) -> Result<(), SettlementError> {
            Ok(())
        }
        async fn open_channel(
            &self,
            _destination: &str,
            _amount_drops: u64,
            _settle_delay_secs: u32,
            _source_public_key: XrpPublicKey,
        ) -> Result<String, SettlementError> {
            Ok("a".repeat(64))
        }
        async fn fund_channel(&self, _channel_id: &str, _additional_drops: u64) -> Result<SubmitResult, SettlementError> {
            Ok(SubmitResult {
                transaction_hash: "f00d".into(),
                ledger_index: 2,
                engine_result: "tesSUCCESS".into(),
            })
        }
    }

    fn telemetry() -> SharedTelemetry {
        Arc::new(NonBlockingSink::new(TracingSink))
    }

    fn lifecycle() -> XrpChannelLifecycle<FakeClient> {
        XrpChannelLifecycle::new(
            Arc::new(FakeClient),
            telemetry(),
            XrpChannelLifecycleConfig::default(),
            "rSource".into(),
            XrpPublicKey::from_raw([1u8; 32]),
        )
    }

    #[tokio::test]
    async fn get_or_create_channel_reuses_open_channel() {
        let lc = lifecycle();
        let first = lc.get_or_create_channel("peer-bob", "rDest", 1000).await.unwrap();
        let second = lc.get_or_create_channel("peer-bob", "rDest", 1000).await.unwrap();
        assert_eq!(first.channel_id, second.channel_id);
    }

    #[tokio::test]
    async fn needs_funding_below_threshold() {
        let lc = lifecycle();
        lc.get_or_create_channel("peer-bob", "rDest", 1000).await.unwrap();
        lc.update_activity("peer-bob", 9_000_000_000, 1000);
        assert!(lc.needs_funding("peer-bob"));
    }

    #[tokio::test]
    async fn needs_funding_false_with_plenty_of_margin() {
        let lc = lifecycle();
        lc.get_or_create_channel("peer-bob", "rDest", 1000).await.unwrap();
        lc.update_activity("peer-bob", 100, 1000);
        assert!(!lc.needs_funding("peer-bob"));
    }

    #[tokio::test]
    async fn fund_channel_increments_amount() {
        let lc = lifecycle();
        lc.get_or_create_channel("peer-bob", "rDest", 1000).await.unwrap();
        lc.fund_channel("peer-bob", 500).await.unwrap();
        let state = lc.cache().get("peer-bob").unwrap();
        assert_eq!(state.amount_drops, 10_000_000_500);
    }

    #[tokio::test]
    async fn close_channel_is_idempotent() {
        let lc = lifecycle();
        lc.get_or_create_channel("peer-bob", "rDest", 1000).await.unwrap();
        lc.close_channel("peer-bob", CloseReason::Manual).await.unwrap();
        lc.close_channel("peer-bob", CloseReason::Manual).await.unwrap();
        let state = lc.cache().get("peer-bob").unwrap();
        assert_eq!(state.status, XrpChannelStatus::Closing);
    }

    #[tokio::test]
    async fn idle_sweep_closes_idle_channel() {
        let lc = lifecycle();
        lc.get_or_create_channel("peer-bob", "rDest", 1000).await.unwrap();
        lc.run_idle_sweep(1000 + DEFAULT_IDLE_CHANNEL_THRESHOLD_SECS + 1).await;
        let state = lc.cache().get("peer-bob").unwrap();
        assert_eq!(state.status, XrpChannelStatus::Closing);
    }

    #[tokio::test]
    async fn expiring_sweep_closes_near_cancel_after() {
        let lc = lifecycle();
        lc.get_or_create_channel("peer-bob", "rDest", 1000).await.unwrap();
        let mut state = lc.cache().get("peer-bob").unwrap();
        state.cancel_after = Some(1000 + DEFAULT_EXPIRATION_BUFFER_SECS);
        lc.cache().set("peer-bob", state);

        lc.run_expiring_sweep(1000).await;
        let state = lc.cache().get("peer-bob").unwrap();
        assert_eq!(state.status, XrpChannelStatus::Closing);
    }
}
