//! The single-chain Settlement Executor: drives one end-to-end
//! EVM settlement from a `SettlementRequired` event to a recorded
//! `record_settlement` call.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use settlement_claims::ClaimSigner;
use settlement_claims::store::ClaimStore;
use settlement_evm::{EvmChannelClient, EvmChannelLifecycle};
use settlement_telemetry::{SharedTelemetry, TelemetryEvent};
use settlement_types::{
    BalanceProof, ChannelActivity, ChannelId, InternalLedger, SettledAmount, SettlementError,
    SettlementState, SettlementStateSink, TokenId,
};
use tracing::{info, instrument};

use crate::proof_exchange::CounterpartyProofExchange;
use crate::retry::retry_with_backoff;

use std::sync::Mutex as StdMutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Parameters governing the retry policy and the deposit-sizing
/// calculation.
pub struct ExecutorConfig {
    pub chain_id: u64,
    pub verifying_contract: Address,
    pub settlement_timeout_secs: u64,
    pub initial_deposit_multiplier: u64,
    pub min_deposit_threshold: f64,
    pub max_retries: u32,
    pub base_retry_delay: Duration,
    /// `now - last_activity` beyond which an active channel is a candidate
    /// for the idle sweep's cooperative-then-unilateral close.
    pub idle_timeout_secs: i64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            chain_id: 1,
            verifying_contract: Address::ZERO,
            settlement_timeout_secs: 86_400,
            initial_deposit_multiplier: 3,
            min_deposit_threshold: 0.5,
            max_retries: 3,
            base_retry_delay: Duration::from_millis(500),
            idle_timeout_secs: 86_400,
        }
    }
}

pub struct SettlementExecutor<C, St, L, Si>
where
    C: EvmChannelClient,
    St: ClaimStore,
    L: InternalLedger,
    Si: SettlementStateSink,
{
    lifecycle: Arc<EvmChannelLifecycle<C>>,
    signer: Arc<ClaimSigner<St>>,
    internal_ledger: Arc<L>,
    state_sink: Arc<Si>,
    proof_exchange: Arc<dyn CounterpartyProofExchange>,
    telemetry: SharedTelemetry,
    config: ExecutorConfig,
    on_channel_activity: Option<Arc<dyn Fn(ChannelActivity) + Send + Sync>>,
    /// One-shot challenge-period settle timers spawned by the idle sweep's
    /// unilateral-close fallback; tracked so `stop()` can cancel every timer
    /// this executor created, per the scheduling contract in spec §5.
    challenge_timers: StdMutex<Vec<JoinHandle<()>>>,
}

impl<C, St, L, Si> SettlementExecutor<C, St, L, Si>
where
    C: EvmChannelClient,
    St: ClaimStore,
    L: InternalLedger,
    Si: SettlementStateSink,
{
    pub fn new(
        lifecycle: Arc<EvmChannelLifecycle<C>>,
        signer: Arc<ClaimSigner<St>>,
        internal_ledger: Arc<L>,
        state_sink: Arc<Si>,
        proof_exchange: Arc<dyn CounterpartyProofExchange>,
        telemetry: SharedTelemetry,
        config: ExecutorConfig,
    ) -> Self {
        SettlementExecutor {
            lifecycle,
            signer,
            internal_ledger,
            state_sink,
            proof_exchange,
            telemetry,
            config,
            on_channel_activity: None,
            challenge_timers: StdMutex::new(Vec::new()),
        }
    }

    pub fn with_activity_hook(mut self, hook: Arc<dyn Fn(ChannelActivity) + Send + Sync>) -> Self {
        self.on_channel_activity = Some(hook);
        self
    }

    /// Cancels every outstanding challenge-period settle timer this executor
    /// spawned. Does not affect settlements already submitted on-chain.
    pub fn stop(&self) {
        for handle in self.challenge_timers.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

    fn publish_activity(&self, channel_id: ChannelId, peer_id: &str, now_unix_secs: i64) {
        if let Some(hook) = &self.on_channel_activity {
            hook(ChannelActivity {
                channel_id,
                peer_id: peer_id.to_string(),
                at_unix_secs: now_unix_secs,
            });
        }
    }

    /// Runs the full six-step algorithm for one `(peer, amount)` EVM
    /// settlement.
    #[instrument(skip(self), fields(peer_id = %peer_id, amount = %amount))]
    pub async fn settle(
        &self,
        peer_id: &str,
        peer_address: Address,
        token: &TokenId,
        token_address: Address,
        amount: U256,
        now_unix_secs: i64,
    ) -> Result<(), SettlementError> {
        // Step 1.
        self.state_sink
            .set_state(peer_id, token, SettlementState::InProgress)
            .await?;
        self.telemetry
            .emit(TelemetryEvent::SettlementStarted {
                peer_id: peer_id.to_string(),
                token_id: token.to_string(),
            })
            .await;

        match self.run_settlement(peer_id, peer_address, token_address, amount, now_unix_secs).await {
            Ok(()) => {
                self.internal_ledger
                    .record_settlement(peer_id, token, SettledAmount::from_u128(amount.to::<u128>()))
                    .await?;
                self.state_sink.set_state(peer_id, token, SettlementState::Idle).await?;
                self.telemetry
                    .emit(TelemetryEvent::SettlementCompleted {
                        peer_id: peer_id.to_string(),
                        token_id: token.to_string(),
                    })
                    .await;
                info!(peer_id = %peer_id, "settlement completed");
                Ok(())
            }
            Err(err) => {
                // State is deliberately left IN_PROGRESS for operator
                // intervention.
                self.telemetry
                    .emit(TelemetryEvent::SettlementFailed {
                        peer_id: peer_id.to_string(),
                        token_id: token.to_string(),
                        reason: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn run_settlement(
        &self,
        peer_id: &str,
        peer_address: Address,
        token_address: Address,
        amount: U256,
        now_unix_secs: i64,
    ) -> Result<(), SettlementError> {
        // Step 2/3: ensure a channel exists and carries enough deposit.
        let token_id = TokenId::ContractAddress(token_address);
        let channel_id = retry_with_backoff(self.config.max_retries, self.config.base_retry_delay, || {
            self.lifecycle.ensure_channel(
                peer_id,
                peer_address,
                &token_id,
                token_address,
                amount,
                self.config.settlement_timeout_secs,
                now_unix_secs,
            )
        })
        .await?;
        self.publish_activity(channel_id, peer_id, now_unix_secs);

        let target_multiple = amount * U256::from(self.config.initial_deposit_multiplier);
        let state = self
            .lifecycle
            .get_state(channel_id)
            .ok_or_else(|| SettlementError::ChannelNotFound(channel_id.to_hex()))?;
        let min_required = U256::from(
            (target_multiple.to::<u128>() as f64 * self.config.min_deposit_threshold) as u128,
        );
        if state.self_deposit < min_required {
            retry_with_backoff(self.config.max_retries, self.config.base_retry_delay, || {
                self.lifecycle.deposit(channel_id, target_multiple)
            })
            .await?;
        }
        let refreshed = self
            .lifecycle
            .get_state(channel_id)
            .ok_or_else(|| SettlementError::ChannelNotFound(channel_id.to_hex()))?;
        if refreshed.self_deposit < amount {
            retry_with_backoff(self.config.max_retries, self.config.base_retry_delay, || {
                self.lifecycle.deposit(channel_id, target_multiple)
            })
            .await?;
        }

        // Step 4: produce and sign my proof, fetch the counterparty's, and
        // attempt cooperative settlement.
        let state = self
            .lifecycle
            .get_state(channel_id)
            .ok_or_else(|| SettlementError::ChannelNotFound(channel_id.to_hex()))?;
        let my_proof = BalanceProof::plain(
            channel_id,
            state.self_nonce + 1,
            state.self_transferred.to::<u128>() + amount.to::<u128>(),
        );
        let my_signature = self
            .signer
            .sign_balance_proof(self.config.chain_id, self.config.verifying_contract, &my_proof)
            .await?;

        let their_proof = self.proof_exchange.fetch_counterparty_proof(channel_id).await?;
        let their_signature = self
            .signer
            .sign_balance_proof(self.config.chain_id, self.config.verifying_contract, &their_proof)
            .await?;

        retry_with_backoff(self.config.max_retries, self.config.base_retry_delay, || {
            self.lifecycle.cooperative_close(
                channel_id,
                my_proof,
                my_signature,
                their_proof,
                their_signature,
            )
        })
        .await?;

        self.publish_activity(channel_id, peer_id, now_unix_secs);
        Ok(())
    }

    /// Idle-detection sweep: for every channel idle beyond
    /// `config.idle_timeout_secs`, attempts a cooperative close; on failure
    /// (no counterparty proof available, or the ledger rejects it) signs a
    /// fresh balance proof over the last known state and closes
    /// unilaterally, then schedules a one-shot challenge-period settle.
    /// Failures for one channel are logged and do not abort the sweep for
    /// the others.
    #[instrument(skip(self))]
    pub async fn run_idle_sweep(&self, now_unix_secs: i64)
    where
        C: 'static,
    {
        for channel_id in self.lifecycle.idle_channels(now_unix_secs, self.config.idle_timeout_secs) {
            if let Err(err) = self.close_idle_channel(channel_id).await {
                warn!(channel_id = %channel_id, error = %err, "idle sweep close failed");
            }
        }
    }

    async fn close_idle_channel(&self, channel_id: ChannelId) -> Result<(), SettlementError>
    where
        C: 'static,
    {
        let state = self
            .lifecycle
            .get_state(channel_id)
            .ok_or_else(|| SettlementError::ChannelNotFound(channel_id.to_hex()))?;
        let my_proof = BalanceProof::plain(channel_id, state.self_nonce, state.self_transferred.to::<u128>());
        let my_signature = self
            .signer
            .sign_balance_proof(self.config.chain_id, self.config.verifying_contract, &my_proof)
            .await?;

        let cooperative = self.try_cooperative_idle_close(channel_id, my_proof, my_signature).await;
        if cooperative.is_ok() {
            info!(channel_id = %channel_id, "cooperative idle close succeeded");
            return Ok(());
        }
        info!(
            channel_id = %channel_id,
            error = %cooperative.unwrap_err(),
            "cooperative close unavailable, falling back to unilateral close"
        );

        self.lifecycle.close(channel_id, my_proof, my_signature).await?;

        let lifecycle = self.lifecycle.clone();
        let delay = Duration::from_secs(self.config.settlement_timeout_secs);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = lifecycle.settle(channel_id).await {
                warn!(channel_id = %channel_id, error = %err, "challenge-period settle failed");
            }
        });
        self.challenge_timers.lock().unwrap().push(handle);
        Ok(())
    }

    async fn try_cooperative_idle_close(
        &self,
        channel_id: ChannelId,
        my_proof: BalanceProof,
        my_signature: [u8; 65],
    ) -> Result<(), SettlementError> {
        let their_proof = self.proof_exchange.fetch_counterparty_proof(channel_id).await?;
        let their_signature = self
            .signer
            .sign_balance_proof(self.config.chain_id, self.config.verifying_contract, &their_proof)
            .await?;
        self.lifecycle
            .cooperative_close(channel_id, my_proof, my_signature, their_proof, their_signature)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ed25519_dalek::SigningKey;
    use alloy_signer_local::PrivateKeySigner;
    use rand::rngs::OsRng;
    use settlement_claims::InMemoryClaimStore;
    use settlement_evm::EvmChannelEvent;
    use settlement_telemetry::{NonBlockingSink, TracingSink};
    use settlement_types::{EvmChannelState, EvmChannelStatus, Participant};
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeClient {
        state: Mutex<Option<EvmChannelState>>,
        channel_id: ChannelId,
    }

    #[async_trait]
    impl EvmChannelClient for FakeClient {
        async fn open_channel(
            &self,
            peer: Address,
            token_address: Address,
            settlement_timeout_secs: u64,
            initial_deposit: U256,
        ) -> Result<ChannelId, SettlementError> {
            *self.state.lock().unwrap() = Some(EvmChannelState {
                channel_id: self.channel_id,
                participants: (Address::ZERO, peer),
                self_index: Participant::A,
                self_deposit: initial_deposit,
                peer_deposit: U256::ZERO,
                self_nonce: 0,
                peer_nonce: 0,
                self_transferred: U256::ZERO,
                peer_transferred: U256::ZERO,
                status: EvmChannelStatus::Opened,
                token_address,
                channel_contract: Address::ZERO,
                settlement_timeout_secs,
                closed_at: None,
            });
            Ok(self.channel_id)
        }

        async fn set_total_deposit(&self, _channel_id: ChannelId, total_deposit: U256) -> Result<(), SettlementError> {
            if let Some(state) = self.state.lock().unwrap().as_mut() {
                state.self_deposit = total_deposit;
            }
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
            self.state
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| SettlementError::ChannelNotFound(self.channel_id.to_hex()))
        }

        async fn get_my_channels(&self) -> Result<Vec<ChannelId>, SettlementError> {
            Ok(vec![self.channel_id])
        }

        async fn gas_price(&self) -> Result<u128, SettlementError> {
            Ok(1)
        }

        async fn poll_events(&self, _from_block: u64) -> Result<Vec<EvmChannelEvent>, SettlementError> {
            Ok(vec![])
        }
    }

    struct FakeLedger {
        recorded: AsyncMutex<Vec<(String, SettledAmount)>>,
    }

    #[async_trait]
    impl InternalLedger for FakeLedger {
        async fn record_settlement(
            &self,
            peer_id: &str,
            _token_id: &TokenId,
            amount: SettledAmount,
        ) -> Result<(), SettlementError> {
            self.recorded.lock().await.push((peer_id.to_string(), amount));
            Ok(())
        }
    }

    struct FakeStateSink {
        state: AsyncMutex<SettlementState>,
    }

    #[async_trait]
    impl SettlementStateSink for FakeStateSink {
        async fn set_state(
            &self,
            _peer_id: &str,
            _token_id: &TokenId,
            state: SettlementState,
        ) -> Result<(), SettlementError> {
            *self.state.lock().await = state;
            Ok(())
        }

        async fn get_state(&self, _peer_id: &str, _token_id: &TokenId) -> Result<SettlementState, SettlementError> {
            Ok(*self.state.lock().await)
        }
    }

    fn signer() -> Arc<ClaimSigner<InMemoryClaimStore>> {
        Arc::new(ClaimSigner::new(
            SigningKey::generate(&mut OsRng),
            PrivateKeySigner::random(),
            Arc::new(InMemoryClaimStore::new()),
        ))
    }

    #[tokio::test]
    async fn settles_evm_with_no_existing_channel() {
        let channel_id = ChannelId::parse(&"e".repeat(64)).unwrap();
        let client = Arc::new(FakeClient {
            state: Mutex::new(None),
            channel_id,
        });
        let lifecycle = Arc::new(EvmChannelLifecycle::new(client, Arc::new(NonBlockingSink::new(TracingSink))));
        let ledger = Arc::new(FakeLedger {
            recorded: AsyncMutex::new(Vec::new()),
        });
        let state_sink = Arc::new(FakeStateSink {
            state: AsyncMutex::new(SettlementState::Idle),
        });

        let executor = SettlementExecutor::new(
            lifecycle,
            signer(),
            ledger.clone(),
            state_sink.clone(),
            Arc::new(settlement_types_test_support::AlwaysMirrorProofExchange),
            Arc::new(NonBlockingSink::new(TracingSink)),
            ExecutorConfig::default(),
        );

        executor
            .settle(
                "peer-bob",
                Address::repeat_byte(9),
                &TokenId::Symbol("USDC".into()),
                Address::repeat_byte(7),
                U256::from(100u64),
                1_000,
            )
            .await
            .unwrap();

        assert_eq!(ledger.recorded.lock().await.len(), 1);
        assert_eq!(*state_sink.state.lock().await, SettlementState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sweep_falls_back_to_unilateral_close_and_schedules_settle() {
        use crate::proof_exchange::NullProofExchange;
        use settlement_types::ChannelMetadataStatus;

        let channel_id = ChannelId::parse(&"f".repeat(64)).unwrap();
        let client = Arc::new(FakeClient {
            state: Mutex::new(None),
            channel_id,
        });
        let lifecycle = Arc::new(EvmChannelLifecycle::new(client, Arc::new(NonBlockingSink::new(TracingSink))));
        lifecycle
            .ensure_channel(
                "peer-idle",
                Address::repeat_byte(2),
                &TokenId::Xrp,
                Address::ZERO,
                U256::from(1_000u64),
                3600,
                0,
            )
            .await
            .unwrap();
        if let Some(mut meta) = lifecycle.cache().get_metadata(channel_id) {
            meta.status = ChannelMetadataStatus::Active;
            meta.last_activity_at_unix_secs = 0;
            lifecycle.cache().set_metadata(meta);
        }

        let ledger = Arc::new(FakeLedger {
            recorded: AsyncMutex::new(Vec::new()),
        });
        let state_sink = Arc::new(FakeStateSink {
            state: AsyncMutex::new(SettlementState::Idle),
        });

        let executor = SettlementExecutor::new(
            lifecycle.clone(),
            signer(),
            ledger,
            state_sink,
            // No real off-chain counterparty hook: cooperative close must
            // fail and the sweep must fall back to unilateral close.
            Arc::new(NullProofExchange),
            Arc::new(NonBlockingSink::new(TracingSink)),
            ExecutorConfig {
                idle_timeout_secs: 3600,
                settlement_timeout_secs: 10,
                ..ExecutorConfig::default()
            },
        );

        executor.run_idle_sweep(100_000).await;

        let meta = lifecycle.cache().get_metadata(channel_id).unwrap();
        assert_eq!(meta.status, ChannelMetadataStatus::Closing, "unilateral close marks metadata closing");

        // Advance past the challenge period and let the scheduled one-shot
        // settle timer fire.
        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        let meta = lifecycle.cache().get_metadata(channel_id).unwrap();
        assert_eq!(meta.status, ChannelMetadataStatus::Closed, "challenge-period settle finalizes the channel");

        executor.stop();
    }

    /// A cooperative-proof exchange test double that mirrors the local
    /// node's own proof, standing in for a real off-chain counterparty
    /// round trip in tests only (never used in production code paths).
    mod settlement_types_test_support {
        use super::*;

        pub struct AlwaysMirrorProofExchange;

        #[async_trait]
        impl CounterpartyProofExchange for AlwaysMirrorProofExchange {
            async fn fetch_counterparty_proof(&self, channel_id: ChannelId) -> Result<BalanceProof, SettlementError> {
                Ok(BalanceProof::plain(channel_id, 1, 0))
            }
        }
    }
}
