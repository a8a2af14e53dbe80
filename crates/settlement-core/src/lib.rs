//! The Unified Settlement Executor: the top-level entry point
//! that subscribes to `SettlementRequired`, validates and routes each
//! event to the EVM or XRP backend, and reconciles the internal ledger on
//! success only.

pub mod event_bus;
pub mod executor;
pub mod registry;

pub use event_bus::{EventBus, ListenerHandle, DEFAULT_BUS_CAPACITY};
pub use executor::UnifiedSettlementExecutor;
pub use registry::{InMemoryPeerRegistry, PeerRegistry};

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use ed25519_dalek::SigningKey;
    use alloy_signer_local::PrivateKeySigner;
    use rand::rngs::OsRng;
    use settlement_claims::{ClaimSigner, InMemoryClaimStore};
    use settlement_evm::{EvmChannelClient, EvmChannelEvent, EvmChannelLifecycle};
    use settlement_executor::{ExecutorConfig, NullProofExchange, SettlementExecutor};
    use settlement_telemetry::{NonBlockingSink, TracingSink};
    use settlement_types::{
        BalanceProof, ChannelId, EvmChannelState, EvmChannelStatus, Participant, PeerConfig,
        SettledAmount, SettlementError, SettlementPreference, SettlementRequired, SettlementState,
        SettlementStateSink, TokenId,
    };
    use settlement_xrp::{
        AccountInfo, SubmitResult, XrpChannelClient, XrpChannelLifecycle, XrpChannelLifecycleConfig,
    };
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeEvmClient {
        state: Mutex<Option<EvmChannelState>>,
        channel_id: ChannelId,
    }

    #[async_trait]
    impl EvmChannelClient for FakeEvmClient {
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

    struct FakeXrpClient;

    #[async_trait]
    impl XrpChannelClient for FakeXrpClient {
        async fn submit_and_wait(&self, _tx_blob: &str) -> Result<SubmitResult, SettlementError> {
            unimplemented!()
        }
        async fn get_ledger_entry(
            &self,
            _channel_id: &str,
        ) -> Result<settlement_types::XrpChannelState, SettlementError> {
            unimplemented!()
        }
        async fn submit_claim(
            &self,
            _channel_id: &str,
            _amount_drops: u64,
            _signature: [u8; 64],
            _public_key: settlement_types::XrpPublicKey,
        ) -> Result<SubmitResult, SettlementError> {
            unimplemented!()
        }
        async fn close_channel(&self, _channel_id: &str) -> Result<SubmitResult, SettlementError> {
            unimplemented!()
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
            _source_public_key: settlement_types::XrpPublicKey,
        ) -> Result<String, SettlementError> {
            Ok("b".repeat(64))
        }
        async fn fund_channel(&self, _channel_id: &str, _additional_drops: u64) -> Result<SubmitResult, SettlementError> {
            unimplemented!()
        }
    }

    struct FakeLedger {
        recorded: AsyncMutex<Vec<(String, SettledAmount)>>,
    }

    #[async_trait]
    impl settlement_types::InternalLedger for FakeLedger {
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

    fn telemetry() -> settlement_telemetry::SharedTelemetry {
        Arc::new(NonBlockingSink::new(TracingSink))
    }

    fn signer() -> Arc<ClaimSigner<InMemoryClaimStore>> {
        Arc::new(ClaimSigner::new(
            SigningKey::generate(&mut OsRng),
            PrivateKeySigner::random(),
            Arc::new(InMemoryClaimStore::new()),
        ))
    }

    #[allow(clippy::type_complexity)]
    fn build() -> (
        UnifiedSettlementExecutor<FakeEvmClient, FakeXrpClient, InMemoryClaimStore, FakeLedger, FakeStateSink, InMemoryPeerRegistry>,
        Arc<FakeLedger>,
        Arc<FakeStateSink>,
    ) {
        let evm_channel_id = ChannelId::parse(&"1".repeat(64)).unwrap();
        let evm_client = Arc::new(FakeEvmClient {
            state: Mutex::new(None),
            channel_id: evm_channel_id,
        });
        let evm_lifecycle = Arc::new(EvmChannelLifecycle::new(evm_client, telemetry()));
        let ledger = Arc::new(FakeLedger {
            recorded: AsyncMutex::new(Vec::new()),
        });
        let state_sink = Arc::new(FakeStateSink {
            state: AsyncMutex::new(SettlementState::Idle),
        });
        let signer = signer();

        let evm_executor = Arc::new(SettlementExecutor::new(
            evm_lifecycle,
            signer.clone(),
            ledger.clone(),
            state_sink.clone(),
            Arc::new(NullProofExchange),
            telemetry(),
            ExecutorConfig::default(),
        ));

        let xrp_lifecycle = Arc::new(XrpChannelLifecycle::new(
            Arc::new(FakeXrpClient),
            telemetry(),
            XrpChannelLifecycleConfig::default(),
            "rSource".into(),
            signer.xrp_public_key(),
        ));

        let registry = Arc::new(InMemoryPeerRegistry::new());
        registry
            .insert(PeerConfig {
                peer_id: "peer-bob".into(),
                settlement_preference: SettlementPreference::Both,
                settlement_tokens: HashSet::new(),
                evm_address: Some(Address::repeat_byte(9)),
                xrp_address: Some("rDest".into()),
            })
            .unwrap();

        let core = UnifiedSettlementExecutor::new(
            evm_executor,
            xrp_lifecycle,
            signer,
            ledger.clone(),
            state_sink.clone(),
            registry,
            telemetry(),
        );
        (core, ledger, state_sink)
    }

    #[tokio::test]
    async fn routes_xrp_token_to_xrp_pipeline() {
        let (core, ledger, state_sink) = build();
        let event = SettlementRequired {
            peer_id: "peer-bob".into(),
            balance: "500".into(),
            token_id: TokenId::Xrp,
            timestamp: 1_000,
        };
        core.handle_event(&event).await.unwrap();
        assert_eq!(ledger.recorded.lock().await.len(), 1);
        assert_eq!(*state_sink.state.lock().await, SettlementState::Idle);
    }

    #[tokio::test]
    async fn routes_contract_address_token_to_evm_pipeline() {
        let (core, ledger, _state_sink) = build();
        let event = SettlementRequired {
            peer_id: "peer-bob".into(),
            balance: "100".into(),
            token_id: TokenId::ContractAddress(Address::repeat_byte(7)),
            timestamp: 1_000,
        };
        core.handle_event(&event).await.unwrap();
        assert_eq!(ledger.recorded.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_peer_fails_validation() {
        let (core, _ledger, _state_sink) = build();
        let event = SettlementRequired {
            peer_id: "peer-ghost".into(),
            balance: "100".into(),
            token_id: TokenId::Xrp,
            timestamp: 1_000,
        };
        assert!(matches!(
            core.handle_event(&event).await,
            Err(SettlementError::PeerNotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn incompatible_preference_is_rejected() {
        let (core, _ledger, _state_sink) = build();
        let registry = Arc::new(InMemoryPeerRegistry::new());
        registry
            .insert(PeerConfig {
                peer_id: "peer-evm-only".into(),
                settlement_preference: SettlementPreference::Evm,
                settlement_tokens: HashSet::new(),
                evm_address: Some(Address::repeat_byte(3)),
                xrp_address: None,
            })
            .unwrap();
        // Reuse `core`'s registry population check indirectly: build a
        // fresh peer config directly via `compatible_with` instead of a
        // second full executor, since the validation step is a pure
        // function of `PeerConfig` + `TokenId`.
        let cfg = registry.get("peer-evm-only").await.unwrap();
        assert!(!cfg.compatible_with(&TokenId::Xrp));
        let _ = core;
    }

    #[tokio::test]
    async fn listener_start_stop_is_symmetric() {
        let (core, _ledger, _state_sink) = build();
        let before = core.start();
        core.stop(before);
    }
}
