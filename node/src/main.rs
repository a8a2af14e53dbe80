//! Settlement node entrypoint.
//!
//! Wires the settlement core's library crates into a running service:
//! loads configuration, opens the SQLite-backed claim and channel stores,
//! constructs the EVM and XRP lifecycle managers and the Unified
//! Settlement Executor, and spawns the periodic sweeps the lifecycle
//! managers and metrics collector need.
//!
//! The concrete EVM/XRP ledger clients are the one seam this binary does
//! not fill in for real deployments: see [`wire_clients`].

mod config;
mod ledger;
mod shutdown;
mod wire_clients;

use std::sync::Arc;
use std::time::Duration;

use alloy_signer_local::PrivateKeySigner;
use dotenvy::dotenv;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use settlement_claims::{ClaimSigner, SqliteClaimStore};
use settlement_core::{InMemoryPeerRegistry, UnifiedSettlementExecutor};
use settlement_evm::EvmChannelLifecycle;
use settlement_executor::{ExecutorConfig, NullProofExchange, SettlementExecutor};
use settlement_metrics::MetricsCollector;
use settlement_scheduler::Scheduler;
use settlement_telemetry::default_sink;
use settlement_xrp::{SqliteXrpChannelStore, XrpChannelLifecycle, XrpChannelLifecycleConfig, XrpChannelStore};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn};

use crate::config::Config;
use crate::ledger::{InMemoryStateSink, LoggingInternalLedger};
use crate::wire_clients::{UnconfiguredEvmClient, UnconfiguredXrpClient};

fn load_evm_signer() -> PrivateKeySigner {
    match std::env::var("EVM_SIGNING_KEY_HEX") {
        Ok(hex_key) => hex_key.parse().expect("EVM_SIGNING_KEY_HEX must be a 32-byte hex private key"),
        Err(_) => {
            warn!("EVM_SIGNING_KEY_HEX not set; generating an ephemeral signer for this process only");
            PrivateKeySigner::random()
        }
    }
}

fn load_xrp_signing_key() -> SigningKey {
    match std::env::var("XRP_SIGNING_KEY_HEX") {
        Ok(hex_key) => {
            let bytes = hex::decode(hex_key.trim()).expect("XRP_SIGNING_KEY_HEX must be hex");
            let array: [u8; 32] = bytes.try_into().expect("XRP_SIGNING_KEY_HEX must decode to 32 bytes");
            SigningKey::from_bytes(&array)
        }
        Err(_) => {
            warn!("XRP_SIGNING_KEY_HEX not set; generating an ephemeral signer for this process only");
            SigningKey::generate(&mut OsRng)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    settlement_telemetry::init_tracing();

    let config = Config::load()?;
    info!(host = %config.host, port = config.port, "starting settlement node");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", config.sqlite_path))
        .await?;

    let claim_store = Arc::new(SqliteClaimStore::new(pool.clone()));
    claim_store.migrate().await?;
    let xrp_channel_store = Arc::new(SqliteXrpChannelStore::new(pool.clone()));
    xrp_channel_store.migrate().await?;

    let evm_signer = load_evm_signer();
    let xrp_signing_key = load_xrp_signing_key();
    let signer = Arc::new(ClaimSigner::new(xrp_signing_key, evm_signer, claim_store.clone()));

    let telemetry = default_sink();

    let evm_client = Arc::new(UnconfiguredEvmClient);
    let evm_lifecycle = Arc::new(EvmChannelLifecycle::new(evm_client.clone(), telemetry.clone()));

    let xrp_client = Arc::new(UnconfiguredXrpClient);
    let xrp_lifecycle = Arc::new(XrpChannelLifecycle::new(
        xrp_client,
        telemetry.clone(),
        XrpChannelLifecycleConfig::default(),
        config.xrp_source_address.clone(),
        signer.xrp_public_key(),
    ));
    for peer_id in config.peers.keys() {
        if let Some((state, _last_activity_at)) = xrp_channel_store.load(peer_id).await? {
            xrp_lifecycle.cache().set(peer_id, state);
        }
    }

    let internal_ledger = Arc::new(LoggingInternalLedger);
    let state_sink = Arc::new(InMemoryStateSink::new());

    let evm_executor = Arc::new(SettlementExecutor::new(
        evm_lifecycle.clone(),
        signer.clone(),
        internal_ledger.clone(),
        state_sink.clone(),
        Arc::new(NullProofExchange),
        telemetry.clone(),
        ExecutorConfig {
            chain_id: config.evm_chain_id,
            verifying_contract: config.evm_verifying_contract,
            settlement_timeout_secs: 86_400,
            initial_deposit_multiplier: config.initial_deposit_multiplier,
            min_deposit_threshold: config.min_deposit_threshold,
            max_retries: config.max_retries,
            base_retry_delay: Duration::from_millis(config.base_retry_delay_ms),
            idle_timeout_secs: config.evm_idle_channel_timeout_secs,
        },
    ));

    let registry = Arc::new(InMemoryPeerRegistry::new());
    for peer in config.peers.values() {
        registry.insert(peer.clone())?;
    }

    let core = Arc::new(UnifiedSettlementExecutor::new(
        evm_executor.clone(),
        xrp_lifecycle.clone(),
        signer,
        internal_ledger,
        state_sink,
        registry,
        telemetry.clone(),
    ));

    // The Settlement Coordinator's multi-method scoring applies to peers
    // whose request could be routed to either ledger family; under this
    // system's resolved `TokenId`, every inbound event already
    // names a concrete ledger family, so the Coordinator is constructed
    // here for its metrics/circuit-breaker bookkeeping and is available to
    // a caller that wants to evaluate options ahead of emitting an event,
    // rather than gating every dispatch through it.
    let metrics = MetricsCollector::new();
    metrics.spawn_cleanup(Duration::from_secs(config.metrics_cleanup_interval_secs));
    let _coordinator = settlement_coordinator::SettlementCoordinator::new(evm_client, metrics);

    let mut scheduler = Scheduler::new();
    {
        let evm_lifecycle = evm_lifecycle.clone();
        scheduler.spawn_periodic(
            "evm-deposit-monitor",
            Duration::from_secs(config.deposit_monitor_interval_secs),
            move || {
                let evm_lifecycle = evm_lifecycle.clone();
                async move { evm_lifecycle.run_deposit_monitor_sweep().await }
            },
        );
    }
    {
        let evm_executor = evm_executor.clone();
        scheduler.spawn_periodic(
            "evm-idle-detection-sweep",
            Duration::from_secs(config.idle_sweep_interval_secs),
            move || {
                let evm_executor = evm_executor.clone();
                async move {
                    let now = chrono::Utc::now().timestamp();
                    evm_executor.run_idle_sweep(now).await;
                }
            },
        );
    }
    {
        let xrp_lifecycle = xrp_lifecycle.clone();
        scheduler.spawn_periodic(
            "xrp-idle-and-expiring-sweep",
            Duration::from_secs(config.idle_sweep_interval_secs),
            move || {
                let xrp_lifecycle = xrp_lifecycle.clone();
                async move {
                    let now = chrono::Utc::now().timestamp();
                    xrp_lifecycle.run_idle_sweep(now).await;
                    xrp_lifecycle.run_expiring_sweep(now).await;
                }
            },
        );
    }
    {
        let xrp_lifecycle = xrp_lifecycle.clone();
        let xrp_channel_store = xrp_channel_store.clone();
        scheduler.spawn_periodic(
            "xrp-channel-persist",
            Duration::from_secs(config.idle_sweep_interval_secs),
            move || {
                let xrp_lifecycle = xrp_lifecycle.clone();
                let xrp_channel_store = xrp_channel_store.clone();
                async move {
                    for (peer_id, state) in xrp_lifecycle.cache().all() {
                        let last_activity_at = xrp_lifecycle.cache().last_activity_at(&peer_id).unwrap_or(0);
                        if let Err(err) = xrp_channel_store.upsert(&peer_id, &state, last_activity_at).await {
                            warn!(peer_id, error = %err, "failed to persist xrp channel state");
                        }
                    }
                }
            },
        );
    }

    let listener = core.start();
    info!("settlement node ready, awaiting SettlementRequired events");

    let shutdown = shutdown::ShutdownSignal::try_new()?;
    shutdown.recv().await;

    info!("shutdown signal received, draining background tasks");
    core.stop(listener);
    scheduler.stop().await;
    evm_executor.stop();

    Ok(())
}
