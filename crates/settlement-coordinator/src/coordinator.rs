//! The Settlement Coordinator: scores every available
//! settlement method for a request and executes with same-request
//! fallback.

use std::sync::Arc;

use settlement_evm::EvmChannelClient;
use settlement_metrics::MetricsCollector;
use settlement_types::{PeerConfig, SettlementError, SettlementMethod, TokenId};
use tracing::{info, instrument};

use crate::gas_price::GasPriceCache;

/// Fixed EVM gas budget per settlement.
pub const EVM_GAS_UNITS: u128 = 50_000;
/// Fixed XRP claim-submission cost, in drops.
pub const XRP_FIXED_COST_DROPS: f64 = 12.0;

/// One candidate settlement route, scored against the others.
#[derive(Debug, Clone)]
pub struct SettlementOption {
    pub method: SettlementMethod,
    pub chain: Option<String>,
    pub estimated_cost: f64,
    pub estimated_latency: f64,
    pub success_rate: f64,
    pub available: bool,
}

impl SettlementOption {
    /// `score = 0.5 * (1/(cost+1)) + 0.3 * success_rate + 0.2 * (1/(latency+1))`
    ///.
    pub fn score(&self) -> f64 {
        0.5 * (1.0 / (self.estimated_cost + 1.0))
            + 0.3 * self.success_rate
            + 0.2 * (1.0 / (self.estimated_latency + 1.0))
    }
}

/// Default per-method latency estimate, used when a real latency oracle is
/// not wired up; a constant keeps `score` well-defined and deterministic in
/// tests.
const DEFAULT_EVM_LATENCY_SECS: f64 = 15.0;
const DEFAULT_XRP_LATENCY_SECS: f64 = 4.0;

pub struct SettlementCoordinator<C: EvmChannelClient> {
    evm_client: Arc<C>,
    gas_price_cache: GasPriceCache,
    metrics: MetricsCollector,
}

impl<C: EvmChannelClient> SettlementCoordinator<C> {
    pub fn new(evm_client: Arc<C>, metrics: MetricsCollector) -> Self {
        SettlementCoordinator {
            evm_client,
            gas_price_cache: GasPriceCache::default(),
            metrics,
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Enumerates every settlement route this peer/token combination could
    /// plausibly use.
    #[instrument(skip(self), fields(peer_id = %peer.peer_id))]
    pub async fn evaluate_options(&self, peer: &PeerConfig, token: &TokenId) -> Vec<SettlementOption> {
        let mut options = Vec::new();
        let is_xrp_token = token.is_xrp();

        if peer.settlement_preference.allows_evm() && !is_xrp_token && peer.evm_address.is_some() {
            let breaker = self.metrics.circuit_breaker_state(SettlementMethod::Evm);
            let success_rate = self.metrics.success_rate(SettlementMethod::Evm);
            match self.gas_price_cache.get(self.evm_client.as_ref()).await {
                Ok(gas_price) => {
                    let cost = (gas_price * EVM_GAS_UNITS) as f64;
                    options.push(SettlementOption {
                        method: SettlementMethod::Evm,
                        chain: Some("evm".to_string()),
                        estimated_cost: cost,
                        estimated_latency: DEFAULT_EVM_LATENCY_SECS,
                        success_rate,
                        available: !breaker.is_open,
                    });
                }
                Err(_) => {
                    options.push(SettlementOption {
                        method: SettlementMethod::Evm,
                        chain: Some("evm".to_string()),
                        estimated_cost: 0.0,
                        estimated_latency: DEFAULT_EVM_LATENCY_SECS,
                        success_rate,
                        available: false,
                    });
                }
            }
        }

        if peer.settlement_preference.allows_xrp() && is_xrp_token && peer.xrp_address.is_some() {
            let breaker = self.metrics.circuit_breaker_state(SettlementMethod::Xrp);
            let success_rate = self.metrics.success_rate(SettlementMethod::Xrp);
            options.push(SettlementOption {
                method: SettlementMethod::Xrp,
                chain: None,
                estimated_cost: XRP_FIXED_COST_DROPS,
                estimated_latency: DEFAULT_XRP_LATENCY_SECS,
                success_rate,
                available: !breaker.is_open,
            });
        }

        options
    }

    /// Picks the maximum-scoring available option.
    pub fn select_settlement_method(&self, options: &[SettlementOption]) -> Result<SettlementOption, SettlementError> {
        options
            .iter()
            .filter(|o| o.available)
            .max_by(|a, b| a.score().partial_cmp(&b.score()).unwrap_or(std::cmp::Ordering::Equal))
            .cloned()
            .ok_or(SettlementError::NoAvailableMethods)
    }

    /// Calls `execute` with the selected primary method; on failure, falls
    /// back to the next-best option whose method differs from the
    /// primary's; on a second failure, fails with `AllMethodsFailed`.
    #[instrument(skip(self, options, execute), fields(peer_id = %peer.peer_id))]
    pub async fn execute_with_fallback<F, Fut>(
        &self,
        peer: &PeerConfig,
        token: &TokenId,
        amount: &str,
        options: Vec<SettlementOption>,
        execute: F,
    ) -> Result<(), SettlementError>
    where
        F: Fn(SettlementMethod) -> Fut,
        Fut: std::future::Future<Output = Result<(), SettlementError>>,
    {
        let primary = self.select_settlement_method(&options)?;
        self.log_decision(peer, token, amount, &primary, &options);

        match execute(primary.method).await {
            Ok(()) => {
                self.metrics.record_success(primary.method);
                Ok(())
            }
            Err(primary_err) => {
                self.metrics.record_failure(primary.method);
                let fallback = options
                    .iter()
                    .filter(|o| o.available && o.method != primary.method)
                    .max_by(|a, b| a.score().partial_cmp(&b.score()).unwrap_or(std::cmp::Ordering::Equal));

                let Some(fallback) = fallback else {
                    return Err(primary_err);
                };

                match execute(fallback.method).await {
                    Ok(()) => {
                        self.metrics.record_success(fallback.method);
                        Ok(())
                    }
                    Err(_) => {
                        self.metrics.record_failure(fallback.method);
                        Err(SettlementError::AllMethodsFailed {
                            primary: primary.method.to_string(),
                            fallback: fallback.method.to_string(),
                        })
                    }
                }
            }
        }
    }

    fn log_decision(
        &self,
        peer: &PeerConfig,
        token: &TokenId,
        amount: &str,
        selected: &SettlementOption,
        all_options: &[SettlementOption],
    ) {
        let all_options_json = serde_json::json!(all_options
            .iter()
            .map(|o| serde_json::json!({
                "method": o.method.to_string(),
                "chain": o.chain,
                "estimated_cost": o.estimated_cost,
                "estimated_latency": o.estimated_latency,
                "success_rate": o.success_rate,
                "available": o.available,
                "score": o.score(),
            }))
            .collect::<Vec<_>>());
        info!(
            peer = %peer.peer_id,
            token = %token,
            amount = %amount,
            selected_method = %selected.method,
            selected_chain = ?selected.chain,
            estimated_cost = selected.estimated_cost,
            estimated_latency = selected.estimated_latency,
            all_options = %all_options_json,
            "settlement method selected"
        );
    }
}
