//! Peer configuration lookup: the Unified Executor's
//! validation step needs to resolve a `peer_id` to its settlement policy
//! before it can dispatch anywhere.

use async_trait::async_trait;
use dashmap::DashMap;
use settlement_types::{PeerConfig, SettlementError};

/// Resolves a `peer_id` to its [`PeerConfig`]. An `async_trait` so a real
/// deployment can back it with a database without changing callers.
#[async_trait]
pub trait PeerRegistry: Send + Sync {
    async fn get(&self, peer_id: &str) -> Result<PeerConfig, SettlementError>;
}

/// An in-memory [`PeerRegistry`], sufficient for a single-node deployment
/// whose peer list is loaded from configuration at startup.
#[derive(Default)]
pub struct InMemoryPeerRegistry {
    peers: DashMap<String, PeerConfig>,
}

impl InMemoryPeerRegistry {
    pub fn new() -> Self {
        InMemoryPeerRegistry::default()
    }

    /// Inserts or replaces a peer's configuration, validating its
    /// addresses against its settlement preference first.
    pub fn insert(&self, peer: PeerConfig) -> Result<(), SettlementError> {
        peer.validate()?;
        self.peers.insert(peer.peer_id.clone(), peer);
        Ok(())
    }
}

#[async_trait]
impl PeerRegistry for InMemoryPeerRegistry {
    async fn get(&self, peer_id: &str) -> Result<PeerConfig, SettlementError> {
        self.peers
            .get(peer_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SettlementError::PeerNotConfigured(peer_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use settlement_types::SettlementPreference;
    use std::collections::HashSet;

    fn peer() -> PeerConfig {
        PeerConfig {
            peer_id: "peer-bob".into(),
            settlement_preference: SettlementPreference::Evm,
            settlement_tokens: HashSet::new(),
            evm_address: Some(Address::ZERO),
            xrp_address: None,
        }
    }

    #[tokio::test]
    async fn returns_inserted_peer() {
        let registry = InMemoryPeerRegistry::new();
        registry.insert(peer()).unwrap();
        let fetched = registry.get("peer-bob").await.unwrap();
        assert_eq!(fetched.peer_id, "peer-bob");
    }

    #[tokio::test]
    async fn unknown_peer_is_not_configured() {
        let registry = InMemoryPeerRegistry::new();
        assert!(matches!(
            registry.get("ghost").await,
            Err(SettlementError::PeerNotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn insert_rejects_invalid_preference_address_pairing() {
        let registry = InMemoryPeerRegistry::new();
        let mut bad = peer();
        bad.evm_address = None;
        assert!(registry.insert(bad).is_err());
    }
}
