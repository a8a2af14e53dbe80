//! The per-peer XRP channel cache: at most one XRP channel per peer at a
//! time.

use dashmap::DashMap;
use settlement_types::XrpChannelState;

#[derive(Default)]
pub struct XrpChannelCache {
    by_peer: DashMap<String, XrpChannelState>,
    last_activity: DashMap<String, i64>,
}

impl XrpChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, peer_id: &str) -> Option<XrpChannelState> {
        self.by_peer.get(peer_id).map(|s| s.clone())
    }

    pub fn set(&self, peer_id: &str, state: XrpChannelState) {
        self.by_peer.insert(peer_id.to_string(), state);
    }

    pub fn last_activity_at(&self, peer_id: &str) -> Option<i64> {
        self.last_activity.get(peer_id).map(|v| *v)
    }

    pub fn touch(&self, peer_id: &str, now_unix_secs: i64) {
        self.last_activity.insert(peer_id.to_string(), now_unix_secs);
    }

    /// Whether the cached channel for `peer_id` is in the `open` state,
    /// i.e. a new channel must be opened rather than reused.
    pub fn has_open_channel(&self, peer_id: &str) -> bool {
        self.by_peer
            .get(peer_id)
            .map(|s| matches!(s.status, settlement_types::XrpChannelStatus::Open))
            .unwrap_or(false)
    }

    pub fn all(&self) -> Vec<(String, XrpChannelState)> {
        self.by_peer
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
