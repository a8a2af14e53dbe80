//! The local EVM channel-state cache and the event reorder buffer.

use std::collections::BinaryHeap;
use std::cmp::Reverse;

use dashmap::DashMap;
use settlement_types::{ChannelId, ChannelMetadata, EvmChannelState};

use crate::client::EvmChannelEvent;

/// Per-channel cached state plus lifecycle metadata, mutated solely by the
/// owning Lifecycle Manager.
#[derive(Default)]
pub struct EvmChannelCache {
    states: DashMap<ChannelId, EvmChannelState>,
    metadata: DashMap<ChannelId, ChannelMetadata>,
    /// (peer, token_address) -> channel_id, for `ensure_channel` lookups.
    by_peer_token: DashMap<(String, String), ChannelId>,
    pending_events: DashMap<ChannelId, BinaryHeap<Reverse<OrderedEvent>>>,
    next_expected_block: DashMap<ChannelId, u64>,
}

/// Wraps an event so it can be ordered by block number in a min-heap via
/// `Reverse`.
pub struct OrderedEvent(pub EvmChannelEvent);

impl PartialEq for OrderedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.0.block_number() == other.0.block_number()
    }
}
impl Eq for OrderedEvent {}
impl PartialOrd for OrderedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.block_number().cmp(&other.0.block_number())
    }
}

impl EvmChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_state(&self, channel_id: ChannelId) -> Option<EvmChannelState> {
        self.states.get(&channel_id).map(|s| s.clone())
    }

    pub fn set_state(&self, state: EvmChannelState) {
        self.states.insert(state.channel_id, state);
    }

    pub fn get_metadata(&self, channel_id: ChannelId) -> Option<ChannelMetadata> {
        self.metadata.get(&channel_id).map(|m| m.clone())
    }

    pub fn set_metadata(&self, metadata: ChannelMetadata) {
        self.metadata.insert(metadata.channel_id, metadata);
    }

    pub fn touch_activity(&self, channel_id: ChannelId, now_unix_secs: i64) {
        if let Some(mut meta) = self.metadata.get_mut(&channel_id) {
            meta.touch(now_unix_secs);
        }
    }

    pub fn channel_for_peer_token(&self, peer_id: &str, token_address: &str) -> Option<ChannelId> {
        self.by_peer_token
            .get(&(peer_id.to_string(), token_address.to_string()))
            .map(|v| *v)
    }

    pub fn bind_peer_token(&self, peer_id: &str, token_address: &str, channel_id: ChannelId) {
        self.by_peer_token
            .insert((peer_id.to_string(), token_address.to_string()), channel_id);
    }

    pub fn all_metadata(&self) -> Vec<ChannelMetadata> {
        self.metadata.iter().map(|e| e.value().clone()).collect()
    }

    /// Buffers `event` and returns every event for its channel that can now
    /// be applied in contiguous block-number order. Unknown channels (no
    /// cached metadata) are ignored.
    pub fn admit_event(&self, event: EvmChannelEvent) -> Vec<EvmChannelEvent> {
        let channel_id = event.channel_id();
        let mut heap = self.pending_events.entry(channel_id).or_default();
        heap.push(Reverse(OrderedEvent(event)));

        let mut ready = Vec::new();
        let mut next_expected = self
            .next_expected_block
            .get(&channel_id)
            .map(|v| *v)
            .unwrap_or(0);

        while let Some(Reverse(top)) = heap.peek() {
            if next_expected == 0 || top.0.block_number() >= next_expected {
                let Reverse(ordered) = heap.pop().unwrap();
                next_expected = ordered.0.block_number() + 1;
                ready.push(ordered.0);
            } else {
                break;
            }
        }
        self.next_expected_block.insert(channel_id, next_expected);
        ready
    }
}
