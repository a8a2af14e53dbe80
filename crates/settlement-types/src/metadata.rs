//! Lifecycle-manager-internal channel metadata.
//!
//! Ownership: created by a Lifecycle Manager on open; mutated only by that
//! Lifecycle Manager or by lifecycle-event handlers reflecting confirmed
//! on-chain events; destroyed only by the Lifecycle Manager after
//! settlement or an explicit purge.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::channel_id::ChannelId;
use crate::token::TokenId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMetadataStatus {
    Opening,
    Active,
    Closing,
    Closed,
    Settling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub channel_id: ChannelId,
    pub peer_id: String,
    pub token_id: TokenId,
    pub token_address: String,
    pub created_at_unix_secs: i64,
    pub last_activity_at_unix_secs: i64,
    pub status: ChannelMetadataStatus,
    /// The deposit sized at open time, so a later top-up can restore this
    /// level instead of compounding off whatever the current deposit is.
    pub initial_deposit: U256,
}

impl ChannelMetadata {
    pub fn touch(&mut self, now_unix_secs: i64) {
        self.last_activity_at_unix_secs = now_unix_secs;
    }

    pub fn idle_for(&self, now_unix_secs: i64) -> i64 {
        now_unix_secs - self.last_activity_at_unix_secs
    }
}
