//! Inbound event shapes and the small closed-set enums shared across the
//! coordinator, executors, and lifecycle managers.

use serde::{Deserialize, Serialize};

use crate::channel_id::ChannelId;
use crate::token::TokenId;

/// The inbound event emitted by the external threshold monitor.
///
/// `balance` is carried as a base-10 big-int string on the wire and parsed
/// into the appropriate integer type (`alloy_primitives::U256` for EVM
/// tokens, `u64` drops for XRP) once the token's ledger family is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequired {
    pub peer_id: String,
    pub balance: String,
    pub token_id: TokenId,
    pub timestamp: i64,
}

/// The settlement method a request can be routed to. A closed, tagged sum
/// rather than open dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMethod {
    Evm,
    Xrp,
}

impl std::fmt::Display for SettlementMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementMethod::Evm => write!(f, "evm"),
            SettlementMethod::Xrp => write!(f, "xrp"),
        }
    }
}

/// The settlement state the core reports back to the external monitor:
/// `IDLE` until a settlement attempt is accepted, then `IN_PROGRESS` until
/// success. Failure deliberately leaves it `IN_PROGRESS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementState {
    Idle,
    InProgress,
}

/// Internal "a channel saw activity" event, used to break the cyclic
/// reference between the Settlement Executor and the Lifecycle Managers
///: the executor publishes this, and the
/// owning lifecycle manager subscribes and updates `last_activity_at`.
#[derive(Debug, Clone)]
pub struct ChannelActivity {
    pub channel_id: ChannelId,
    pub peer_id: String,
    pub at_unix_secs: i64,
}
