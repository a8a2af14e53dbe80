//! Outbound telemetry event shapes.

use serde::Serialize;

/// Every outbound telemetry tag the core emits, across settlement and both
/// per-ledger-family channel lifecycles.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TelemetryEvent {
    SettlementStarted {
        peer_id: String,
        token_id: String,
    },
    SettlementCompleted {
        peer_id: String,
        token_id: String,
    },
    SettlementFailed {
        peer_id: String,
        token_id: String,
        reason: String,
    },
    PaymentChannelOpened {
        channel_id: String,
        participants: (String, String),
    },
    PaymentChannelBalanceUpdate {
        channel_id: String,
        self_transferred: String,
        peer_transferred: String,
    },
    PaymentChannelSettled {
        channel_id: String,
    },
    XrpChannelOpened {
        channel_id: String,
        destination: String,
    },
    XrpChannelClaimed {
        channel_id: String,
        cumulative_amount_drops: u64,
    },
    XrpChannelClosed {
        channel_id: String,
        reason: XrpCloseReason,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum XrpCloseReason {
    Idle,
    Expiration,
    Manual,
}

impl TelemetryEvent {
    /// A short tag used in log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            TelemetryEvent::SettlementStarted { .. } => "SETTLEMENT_STARTED",
            TelemetryEvent::SettlementCompleted { .. } => "SETTLEMENT_COMPLETED",
            TelemetryEvent::SettlementFailed { .. } => "SETTLEMENT_FAILED",
            TelemetryEvent::PaymentChannelOpened { .. } => "PAYMENT_CHANNEL_OPENED",
            TelemetryEvent::PaymentChannelBalanceUpdate { .. } => "PAYMENT_CHANNEL_BALANCE_UPDATE",
            TelemetryEvent::PaymentChannelSettled { .. } => "PAYMENT_CHANNEL_SETTLED",
            TelemetryEvent::XrpChannelOpened { .. } => "XRP_CHANNEL_OPENED",
            TelemetryEvent::XrpChannelClaimed { .. } => "XRP_CHANNEL_CLAIMED",
            TelemetryEvent::XrpChannelClosed { .. } => "XRP_CHANNEL_CLOSED",
        }
    }
}
