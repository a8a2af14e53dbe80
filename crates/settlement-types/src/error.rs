//! Error taxonomy shared across the settlement core.

use thiserror::Error;

/// The single error type returned by every public entry point in the
/// settlement core.
///
/// [`SettlementError::retryable`] is the one source of truth for which
/// variants the executor's retry loop will retry.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Malformed identifiers, addresses, or amounts. Raised at the call
    /// boundary; never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A claim did not strictly exceed every prior accepted claim for its channel.
    #[error("non-monotonic claim: new amount does not exceed the latest accepted claim")]
    NonMonotonicClaim,

    /// A balance proof's nonce did not strictly exceed the signer's last accepted nonce.
    #[error("nonce did not increase: {0}")]
    NonceNotIncreasing(String),

    /// The payer's on-chain balance or reserve cannot cover the operation.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// An XRP account's reserve requirement blocks the operation.
    #[error("insufficient reserve")]
    InsufficientReserve,

    /// No cached or on-chain channel exists for this lookup.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// No ledger entry exists for this channel id.
    #[error("ledger entry not found: {0}")]
    EntryNotFound(String),

    /// `settle` was attempted before `closed_at + settlement_timeout` elapsed.
    #[error("challenge period has not expired")]
    ChallengeNotExpired,

    /// A transient ledger-layer failure: timeout, network blip, gas price
    /// spike, or a nonce-too-low race. Retryable with exponential backoff.
    #[error("transient ledger error ({kind}): {message}")]
    TransientLedger { kind: TransientKind, message: String },

    /// A signature failed verification.
    #[error("invalid signature")]
    InvalidSignature,

    /// A counterparty submitted a conflicting, disputed channel state.
    #[error("channel dispute")]
    ChannelDispute,

    /// The declared settlement preference is not compatible with the token's
    /// ledger family.
    #[error("incompatible settlement method for this token")]
    IncompatibleSettlementMethod,

    /// The peer config is missing the address required by its preference.
    #[error("missing address for settlement method")]
    MissingAddress,

    /// No peer configuration is registered for this peer id.
    #[error("no peer config for peer {0}")]
    PeerNotConfigured(String),

    /// Every candidate settlement method was filtered out as unavailable.
    #[error("no available settlement methods")]
    NoAvailableMethods,

    /// The primary and the fallback settlement method both failed.
    #[error("all settlement methods failed: primary={primary}, fallback={fallback}")]
    AllMethodsFailed { primary: String, fallback: String },

    /// A bounded queue (e.g. the batch writer's pending-transfer queue) is full.
    #[error("queue full")]
    QueueFull,

    /// An off-chain counterparty balance-proof/claim exchange could not be
    /// completed; see [`crate::error::SettlementError`] docs on cooperative
    /// settlement for why this is never silently substituted.
    #[error("counterparty proof exchange unavailable")]
    ProofExchangeUnavailable,

    /// Anything the taxonomy above does not name. Treated as non-retryable
    /// as a safety bias.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// The sub-kind of a [`SettlementError::TransientLedger`] error, matching
/// the four retryable message classes the ledger client can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    Timeout,
    Network,
    GasPrice,
    NonceTooLow,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransientKind::Timeout => "timeout",
            TransientKind::Network => "network",
            TransientKind::GasPrice => "gas price",
            TransientKind::NonceTooLow => "nonce too low",
        };
        write!(f, "{s}")
    }
}

impl SettlementError {
    /// Whether the executor's retry loop should retry this error.
    ///
    /// Only [`SettlementError::TransientLedger`] is retryable; everything
    /// else — including variants this taxonomy does not yet name — is
    /// non-retryable: unknown errors default to non-retryable as a safety
    /// bias.
    pub fn retryable(&self) -> bool {
        matches!(self, SettlementError::TransientLedger { .. })
    }

    /// Classifies a raw error message from a ledger client into a
    /// [`SettlementError`] by substring match: `{timeout, network, gas
    /// price, nonce too low}` are retryable; `{insufficient funds, channel
    /// closed, invalid signature, challenge not expired}` are not; anything
    /// else is `Unknown`.
    pub fn classify_ledger_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("timeout") {
            return SettlementError::TransientLedger {
                kind: TransientKind::Timeout,
                message,
            };
        }
        if lower.contains("network") {
            return SettlementError::TransientLedger {
                kind: TransientKind::Network,
                message,
            };
        }
        if lower.contains("gas price") {
            return SettlementError::TransientLedger {
                kind: TransientKind::GasPrice,
                message,
            };
        }
        if lower.contains("nonce too low") {
            return SettlementError::TransientLedger {
                kind: TransientKind::NonceTooLow,
                message,
            };
        }
        if lower.contains("insufficient funds") {
            return SettlementError::InsufficientFunds;
        }
        if lower.contains("channel closed") {
            return SettlementError::ChannelNotFound(message);
        }
        if lower.contains("invalid signature") {
            return SettlementError::InvalidSignature;
        }
        if lower.contains("challenge not expired") {
            return SettlementError::ChallengeNotExpired;
        }
        SettlementError::Unknown(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_messages_classify_as_transient() {
        for msg in ["request timeout", "network unreachable", "gas price too volatile", "nonce too low"] {
            let err = SettlementError::classify_ledger_message(msg);
            assert!(err.retryable(), "{msg:?} should be retryable, got {err:?}");
        }
    }

    #[test]
    fn non_retryable_messages_classify_as_non_retryable() {
        for msg in [
            "insufficient funds",
            "channel closed",
            "invalid signature",
            "challenge not expired",
        ] {
            let err = SettlementError::classify_ledger_message(msg);
            assert!(!err.retryable(), "{msg:?} should not be retryable, got {err:?}");
        }
    }

    #[test]
    fn unknown_messages_are_non_retryable() {
        let err = SettlementError::classify_ledger_message("the moon is full");
        assert!(matches!(err, SettlementError::Unknown(_)));
        assert!(!err.retryable());
    }
}
