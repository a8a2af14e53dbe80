//! Core data model for the settlement core.
//!
//! This crate holds the types every other crate shares: channel
//! identifiers, per-ledger-family channel state, balance proofs and
//! claims, peer configuration, lifecycle-manager metadata, the error
//! taxonomy, and the narrow interfaces to the external collaborators this
//! system treats as opaque (the internal ledger, the settlement-state
//! sink).

pub mod channel_id;
pub mod error;
pub mod evm;
pub mod events;
pub mod external;
pub mod metadata;
pub mod peer;
pub mod timestamp;
pub mod token;

pub use channel_id::ChannelId;
pub use error::{SettlementError, TransientKind};
pub use evm::{BalanceProof, EvmChannelState, EvmChannelStatus, Participant};
pub use events::{ChannelActivity, SettlementMethod, SettlementRequired, SettlementState};
pub use external::{InternalLedger, SettledAmount, SettlementStateSink};
pub use metadata::{ChannelMetadata, ChannelMetadataStatus};
pub use peer::{PeerConfig, SettlementPreference};
pub use timestamp::{Clock, SystemClock, ripple_to_unix, unix_to_ripple};
pub use token::TokenId;
pub mod xrp;
pub use xrp::{Claim, StoredClaim, XrpChannelState, XrpChannelStatus, XrpPublicKey};
