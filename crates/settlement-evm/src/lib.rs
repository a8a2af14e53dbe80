//! EVM Channel Lifecycle: local state cache, event ingestion,
//! and the open/deposit/close/settle driver, built over a narrow
//! [`EvmChannelClient`] collaborator.

pub mod cache;
pub mod client;
pub mod lifecycle;

pub use cache::EvmChannelCache;
pub use client::{EvmChannelClient, EvmChannelEvent};
pub use lifecycle::{EvmChannelLifecycle, INITIAL_DEPOSIT_MULTIPLIER, MIN_DEPOSIT_THRESHOLD};
