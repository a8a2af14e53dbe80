//! XRP Channel Lifecycle: per-peer channel cache, open/fund/
//! close driver, idle and expiring sweeps, and durable channel persistence.

pub mod cache;
pub mod client;
pub mod lifecycle;
pub mod store;

pub use cache::XrpChannelCache;
pub use client::{AccountInfo, ClaimDelivery, SubmitResult, XrpChannelClient};
pub use lifecycle::{CloseReason, XrpChannelLifecycle, XrpChannelLifecycleConfig};
pub use store::{SqliteXrpChannelStore, XrpChannelStore};
