//! The Settlement Coordinator: evaluates every available
//! settlement method for a request, scores them, and executes with
//! same-request fallback.

pub mod coordinator;
pub mod gas_price;

pub use coordinator::{SettlementCoordinator, SettlementOption, EVM_GAS_UNITS, XRP_FIXED_COST_DROPS};
pub use gas_price::{GasPriceCache, DEFAULT_GAS_PRICE_CACHE_DURATION};
