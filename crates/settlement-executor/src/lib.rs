//! The single-chain Settlement Executor: the six-step
//! settlement algorithm, its retry policy, and the counterparty
//! balance-proof exchange hook.

pub mod executor;
pub mod proof_exchange;
pub mod retry;

pub use executor::{ExecutorConfig, SettlementExecutor};
pub use proof_exchange::{CounterpartyProofExchange, NullProofExchange};
pub use retry::retry_with_backoff;
