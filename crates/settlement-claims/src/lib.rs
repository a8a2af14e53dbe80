//! Off-chain claim/balance-proof signing and append-only persistence
//!.

pub mod signer;
pub mod store;

pub use signer::{ClaimSigner, ClaimSignature, EvmSignatureBytes};
pub use store::{ClaimStore, InMemoryClaimStore, SqliteClaimStore};
