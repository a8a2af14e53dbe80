//! Claim signing/verification (ed25519, XRP) and balance-proof
//! signing/verification (EIP-712-style, EVM).

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use alloy_signer::Signer as EvmSignerTrait;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain, sol};
use ed25519_dalek::{Signature as Ed25519Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use settlement_types::{BalanceProof, Claim, ChannelId, SettlementError, XrpPublicKey};

use crate::store::ClaimStore;

sol! {
    /// The EIP-712 typed struct a [`BalanceProof`] is signed under, with
    /// domain `{name: "PaymentChannel", version: "1", chain_id,
    /// verifying_contract}`.
    #[derive(Debug)]
    struct PaymentChannelBalanceProof {
        bytes32 channelId;
        uint64 nonce;
        uint128 transferred;
        uint128 locked;
        bytes32 locksRoot;
    }
}

/// The ed25519 claim signature, 64 raw bytes / 128 hex characters on the
/// wire.
pub type ClaimSignature = [u8; 64];

/// The 65-byte recoverable EVM signature, `0x` + 130 hex characters on the
/// wire.
pub type EvmSignatureBytes = [u8; 65];

/// Holds (or indirects to) the single signing identity for each ledger
/// family this node settles over, and enforces the monotonicity
/// precondition on every claim it signs.
pub struct ClaimSigner<S> {
    xrp_key: SigningKey,
    evm_signer: PrivateKeySigner,
    store: Arc<S>,
}

impl<S: ClaimStore> ClaimSigner<S> {
    pub fn new(xrp_key: SigningKey, evm_signer: PrivateKeySigner, store: Arc<S>) -> Self {
        ClaimSigner {
            xrp_key,
            evm_signer,
            store,
        }
    }

    pub fn xrp_public_key(&self) -> XrpPublicKey {
        XrpPublicKey::from_raw(self.xrp_key.verifying_key().to_bytes())
    }

    pub fn evm_address(&self) -> Address {
        self.evm_signer.address()
    }

    /// Signs a new cumulative-amount claim for `channel_id`, enforcing
    /// monotonicity against the Claim Store before signing.
    ///
    /// # Errors
    /// `InvalidInput` if `amount` is zero; `NonMonotonicClaim` if a
    /// previously-stored claim for this channel already carries an amount
    /// `>= amount`.
    pub async fn sign_claim(
        &self,
        channel_id: ChannelId,
        amount_drops: u64,
    ) -> Result<ClaimSignature, SettlementError> {
        if amount_drops == 0 {
            return Err(SettlementError::InvalidInput("claim amount must be positive".into()));
        }
        if let Some(previous) = self.store.latest_for_channel(channel_id).await? {
            if previous.claim.cumulative_amount_drops >= amount_drops {
                return Err(SettlementError::NonMonotonicClaim);
            }
        }

        let payload = Claim::signing_payload(&channel_id, amount_drops);
        let signature = self.xrp_key.sign(&payload);
        let signature_bytes = signature.to_bytes();

        let claim = Claim {
            channel_id,
            cumulative_amount_drops: amount_drops,
            signature: signature_bytes,
            public_key: self.xrp_public_key(),
        };
        self.store.insert(&claim, now_unix_millis()).await?;
        Ok(signature_bytes)
    }

    /// Verifies a claim's signature and capacity bound, without touching
    /// the store. Never panics; every failure mode returns `false`.
    pub fn verify_claim(
        channel_id: ChannelId,
        amount_drops: u64,
        signature: &ClaimSignature,
        public_key: &XrpPublicKey,
        channel_capacity_drops: Option<u64>,
    ) -> bool {
        if let Some(capacity) = channel_capacity_drops {
            if amount_drops > capacity {
                return false;
            }
        }
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
            return false;
        };
        let signature = Ed25519Signature::from_bytes(signature);
        let payload = Claim::signing_payload(&channel_id, amount_drops);
        verifying_key.verify(&payload, &signature).is_ok()
    }

    /// Signs a [`BalanceProof`] under the EIP-712 `PaymentChannel` domain
    ///.
    pub async fn sign_balance_proof(
        &self,
        chain_id: u64,
        verifying_contract: Address,
        proof: &BalanceProof,
    ) -> Result<EvmSignatureBytes, SettlementError> {
        let domain = eip712_domain! {
            name: "PaymentChannel",
            version: "1",
            chain_id: chain_id,
            verifying_contract: verifying_contract,
        };
        let typed = PaymentChannelBalanceProof {
            channelId: B256::from_slice(proof.channel_id.as_bytes()),
            nonce: proof.nonce,
            transferred: U256::from(proof.transferred),
            locked: U256::from(proof.locked),
            locksRoot: proof.locks_root,
        };
        let hash = typed.eip712_signing_hash(&domain);
        let signature = self
            .evm_signer
            .sign_hash(&hash)
            .await
            .map_err(|e| SettlementError::Unknown(format!("balance proof signing failed: {e}")))?;
        let bytes: EvmSignatureBytes = signature.as_bytes();
        if bytes.len() != 65 {
            return Err(SettlementError::Unknown("signature is not 65 bytes".into()));
        }
        Ok(bytes)
    }

    /// Verifies a [`BalanceProof`] signature against `expected_signer`.
    pub fn verify_balance_proof(
        chain_id: u64,
        verifying_contract: Address,
        proof: &BalanceProof,
        signature: &EvmSignatureBytes,
        expected_signer: Address,
    ) -> bool {
        let domain = eip712_domain! {
            name: "PaymentChannel",
            version: "1",
            chain_id: chain_id,
            verifying_contract: verifying_contract,
        };
        let typed = PaymentChannelBalanceProof {
            channelId: B256::from_slice(proof.channel_id.as_bytes()),
            nonce: proof.nonce,
            transferred: U256::from(proof.transferred),
            locked: U256::from(proof.locked),
            locksRoot: proof.locks_root,
        };
        let hash = typed.eip712_signing_hash(&domain);
        let Ok(sig) = alloy_primitives::Signature::from_raw_array(signature) else {
            return false;
        };
        match sig.recover_address_from_prehash(&hash) {
            Ok(recovered) => recovered == expected_signer,
            Err(_) => false,
        }
    }
}

fn now_unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}
