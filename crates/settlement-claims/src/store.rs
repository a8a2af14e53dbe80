//! Append-only claim persistence.

use async_trait::async_trait;
use dashmap::DashMap;
use settlement_types::{Claim, ChannelId, SettlementError, StoredClaim, XrpPublicKey};
use sqlx::SqlitePool;
use sqlx::Row;

/// Append-only persistence for off-chain claims, keyed by channel.
///
/// `insert` never updates an existing row; `latest_for_channel` answers the
/// monotonicity check the Claim Signer relies on.
/// Implementations must be safe for concurrent readers; concurrent writers
/// to the *same* channel are serialized by the caller (the Signer).
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn insert(&self, claim: &Claim, created_at_unix_millis: i64) -> Result<(), SettlementError>;

    async fn latest_for_channel(&self, channel_id: ChannelId) -> Result<Option<StoredClaim>, SettlementError>;

    async fn list_for_destination(&self, destination: &str) -> Result<Vec<ChannelId>, SettlementError>;
}

/// An in-memory [`ClaimStore`], used in tests and as the store for
/// ledger-client test doubles. Not durable across process restarts.
#[derive(Default)]
pub struct InMemoryClaimStore {
    // channel_id -> (destination, claims ordered by insertion / created_at)
    by_channel: DashMap<ChannelId, Vec<StoredClaim>>,
    destinations: DashMap<ChannelId, String>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a channel with the destination address its claims draw
    /// against, so [`ClaimStore::list_for_destination`] can answer without
    /// a join. In the SQL-backed store this is simply a column on the row.
    pub fn register_destination(&self, channel_id: ChannelId, destination: impl Into<String>) {
        self.destinations.insert(channel_id, destination.into());
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn insert(&self, claim: &Claim, created_at_unix_millis: i64) -> Result<(), SettlementError> {
        let mut entry = self.by_channel.entry(claim.channel_id).or_default();
        entry.push(StoredClaim {
            claim: claim.clone(),
            created_at_unix_millis,
        });
        Ok(())
    }

    async fn latest_for_channel(&self, channel_id: ChannelId) -> Result<Option<StoredClaim>, SettlementError> {
        Ok(self
            .by_channel
            .get(&channel_id)
            .and_then(|claims| claims.iter().max_by_key(|c| c.created_at_unix_millis).cloned()))
    }

    async fn list_for_destination(&self, destination: &str) -> Result<Vec<ChannelId>, SettlementError> {
        Ok(self
            .destinations
            .iter()
            .filter(|entry| entry.value() == destination)
            .map(|entry| *entry.key())
            .collect())
    }
}

/// A [`ClaimStore`] backed by SQLite (via `sqlx`), matching the
/// `xrp_claims` table: `channel_id, amount, signature,
/// public_key, created_at`, with an index on `(channel_id, created_at)`.
///
/// `destination` is not part of the claim payload itself (a claim only
/// carries `channel_id, cumulative_amount, signature, public_key`);
/// `list_for_destination` is therefore answered by the owning
/// `settlement-xrp` channel cache, which this store is always paired with.
/// For a connector that only needs the Claim Store in isolation, pass an
/// explicit destination lookup via [`SqliteClaimStore::with_destinations`].
pub struct SqliteClaimStore {
    pool: SqlitePool,
    destinations: DashMap<ChannelId, String>,
}

impl SqliteClaimStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteClaimStore {
            pool,
            destinations: DashMap::new(),
        }
    }

    pub fn register_destination(&self, channel_id: ChannelId, destination: impl Into<String>) {
        self.destinations.insert(channel_id, destination.into());
    }

    /// Runs the embedded migrations against the configured pool.
    pub async fn migrate(&self) -> Result<(), SettlementError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SettlementError::Unknown(format!("claim store migration failed: {e}")))
    }
}

#[async_trait]
impl ClaimStore for SqliteClaimStore {
    async fn insert(&self, claim: &Claim, created_at_unix_millis: i64) -> Result<(), SettlementError> {
        sqlx::query(
            "INSERT INTO xrp_claims (channel_id, amount, signature, public_key, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(claim.channel_id.to_hex())
        .bind(claim.cumulative_amount_drops as i64)
        .bind(hex::encode(claim.signature))
        .bind(claim.public_key.to_wire_string())
        .bind(created_at_unix_millis)
        .execute(&self.pool)
        .await
        .map_err(|e| SettlementError::Unknown(format!("claim insert failed: {e}")))?;
        Ok(())
    }

    async fn latest_for_channel(&self, channel_id: ChannelId) -> Result<Option<StoredClaim>, SettlementError> {
        let row = sqlx::query(
            "SELECT channel_id, amount, signature, public_key, created_at FROM xrp_claims \
             WHERE channel_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(channel_id.to_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SettlementError::Unknown(format!("claim lookup failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        row_to_stored_claim(&row).map(Some)
    }

    async fn list_for_destination(&self, destination: &str) -> Result<Vec<ChannelId>, SettlementError> {
        Ok(self
            .destinations
            .iter()
            .filter(|entry| entry.value() == destination)
            .map(|entry| *entry.key())
            .collect())
    }
}

fn row_to_stored_claim(row: &sqlx::sqlite::SqliteRow) -> Result<StoredClaim, SettlementError> {
    let channel_id_hex: String = row.try_get("channel_id").map_err(sqlx_err)?;
    let amount: i64 = row.try_get("amount").map_err(sqlx_err)?;
    let signature_hex: String = row.try_get("signature").map_err(sqlx_err)?;
    let public_key_wire: String = row.try_get("public_key").map_err(sqlx_err)?;
    let created_at: i64 = row.try_get("created_at").map_err(sqlx_err)?;

    let channel_id = ChannelId::parse(&channel_id_hex)?;
    let signature_bytes = hex::decode(&signature_hex)
        .map_err(|e| SettlementError::Unknown(format!("invalid stored signature hex: {e}")))?;
    let signature: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| SettlementError::Unknown("stored signature is not 64 bytes".into()))?;
    let public_key = XrpPublicKey::parse(&public_key_wire)?;

    Ok(StoredClaim {
        claim: Claim {
            channel_id,
            cumulative_amount_drops: amount as u64,
            signature,
            public_key,
        },
        created_at_unix_millis: created_at,
    })
}

fn sqlx_err(e: sqlx::Error) -> SettlementError {
    SettlementError::Unknown(format!("claim row decode failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claim(channel_id: ChannelId, amount: u64) -> Claim {
        Claim {
            channel_id,
            cumulative_amount_drops: amount,
            signature: [9u8; 64],
            public_key: XrpPublicKey::from_raw([1u8; 32]),
        }
    }

    #[tokio::test]
    async fn in_memory_store_returns_latest_by_created_at() {
        let store = InMemoryClaimStore::new();
        let channel = ChannelId::parse(&"a".repeat(64)).unwrap();
        store.insert(&sample_claim(channel, 100), 1000).await.unwrap();
        store.insert(&sample_claim(channel, 200), 2000).await.unwrap();
        store.insert(&sample_claim(channel, 150), 1500).await.unwrap();

        let latest = store.latest_for_channel(channel).await.unwrap().unwrap();
        assert_eq!(latest.claim.cumulative_amount_drops, 200);
    }

    #[tokio::test]
    async fn in_memory_store_lists_by_destination() {
        let store = InMemoryClaimStore::new();
        let channel_a = ChannelId::parse(&"a".repeat(64)).unwrap();
        let channel_b = ChannelId::parse(&"b".repeat(64)).unwrap();
        store.register_destination(channel_a, "rDest1");
        store.register_destination(channel_b, "rDest2");

        let found = store.list_for_destination("rDest1").await.unwrap();
        assert_eq!(found, vec![channel_a]);
    }

    #[tokio::test]
    async fn unknown_channel_has_no_latest_claim() {
        let store = InMemoryClaimStore::new();
        let channel = ChannelId::parse(&"c".repeat(64)).unwrap();
        assert!(store.latest_for_channel(channel).await.unwrap().is_none());
    }
}
