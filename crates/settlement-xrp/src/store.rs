//! Durable persistence for XRP channel state, mirroring
//! `settlement-claims::store`'s `sqlx`-backed/in-memory split so the
//! lifecycle cache can be rehydrated across restarts.

use async_trait::async_trait;
use settlement_types::{ChannelId, SettlementError, XrpChannelState, XrpChannelStatus, XrpPublicKey};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[async_trait]
pub trait XrpChannelStore: Send + Sync {
    async fn upsert(&self, peer_id: &str, state: &XrpChannelState, last_activity_at: i64) -> Result<(), SettlementError>;
    async fn load(&self, peer_id: &str) -> Result<Option<(XrpChannelState, i64)>, SettlementError>;
    async fn list_by_status(&self, status: XrpChannelStatus) -> Result<Vec<String>, SettlementError>;
}

pub struct SqliteXrpChannelStore {
    pool: SqlitePool,
}

impl SqliteXrpChannelStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteXrpChannelStore { pool }
    }

    pub async fn migrate(&self) -> Result<(), SettlementError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SettlementError::Unknown(format!("xrp channel store migration failed: {e}")))
    }

    fn status_str(status: XrpChannelStatus) -> &'static str {
        match status {
            XrpChannelStatus::Open => "open",
            XrpChannelStatus::Closing => "closing",
            XrpChannelStatus::Closed => "closed",
        }
    }

    fn row_to_state(row: &SqliteRow) -> Result<(XrpChannelState, i64), SettlementError> {
        let channel_id: String = row.try_get("channel_id").map_err(sqlx_err)?;
        let public_key: String = row.try_get("source_public_key").map_err(sqlx_err)?;
        let status_str: String = row.try_get("status").map_err(sqlx_err)?;
        let status = match status_str.as_str() {
            "open" => XrpChannelStatus::Open,
            "closing" => XrpChannelStatus::Closing,
            _ => XrpChannelStatus::Closed,
        };
        let state = XrpChannelState {
            channel_id: ChannelId::parse(&channel_id)?,
            source_address: row.try_get("source_address").map_err(sqlx_err)?,
            destination_address: row.try_get("destination_address").map_err(sqlx_err)?,
            amount_drops: row.try_get::<i64, _>("amount_drops").map_err(sqlx_err)? as u64,
            balance_drops: row.try_get::<i64, _>("balance_drops").map_err(sqlx_err)? as u64,
            settle_delay_secs: row.try_get::<i64, _>("settle_delay_secs").map_err(sqlx_err)? as u32,
            source_public_key: XrpPublicKey::parse(&public_key)?,
            cancel_after: row.try_get("cancel_after").map_err(sqlx_err)?,
            expiration: row.try_get("expiration").map_err(sqlx_err)?,
            status,
        };
        let last_activity_at: i64 = row.try_get("last_activity_at").map_err(sqlx_err)?;
        Ok((state, last_activity_at))
    }
}

fn sqlx_err(err: sqlx::Error) -> SettlementError {
    SettlementError::Unknown(format!("xrp channel store error: {err}"))
}

#[async_trait]
impl XrpChannelStore for SqliteXrpChannelStore {
    async fn upsert(&self, peer_id: &str, state: &XrpChannelState, last_activity_at: i64) -> Result<(), SettlementError> {
        sqlx::query(
            "INSERT INTO xrp_channels
                (peer_id, channel_id, source_address, destination_address, amount_drops, balance_drops,
                 settle_delay_secs, source_public_key, cancel_after, expiration, status, last_activity_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(peer_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                source_address = excluded.source_address,
                destination_address = excluded.destination_address,
                amount_drops = excluded.amount_drops,
                balance_drops = excluded.balance_drops,
                settle_delay_secs = excluded.settle_delay_secs,
                source_public_key = excluded.source_public_key,
                cancel_after = excluded.cancel_after,
                expiration = excluded.expiration,
                status = excluded.status,
                last_activity_at = excluded.last_activity_at",
        )
        .bind(peer_id)
        .bind(state.channel_id.to_hex())
        .bind(&state.source_address)
        .bind(&state.destination_address)
        .bind(state.amount_drops as i64)
        .bind(state.balance_drops as i64)
        .bind(state.settle_delay_secs as i64)
        .bind(state.source_public_key.to_wire_string())
        .bind(state.cancel_after)
        .bind(state.expiration)
        .bind(Self::status_str(state.status))
        .bind(last_activity_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn load(&self, peer_id: &str) -> Result<Option<(XrpChannelState, i64)>, SettlementError> {
        let row = sqlx::query("SELECT * FROM xrp_channels WHERE peer_id = ?")
            .bind(peer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.as_ref().map(Self::row_to_state).transpose()
    }

    async fn list_by_status(&self, status: XrpChannelStatus) -> Result<Vec<String>, SettlementError> {
        let rows = sqlx::query("SELECT peer_id FROM xrp_channels WHERE status = ?")
            .bind(Self::status_str(status))
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("peer_id").map_err(sqlx_err))
            .collect()
    }
}
