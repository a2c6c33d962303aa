//! `sqlx`-backed `RiskRepository`. Indexed on `(pool_id, expires_at)` per
//! the storage contract above.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use spot_core::model::{RiskEvent, RiskEventKind, RiskEventMetadata};
use spot_core::{Error, PoolId};

use crate::RiskRepository;

pub struct PostgresRiskRepository {
    pool: PgPool,
}

impl PostgresRiskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn kind_to_str(kind: RiskEventKind) -> &'static str {
    match kind {
        RiskEventKind::RebalanceNotice => "rebalance_notice",
        RiskEventKind::TerminationNotice => "termination_notice",
    }
}

fn kind_from_str(s: &str) -> Result<RiskEventKind, Error> {
    match s {
        "rebalance_notice" => Ok(RiskEventKind::RebalanceNotice),
        "termination_notice" => Ok(RiskEventKind::TerminationNotice),
        other => Err(Error::Internal(format!("unknown risk event kind {other}"))),
    }
}

#[async_trait]
impl RiskRepository for PostgresRiskRepository {
    async fn insert(&self, event: &RiskEvent) -> Result<(), Error> {
        let metadata = serde_json::to_value(&event.metadata)
            .map_err(|e| Error::Internal(format!("serialize risk event metadata: {e}")))?;

        sqlx::query(
            "INSERT INTO risk_events
             (id, pool_id, kind, reported_at, expires_at, source_tenant, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.id)
        .bind(&event.pool_id)
        .bind(kind_to_str(event.kind))
        .bind(event.reported_at)
        .bind(event.expires_at)
        .bind(event.source_tenant)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::TransientUpstream(format!("insert risk event: {e}")))?;

        Ok(())
    }

    async fn active_events(&self, pool: &PoolId) -> Result<Vec<RiskEvent>, Error> {
        let pool_id = pool.to_string();
        let now = Utc::now();

        let rows = sqlx::query(
            "SELECT id, pool_id, kind, reported_at, expires_at, source_tenant, metadata
             FROM risk_events
             WHERE pool_id = $1 AND expires_at > $2",
        )
        .bind(&pool_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::TransientUpstream(format!("query active risk events: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let metadata: serde_json::Value = row
                    .try_get("metadata")
                    .map_err(|e| Error::Internal(e.to_string()))?;
                let metadata: RiskEventMetadata = serde_json::from_value(metadata)
                    .map_err(|e| Error::Internal(format!("deserialize risk event metadata: {e}")))?;
                let kind_str: String = row
                    .try_get("kind")
                    .map_err(|e| Error::Internal(e.to_string()))?;

                Ok(RiskEvent {
                    id: row.try_get("id").map_err(|e| Error::Internal(e.to_string()))?,
                    pool_id: row
                        .try_get("pool_id")
                        .map_err(|e| Error::Internal(e.to_string()))?,
                    kind: kind_from_str(&kind_str)?,
                    reported_at: row
                        .try_get("reported_at")
                        .map_err(|e| Error::Internal(e.to_string()))?,
                    expires_at: row
                        .try_get("expires_at")
                        .map_err(|e| Error::Internal(e.to_string()))?,
                    source_tenant: row
                        .try_get("source_tenant")
                        .map_err(|e| Error::Internal(e.to_string()))?,
                    metadata,
                })
            })
            .collect()
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM risk_events WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::TransientUpstream(format!("cleanup risk events: {e}")))?;

        Ok(result.rows_affected())
    }
}
