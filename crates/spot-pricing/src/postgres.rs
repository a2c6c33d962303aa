use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use spot_core::model::{PriceSource, PricingSnapshot};
use sqlx::{PgPool, Row};

use crate::store::PricingRepository;

pub struct PostgresPricingRepository(PgPool);

impl PostgresPricingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }
}

fn source_to_str(s: PriceSource) -> &'static str {
    match s {
        PriceSource::Agent => "agent",
        PriceSource::Scrape => "scrape",
        PriceSource::Interpolated => "interpolated",
    }
}

fn source_from_str(s: &str) -> PriceSource {
    match s {
        "agent" => PriceSource::Agent,
        "scrape" => PriceSource::Scrape,
        _ => PriceSource::Interpolated,
    }
}

fn row_to_snapshot(row: &sqlx::postgres::PgRow) -> PricingSnapshot {
    PricingSnapshot {
        pool_id: row.get("pool_id"),
        time_bucket: row.get("time_bucket"),
        spot_price: row.get("spot_price"),
        on_demand_price: row.get("on_demand_price"),
        confidence: row.get("confidence"),
        source: source_from_str(row.get("source")),
    }
}

#[async_trait]
impl PricingRepository for PostgresPricingRepository {
    async fn insert_raw(&self, snapshot: PricingSnapshot) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pricing_snapshots_raw
            (pool_id, time_bucket, spot_price, on_demand_price, confidence, source)
            VALUES ($1, $2, $3, $4, $5, $6::price_source_type)
            "#,
        )
        .bind(&snapshot.pool_id)
        .bind(snapshot.time_bucket)
        .bind(snapshot.spot_price)
        .bind(snapshot.on_demand_price)
        .bind(snapshot.confidence)
        .bind(source_to_str(snapshot.source))
        .execute(&self.0)
        .await?;
        Ok(())
    }

    async fn raw_candidates(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PricingSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT pool_id, time_bucket, spot_price, on_demand_price, confidence, source::text as source
            FROM pricing_snapshots_raw
            WHERE pool_id = $1 AND time_bucket = $2
            ORDER BY id ASC
            "#,
        )
        .bind(pool_id)
        .bind(bucket)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.iter().map(row_to_snapshot).collect())
    }

    async fn get_cleaned(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
    ) -> anyhow::Result<Option<PricingSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT pool_id, time_bucket, spot_price, on_demand_price, confidence, source::text as source
            FROM pricing_snapshots
            WHERE pool_id = $1 AND time_bucket = $2
            "#,
        )
        .bind(pool_id)
        .bind(bucket)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn upsert_cleaned(&self, snapshot: PricingSnapshot) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pricing_snapshots
            (pool_id, time_bucket, spot_price, on_demand_price, confidence, source)
            VALUES ($1, $2, $3, $4, $5, $6::price_source_type)
            ON CONFLICT (pool_id, time_bucket) DO UPDATE SET
                spot_price = EXCLUDED.spot_price,
                on_demand_price = EXCLUDED.on_demand_price,
                confidence = EXCLUDED.confidence,
                source = EXCLUDED.source
            "#,
        )
        .bind(&snapshot.pool_id)
        .bind(snapshot.time_bucket)
        .bind(snapshot.spot_price)
        .bind(snapshot.on_demand_price)
        .bind(snapshot.confidence)
        .bind(source_to_str(snapshot.source))
        .execute(&self.0)
        .await?;
        Ok(())
    }

    async fn nearest_cleaned_before(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
        horizon: Duration,
    ) -> anyhow::Result<Option<PricingSnapshot>> {
        let floor = bucket - horizon;
        let row = sqlx::query(
            r#"
            SELECT pool_id, time_bucket, spot_price, on_demand_price, confidence, source::text as source
            FROM pricing_snapshots
            WHERE pool_id = $1 AND time_bucket < $2 AND time_bucket >= $3 AND source != 'interpolated'
            ORDER BY time_bucket DESC
            LIMIT 1
            "#,
        )
        .bind(pool_id)
        .bind(bucket)
        .bind(floor)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn nearest_cleaned_after(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
        horizon: Duration,
    ) -> anyhow::Result<Option<PricingSnapshot>> {
        let ceiling = bucket + horizon;
        let row = sqlx::query(
            r#"
            SELECT pool_id, time_bucket, spot_price, on_demand_price, confidence, source::text as source
            FROM pricing_snapshots
            WHERE pool_id = $1 AND time_bucket > $2 AND time_bucket <= $3 AND source != 'interpolated'
            ORDER BY time_bucket ASC
            LIMIT 1
            "#,
        )
        .bind(pool_id)
        .bind(bucket)
        .bind(ceiling)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn known_pools(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT pool_id FROM pricing_snapshots_raw")
            .fetch_all(&self.0)
            .await?;
        Ok(rows.iter().map(|r| r.get("pool_id")).collect())
    }

    async fn latest_by_type(&self, instance_type: &str) -> anyhow::Result<Vec<PricingSnapshot>> {
        let suffix = format!(":{instance_type}");
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (pool_id)
                pool_id, time_bucket, spot_price, on_demand_price, confidence, source::text as source
            FROM pricing_snapshots
            WHERE pool_id LIKE '%' || $1
            ORDER BY pool_id, time_bucket DESC
            "#,
        )
        .bind(&suffix)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.iter().map(row_to_snapshot).collect())
    }
}
