//! Dedup-by-confidence and 24h gap-fill interpolation.

use chrono::{DateTime, Duration, Utc};
use spot_core::model::{PriceSource, PricingSnapshot};
use std::sync::Arc;
use tracing::debug;

use crate::store::PricingRepository;

const BUCKET: Duration = Duration::minutes(5);
const GAP_FILL_HORIZON_BUCKETS: i64 = 24 * 60 / 5; // 24h at 5-min granularity

/// Confidence assigned to a linear interpolation (both anchors present).
const LINEAR_CONFIDENCE: f64 = 0.7;
/// Confidence assigned to a carry-forward/carry-back fill (one anchor only).
const CARRY_CONFIDENCE: f64 = 0.5;

pub struct Reconciler<R: PricingRepository> {
    repo: Arc<R>,
}

impl<R: PricingRepository> Reconciler<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Run one reconcile tick for `pool_id` as of `now`: dedup the
    /// current bucket, then fill any gaps in the trailing 24h window.
    pub async fn reconcile_pool(&self, pool_id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        let current_bucket = spot_core::model::floor_to_5min(now);
        self.dedup_bucket(pool_id, current_bucket).await?;
        self.fill_gaps(pool_id, current_bucket).await?;
        Ok(())
    }

    /// Pick the dedup winner among all raw reports for `(pool_id,
    /// bucket)` — highest confidence, ties broken by insertion order —
    /// and write it as the sole cleaned row for that bucket.
    async fn dedup_bucket(&self, pool_id: &str, bucket: DateTime<Utc>) -> anyhow::Result<()> {
        let candidates = self.repo.raw_candidates(pool_id, bucket).await?;
        let Some(winner) = pick_winner(&candidates) else {
            return Ok(());
        };
        self.repo.upsert_cleaned(winner.clone()).await?;
        debug!(
            pool_id,
            bucket = %bucket,
            confidence = winner.confidence,
            candidates = candidates.len(),
            "dedup winner written to cleaned store"
        );
        Ok(())
    }

    /// Walk the trailing 24h of buckets (oldest first) and interpolate
    /// any that are missing from the cleaned store.
    async fn fill_gaps(&self, pool_id: &str, current_bucket: DateTime<Utc>) -> anyhow::Result<()> {
        for offset in (1..=GAP_FILL_HORIZON_BUCKETS).rev() {
            let bucket = current_bucket - BUCKET * offset as i32;
            if self.repo.get_cleaned(pool_id, bucket).await?.is_some() {
                continue;
            }

            let horizon = Duration::hours(24);
            let before = self
                .repo
                .nearest_cleaned_before(pool_id, bucket, horizon)
                .await?;
            let after = self
                .repo
                .nearest_cleaned_after(pool_id, bucket, horizon)
                .await?;

            if let Some(filled) = interpolate(pool_id, bucket, before.as_ref(), after.as_ref()) {
                self.repo.upsert_cleaned(filled).await?;
            }
        }
        Ok(())
    }
}

/// Highest confidence wins; on tie, the first element wins (callers pass
/// candidates in insertion order).
fn pick_winner(candidates: &[PricingSnapshot]) -> Option<&PricingSnapshot> {
    candidates.iter().fold(None, |best, cand| match best {
        None => Some(cand),
        Some(b) if cand.confidence > b.confidence => Some(cand),
        Some(b) => Some(b),
    })
}

fn interpolate(
    pool_id: &str,
    bucket: DateTime<Utc>,
    before: Option<&PricingSnapshot>,
    after: Option<&PricingSnapshot>,
) -> Option<PricingSnapshot> {
    match (before, after) {
        (Some(b), Some(a)) => {
            let span = (a.time_bucket - b.time_bucket).num_seconds() as f64;
            let weight = if span > 0.0 {
                (bucket - b.time_bucket).num_seconds() as f64 / span
            } else {
                0.0
            };
            let lerp = |x: f64, y: f64| x + (y - x) * weight;
            Some(PricingSnapshot {
                pool_id: pool_id.to_string(),
                time_bucket: bucket,
                spot_price: lerp(b.spot_price, a.spot_price),
                on_demand_price: lerp(b.on_demand_price, a.on_demand_price),
                confidence: LINEAR_CONFIDENCE,
                source: PriceSource::Interpolated,
            })
        }
        (Some(b), None) => Some(PricingSnapshot {
            pool_id: pool_id.to_string(),
            time_bucket: bucket,
            spot_price: b.spot_price,
            on_demand_price: b.on_demand_price,
            confidence: CARRY_CONFIDENCE,
            source: PriceSource::Interpolated,
        }),
        (None, Some(a)) => Some(PricingSnapshot {
            pool_id: pool_id.to_string(),
            time_bucket: bucket,
            spot_price: a.spot_price,
            on_demand_price: a.on_demand_price,
            confidence: CARRY_CONFIDENCE,
            source: PriceSource::Interpolated,
        }),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPricingRepository;

    fn snapshot(pool: &str, bucket: DateTime<Utc>, spot: f64, confidence: f64) -> PricingSnapshot {
        PricingSnapshot {
            pool_id: pool.to_string(),
            time_bucket: bucket,
            spot_price: spot,
            on_demand_price: spot * 3.0,
            confidence,
            source: PriceSource::Agent,
        }
    }

    #[tokio::test]
    async fn dedup_prefers_highest_confidence() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let now = spot_core::model::floor_to_5min(Utc::now());
        repo.insert_raw(snapshot("us-east-1a:c5.large", now, 0.10, 0.6))
            .await
            .unwrap();
        repo.insert_raw(snapshot("us-east-1a:c5.large", now, 0.12, 0.9))
            .await
            .unwrap();

        let reconciler = Reconciler::new(repo.clone());
        reconciler
            .reconcile_pool("us-east-1a:c5.large", now)
            .await
            .unwrap();

        let cleaned = repo
            .get_cleaned("us-east-1a:c5.large", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleaned.spot_price, 0.12);
    }

    #[tokio::test]
    async fn dedup_tie_keeps_first_inserted() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let now = spot_core::model::floor_to_5min(Utc::now());
        repo.insert_raw(snapshot("us-east-1a:c5.large", now, 0.10, 0.8))
            .await
            .unwrap();
        repo.insert_raw(snapshot("us-east-1a:c5.large", now, 0.99, 0.8))
            .await
            .unwrap();

        let reconciler = Reconciler::new(repo.clone());
        reconciler
            .reconcile_pool("us-east-1a:c5.large", now)
            .await
            .unwrap();

        let cleaned = repo
            .get_cleaned("us-east-1a:c5.large", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleaned.spot_price, 0.10);
    }

    #[tokio::test]
    async fn gap_fill_interpolates_between_anchors() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let now = spot_core::model::floor_to_5min(Utc::now());
        let earlier = now - BUCKET * 2;
        repo.upsert_cleaned(snapshot("pool", earlier, 0.10, 1.0))
            .await
            .unwrap();
        repo.insert_raw(snapshot("pool", now, 0.20, 1.0))
            .await
            .unwrap();

        let reconciler = Reconciler::new(repo.clone());
        reconciler.reconcile_pool("pool", now).await.unwrap();

        let missing_bucket = now - BUCKET;
        let filled = repo
            .get_cleaned("pool", missing_bucket)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(filled.source, PriceSource::Interpolated);
        assert!((filled.spot_price - 0.15).abs() < 1e-9);
        assert_eq!(filled.confidence, LINEAR_CONFIDENCE);
    }

    #[tokio::test]
    async fn gap_fill_carries_forward_when_only_earlier_anchor() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let now = spot_core::model::floor_to_5min(Utc::now());
        let earlier = now - BUCKET * 3;
        repo.upsert_cleaned(snapshot("pool", earlier, 0.42, 1.0))
            .await
            .unwrap();

        let reconciler = Reconciler::new(repo.clone());
        reconciler.reconcile_pool("pool", now).await.unwrap();

        let filled = repo
            .get_cleaned("pool", now - BUCKET)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(filled.spot_price, 0.42);
        assert_eq!(filled.confidence, CARRY_CONFIDENCE);
    }
}
