use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use spot_core::model::{PriceSource, PricingSnapshot};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::PricingRepository;

struct RawRow {
    seq: u64,
    snapshot: PricingSnapshot,
}

#[derive(Default)]
struct Inner {
    raw: Vec<RawRow>,
    cleaned: HashMap<(String, DateTime<Utc>), PricingSnapshot>,
    next_seq: u64,
}

/// In-memory [`PricingRepository`] for tests and the reconciler's own
/// unit tests.
#[derive(Default)]
pub struct InMemoryPricingRepository {
    inner: Mutex<Inner>,
}

impl InMemoryPricingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PricingRepository for InMemoryPricingRepository {
    async fn insert_raw(&self, snapshot: PricingSnapshot) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.raw.push(RawRow { seq, snapshot });
        Ok(())
    }

    async fn raw_candidates(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PricingSnapshot>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<&RawRow> = inner
            .raw
            .iter()
            .filter(|r| r.snapshot.pool_id == pool_id && r.snapshot.time_bucket == bucket)
            .collect();
        rows.sort_by_key(|r| r.seq);
        Ok(rows.into_iter().map(|r| r.snapshot.clone()).collect())
    }

    async fn get_cleaned(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
    ) -> anyhow::Result<Option<PricingSnapshot>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.cleaned.get(&(pool_id.to_string(), bucket)).cloned())
    }

    async fn upsert_cleaned(&self, snapshot: PricingSnapshot) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .cleaned
            .insert((snapshot.pool_id.clone(), snapshot.time_bucket), snapshot);
        Ok(())
    }

    async fn nearest_cleaned_before(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
        horizon: Duration,
    ) -> anyhow::Result<Option<PricingSnapshot>> {
        let inner = self.inner.lock().unwrap();
        let floor = bucket - horizon;
        Ok(inner
            .cleaned
            .values()
            .filter(|s| {
                s.pool_id == pool_id
                    && s.source != PriceSource::Interpolated
                    && s.time_bucket < bucket
                    && s.time_bucket >= floor
            })
            .max_by_key(|s| s.time_bucket)
            .cloned())
    }

    async fn nearest_cleaned_after(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
        horizon: Duration,
    ) -> anyhow::Result<Option<PricingSnapshot>> {
        let inner = self.inner.lock().unwrap();
        let ceiling = bucket + horizon;
        Ok(inner
            .cleaned
            .values()
            .filter(|s| {
                s.pool_id == pool_id
                    && s.source != PriceSource::Interpolated
                    && s.time_bucket > bucket
                    && s.time_bucket <= ceiling
            })
            .min_by_key(|s| s.time_bucket)
            .cloned())
    }

    async fn known_pools(&self) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut pools: Vec<String> = inner
            .raw
            .iter()
            .map(|r| r.snapshot.pool_id.clone())
            .collect();
        pools.sort();
        pools.dedup();
        Ok(pools)
    }

    async fn latest_by_type(&self, instance_type: &str) -> anyhow::Result<Vec<PricingSnapshot>> {
        let inner = self.inner.lock().unwrap();
        let suffix = format!(":{instance_type}");
        let mut latest: HashMap<String, PricingSnapshot> = HashMap::new();
        for snapshot in inner.cleaned.values() {
            if !snapshot.pool_id.ends_with(&suffix) {
                continue;
            }
            latest
                .entry(snapshot.pool_id.clone())
                .and_modify(|existing| {
                    if snapshot.time_bucket > existing.time_bucket {
                        *existing = snapshot.clone();
                    }
                })
                .or_insert_with(|| snapshot.clone());
        }
        Ok(latest.into_values().collect())
    }
}
