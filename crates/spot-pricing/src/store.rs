use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use spot_core::model::PricingSnapshot;

/// Raw/cleaned pricing store.
///
/// Raw rows are append-only audit trail; the cleaned store enforces the
/// one-row-per-`(pool, bucket)` invariant via [`PricingRepository::upsert_cleaned`].
#[async_trait]
pub trait PricingRepository: Send + Sync {
    async fn insert_raw(&self, snapshot: PricingSnapshot) -> anyhow::Result<()>;

    /// All raw reports received for `pool_id` at exactly `bucket`, in
    /// insertion order (oldest first) — used to pick the dedup winner.
    async fn raw_candidates(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PricingSnapshot>>;

    async fn get_cleaned(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
    ) -> anyhow::Result<Option<PricingSnapshot>>;

    /// Replace whatever cleaned row exists for `(pool, bucket)` with
    /// `snapshot`. Callers are responsible for having already picked the
    /// dedup winner; this is an unconditional upsert.
    async fn upsert_cleaned(&self, snapshot: PricingSnapshot) -> anyhow::Result<()>;

    /// Nearest non-interpolated cleaned row strictly before `bucket`,
    /// within `horizon`.
    async fn nearest_cleaned_before(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
        horizon: Duration,
    ) -> anyhow::Result<Option<PricingSnapshot>>;

    /// Nearest non-interpolated cleaned row strictly after `bucket`,
    /// within `horizon`.
    async fn nearest_cleaned_after(
        &self,
        pool_id: &str,
        bucket: DateTime<Utc>,
        horizon: Duration,
    ) -> anyhow::Result<Option<PricingSnapshot>>;

    /// Distinct pool ids seen in the raw store — the reconcile tick's
    /// per-pool worklist.
    async fn known_pools(&self) -> anyhow::Result<Vec<String>>;

    /// Most recent cleaned-store row for every pool whose id ends in
    /// `:{instance_type}` — used by the replica coordinator to compare
    /// prices across availability zones for a fixed instance type.
    async fn latest_by_type(&self, instance_type: &str) -> anyhow::Result<Vec<PricingSnapshot>>;
}
