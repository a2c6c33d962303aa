//! Global risk tracker: append-only pool-event log with a 15-day TTL and
//! a fast `is_pool_safe` lookup. "Herd immunity" — one
//! tenant's production interruption quarantines the pool for everyone.

mod memory;
mod postgres;

pub use memory::InMemoryRiskRepository;
pub use postgres::PostgresRiskRepository;

use async_trait::async_trait;
use spot_core::model::{Environment, RiskEvent, RiskEventKind, RiskEventMetadata};
use spot_core::{Error, PoolId};

/// Storage contract for the risk event log. Implementations never update
/// a row once inserted; `cleanup` only deletes expired ones.
#[async_trait]
pub trait RiskRepository: Send + Sync {
    async fn insert(&self, event: &RiskEvent) -> Result<(), Error>;

    async fn active_events(&self, pool: &PoolId) -> Result<Vec<RiskEvent>, Error>;

    /// Deletes rows with `expires_at <= now`. Idempotent, safe to run
    /// concurrently with readers and writers.
    async fn cleanup(&self, now: chrono::DateTime<chrono::Utc>) -> Result<u64, Error>;
}

/// Gatekeeper every pipeline filter stage consults before accepting a
/// candidate pool.
pub struct GlobalRiskTracker<R: RiskRepository> {
    repo: R,
}

impl<R: RiskRepository> GlobalRiskTracker<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Fire-and-forget write path. Interruptions reported by a LAB
    /// environment account are dropped — only PROD interruptions poison
    /// the pool, per the herd-immunity design. Never blocks the caller
    /// on a slow write; callers should spawn this rather than await it
    /// inline on a latency-sensitive path.
    pub async fn register_event(
        &self,
        pool: PoolId,
        kind: RiskEventKind,
        source_environment: Environment,
        source_tenant: Option<uuid::Uuid>,
        metadata: RiskEventMetadata,
    ) -> Result<(), Error> {
        if source_environment != Environment::Prod {
            tracing::debug!(%pool, "lab-mode interruption, not poisoning pool");
            return Ok(());
        }

        let event = RiskEvent::new(pool, kind, source_tenant, metadata);
        self.repo.insert(&event).await
    }

    /// Read path: `false` iff at least one non-expired event exists for
    /// the pool.
    pub async fn is_pool_safe(&self, pool: &PoolId) -> Result<(bool, Vec<RiskEvent>), Error> {
        let active = self.repo.active_events(pool).await?;
        Ok((active.is_empty(), active))
    }

    pub async fn cleanup(&self, now: chrono::DateTime<chrono::Utc>) -> Result<u64, Error> {
        self.repo.cleanup(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn lab_interruption_does_not_poison() {
        let tracker = GlobalRiskTracker::new(InMemoryRiskRepository::default());
        let pool: PoolId = "us-east-1a:c5.large".parse().unwrap();

        tracker
            .register_event(
                pool.clone(),
                RiskEventKind::TerminationNotice,
                Environment::Lab,
                None,
                RiskEventMetadata::new("SPOT_INTERRUPTION", None),
            )
            .await
            .unwrap();

        let (safe, events) = tracker.is_pool_safe(&pool).await.unwrap();
        assert!(safe);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn prod_interruption_poisons_until_ttl() {
        let tracker = GlobalRiskTracker::new(InMemoryRiskRepository::default());
        let pool: PoolId = "us-east-1a:c5.large".parse().unwrap();

        tracker
            .register_event(
                pool.clone(),
                RiskEventKind::TerminationNotice,
                Environment::Prod,
                None,
                RiskEventMetadata::new("SPOT_INTERRUPTION", None),
            )
            .await
            .unwrap();

        let (safe, events) = tracker.is_pool_safe(&pool).await.unwrap();
        assert!(!safe);
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn expires_at_equal_now_is_expired() {
        let repo = InMemoryRiskRepository::default();
        let pool: PoolId = "us-east-1a:c5.large".parse().unwrap();
        let reported_at = chrono::Utc::now() - Duration::days(15);
        let event = RiskEvent::new_at(
            pool.clone(),
            RiskEventKind::RebalanceNotice,
            None,
            RiskEventMetadata::new("REBALANCE_RECOMMENDATION", None),
            reported_at,
        );
        repo.insert(&event).await.unwrap();

        let tracker = GlobalRiskTracker::new(repo);
        let (safe, _) = tracker.is_pool_safe(&pool).await.unwrap();
        assert!(safe, "event expiring exactly now must be treated as expired");
    }
}
