//! Individual periodic jobs. Each job takes a single tick
//! and either completes or yields; the runner in [`crate::runner`]
//! decides whether a slow tick skips the next one.

use std::sync::Arc;

use chrono::Utc;
use spot_core::model::floor_to_5min;
use spot_core::model::{PriceSource, PricingSnapshot};
use spot_pricing::{PricingRepository, Reconciler};
use spot_providers::PriceProvider;
use spot_replica::{ReplicaCoordinator, ReplicaStore};
use spot_risk::{GlobalRiskTracker, RiskRepository};
use tracing::{debug, warn};

/// One `(instance_type, availability_zone)` pair the scraper tracks.
/// Pool ids are derived as `"{az}:{instance_type}"`.
#[derive(Debug, Clone)]
pub struct TrackedPool {
    pub instance_type: String,
    pub availability_zone: String,
}

/// Price scrape job (every 5 min per region). Pulls current
/// spot/on-demand prices for every tracked pool and writes them to the
/// raw store as `source = Scrape` for the reconcile job to fold in.
pub async fn price_scrape<PR: PricingRepository>(
    pricing: &Arc<PR>,
    price_provider: &Arc<dyn PriceProvider>,
    pools: &[TrackedPool],
) {
    let now = floor_to_5min(Utc::now());
    for pool in pools {
        let spot = match price_provider
            .spot(&pool.instance_type, &pool.availability_zone)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                debug!(instance_type = %pool.instance_type, az = %pool.availability_zone, error = %e, "price scrape: no spot price");
                continue;
            }
        };
        let on_demand = match price_provider.on_demand(&pool.instance_type).await {
            Ok(p) => p,
            Err(e) => {
                debug!(instance_type = %pool.instance_type, error = %e, "price scrape: no on-demand price");
                continue;
            }
        };

        let snapshot = PricingSnapshot {
            pool_id: format!("{}:{}", pool.availability_zone, pool.instance_type),
            time_bucket: now,
            spot_price: spot,
            on_demand_price: on_demand,
            confidence: 1.0,
            source: PriceSource::Scrape,
        };
        if let Err(e) = pricing.insert_raw(snapshot).await {
            warn!(error = %e, "price scrape: failed to store raw snapshot");
        }
    }
}

/// Risk cleanup job (daily; idempotent, concurrency-safe).
pub async fn risk_cleanup<R: RiskRepository>(risk: &Arc<GlobalRiskTracker<R>>) {
    if let Err(e) = risk.cleanup(Utc::now()).await {
        warn!(error = %e, "risk cleanup failed");
    }
}

/// Data-quality reconcile job (every 5 min per active pool).
pub async fn data_quality_reconcile<PR: PricingRepository>(
    pricing: &Arc<PR>,
    reconciler: &Reconciler<PR>,
) {
    let pools = match pricing.known_pools().await {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "reconcile: failed to list known pools");
            return;
        }
    };
    let now = Utc::now();
    for pool_id in pools {
        if let Err(e) = reconciler.reconcile_pool(&pool_id, now).await {
            warn!(pool_id, error = %e, "reconcile failed for pool");
        }
    }
}

/// Replica coordinator tick (every 10s).
pub async fn replica_tick<S, P, R>(coordinator: &ReplicaCoordinator<S, P, R>)
where
    S: ReplicaStore,
    P: PricingRepository,
    R: RiskRepository,
{
    if let Err(e) = coordinator.tick(Utc::now()).await {
        warn!(error = %e, "replica coordinator tick failed");
    }
}
