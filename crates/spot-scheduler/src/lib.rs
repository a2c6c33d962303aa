//! The scheduler: spawns the four periodic jobs as
//! independent tasks, each with its own cadence and cooperative
//! cancellation via [`runner::Shutdown`].

pub mod jobs;
pub mod runner;

pub use jobs::TrackedPool;
pub use runner::{Shutdown, ShutdownSignal};

use std::sync::Arc;
use std::time::Duration;

use spot_pricing::{PricingRepository, Reconciler};
use spot_providers::PriceProvider;
use spot_replica::{ReplicaCoordinator, ReplicaStore};
use spot_risk::{GlobalRiskTracker, RiskRepository};
use tokio::task::JoinHandle;

const PRICE_SCRAPE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const RISK_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const RECONCILE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const REPLICA_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Spawns all four jobs and returns their join handles plus the
/// shutdown trigger. Dropping or triggering the returned [`Shutdown`]
/// stops every job at its next tick boundary.
pub fn spawn_all<PR, S, R>(
    pricing: Arc<PR>,
    price_provider: Arc<dyn PriceProvider>,
    tracked_pools: Vec<TrackedPool>,
    risk: Arc<GlobalRiskTracker<R>>,
    coordinator: Arc<ReplicaCoordinator<S, PR, R>>,
) -> (Shutdown, Vec<JoinHandle<()>>)
where
    PR: PricingRepository + 'static,
    S: ReplicaStore + 'static,
    R: RiskRepository + 'static,
{
    let (shutdown, signal) = Shutdown::new();
    let mut handles = Vec::new();

    {
        let pricing = pricing.clone();
        let price_provider = price_provider.clone();
        let pools = tracked_pools;
        let signal = signal.clone();
        handles.push(tokio::spawn(runner::run_periodic(
            "price_scrape",
            PRICE_SCRAPE_INTERVAL,
            signal,
            move || {
                let pricing = pricing.clone();
                let price_provider = price_provider.clone();
                let pools = pools.clone();
                async move { jobs::price_scrape(&pricing, &price_provider, &pools).await }
            },
        )));
    }

    {
        let risk = risk.clone();
        let signal = signal.clone();
        handles.push(tokio::spawn(runner::run_periodic(
            "risk_cleanup",
            RISK_CLEANUP_INTERVAL,
            signal,
            move || {
                let risk = risk.clone();
                async move { jobs::risk_cleanup(&risk).await }
            },
        )));
    }

    {
        let pricing = pricing.clone();
        let reconciler = Arc::new(Reconciler::new(pricing.clone()));
        let signal = signal.clone();
        handles.push(tokio::spawn(runner::run_periodic(
            "data_quality_reconcile",
            RECONCILE_INTERVAL,
            signal,
            move || {
                let pricing = pricing.clone();
                let reconciler = reconciler.clone();
                async move { jobs::data_quality_reconcile(&pricing, &*reconciler).await }
            },
        )));
    }

    {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(runner::run_periodic(
            "replica_coordinator_tick",
            REPLICA_TICK_INTERVAL,
            signal,
            move || {
                let coordinator = coordinator.clone();
                async move { jobs::replica_tick(&coordinator).await }
            },
        )));
    }

    (shutdown, handles)
}
