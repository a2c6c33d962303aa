use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use spot_core::config::AppConfig;
use spot_database::{AgentRegistry, CommandQueue, DatabaseConnection, MigrationManager};
use spot_pricing::PostgresPricingRepository;
use spot_replica::{PostgresReplicaStore, ReplicaCoordinator};
use spot_risk::{GlobalRiskTracker, PostgresRiskRepository};

pub type Coordinator =
    ReplicaCoordinator<PostgresReplicaStore, PostgresPricingRepository, PostgresRiskRepository>;

/// Shared handles every RPC handler needs. Constructed once in `main`
/// and held behind an `Arc` by the router.
pub struct AppState {
    pub config: AppConfig,
    pub agents: AgentRegistry,
    pub commands: CommandQueue,
    pub pricing: Arc<PostgresPricingRepository>,
    pub risk: Arc<GlobalRiskTracker<PostgresRiskRepository>>,
    pub coordinator: Arc<Coordinator>,
    pub db: sqlx::PgPool,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub async fn new(config: AppConfig, metrics_handle: PrometheusHandle) -> anyhow::Result<Self> {
        let conn =
            DatabaseConnection::new(&config.database.url, config.database.max_connections).await?;
        let pool = conn.pool.clone();

        MigrationManager::new(pool.clone()).migrate().await?;

        let pricing = Arc::new(PostgresPricingRepository::new(pool.clone()));
        let risk = Arc::new(GlobalRiskTracker::new(PostgresRiskRepository::new(pool.clone())));
        let replica_store = Arc::new(PostgresReplicaStore::new(pool.clone()));
        let recovery_window = chrono::Duration::seconds(config.agent.ready_timeout_secs as i64);
        let coordinator = Arc::new(ReplicaCoordinator::new(
            replica_store,
            pricing.clone(),
            risk.clone(),
            recovery_window,
        ));

        Ok(Self {
            agents: AgentRegistry::new(pool.clone()),
            commands: CommandQueue::new(pool.clone()),
            pricing,
            risk,
            coordinator,
            db: pool,
            config,
            metrics_handle,
        })
    }
}
