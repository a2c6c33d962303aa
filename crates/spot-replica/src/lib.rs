//! Replica coordinator: emergency failover orchestration for
//! auto-switch agents and standby maintenance for manual-replica agents.

pub mod coordinator;
pub mod memory;
pub mod postgres;
pub mod store;

pub use coordinator::{RebalanceOutcome, ReplicaCoordinator, TerminationOutcome};
pub use memory::InMemoryReplicaStore;
pub use postgres::PostgresReplicaStore;
pub use store::ReplicaStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use spot_core::model::{
        Agent, AgentStatus, Instance, Lifecycle, PipelineMode, PriceSource, PricingSnapshot,
        Replica, ReplicaStatus, ReplicaType,
    };
    use spot_pricing::InMemoryPricingRepository;
    use spot_risk::{GlobalRiskTracker, InMemoryRiskRepository};
    use std::sync::Arc;
    use uuid::Uuid;

    fn make_agent(instance_id: Uuid, auto_switch: bool, manual: bool) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            instance_id,
            client_token: "tok".to_string(),
            last_heartbeat_at: Some(Utc::now()),
            status: AgentStatus::Online,
            current_replica_id: None,
            auto_switch_enabled: auto_switch,
            manual_replica_enabled: manual,
            switching_threshold: 0.85,
            interruption_handled_count: 0,
        }
    }

    fn make_instance(id: Uuid, pool: &str) -> Instance {
        let parsed: spot_core::PoolId = pool.parse().unwrap();
        Instance {
            id,
            account_id: Uuid::new_v4(),
            cloud_instance_id: "i-123".to_string(),
            instance_type: parsed.instance_type().to_string(),
            availability_zone: parsed.availability_zone().to_string(),
            region: parsed.region().to_string(),
            lifecycle: Lifecycle::Spot,
            current_pool_id: Some(pool.to_string()),
            pipeline_mode: PipelineMode::Linear,
            cluster: None,
            node_group: None,
            risk_model_id: None,
            shadow_mode: false,
            is_active: true,
            installed_at: Utc::now(),
        }
    }

    async fn seed_price(pricing: &InMemoryPricingRepository, pool: &str, price: f64) {
        pricing
            .upsert_cleaned(PricingSnapshot {
                pool_id: pool.to_string(),
                time_bucket: Utc::now(),
                spot_price: price,
                on_demand_price: price * 3.0,
                confidence: 1.0,
                source: PriceSource::Agent,
            })
            .await
            .unwrap();
    }

    fn setup() -> (
        Arc<InMemoryReplicaStore>,
        Arc<InMemoryPricingRepository>,
        Arc<GlobalRiskTracker<InMemoryRiskRepository>>,
    ) {
        (
            Arc::new(InMemoryReplicaStore::new()),
            Arc::new(InMemoryPricingRepository::new()),
            Arc::new(GlobalRiskTracker::new(InMemoryRiskRepository::default())),
        )
    }

    #[tokio::test]
    async fn rebalance_creates_replica_in_cheapest_other_pool() {
        let (store, pricing, risk) = setup();
        use spot_pricing::PricingRepository;

        let instance_id = Uuid::new_v4();
        let instance = make_instance(instance_id, "us-east-1a:c5.large");
        store.put_instance(instance);
        let agent = make_agent(instance_id, true, false);
        let agent_id = agent.id;
        store.put_agent(agent);

        seed_price(&pricing, "us-east-1a:c5.large", 0.10).await;
        seed_price(&pricing, "us-east-1b:c5.large", 0.08).await;
        seed_price(&pricing, "us-east-1c:c5.large", 0.09).await;

        let coordinator = ReplicaCoordinator::new(store, pricing, risk, Duration::hours(2));
        let outcome = coordinator
            .on_rebalance(agent_id, Utc::now())
            .await
            .unwrap();

        match outcome {
            RebalanceOutcome::ReplicaCreated { pool_id, .. } => {
                assert_eq!(pool_id, "us-east-1b:c5.large");
            }
            other => panic!("expected ReplicaCreated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rebalance_excludes_poisoned_pools() {
        let (store, pricing, risk) = setup();
        use spot_pricing::PricingRepository;

        let instance_id = Uuid::new_v4();
        store.put_instance(make_instance(instance_id, "us-east-1a:c5.large"));
        let agent = make_agent(instance_id, true, false);
        let agent_id = agent.id;
        store.put_agent(agent);

        seed_price(&pricing, "us-east-1a:c5.large", 0.10).await;
        seed_price(&pricing, "us-east-1b:c5.large", 0.01).await;
        seed_price(&pricing, "us-east-1c:c5.large", 0.09).await;

        risk.register_event(
            "us-east-1b:c5.large".parse().unwrap(),
            spot_core::model::RiskEventKind::TerminationNotice,
            spot_core::model::Environment::Prod,
            None,
            spot_core::model::RiskEventMetadata::new("SPOT_INTERRUPTION", None),
        )
        .await
        .unwrap();

        let coordinator = ReplicaCoordinator::new(store, pricing, risk, Duration::hours(2));
        let outcome = coordinator
            .on_rebalance(agent_id, Utc::now())
            .await
            .unwrap();

        match outcome {
            RebalanceOutcome::ReplicaCreated { pool_id, .. } => {
                assert_eq!(pool_id, "us-east-1c:c5.large");
            }
            other => panic!("expected ReplicaCreated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn termination_promotes_ready_replica() {
        let (store, pricing, risk) = setup();

        let instance_id = Uuid::new_v4();
        store.put_instance(make_instance(instance_id, "us-east-1a:c5.large"));
        let mut agent = make_agent(instance_id, true, false);
        let replica_id = Uuid::new_v4();
        agent.current_replica_id = Some(replica_id);
        let agent_id = agent.id;
        store.put_agent(agent);

        store
            .insert_replica(Replica {
                id: replica_id,
                parent_instance_id: instance_id,
                pool_id: "us-east-1b:c5.large".to_string(),
                status: ReplicaStatus::Ready,
                replica_type: ReplicaType::AutomaticRebalance,
                sync_progress: 1.0,
                hourly_cost: 0.08,
                created_by: "coordinator".to_string(),
                is_active: true,
                promoted_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let coordinator = ReplicaCoordinator::new(store.clone(), pricing, risk, Duration::hours(2));
        let outcome = coordinator
            .on_termination(agent_id, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, TerminationOutcome::Promoted { replica_id });
        let updated_agent = store.agent(agent_id).await.unwrap().unwrap();
        assert_eq!(updated_agent.current_replica_id, None);
        assert_eq!(updated_agent.interruption_handled_count, 1);
    }

    #[tokio::test]
    async fn termination_promotion_is_idempotent() {
        let (store, pricing, risk) = setup();

        let instance_id = Uuid::new_v4();
        store.put_instance(make_instance(instance_id, "us-east-1a:c5.large"));
        let mut agent = make_agent(instance_id, true, false);
        let replica_id = Uuid::new_v4();
        agent.current_replica_id = Some(replica_id);
        let agent_id = agent.id;
        store.put_agent(agent);

        store
            .insert_replica(Replica {
                id: replica_id,
                parent_instance_id: instance_id,
                pool_id: "us-east-1b:c5.large".to_string(),
                status: ReplicaStatus::Promoted,
                replica_type: ReplicaType::AutomaticRebalance,
                sync_progress: 1.0,
                hourly_cost: 0.08,
                created_by: "coordinator".to_string(),
                is_active: true,
                promoted_at: Some(Utc::now()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let coordinator = ReplicaCoordinator::new(store, pricing, risk, Duration::hours(2));
        let outcome = coordinator
            .on_termination(agent_id, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, TerminationOutcome::AlreadyPromoted { replica_id });
    }

    #[tokio::test]
    async fn manual_mode_keeps_newest_and_terminates_extras() {
        let (store, pricing, risk) = setup();

        let instance_id = Uuid::new_v4();
        store.put_instance(make_instance(instance_id, "us-east-1a:c5.large"));
        let agent = make_agent(instance_id, false, true);
        store.put_agent(agent.clone());

        let older = Replica {
            id: Uuid::new_v4(),
            parent_instance_id: instance_id,
            pool_id: "us-east-1b:c5.large".to_string(),
            status: ReplicaStatus::Launching,
            replica_type: ReplicaType::Manual,
            sync_progress: 0.0,
            hourly_cost: 0.08,
            created_by: "coordinator".to_string(),
            is_active: true,
            promoted_at: None,
            created_at: Utc::now() - Duration::minutes(10),
        };
        let newer = Replica {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            ..older.clone()
        };
        let newer_id = newer.id;
        store.insert_replica(older.clone()).await.unwrap();
        store.insert_replica(newer).await.unwrap();

        let coordinator = ReplicaCoordinator::new(store.clone(), pricing, risk, Duration::hours(2));
        coordinator.tick(Utc::now()).await.unwrap();

        let old = store.replica(older.id).await.unwrap().unwrap();
        assert_eq!(old.status, ReplicaStatus::Terminated);
        let kept = store.replica(newer_id).await.unwrap().unwrap();
        assert_eq!(kept.status, ReplicaStatus::Launching);
    }
}
