//! Emergency and manual replica orchestration.

use chrono::{DateTime, Duration, Utc};
use spot_core::model::{Agent, Replica, ReplicaStatus, ReplicaType};
use spot_core::PoolId;
use spot_pricing::PricingRepository;
use spot_risk::{GlobalRiskTracker, RiskRepository};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::ReplicaStore;

/// Promotion threshold for a `Syncing` replica: sync progress above 50%
/// is close enough to promote under time pressure.
const SYNC_PROMOTE_FLOOR: f64 = 0.5;

/// A manual promotion is considered "recent" (and thus needs a fresh
/// standby created) within this window of the tick that observes it.
const MANUAL_PROMOTION_LOOKBACK: Duration = Duration::minutes(5);

#[derive(Debug, Clone, PartialEq)]
pub enum RebalanceOutcome {
    ReplicaCreated { replica_id: Uuid, pool_id: String },
    ReplicaAlreadyExists { replica_id: Uuid, status: ReplicaStatus },
    NoSafePool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminationOutcome {
    Promoted { replica_id: Uuid },
    AlreadyPromoted { replica_id: Uuid },
    EmergencyCreateAndPromoteFailed,
    UnknownAgent,
}

/// Server-side loop (10s cadence) that ensures replicas exist ahead of
/// rebalance events, promotes them on termination, and maintains the
/// manual-replica invariant.
pub struct ReplicaCoordinator<S, P, R>
where
    S: ReplicaStore,
    P: PricingRepository,
    R: RiskRepository,
{
    store: Arc<S>,
    pricing: Arc<P>,
    risk: Arc<GlobalRiskTracker<R>>,
    recovery_window: Duration,
}

impl<S, P, R> ReplicaCoordinator<S, P, R>
where
    S: ReplicaStore,
    P: PricingRepository,
    R: RiskRepository,
{
    pub fn new(
        store: Arc<S>,
        pricing: Arc<P>,
        risk: Arc<GlobalRiskTracker<R>>,
        recovery_window: Duration,
    ) -> Self {
        Self {
            store,
            pricing,
            risk,
            recovery_window,
        }
    }

    /// Background tick: progress auto-switch emergencies within the
    /// recovery window (trace only) and maintain manual replicas.
    pub async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        for agent in self.store.online_agents().await? {
            if agent.manual_replica_enabled {
                self.maintain_manual(&agent, now).await?;
            } else if agent.auto_switch_enabled {
                self.monitor_emergency(&agent, now).await?;
            }
        }
        Ok(())
    }

    /// `POST /agents/{id}/rebalance` handler entry point: ensure a
    /// replica exists in the cheapest safe, non-current pool.
    pub async fn on_rebalance(
        &self,
        agent_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RebalanceOutcome> {
        let agent = self
            .store
            .agent(agent_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown agent {agent_id}"))?;
        self.ensure_replica_exists(&agent, now).await
    }

    /// `POST /agents/{id}/termination` handler entry point: promote the
    /// standby replica (creating one as a best-effort fallback if none
    /// exists yet).
    pub async fn on_termination(
        &self,
        agent_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TerminationOutcome> {
        let Some(agent) = self.store.agent(agent_id).await? else {
            return Ok(TerminationOutcome::UnknownAgent);
        };

        let replica = match agent.current_replica_id {
            Some(replica_id) => self.store.replica(replica_id).await?,
            None => None,
        };

        let replica = match replica {
            Some(r) => r,
            None => match self.ensure_replica_exists(&agent, now).await? {
                RebalanceOutcome::ReplicaCreated { replica_id, .. } => self
                    .store
                    .replica(replica_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("replica {replica_id} vanished"))?,
                _ => return Ok(TerminationOutcome::EmergencyCreateAndPromoteFailed),
            },
        };

        self.promote(&agent, &replica, now).await
    }

    async fn promote(
        &self,
        agent: &Agent,
        replica: &Replica,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TerminationOutcome> {
        if replica.status == ReplicaStatus::Promoted {
            return Ok(TerminationOutcome::AlreadyPromoted {
                replica_id: replica.id,
            });
        }

        let ready = replica.status == ReplicaStatus::Ready
            || (replica.status == ReplicaStatus::Syncing
                && replica.sync_progress > SYNC_PROMOTE_FLOOR);
        if !ready {
            warn!(
                replica_id = %replica.id,
                status = ?replica.status,
                progress = replica.sync_progress,
                "replica not ready but termination is imminent; promoting anyway"
            );
        }

        self.store.promote_replica(replica.id, now).await?;
        self.store
            .set_agent_current_replica(agent.id, None)
            .await?;
        self.store.bump_interruption_handled(agent.id).await?;
        Ok(TerminationOutcome::Promoted {
            replica_id: replica.id,
        })
    }

    async fn ensure_replica_exists(
        &self,
        agent: &Agent,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RebalanceOutcome> {
        let existing = self
            .store
            .active_replicas_for_instance(agent.instance_id)
            .await?;
        if let Some(r) = existing.into_iter().next() {
            debug!(agent_id = %agent.id, replica_id = %r.id, status = ?r.status, "replica already exists, reporting status only");
            return Ok(RebalanceOutcome::ReplicaAlreadyExists {
                replica_id: r.id,
                status: r.status,
            });
        }

        self.create_replica(agent, now, ReplicaType::AutomaticRebalance)
            .await
            .map(|outcome| outcome.unwrap_or(RebalanceOutcome::NoSafePool))
    }

    async fn maintain_manual(&self, agent: &Agent, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut active = self
            .store
            .active_replicas_for_instance(agent.instance_id)
            .await?;

        if active.is_empty() {
            self.create_replica(agent, now, ReplicaType::Manual).await?;
        } else if active.len() > 1 {
            active.sort_by_key(|r| r.created_at);
            for stale in &active[..active.len() - 1] {
                self.store.terminate_replica(stale.id).await?;
            }
        }

        let recently_promoted = self
            .store
            .recently_promoted(agent.instance_id, now - MANUAL_PROMOTION_LOOKBACK)
            .await?;
        if !recently_promoted.is_empty() {
            self.create_replica(agent, now, ReplicaType::Manual).await?;
        }

        Ok(())
    }

    async fn monitor_emergency(&self, agent: &Agent, now: DateTime<Utc>) -> anyhow::Result<()> {
        let Some(replica_id) = agent.current_replica_id else {
            return Ok(());
        };
        let Some(replica) = self.store.replica(replica_id).await? else {
            return Ok(());
        };
        if now - replica.created_at > self.recovery_window {
            debug!(agent_id = %agent.id, "recovery window elapsed, ML pipeline regains control");
            return Ok(());
        }
        debug!(
            agent_id = %agent.id,
            replica_id = %replica.id,
            status = ?replica.status,
            progress = replica.sync_progress,
            "emergency replica progress"
        );
        Ok(())
    }

    async fn create_replica(
        &self,
        agent: &Agent,
        now: DateTime<Utc>,
        replica_type: ReplicaType,
    ) -> anyhow::Result<Option<RebalanceOutcome>> {
        let Some(instance) = self.store.instance(agent.instance_id).await? else {
            return Ok(None);
        };

        let Some((pool_id, price)) = self
            .cheapest_safe_pool(
                &instance.instance_type,
                &instance.region,
                instance.current_pool_id.as_deref(),
            )
            .await?
        else {
            return Ok(None);
        };

        let replica = Replica {
            id: Uuid::new_v4(),
            parent_instance_id: instance.id,
            pool_id: pool_id.clone(),
            status: ReplicaStatus::Launching,
            replica_type,
            sync_progress: 0.0,
            hourly_cost: price,
            created_by: "coordinator".to_string(),
            is_active: true,
            promoted_at: None,
            created_at: now,
        };
        let replica_id = replica.id;
        self.store.insert_replica(replica).await?;
        self.store
            .set_agent_current_replica(agent.id, Some(replica_id))
            .await?;
        Ok(Some(RebalanceOutcome::ReplicaCreated {
            replica_id,
            pool_id,
        }))
    }

    /// Lowest-priced safe pool for `instance_type` in `region`,
    /// excluding `exclude_pool`.
    async fn cheapest_safe_pool(
        &self,
        instance_type: &str,
        region: &str,
        exclude_pool: Option<&str>,
    ) -> anyhow::Result<Option<(String, f64)>> {
        let candidates = self.pricing.latest_by_type(instance_type).await?;
        let mut best: Option<(String, f64)> = None;

        for snapshot in candidates {
            if Some(snapshot.pool_id.as_str()) == exclude_pool {
                continue;
            }
            let Ok(pool): Result<PoolId, _> = snapshot.pool_id.parse() else {
                continue;
            };
            if pool.region() != region {
                continue;
            }
            let (safe, _) = self.risk.is_pool_safe(&pool).await?;
            if !safe {
                continue;
            }
            if best.as_ref().map(|(_, p)| snapshot.spot_price < *p).unwrap_or(true) {
                best = Some((snapshot.pool_id, snapshot.spot_price));
            }
        }

        Ok(best)
    }
}
