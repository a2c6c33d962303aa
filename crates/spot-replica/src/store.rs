use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spot_core::model::{Agent, Instance, Replica, ReplicaStatus};
use uuid::Uuid;

/// Persistence surface the coordinator needs for agents, their parent
/// instances, and the replicas standing by for them.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    async fn agent(&self, agent_id: Uuid) -> anyhow::Result<Option<Agent>>;
    async fn instance(&self, instance_id: Uuid) -> anyhow::Result<Option<Instance>>;

    /// Agents currently `Online` with either auto-switch or manual-replica
    /// enabled — the coordinator tick's worklist.
    async fn online_agents(&self) -> anyhow::Result<Vec<Agent>>;

    async fn replica(&self, replica_id: Uuid) -> anyhow::Result<Option<Replica>>;

    /// Active replicas (`is_active = true`, not `Terminated`/`Promoted`)
    /// standing by for `parent_instance_id`.
    async fn active_replicas_for_instance(
        &self,
        parent_instance_id: Uuid,
    ) -> anyhow::Result<Vec<Replica>>;

    /// Replicas promoted within the last `since` — used to detect a
    /// user-initiated manual promotion that needs a fresh standby.
    async fn recently_promoted(
        &self,
        parent_instance_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Replica>>;

    async fn insert_replica(&self, replica: Replica) -> anyhow::Result<()>;

    async fn update_replica_status(
        &self,
        replica_id: Uuid,
        status: ReplicaStatus,
    ) -> anyhow::Result<()>;

    async fn promote_replica(
        &self,
        replica_id: Uuid,
        promoted_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn terminate_replica(&self, replica_id: Uuid) -> anyhow::Result<()>;

    async fn set_agent_current_replica(
        &self,
        agent_id: Uuid,
        replica_id: Option<Uuid>,
    ) -> anyhow::Result<()>;

    async fn bump_interruption_handled(&self, agent_id: Uuid) -> anyhow::Result<()>;
}
