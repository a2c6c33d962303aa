use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spot_core::model::{Agent, AgentStatus, Instance, Replica, ReplicaStatus};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::store::ReplicaStore;

#[derive(Default)]
struct Inner {
    agents: HashMap<Uuid, Agent>,
    instances: HashMap<Uuid, Instance>,
    replicas: HashMap<Uuid, Replica>,
}

/// In-memory [`ReplicaStore`] for tests.
#[derive(Default)]
pub struct InMemoryReplicaStore {
    inner: Mutex<Inner>,
}

impl InMemoryReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_agent(&self, agent: Agent) {
        self.inner.lock().unwrap().agents.insert(agent.id, agent);
    }

    pub fn put_instance(&self, instance: Instance) {
        self.inner
            .lock()
            .unwrap()
            .instances
            .insert(instance.id, instance);
    }
}

#[async_trait]
impl ReplicaStore for InMemoryReplicaStore {
    async fn agent(&self, agent_id: Uuid) -> anyhow::Result<Option<Agent>> {
        Ok(self.inner.lock().unwrap().agents.get(&agent_id).cloned())
    }

    async fn instance(&self, instance_id: Uuid) -> anyhow::Result<Option<Instance>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .instances
            .get(&instance_id)
            .cloned())
    }

    async fn online_agents(&self) -> anyhow::Result<Vec<Agent>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .agents
            .values()
            .filter(|a| {
                a.status == AgentStatus::Online
                    && (a.auto_switch_enabled || a.manual_replica_enabled)
            })
            .cloned()
            .collect())
    }

    async fn replica(&self, replica_id: Uuid) -> anyhow::Result<Option<Replica>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .replicas
            .get(&replica_id)
            .cloned())
    }

    async fn active_replicas_for_instance(
        &self,
        parent_instance_id: Uuid,
    ) -> anyhow::Result<Vec<Replica>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .replicas
            .values()
            .filter(|r| {
                r.parent_instance_id == parent_instance_id
                    && r.is_active
                    && !matches!(r.status, ReplicaStatus::Terminated | ReplicaStatus::Promoted)
            })
            .cloned()
            .collect())
    }

    async fn recently_promoted(
        &self,
        parent_instance_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Replica>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .replicas
            .values()
            .filter(|r| {
                r.parent_instance_id == parent_instance_id
                    && r.status == ReplicaStatus::Promoted
                    && r.promoted_at.map(|p| p >= since).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn insert_replica(&self, replica: Replica) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .replicas
            .insert(replica.id, replica);
        Ok(())
    }

    async fn update_replica_status(
        &self,
        replica_id: Uuid,
        status: ReplicaStatus,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.replicas.get_mut(&replica_id) {
            r.status = status;
        }
        Ok(())
    }

    async fn promote_replica(
        &self,
        replica_id: Uuid,
        promoted_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.replicas.get_mut(&replica_id) {
            r.status = ReplicaStatus::Promoted;
            r.promoted_at = Some(promoted_at);
        }
        Ok(())
    }

    async fn terminate_replica(&self, replica_id: Uuid) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.replicas.get_mut(&replica_id) {
            r.status = ReplicaStatus::Terminated;
            r.is_active = false;
        }
        Ok(())
    }

    async fn set_agent_current_replica(
        &self,
        agent_id: Uuid,
        replica_id: Option<Uuid>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.agents.get_mut(&agent_id) {
            a.current_replica_id = replica_id;
        }
        Ok(())
    }

    async fn bump_interruption_handled(&self, agent_id: Uuid) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.agents.get_mut(&agent_id) {
            a.interruption_handled_count += 1;
        }
        Ok(())
    }
}
