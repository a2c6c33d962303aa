//! `sqlx`-backed [`ReplicaStore`], grounded on `spot-risk`'s
//! `PostgresRiskRepository` for error-mapping conventions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use spot_core::model::{
    Agent, AgentStatus, Instance, Lifecycle, PipelineMode, Replica, ReplicaStatus, ReplicaType,
};
use uuid::Uuid;

use crate::store::ReplicaStore;

pub struct PostgresReplicaStore {
    pool: PgPool,
}

impl PostgresReplicaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn agent_status_from_str(s: &str) -> anyhow::Result<AgentStatus> {
    Ok(match s {
        "online" => AgentStatus::Online,
        "offline" => AgentStatus::Offline,
        "switching" => AgentStatus::Switching,
        "failover" => AgentStatus::Failover,
        other => anyhow::bail!("unknown agent status {other}"),
    })
}

fn replica_status_to_str(status: ReplicaStatus) -> &'static str {
    match status {
        ReplicaStatus::Launching => "launching",
        ReplicaStatus::Syncing => "syncing",
        ReplicaStatus::Ready => "ready",
        ReplicaStatus::Promoted => "promoted",
        ReplicaStatus::Terminated => "terminated",
        ReplicaStatus::Failed => "failed",
    }
}

fn replica_status_from_str(s: &str) -> anyhow::Result<ReplicaStatus> {
    Ok(match s {
        "launching" => ReplicaStatus::Launching,
        "syncing" => ReplicaStatus::Syncing,
        "ready" => ReplicaStatus::Ready,
        "promoted" => ReplicaStatus::Promoted,
        "terminated" => ReplicaStatus::Terminated,
        "failed" => ReplicaStatus::Failed,
        other => anyhow::bail!("unknown replica status {other}"),
    })
}

fn replica_type_from_str(s: &str) -> anyhow::Result<ReplicaType> {
    Ok(match s {
        "manual" => ReplicaType::Manual,
        "automatic_rebalance" => ReplicaType::AutomaticRebalance,
        other => anyhow::bail!("unknown replica type {other}"),
    })
}

fn replica_type_to_str(t: ReplicaType) -> &'static str {
    match t {
        ReplicaType::Manual => "manual",
        ReplicaType::AutomaticRebalance => "automatic_rebalance",
    }
}

fn lifecycle_from_str(s: &str) -> anyhow::Result<Lifecycle> {
    Ok(match s {
        "spot" => Lifecycle::Spot,
        "on_demand" => Lifecycle::OnDemand,
        other => anyhow::bail!("unknown lifecycle {other}"),
    })
}

fn pipeline_mode_from_str(s: &str) -> anyhow::Result<PipelineMode> {
    Ok(match s {
        "linear" => PipelineMode::Linear,
        "cluster" => PipelineMode::Cluster,
        "kubernetes" => PipelineMode::Kubernetes,
        other => anyhow::bail!("unknown pipeline mode {other}"),
    })
}

fn row_to_agent(row: &sqlx::postgres::PgRow) -> anyhow::Result<Agent> {
    let status: String = row.try_get("status")?;
    Ok(Agent {
        id: row.try_get("id")?,
        instance_id: row.try_get("instance_id")?,
        client_token: row.try_get("client_token")?,
        last_heartbeat_at: row.try_get("last_heartbeat_at")?,
        status: agent_status_from_str(&status)?,
        current_replica_id: row.try_get("current_replica_id")?,
        auto_switch_enabled: row.try_get("auto_switch_enabled")?,
        manual_replica_enabled: row.try_get("manual_replica_enabled")?,
        switching_threshold: row.try_get("switching_threshold")?,
        interruption_handled_count: row.try_get::<i64, _>("interruption_handled_count")? as u64,
    })
}

fn row_to_instance(row: &sqlx::postgres::PgRow) -> anyhow::Result<Instance> {
    let lifecycle: String = row.try_get("lifecycle")?;
    let pipeline_mode: String = row.try_get("pipeline_mode")?;
    Ok(Instance {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        cloud_instance_id: row.try_get("cloud_instance_id")?,
        instance_type: row.try_get("instance_type")?,
        availability_zone: row.try_get("availability_zone")?,
        region: row.try_get("region")?,
        lifecycle: lifecycle_from_str(&lifecycle)?,
        current_pool_id: row.try_get("current_pool_id")?,
        pipeline_mode: pipeline_mode_from_str(&pipeline_mode)?,
        cluster: row.try_get("cluster")?,
        node_group: row.try_get("node_group")?,
        risk_model_id: row.try_get("risk_model_id")?,
        shadow_mode: row.try_get("shadow_mode")?,
        is_active: row.try_get("is_active")?,
        installed_at: row.try_get("installed_at")?,
    })
}

fn row_to_replica(row: &sqlx::postgres::PgRow) -> anyhow::Result<Replica> {
    let status: String = row.try_get("status")?;
    let replica_type: String = row.try_get("replica_type")?;
    Ok(Replica {
        id: row.try_get("id")?,
        parent_instance_id: row.try_get("parent_instance_id")?,
        pool_id: row.try_get("pool_id")?,
        status: replica_status_from_str(&status)?,
        replica_type: replica_type_from_str(&replica_type)?,
        sync_progress: row.try_get("sync_progress")?,
        hourly_cost: row.try_get("hourly_cost")?,
        created_by: row.try_get("created_by")?,
        is_active: row.try_get("is_active")?,
        promoted_at: row.try_get("promoted_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ReplicaStore for PostgresReplicaStore {
    async fn agent(&self, agent_id: Uuid) -> anyhow::Result<Option<Agent>> {
        let row = sqlx::query(
            "SELECT id, instance_id, client_token, last_heartbeat_at, status::text AS status,
             current_replica_id, auto_switch_enabled, manual_replica_enabled,
             switching_threshold, interruption_handled_count
             FROM agents WHERE id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn instance(&self, instance_id: Uuid) -> anyhow::Result<Option<Instance>> {
        let row = sqlx::query(
            "SELECT id, account_id, cloud_instance_id, instance_type, availability_zone, region,
             lifecycle::text AS lifecycle, current_pool_id, pipeline_mode::text AS pipeline_mode,
             cluster, node_group, risk_model_id, shadow_mode, is_active, installed_at
             FROM instances WHERE id = $1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_instance).transpose()
    }

    async fn online_agents(&self) -> anyhow::Result<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT id, instance_id, client_token, last_heartbeat_at, status::text AS status,
             current_replica_id, auto_switch_enabled, manual_replica_enabled,
             switching_threshold, interruption_handled_count
             FROM agents
             WHERE status = 'online' AND (auto_switch_enabled OR manual_replica_enabled)",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn replica(&self, replica_id: Uuid) -> anyhow::Result<Option<Replica>> {
        let row = sqlx::query(
            "SELECT id, parent_instance_id, pool_id, status::text AS status,
             replica_type::text AS replica_type, sync_progress, hourly_cost,
             created_by, is_active, promoted_at, created_at
             FROM replicas WHERE id = $1",
        )
        .bind(replica_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_replica).transpose()
    }

    async fn active_replicas_for_instance(
        &self,
        parent_instance_id: Uuid,
    ) -> anyhow::Result<Vec<Replica>> {
        let rows = sqlx::query(
            "SELECT id, parent_instance_id, pool_id, status::text AS status,
             replica_type::text AS replica_type, sync_progress, hourly_cost,
             created_by, is_active, promoted_at, created_at
             FROM replicas
             WHERE parent_instance_id = $1 AND is_active
             AND status NOT IN ('terminated', 'promoted')",
        )
        .bind(parent_instance_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_replica).collect()
    }

    async fn recently_promoted(
        &self,
        parent_instance_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Replica>> {
        let rows = sqlx::query(
            "SELECT id, parent_instance_id, pool_id, status::text AS status,
             replica_type::text AS replica_type, sync_progress, hourly_cost,
             created_by, is_active, promoted_at, created_at
             FROM replicas
             WHERE parent_instance_id = $1 AND status = 'promoted' AND promoted_at >= $2",
        )
        .bind(parent_instance_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_replica).collect()
    }

    async fn insert_replica(&self, replica: Replica) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO replicas
             (id, parent_instance_id, pool_id, status, replica_type, sync_progress,
              hourly_cost, created_by, is_active, promoted_at, created_at)
             VALUES ($1, $2, $3, $4::replica_status_type, $5::replica_kind_type, $6, $7, $8, $9, $10, $11)",
        )
        .bind(replica.id)
        .bind(replica.parent_instance_id)
        .bind(&replica.pool_id)
        .bind(replica_status_to_str(replica.status))
        .bind(replica_type_to_str(replica.replica_type))
        .bind(replica.sync_progress)
        .bind(replica.hourly_cost)
        .bind(&replica.created_by)
        .bind(replica.is_active)
        .bind(replica.promoted_at)
        .bind(replica.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_replica_status(
        &self,
        replica_id: Uuid,
        status: ReplicaStatus,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE replicas SET status = $1::replica_status_type WHERE id = $2")
            .bind(replica_status_to_str(status))
            .bind(replica_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn promote_replica(
        &self,
        replica_id: Uuid,
        promoted_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE replicas SET status = 'promoted'::replica_status_type, promoted_at = $1
             WHERE id = $2",
        )
        .bind(promoted_at)
        .bind(replica_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn terminate_replica(&self, replica_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE replicas SET status = 'terminated'::replica_status_type, is_active = false
             WHERE id = $1",
        )
        .bind(replica_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_agent_current_replica(
        &self,
        agent_id: Uuid,
        replica_id: Option<Uuid>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE agents SET current_replica_id = $1 WHERE id = $2")
            .bind(replica_id)
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bump_interruption_handled(&self, agent_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE agents SET interruption_handled_count = interruption_handled_count + 1
             WHERE id = $1",
        )
        .bind(agent_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
