//! Postgres repositories for the entities the agent/server RPC surface
//! owns directly: accounts/instances/agents and
//! the command queue. Pricing, risk, and replica persistence live in
//! their own crates (`spot-pricing`, `spot-risk`, `spot-replica`)
//! because the business logic that reasons about them lives there too;
//! this crate covers everything left over.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use spot_core::model::{
    Agent, AgentStatus, Command, CommandKind, CommandStatus, Environment, Instance, Lifecycle,
    PipelineMode,
};
use spot_core::Error;
use uuid::Uuid;

/// Reserved cloud-account id for the auto-provisioned single-tenant
/// account new agents register under until real tenant/account
/// association is wired up ahead of the client-token bootstrap.
const DEFAULT_CLOUD_ACCOUNT_ID: &str = "default";

fn tx_err(action: &str, e: sqlx::Error) -> Error {
    Error::TransientUpstream(format!("{action}: {e}"))
}

fn agent_status_str(s: AgentStatus) -> &'static str {
    match s {
        AgentStatus::Online => "online",
        AgentStatus::Offline => "offline",
        AgentStatus::Switching => "switching",
        AgentStatus::Failover => "failover",
    }
}

fn agent_status_from(s: &str) -> Result<AgentStatus, Error> {
    Ok(match s {
        "online" => AgentStatus::Online,
        "offline" => AgentStatus::Offline,
        "switching" => AgentStatus::Switching,
        "failover" => AgentStatus::Failover,
        other => return Err(Error::Internal(format!("unknown agent status {other}"))),
    })
}

fn lifecycle_from(s: &str) -> Result<Lifecycle, Error> {
    Ok(match s {
        "spot" => Lifecycle::Spot,
        "on_demand" => Lifecycle::OnDemand,
        other => return Err(Error::Internal(format!("unknown lifecycle {other}"))),
    })
}

fn pipeline_mode_from(s: &str) -> Result<PipelineMode, Error> {
    Ok(match s {
        "linear" => PipelineMode::Linear,
        "cluster" => PipelineMode::Cluster,
        "kubernetes" => PipelineMode::Kubernetes,
        other => return Err(Error::Internal(format!("unknown pipeline mode {other}"))),
    })
}

fn command_kind_str(k: CommandKind) -> &'static str {
    match k {
        CommandKind::Switch => "switch",
        CommandKind::Shutdown => "shutdown",
        CommandKind::ApplyConfig => "apply_config",
        CommandKind::CreateReplica => "create_replica",
        CommandKind::PromoteReplica => "promote_replica",
    }
}

fn command_kind_from(s: &str) -> Result<CommandKind, Error> {
    Ok(match s {
        "switch" => CommandKind::Switch,
        "shutdown" => CommandKind::Shutdown,
        "apply_config" => CommandKind::ApplyConfig,
        "create_replica" => CommandKind::CreateReplica,
        "promote_replica" => CommandKind::PromoteReplica,
        other => return Err(Error::Internal(format!("unknown command kind {other}"))),
    })
}

fn command_status_str(s: CommandStatus) -> &'static str {
    match s {
        CommandStatus::Pending => "pending",
        CommandStatus::PickedUp => "picked_up",
        CommandStatus::Completed => "completed",
        CommandStatus::Failed => "failed",
        CommandStatus::Expired => "expired",
    }
}

fn command_status_from(s: &str) -> Result<CommandStatus, Error> {
    Ok(match s {
        "pending" => CommandStatus::Pending,
        "picked_up" => CommandStatus::PickedUp,
        "completed" => CommandStatus::Completed,
        "failed" => CommandStatus::Failed,
        "expired" => CommandStatus::Expired,
        other => return Err(Error::Internal(format!("unknown command status {other}"))),
    })
}

fn row_to_agent(row: &sqlx::postgres::PgRow) -> Result<Agent, Error> {
    let status: String = row
        .try_get("status")
        .map_err(|e| Error::Internal(e.to_string()))?;
    Ok(Agent {
        id: row
            .try_get("id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        instance_id: row
            .try_get("instance_id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        client_token: row
            .try_get("client_token")
            .map_err(|e| Error::Internal(e.to_string()))?,
        last_heartbeat_at: row
            .try_get("last_heartbeat_at")
            .map_err(|e| Error::Internal(e.to_string()))?,
        status: agent_status_from(&status)?,
        current_replica_id: row
            .try_get("current_replica_id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        auto_switch_enabled: row
            .try_get("auto_switch_enabled")
            .map_err(|e| Error::Internal(e.to_string()))?,
        manual_replica_enabled: row
            .try_get("manual_replica_enabled")
            .map_err(|e| Error::Internal(e.to_string()))?,
        switching_threshold: row
            .try_get("switching_threshold")
            .map_err(|e| Error::Internal(e.to_string()))?,
        interruption_handled_count: row
            .try_get::<i64, _>("interruption_handled_count")
            .map_err(|e| Error::Internal(e.to_string()))? as u64,
    })
}

fn row_to_instance(row: &sqlx::postgres::PgRow) -> Result<Instance, Error> {
    let lifecycle: String = row
        .try_get("lifecycle")
        .map_err(|e| Error::Internal(e.to_string()))?;
    let pipeline_mode: String = row
        .try_get("pipeline_mode")
        .map_err(|e| Error::Internal(e.to_string()))?;
    Ok(Instance {
        id: row
            .try_get("id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        account_id: row
            .try_get("account_id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        cloud_instance_id: row
            .try_get("cloud_instance_id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        instance_type: row
            .try_get("instance_type")
            .map_err(|e| Error::Internal(e.to_string()))?,
        availability_zone: row
            .try_get("availability_zone")
            .map_err(|e| Error::Internal(e.to_string()))?,
        region: row
            .try_get("region")
            .map_err(|e| Error::Internal(e.to_string()))?,
        lifecycle: lifecycle_from(&lifecycle)?,
        current_pool_id: row
            .try_get("current_pool_id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        pipeline_mode: pipeline_mode_from(&pipeline_mode)?,
        cluster: row
            .try_get("cluster")
            .map_err(|e| Error::Internal(e.to_string()))?,
        node_group: row
            .try_get("node_group")
            .map_err(|e| Error::Internal(e.to_string()))?,
        risk_model_id: row
            .try_get("risk_model_id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        shadow_mode: row
            .try_get("shadow_mode")
            .map_err(|e| Error::Internal(e.to_string()))?,
        is_active: row
            .try_get("is_active")
            .map_err(|e| Error::Internal(e.to_string()))?,
        installed_at: row
            .try_get("installed_at")
            .map_err(|e| Error::Internal(e.to_string()))?,
    })
}

fn row_to_command(row: &sqlx::postgres::PgRow) -> Result<Command, Error> {
    let kind: String = row
        .try_get("kind")
        .map_err(|e| Error::Internal(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| Error::Internal(e.to_string()))?;
    Ok(Command {
        id: row
            .try_get("id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        agent_id: row
            .try_get("agent_id")
            .map_err(|e| Error::Internal(e.to_string()))?,
        kind: command_kind_from(&kind)?,
        payload: row
            .try_get("payload")
            .map_err(|e| Error::Internal(e.to_string()))?,
        status: command_status_from(&status)?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| Error::Internal(e.to_string()))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| Error::Internal(e.to_string()))?,
        picked_up_at: row
            .try_get("picked_up_at")
            .map_err(|e| Error::Internal(e.to_string()))?,
        completed_at: row
            .try_get("completed_at")
            .map_err(|e| Error::Internal(e.to_string()))?,
        result: row
            .try_get("result")
            .map_err(|e| Error::Internal(e.to_string()))?,
        error: row
            .try_get("error")
            .map_err(|e| Error::Internal(e.to_string()))?,
    })
}

/// Everything the agents RPC handlers need that isn't already owned by
/// `spot-pricing`/`spot-risk`/`spot-replica`.
pub struct AgentRegistry {
    pool: PgPool,
}

/// What `register` returns: whether this was a brand-new agent or a
/// reconnect of one the server already knew about (register
/// is idempotent on `client_token`).
pub struct RegisteredAgent {
    pub agent_id: Uuid,
    pub instance_id: Uuid,
    pub is_new: bool,
}

impl AgentRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn default_account_id(&self, tx: &mut sqlx::PgConnection) -> Result<Uuid, Error> {
        if let Some(row) = sqlx::query("SELECT id FROM accounts WHERE cloud_account_id = $1")
            .bind(DEFAULT_CLOUD_ACCOUNT_ID)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| tx_err("lookup default account", e))?
        {
            return row
                .try_get("id")
                .map_err(|e| Error::Internal(e.to_string()));
        }

        let tenant_id: Uuid = sqlx::query("INSERT INTO tenants (name) VALUES ($1) RETURNING id")
            .bind("default")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| tx_err("create default tenant", e))?
            .try_get("id")
            .map_err(|e| Error::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO accounts (tenant_id, cloud_account_id, environment_type)
             VALUES ($1, $2, 'lab') RETURNING id",
        )
        .bind(tenant_id)
        .bind(DEFAULT_CLOUD_ACCOUNT_ID)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| tx_err("create default account", e))?
        .try_get("id")
        .map_err(|e| Error::Internal(e.to_string()))
    }

    /// Idempotent on `client_token`: a re-register after a crash-restart
    /// refreshes the instance row and returns the same `agent_id`.
    pub async fn register(
        &self,
        client_token: &str,
        hostname: &str,
        cloud_instance_id: &str,
        instance_type: &str,
        region: &str,
        az: &str,
        current_mode: &str,
    ) -> Result<RegisteredAgent, Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| tx_err("begin registration transaction", e))?;

        if let Some(row) = sqlx::query(
            "SELECT id AS agent_id, instance_id FROM agents WHERE client_token = $1",
        )
        .bind(client_token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| tx_err("lookup existing agent", e))?
        {
            let agent_id: Uuid = row
                .try_get("agent_id")
                .map_err(|e| Error::Internal(e.to_string()))?;
            let instance_id: Uuid = row
                .try_get("instance_id")
                .map_err(|e| Error::Internal(e.to_string()))?;
            let lifecycle = if current_mode == "spot" { "spot" } else { "on_demand" };

            sqlx::query(
                "UPDATE instances SET instance_type = $1, availability_zone = $2, region = $3,
                 lifecycle = $4::lifecycle_type WHERE id = $5",
            )
            .bind(instance_type)
            .bind(az)
            .bind(region)
            .bind(lifecycle)
            .bind(instance_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| tx_err("refresh instance on re-register", e))?;

            tx.commit()
                .await
                .map_err(|e| tx_err("commit re-register", e))?;
            return Ok(RegisteredAgent {
                agent_id,
                instance_id,
                is_new: false,
            });
        }

        let account_id = self.default_account_id(&mut tx).await?;
        let lifecycle = if current_mode == "spot" { "spot" } else { "on_demand" };
        let pool_id = format!("{az}:{instance_type}");

        let instance_id: Uuid = sqlx::query(
            "INSERT INTO instances
             (account_id, cloud_instance_id, instance_type, availability_zone, region,
              lifecycle, current_pool_id)
             VALUES ($1, $2, $3, $4, $5, $6::lifecycle_type, $7)
             RETURNING id",
        )
        .bind(account_id)
        .bind(cloud_instance_id)
        .bind(instance_type)
        .bind(az)
        .bind(region)
        .bind(lifecycle)
        .bind(&pool_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| tx_err("insert instance", e))?
        .try_get("id")
        .map_err(|e| Error::Internal(e.to_string()))?;

        let agent_id: Uuid = sqlx::query(
            "INSERT INTO agents (instance_id, client_token, status)
             VALUES ($1, $2, 'offline') RETURNING id",
        )
        .bind(instance_id)
        .bind(client_token)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| tx_err("insert agent", e))?
        .try_get("id")
        .map_err(|e| Error::Internal(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| tx_err("commit registration", e))?;
        tracing::info!(%agent_id, %instance_id, %hostname, "agent registered");

        Ok(RegisteredAgent {
            agent_id,
            instance_id,
            is_new: true,
        })
    }

    /// `None` if `agent_id` has no row, or its `client_token` doesn't
    /// match (every endpoint validates token ownership).
    pub async fn agent_by_token(
        &self,
        agent_id: Uuid,
        client_token: &str,
    ) -> Result<Option<Agent>, Error> {
        let row = sqlx::query(
            "SELECT id, instance_id, client_token, last_heartbeat_at, status::text AS status,
             current_replica_id, auto_switch_enabled, manual_replica_enabled,
             switching_threshold, interruption_handled_count
             FROM agents WHERE id = $1 AND client_token = $2",
        )
        .bind(agent_id)
        .bind(client_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| tx_err("lookup agent by token", e))?;
        row.as_ref().map(row_to_agent).transpose()
    }

    /// Tenant environment behind `instance_id` (only PROD
    /// interruptions poison a pool).
    pub async fn environment_for_instance(&self, instance_id: Uuid) -> Result<Environment, Error> {
        let row = sqlx::query(
            "SELECT a.environment_type::text AS environment_type
             FROM instances i JOIN accounts a ON a.id = i.account_id
             WHERE i.id = $1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| tx_err("lookup instance environment", e))?;

        let Some(row) = row else {
            return Err(Error::NotFound(format!("instance {instance_id}")));
        };
        let environment: String = row
            .try_get("environment_type")
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(match environment.as_str() {
            "prod" => Environment::Prod,
            _ => Environment::Lab,
        })
    }

    pub async fn instance(&self, instance_id: Uuid) -> Result<Option<Instance>, Error> {
        let row = sqlx::query(
            "SELECT id, account_id, cloud_instance_id, instance_type, availability_zone, region,
             lifecycle::text AS lifecycle, current_pool_id, pipeline_mode::text AS pipeline_mode,
             cluster, node_group, risk_model_id, shadow_mode, is_active, installed_at
             FROM instances WHERE id = $1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| tx_err("lookup instance", e))?;
        row.as_ref().map(row_to_instance).transpose()
    }

    pub async fn record_heartbeat(
        &self,
        agent_id: Uuid,
        status: AgentStatus,
        current_pool_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "UPDATE agents SET status = $1::agent_status_type, last_heartbeat_at = $2 WHERE id = $3",
        )
        .bind(agent_status_str(status))
        .bind(now)
        .bind(agent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| tx_err("record heartbeat", e))?;

        if let Some(pool_id) = current_pool_id {
            let agent = sqlx::query("SELECT instance_id FROM agents WHERE id = $1")
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| tx_err("lookup agent instance", e))?;
            if let Some(row) = agent {
                let instance_id: Uuid = row
                    .try_get("instance_id")
                    .map_err(|e| Error::Internal(e.to_string()))?;
                sqlx::query("UPDATE instances SET current_pool_id = $1 WHERE id = $2")
                    .bind(pool_id)
                    .bind(instance_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| tx_err("update current pool", e))?;
            }
        }
        Ok(())
    }
}

/// Agent command queue. Status transitions only ever move forward:
/// pending -> picked_up -> completed|failed, or pending -> expired.
pub struct CommandQueue {
    pool: PgPool,
}

impl CommandQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        agent_id: Uuid,
        kind: CommandKind,
        payload: serde_json::Value,
        ttl: Duration,
    ) -> Result<Command, Error> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let row = sqlx::query(
            "INSERT INTO commands (agent_id, kind, payload, status, created_at, expires_at)
             VALUES ($1, $2::command_kind_type, $3, 'pending', $4, $5)
             RETURNING id, agent_id, kind::text AS kind, payload, status::text AS status,
             created_at, expires_at, picked_up_at, completed_at, result, error",
        )
        .bind(agent_id)
        .bind(command_kind_str(kind))
        .bind(&payload)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| tx_err("enqueue command", e))?;
        row_to_command(&row)
    }

    /// Pending, unexpired commands for `agent_id`, marking each
    /// `picked_up` as it is returned.
    pub async fn pick_up_pending(&self, agent_id: Uuid) -> Result<Vec<Command>, Error> {
        let now = Utc::now();
        let rows = sqlx::query(
            "UPDATE commands SET status = 'picked_up', picked_up_at = $2
             WHERE agent_id = $1 AND status = 'pending' AND expires_at > $2
             RETURNING id, agent_id, kind::text AS kind, payload, status::text AS status,
             created_at, expires_at, picked_up_at, completed_at, result, error",
        )
        .bind(agent_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| tx_err("pick up pending commands", e))?;
        rows.iter().map(row_to_command).collect()
    }

    pub async fn mark_executed(
        &self,
        command_id: Uuid,
        success: bool,
        message: &str,
    ) -> Result<(), Error> {
        let next = if success {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        let result = serde_json::json!({ "message": message });
        sqlx::query(
            "UPDATE commands SET status = $1::command_status_type, completed_at = $2,
             result = $3, error = $4
             WHERE id = $5 AND status = 'picked_up'",
        )
        .bind(command_status_str(next))
        .bind(Utc::now())
        .bind(if success { Some(result) } else { None })
        .bind(if success { None } else { Some(message) })
        .bind(command_id)
        .execute(&self.pool)
        .await
        .map_err(|e| tx_err("mark command executed", e))?;
        Ok(())
    }

    /// Expires pending commands past their TTL.
    /// Intended to run alongside `spot-risk`'s TTL cleanup on the same
    /// scheduler cadence.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE commands SET status = 'expired' WHERE status = 'pending' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| tx_err("expire stale commands", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
pub trait AgentLookup: Send + Sync {
    async fn agent_by_token(&self, agent_id: Uuid, client_token: &str) -> Result<Option<Agent>, Error>;
}

#[async_trait]
impl AgentLookup for AgentRegistry {
    async fn agent_by_token(&self, agent_id: Uuid, client_token: &str) -> Result<Option<Agent>, Error> {
        AgentRegistry::agent_by_token(self, agent_id, client_token).await
    }
}
