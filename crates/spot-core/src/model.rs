//! Data model: identities, pools, pricing, risk state, commands
//! and their lifecycles.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pool::PoolId;

/// Lifecycle an `Instance` runs under (spot vs on-demand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Spot,
    OnDemand,
}

/// Which decision pipeline mode an instance is evaluated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineMode {
    Linear,
    Cluster,
    Kubernetes,
}

/// Tenant environment type. Gates Global Risk Tracker writes:
/// lab-mode interruptions never poison a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Prod,
    Lab,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    pub account_id: Uuid,
    pub cloud_instance_id: String,
    pub instance_type: String,
    pub availability_zone: String,
    pub region: String,
    pub lifecycle: Lifecycle,
    pub current_pool_id: Option<String>,
    pub pipeline_mode: PipelineMode,
    pub cluster: Option<String>,
    pub node_group: Option<String>,
    pub risk_model_id: Option<String>,
    pub shadow_mode: bool,
    pub is_active: bool,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Switching,
    Failover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub client_token: String,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub status: AgentStatus,
    pub current_replica_id: Option<Uuid>,
    pub auto_switch_enabled: bool,
    pub manual_replica_enabled: bool,
    pub switching_threshold: f64,
    pub interruption_handled_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaStatus {
    Launching,
    Syncing,
    Ready,
    Promoted,
    Terminated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaType {
    Manual,
    AutomaticRebalance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replica {
    pub id: Uuid,
    pub parent_instance_id: Uuid,
    pub pool_id: String,
    pub status: ReplicaStatus,
    pub replica_type: ReplicaType,
    pub sync_progress: f64,
    pub hourly_cost: f64,
    pub created_by: String,
    pub is_active: bool,
    pub promoted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Source of a pricing observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Agent,
    Scrape,
    Interpolated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub pool_id: String,
    /// Floored to a 5-minute bucket.
    pub time_bucket: DateTime<Utc>,
    pub spot_price: f64,
    pub on_demand_price: f64,
    pub confidence: f64,
    pub source: PriceSource,
}

/// Floor a timestamp to its containing 5-minute bucket.
pub fn floor_to_5min(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    let bucket_secs = secs - secs.rem_euclid(300);
    DateTime::from_timestamp(bucket_secs, 0).unwrap_or(t)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    RebalanceNotice,
    TerminationNotice,
}

/// TTL for a risk event: 15 days.
pub const POISON_TTL: Duration = Duration::days(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEventMetadata {
    pub event_type: String,
    pub account_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RiskEventMetadata {
    pub fn new(event_type: impl Into<String>, account_id: Option<String>) -> Self {
        Self {
            event_type: event_type.into(),
            account_id,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only risk event. Never updated after insertion — only inserted
/// or pruned on TTL expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: Uuid,
    pub pool_id: String,
    pub kind: RiskEventKind,
    pub reported_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub source_tenant: Option<Uuid>,
    pub metadata: RiskEventMetadata,
}

impl RiskEvent {
    pub fn new(
        pool_id: PoolId,
        kind: RiskEventKind,
        source_tenant: Option<Uuid>,
        metadata: RiskEventMetadata,
    ) -> Self {
        Self::new_at(pool_id, kind, source_tenant, metadata, Utc::now())
    }

    /// Variant with an explicit `reported_at`, for backfills and tests
    /// that need to exercise TTL boundaries deterministically.
    pub fn new_at(
        pool_id: PoolId,
        kind: RiskEventKind,
        source_tenant: Option<Uuid>,
        metadata: RiskEventMetadata,
        reported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pool_id: pool_id.to_string(),
            kind,
            reported_at,
            expires_at: reported_at + POISON_TTL,
            source_tenant,
            metadata,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Switch,
    Shutdown,
    ApplyConfig,
    CreateReplica,
    PromoteReplica,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    PickedUp,
    Completed,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub kind: CommandKind,
    pub payload: serde_json::Value,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Command {
    /// Valid next states from the current one.
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        use CommandStatus::*;
        matches!(
            (self.status, next),
            (Pending, PickedUp) | (Pending, Expired) | (PickedUp, Completed) | (PickedUp, Failed)
        )
    }
}
