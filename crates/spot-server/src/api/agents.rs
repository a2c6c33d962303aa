//! Agent/server RPC surface: register, heartbeat, pricing-report, the
//! command queue, and the two interruption-signal endpoints agents call
//! ahead of a cutover.

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use spot_core::model::{
    Agent, AgentStatus, CommandKind, PriceSource, PricingSnapshot, RiskEventKind,
    RiskEventMetadata,
};
use spot_core::Error;
use spot_core::PoolId;
use spot_pricing::PricingRepository;
use spot_replica::{RebalanceOutcome, TerminationOutcome};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::AppState;

/// How long a command stays claimable before it expires.
const COMMAND_TTL: Duration = Duration::minutes(10);

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub cloud_instance_id: String,
    #[serde(rename = "type")]
    pub instance_type: String,
    pub region: String,
    pub az: String,
    pub current_mode: String,
    #[allow(dead_code)]
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub agent_id: Uuid,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let token = headers
        .get("client-token")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError(Error::Auth("missing client-token header".into())))?;

    let registered = state
        .agents
        .register(
            token,
            &req.hostname,
            &req.cloud_instance_id,
            &req.instance_type,
            &req.region,
            &req.az,
            &req.current_mode,
        )
        .await?;

    Ok(Json(RegisterResponse {
        agent_id: registered.agent_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub status: String,
    #[allow(dead_code)]
    pub cloud_instance_id: String,
    #[allow(dead_code)]
    pub current_mode: String,
    pub current_pool_id: Option<String>,
}

fn parse_agent_status(s: &str) -> Result<AgentStatus, ApiError> {
    Ok(match s {
        "online" => AgentStatus::Online,
        "offline" => AgentStatus::Offline,
        "switching" => AgentStatus::Switching,
        "failover" => AgentStatus::Failover,
        other => {
            return Err(ApiError(Error::Validation(format!(
                "unknown agent status '{other}'"
            ))))
        }
    })
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Extension(agent): Extension<Agent>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = parse_agent_status(&req.status)?;
    state
        .agents
        .record_heartbeat(agent.id, status, req.current_pool_id.as_deref(), Utc::now())
        .await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
pub struct SpotPoolReport {
    pub pool_id: String,
    pub spot_price: f64,
    pub on_demand_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct PricingReportRequest {
    #[allow(dead_code)]
    pub instance: String,
    pub pricing: SpotPoolReport,
    pub spot_pools: Vec<SpotPoolReport>,
    pub collected_at: DateTime<Utc>,
}

pub async fn pricing_report(
    State(state): State<Arc<AppState>>,
    Extension(_agent): Extension<Agent>,
    Json(req): Json<PricingReportRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let bucket = spot_core::model::floor_to_5min(req.collected_at);
    let reports = std::iter::once(req.pricing).chain(req.spot_pools);
    for report in reports {
        state
            .pricing
            .insert_raw(PricingSnapshot {
                pool_id: report.pool_id,
                time_bucket: bucket,
                spot_price: report.spot_price,
                on_demand_price: report.on_demand_price,
                confidence: 1.0,
                source: PriceSource::Agent,
            })
            .await
            .map_err(Error::from)?;
    }
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Serialize)]
pub struct CommandWire {
    pub id: Uuid,
    pub kind: CommandKind,
    pub payload: serde_json::Value,
}

pub async fn list_commands(
    State(state): State<Arc<AppState>>,
    Extension(agent): Extension<Agent>,
) -> Result<Json<Vec<CommandWire>>, ApiError> {
    let commands = state.commands.pick_up_pending(agent.id).await?;
    Ok(Json(
        commands
            .into_iter()
            .map(|c| CommandWire {
                id: c.id,
                kind: c.kind,
                payload: c.payload,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CommandExecutedRequest {
    pub success: bool,
    pub message: String,
}

pub async fn command_executed(
    State(state): State<Arc<AppState>>,
    Extension(_agent): Extension<Agent>,
    Path((_agent_id, command_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CommandExecutedRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .commands
        .mark_executed(command_id, req.success, &req.message)
        .await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
pub struct RebalanceRequest {
    #[allow(dead_code)]
    pub cloud_instance_id: String,
    #[allow(dead_code)]
    pub pool_id: Option<String>,
    #[allow(dead_code)]
    pub urgency: String,
}

#[derive(Debug, Serialize)]
pub struct RebalanceResponse {
    pub outcome: String,
    pub pool_id: Option<String>,
}

/// A rebalance notice is a soft warning: it still poisons the pool so
/// other tenants steer away, but it doesn't force a cutover by itself —
/// the coordinator just makes sure a standby exists.
pub async fn rebalance(
    State(state): State<Arc<AppState>>,
    Extension(agent): Extension<Agent>,
    Json(_req): Json<RebalanceRequest>,
) -> Result<Json<RebalanceResponse>, ApiError> {
    if let Some(instance) = state.agents.instance(agent.instance_id).await? {
        if let Some(pool_id) = &instance.current_pool_id {
            register_risk_event(&state, &instance.id, pool_id, RiskEventKind::RebalanceNotice)
                .await?;
        }
    }

    let outcome = state.coordinator.on_rebalance(agent.id, Utc::now()).await?;
    let response = match outcome {
        RebalanceOutcome::ReplicaCreated { pool_id, .. } => RebalanceResponse {
            outcome: "replica_created".to_string(),
            pool_id: Some(pool_id),
        },
        RebalanceOutcome::ReplicaAlreadyExists { .. } => RebalanceResponse {
            outcome: "replica_already_exists".to_string(),
            pool_id: None,
        },
        RebalanceOutcome::NoSafePool => RebalanceResponse {
            outcome: "no_safe_pool".to_string(),
            pool_id: None,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct TerminationRequest {
    #[allow(dead_code)]
    pub cloud_instance_id: String,
    #[allow(dead_code)]
    pub termination_time: String,
}

#[derive(Debug, Serialize)]
pub struct TerminationResponse {
    pub outcome: String,
}

/// A termination notice is the hard signal: the instance is about to
/// disappear, so the coordinator promotes whatever standby it has and
/// the agent is handed a command pointing at it.
pub async fn termination(
    State(state): State<Arc<AppState>>,
    Extension(agent): Extension<Agent>,
    Json(_req): Json<TerminationRequest>,
) -> Result<Json<TerminationResponse>, ApiError> {
    if let Some(instance) = state.agents.instance(agent.instance_id).await? {
        if let Some(pool_id) = &instance.current_pool_id {
            register_risk_event(&state, &instance.id, pool_id, RiskEventKind::TerminationNotice)
                .await?;
        }
    }

    let outcome = state.coordinator.on_termination(agent.id, Utc::now()).await?;
    let label = match outcome {
        TerminationOutcome::Promoted { replica_id }
        | TerminationOutcome::AlreadyPromoted { replica_id } => {
            state
                .commands
                .enqueue(
                    agent.id,
                    CommandKind::PromoteReplica,
                    serde_json::json!({ "replica_id": replica_id }),
                    COMMAND_TTL,
                )
                .await?;
            "promoted"
        }
        TerminationOutcome::EmergencyCreateAndPromoteFailed => {
            "emergency_create_and_promote_failed"
        }
        TerminationOutcome::UnknownAgent => "unknown_agent",
    };

    Ok(Json(TerminationResponse {
        outcome: label.to_string(),
    }))
}

async fn register_risk_event(
    state: &AppState,
    instance_id: &Uuid,
    pool_id: &str,
    kind: RiskEventKind,
) -> Result<(), ApiError> {
    let environment = state.agents.environment_for_instance(*instance_id).await?;
    let pool: PoolId = pool_id
        .parse()
        .map_err(|e: spot_core::pool::PoolIdError| ApiError(Error::Internal(e.to_string())))?;
    state
        .risk
        .register_event(
            pool,
            kind,
            environment,
            None,
            RiskEventMetadata::new(
                match kind {
                    RiskEventKind::RebalanceNotice => "AGENT_REBALANCE_NOTICE",
                    RiskEventKind::TerminationNotice => "AGENT_TERMINATION_NOTICE",
                },
                None,
            ),
        )
        .await
        .map_err(ApiError)
}
