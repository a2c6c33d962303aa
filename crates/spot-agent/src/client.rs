//! HTTP client for the Agent/Server RPC surface.
//! Bearer-style auth via a `client-token` header; 5xx is retriable by
//! the caller, 4xx is terminal for that call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub cloud_instance_id: String,
    #[serde(rename = "type")]
    pub instance_type: String,
    pub region: String,
    pub az: String,
    pub current_mode: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub agent_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatRequest {
    pub status: String,
    pub cloud_instance_id: String,
    pub current_mode: String,
    pub current_pool_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SpotPoolReport {
    pub pool_id: String,
    pub spot_price: f64,
    pub on_demand_price: f64,
}

#[derive(Debug, Serialize)]
pub struct PricingReportRequest {
    pub instance: String,
    pub pricing: SpotPoolReport,
    pub spot_pools: Vec<SpotPoolReport>,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Switch,
    PromoteReplica,
    ApplyConfig,
    Shutdown,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Command {
    pub id: Uuid,
    pub kind: CommandKind,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct CommandExecutedRequest {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RebalanceRequest {
    pub cloud_instance_id: String,
    pub pool_id: Option<String>,
    pub urgency: String,
}

#[derive(Debug, Serialize)]
pub struct TerminationRequest {
    pub cloud_instance_id: String,
    pub termination_time: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl ClientError {
    /// 4xx is terminal for that call, 5xx is retriable.
    pub fn is_retriable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Rejected { status, .. } => *status >= 500,
        }
    }
}

pub struct ServerClient {
    http: reqwest::Client,
    base_url: String,
    client_token: String,
}

impl ServerClient {
    pub fn new(base_url: String, client_token: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a valid configuration");
        Self {
            http,
            base_url,
            client_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, ClientError> {
        let mut req = self
            .http
            .request(method, self.url(path))
            .header("client-token", &self.client_token);
        if let Some(b) = body {
            req = req.json(b);
        }
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        response.json::<R>().await.map_err(ClientError::Transport)
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse, ClientError> {
        self.send(reqwest::Method::POST, "/agents/register", Some(req))
            .await
    }

    pub async fn heartbeat(
        &self,
        agent_id: Uuid,
        req: &HeartbeatRequest,
    ) -> Result<(), ClientError> {
        self.send::<_, serde_json::Value>(
            reqwest::Method::POST,
            &format!("/agents/{agent_id}/heartbeat"),
            Some(req),
        )
        .await?;
        Ok(())
    }

    pub async fn report_pricing(
        &self,
        agent_id: Uuid,
        req: &PricingReportRequest,
    ) -> Result<(), ClientError> {
        self.send::<_, serde_json::Value>(
            reqwest::Method::POST,
            &format!("/agents/{agent_id}/pricing-report"),
            Some(req),
        )
        .await?;
        Ok(())
    }

    pub async fn pending_commands(&self, agent_id: Uuid) -> Result<Vec<Command>, ClientError> {
        self.send::<(), _>(
            reqwest::Method::GET,
            &format!("/agents/{agent_id}/commands"),
            None,
        )
        .await
    }

    pub async fn command_executed(
        &self,
        agent_id: Uuid,
        command_id: Uuid,
        req: &CommandExecutedRequest,
    ) -> Result<(), ClientError> {
        self.send::<_, serde_json::Value>(
            reqwest::Method::POST,
            &format!("/agents/{agent_id}/commands/{command_id}/executed"),
            Some(req),
        )
        .await?;
        Ok(())
    }

    pub async fn rebalance(
        &self,
        agent_id: Uuid,
        req: &RebalanceRequest,
    ) -> Result<(), ClientError> {
        self.send::<_, serde_json::Value>(
            reqwest::Method::POST,
            &format!("/agents/{agent_id}/rebalance"),
            Some(req),
        )
        .await?;
        Ok(())
    }

    pub async fn termination(
        &self,
        agent_id: Uuid,
        req: &TerminationRequest,
    ) -> Result<(), ClientError> {
        self.send::<_, serde_json::Value>(
            reqwest::Method::POST,
            &format!("/agents/{agent_id}/termination"),
            Some(req),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_rejection_below_500_is_terminal() {
        let err = ClientError::Rejected {
            status: 409,
            body: "conflict".to_string(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn server_rejection_500_and_above_is_retriable() {
        let err = ClientError::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn command_kind_round_trips_through_json() {
        let payload = serde_json::json!({
            "id": "2c5ea4c0-4cad-4b81-0000-0000000000f1",
            "kind": "switch",
            "payload": {"target_type": "spot", "target_az": "us-east-1b", "target_pool_id": "us-east-1b:c5.large"}
        });
        let command: Command = serde_json::from_value(payload).unwrap();
        assert!(matches!(command.kind, CommandKind::Switch));
    }
}
