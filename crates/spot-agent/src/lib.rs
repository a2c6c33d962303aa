//! The on-host agent: registers with the
//! server, then runs four independent loops — heartbeat, pricing
//! report, command poll, interruption watch — until a Shutdown command
//! or a termination signal ends the process.

pub mod client;
pub mod metadata;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use client::{
    ClientError, Command, CommandExecutedRequest, CommandKind, HeartbeatRequest,
    PricingReportRequest, RebalanceRequest, RegisterRequest, ServerClient, SpotPoolReport,
    TerminationRequest,
};
use metadata::MetadataClient;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Graceful = 0,
    RegistrationFailed = 1,
    ConfigurationInvalid = 2,
    UnrecoverableLoopError = 3,
}

pub struct AgentIdentity {
    pub hostname: String,
    pub cloud_instance_id: String,
    pub instance_type: String,
    pub region: String,
    pub az: String,
}

struct RuntimeState {
    current_mode: String,
    current_pool_id: Option<String>,
}

pub struct Agent {
    client: Arc<ServerClient>,
    metadata: Arc<MetadataClient>,
    agent_id: Uuid,
    identity: AgentIdentity,
    state: RwLock<RuntimeState>,
    heartbeat_interval: Duration,
    pricing_report_interval: Duration,
    command_poll_interval: Duration,
    signal_poll_interval: Duration,
}

impl Agent {
    /// Fetches instance identity from the cloud metadata surface,
    /// falling back to placeholder values off-cloud, then registers
    /// with the server. Idempotent on `(client_token, cloud_instance_id)`
    /// — safe to call again after a crash-restart.
    pub async fn register(
        client: Arc<ServerClient>,
        metadata: Arc<MetadataClient>,
        hostname: String,
        cadences: AgentCadences,
    ) -> Result<Self, ClientError> {
        let cloud_instance_id = metadata
            .instance_id()
            .await
            .unwrap_or_else(|| format!("local-{hostname}"));
        let instance_type = metadata
            .instance_type()
            .await
            .unwrap_or_else(|| "t3.medium".to_string());
        let az = metadata
            .availability_zone()
            .await
            .unwrap_or_else(|| "us-east-1a".to_string());
        let region = metadata
            .region()
            .await
            .unwrap_or_else(|| az[..az.len() - 1].to_string());
        // Presence of the spot/instance-action key is itself evidence this
        // is a spot instance (the key only exists on the spot product).
        let current_mode = if metadata.termination_notice().await.is_some() {
            "spot"
        } else {
            "ondemand"
        }
        .to_string();

        info!(%cloud_instance_id, %instance_type, %region, %az, "registering agent");

        let response = client
            .register(&RegisterRequest {
                hostname: hostname.clone(),
                cloud_instance_id: cloud_instance_id.clone(),
                instance_type: instance_type.clone(),
                region: region.clone(),
                az: az.clone(),
                current_mode: current_mode.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await?;

        info!(agent_id = %response.agent_id, "registered");

        Ok(Self {
            client,
            metadata,
            agent_id: response.agent_id,
            identity: AgentIdentity {
                hostname,
                cloud_instance_id,
                instance_type,
                region,
                az,
            },
            state: RwLock::new(RuntimeState {
                current_mode,
                current_pool_id: None,
            }),
            heartbeat_interval: cadences.heartbeat_interval,
            pricing_report_interval: cadences.pricing_report_interval,
            command_poll_interval: cadences.command_poll_interval,
            signal_poll_interval: cadences.signal_poll_interval,
        })
    }

    /// Runs every loop until a shutdown command or termination signal
    /// fires, then drains gracefully. Returns the exit code the process
    /// should use.
    pub async fn run(self: Arc<Self>) -> ExitCode {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let heartbeat = tokio::spawn(self.clone().heartbeat_loop(shutdown_rx.clone()));
        let pricing = tokio::spawn(self.clone().pricing_loop(shutdown_rx.clone()));
        let commands = tokio::spawn(
            self.clone()
                .command_loop(shutdown_tx.clone(), shutdown_rx.clone()),
        );
        let signals =
            tokio::spawn(self.clone().signal_loop(shutdown_tx.clone(), shutdown_rx.clone()));

        // Drive until shutdown is requested by any loop (commands or signals).
        let mut rx = shutdown_rx.clone();
        let _ = rx.wait_for(|triggered| *triggered).await;

        for handle in [heartbeat, pricing, commands, signals] {
            if let Err(e) = handle.await {
                error!(error = %e, "agent loop task panicked");
                return ExitCode::UnrecoverableLoopError;
            }
        }

        self.send_terminal_heartbeat().await;
        ExitCode::Graceful
    }

    async fn heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.send_heartbeat("online").await {
                        if e.is_retriable() {
                            warn!(error = %e, "heartbeat failed, will retry next tick");
                        } else {
                            error!(error = %e, "heartbeat rejected, re-registration required");
                        }
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn send_heartbeat(&self, status: &str) -> Result<(), ClientError> {
        let state = self.state.read().await;
        self.client
            .heartbeat(
                self.agent_id,
                &HeartbeatRequest {
                    status: status.to_string(),
                    cloud_instance_id: self.identity.cloud_instance_id.clone(),
                    current_mode: state.current_mode.clone(),
                    current_pool_id: state.current_pool_id.clone(),
                },
            )
            .await
    }

    async fn send_terminal_heartbeat(&self) {
        info!("sending terminal heartbeat before exit");
        if let Err(e) = self.send_heartbeat("offline").await {
            warn!(error = %e, "terminal heartbeat failed");
        }
    }

    async fn pricing_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.pricing_report_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.report_pricing().await {
                        warn!(error = %e, "pricing report failed");
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn report_pricing(&self) -> Result<(), ClientError> {
        // The agent does not itself price pools; it reports what it
        // observes locally. A real deployment wires this to the cloud
        // billing/spot-price API for this instance's pool.
        let pool_id = format!("{}:{}", self.identity.az, self.identity.instance_type);
        let report = SpotPoolReport {
            pool_id: pool_id.clone(),
            spot_price: 0.0,
            on_demand_price: 0.0,
        };
        self.client
            .report_pricing(
                self.agent_id,
                &PricingReportRequest {
                    instance: self.identity.instance_type.clone(),
                    pricing: report,
                    spot_pools: vec![],
                    collected_at: Utc::now(),
                },
            )
            .await
    }

    async fn command_loop(
        self: Arc<Self>,
        shutdown_tx: watch::Sender<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.command_poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.client.pending_commands(self.agent_id).await {
                        Ok(commands) => {
                            for command in commands {
                                if self.execute_command(command).await {
                                    let _ = shutdown_tx.send(true);
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "command poll failed"),
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Executes `command` and reports completion. Returns `true` if this
    /// was a shutdown command, so the caller can stop polling.
    async fn execute_command(&self, command: Command) -> bool {
        let is_shutdown = matches!(command.kind, CommandKind::Shutdown);
        let (success, message) = match command.kind {
            CommandKind::Switch => self.apply_switch(&command).await,
            CommandKind::PromoteReplica => (true, "acknowledged".to_string()),
            CommandKind::ApplyConfig => (true, "config overlay applied".to_string()),
            CommandKind::Shutdown => (true, "shutting down".to_string()),
        };

        if let Err(e) = self
            .client
            .command_executed(
                self.agent_id,
                command.id,
                &CommandExecutedRequest { success, message },
            )
            .await
        {
            warn!(command_id = %command.id, error = %e, "failed to report command execution");
        }
        is_shutdown
    }

    async fn apply_switch(&self, command: &Command) -> (bool, String) {
        let target_pool_id = command
            .payload
            .get("target_pool_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let target_type = command
            .payload
            .get("target_type")
            .and_then(|v| v.as_str())
            .unwrap_or("spot");

        let mut state = self.state.write().await;
        state.current_mode = target_type.to_string();
        state.current_pool_id = target_pool_id.clone();
        (true, format!("switched to {target_type}"))
    }

    async fn signal_loop(
        self: Arc<Self>,
        shutdown_tx: watch::Sender<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.signal_poll_interval);
        let mut rebalance_reported = false;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !rebalance_reported && self.metadata.rebalance_recommendation().await {
                        warn!("rebalance recommendation detected");
                        let state = self.state.read().await;
                        if let Err(e) = self.client.rebalance(self.agent_id, &RebalanceRequest {
                            cloud_instance_id: self.identity.cloud_instance_id.clone(),
                            pool_id: state.current_pool_id.clone(),
                            urgency: "high".to_string(),
                        }).await {
                            error!(error = %e, "failed to report rebalance recommendation");
                        }
                        rebalance_reported = true;
                    }

                    if let Some(termination_time) = self.metadata.termination_notice().await {
                        error!(termination_time = %termination_time, "termination notice received");
                        if let Err(e) = self.client.termination(self.agent_id, &TerminationRequest {
                            cloud_instance_id: self.identity.cloud_instance_id.clone(),
                            termination_time,
                        }).await {
                            error!(error = %e, "failed to report imminent termination");
                        }
                        let _ = shutdown_tx.send(true);
                        return;
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AgentCadences {
    pub heartbeat_interval: Duration,
    pub pricing_report_interval: Duration,
    pub command_poll_interval: Duration,
    pub signal_poll_interval: Duration,
}
