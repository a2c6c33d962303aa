//! Agent process entry point.

use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;
use std::time::Duration;

use spot_agent::client::ServerClient;
use spot_agent::metadata::MetadataClient;
use spot_agent::{Agent, AgentCadences, ExitCode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ProcessExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spot_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let client_token = match std::env::var("CLIENT_TOKEN") {
        Ok(t) if !t.is_empty() => t,
        _ => {
            tracing::error!("CLIENT_TOKEN environment variable is required");
            return exit(ExitCode::ConfigurationInvalid);
        }
    };
    let server_url =
        std::env::var("SPOT_SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let metadata_base_url = std::env::var("SPOT_METADATA_URL")
        .unwrap_or_else(|_| "http://169.254.169.254/latest/meta-data/".to_string());
    let hostname = hostname_or_fallback();

    let cadences = AgentCadences {
        heartbeat_interval: env_secs("SPOT_HEARTBEAT_INTERVAL_SECS", 30),
        pricing_report_interval: env_secs("SPOT_PRICING_REPORT_INTERVAL_SECS", 300),
        command_poll_interval: env_secs("SPOT_COMMAND_POLL_INTERVAL_SECS", 30),
        signal_poll_interval: env_secs("SPOT_SIGNAL_POLL_INTERVAL_SECS", 5),
    };

    let client = Arc::new(ServerClient::new(
        server_url,
        client_token,
        Duration::from_secs(10),
    ));
    let metadata = Arc::new(MetadataClient::new(metadata_base_url));

    let agent = match Agent::register(client, metadata, hostname, cadences).await {
        Ok(agent) => Arc::new(agent),
        Err(e) => {
            tracing::error!(error = %e, "agent registration failed");
            return exit(ExitCode::RegistrationFailed);
        }
    };

    exit(agent.run().await)
}

fn hostname_or_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

fn env_secs(key: &str, default: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default))
}

fn exit(code: ExitCode) -> ProcessExitCode {
    ProcessExitCode::from(code as u8)
}
