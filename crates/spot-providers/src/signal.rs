//! AWS interruption-signal watcher.

use std::time::Duration;

use async_trait::async_trait;

const SIGNAL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    None,
    Rebalance,
    Termination,
}

#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Poll the host's interruption-signal surface. Termination takes
    /// priority over rebalance when both are present; any error or
    /// timeout resolves to `Signal::None` rather than propagating, since
    /// a missed poll is retried on the next tick.
    async fn check(&self) -> Signal;
}

/// IMDSv2-backed signal provider: fetches a session token, then probes
/// the termination-notice path before the rebalance-recommendation path.
pub struct ImdsSignalProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ImdsSignalProvider {
    pub fn new() -> Self {
        Self::with_base_url("http://169.254.169.254".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SIGNAL_TIMEOUT)
            .build()
            .expect("reqwest client build");
        Self { client, base_url }
    }

    async fn token(&self) -> Option<String> {
        let resp = self
            .client
            .put(format!("{}/latest/api/token", self.base_url))
            .header("X-aws-ec2-metadata-token-ttl-seconds", "21600")
            .send()
            .await
            .ok()?;
        resp.text().await.ok()
    }

    async fn probe(&self, token: &str, path: &str) -> bool {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("X-aws-ec2-metadata-token", token)
            .send()
            .await;

        matches!(resp, Ok(r) if r.status().is_success())
    }
}

impl Default for ImdsSignalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalProvider for ImdsSignalProvider {
    async fn check(&self) -> Signal {
        let Some(token) = self.token().await else {
            return Signal::None;
        };

        if self
            .probe(&token, "/latest/meta-data/spot/instance-action")
            .await
        {
            return Signal::Termination;
        }

        if self
            .probe(&token, "/latest/meta-data/events/recommendations/rebalance")
            .await
        {
            return Signal::Rebalance;
        }

        Signal::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_resolves_to_none() {
        let p = ImdsSignalProvider::with_base_url("http://127.0.0.1:1".to_string());
        assert_eq!(p.check().await, Signal::None);
    }
}
