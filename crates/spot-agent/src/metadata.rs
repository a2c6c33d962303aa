//! Cloud metadata surface: instance identity and the two
//! interruption signals, each a 2-second-timeout fetch where absence is
//! indistinguishable from "signal not present".

use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://169.254.169.254/latest/meta-data/";
const FETCH_TIMEOUT: Duration = Duration::from_secs(2);

pub struct MetadataClient {
    base_url: String,
    client: reqwest::Client,
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.to_string())
    }
}

impl MetadataClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Option<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok().map(|s| s.trim().to_string())
    }

    pub async fn instance_id(&self) -> Option<String> {
        self.get("instance-id").await
    }

    pub async fn instance_type(&self) -> Option<String> {
        self.get("instance-type").await
    }

    pub async fn availability_zone(&self) -> Option<String> {
        self.get("placement/availability-zone").await
    }

    /// Region derived by dropping the AZ's trailing letter.
    pub async fn region(&self) -> Option<String> {
        let az = self.availability_zone().await?;
        if az.is_empty() {
            return None;
        }
        Some(az[..az.len() - 1].to_string())
    }

    /// Presence of this key means REBALANCE.
    pub async fn rebalance_recommendation(&self) -> bool {
        self.get("events/recommendations/rebalance").await.is_some()
    }

    /// Presence means TERMINATION; body is the scheduled termination
    /// timestamp, which the caller currently only needs as a signal.
    pub async fn termination_notice(&self) -> Option<String> {
        self.get("spot/instance-action").await
    }
}
