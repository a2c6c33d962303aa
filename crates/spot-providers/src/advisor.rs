//! Historical interrupt-rate advisor.

use async_trait::async_trait;

#[async_trait]
pub trait SpotAdvisor: Send + Sync {
    /// Historical interruption rate for `(instance_type, az)` as a
    /// fraction in `[0, 1]`. Callers fall back to a default of `0.10`
    /// when the pool is unknown — this trait returns `None` rather than
    /// an `Error` so the fallback stays at the call site, matching how
    /// the rightsizing and safety-gate stages each pick their own
    /// default.
    async fn interrupt_rate(&self, instance_type: &str, az: &str) -> Option<f64>;
}

/// Size-tier table: larger instances interrupt more often because they
/// compete for scarcer capacity.
pub struct StaticSpotAdvisor;

impl StaticSpotAdvisor {
    fn rate_for_type(instance_type: &str) -> f64 {
        if instance_type.ends_with(".metal") || instance_type.ends_with(".24xlarge") {
            0.18
        } else if instance_type.ends_with(".12xlarge") || instance_type.ends_with(".16xlarge") {
            0.12
        } else if instance_type.ends_with(".4xlarge") || instance_type.ends_with(".8xlarge") {
            0.08
        } else {
            0.05
        }
    }
}

#[async_trait]
impl SpotAdvisor for StaticSpotAdvisor {
    async fn interrupt_rate(&self, instance_type: &str, _az: &str) -> Option<f64> {
        Some(Self::rate_for_type(instance_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn large_sizes_interrupt_more() {
        let a = StaticSpotAdvisor;
        let small = a.interrupt_rate("c5.large", "us-east-1a").await.unwrap();
        let huge = a.interrupt_rate("c5.24xlarge", "us-east-1a").await.unwrap();
        assert!(huge > small);
    }
}
