//! Crash-probability inference contract.

use std::collections::HashMap;

use async_trait::async_trait;
use spot_core::PoolId;

/// Default crash probability assigned to a pool the model has no opinion
/// on, or whose score failed NaN/Inf validation.
pub const FALLBACK_CRASH_PROBABILITY: f64 = 0.5;

#[async_trait]
pub trait RiskModel: Send + Sync {
    /// Opaque version string surfaced on audit records, so a model swap
    /// is visible in stored decisions.
    fn feature_version(&self) -> &str;

    /// Crash probability per candidate pool, each in `[0, 1]`. Entries
    /// missing from the model's own output, or containing NaN/Inf, are
    /// replaced with `FALLBACK_CRASH_PROBABILITY` before this returns.
    async fn predict(&self, candidates: &[PoolId]) -> HashMap<PoolId, f64>;
}

fn sanitize(score: f64) -> f64 {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        score
    } else {
        FALLBACK_CRASH_PROBABILITY
    }
}

/// Declares every pool risk-free. Useful for tests and for deployments
/// that haven't wired a trained model yet.
pub struct AlwaysSafeRiskModel;

#[async_trait]
impl RiskModel for AlwaysSafeRiskModel {
    fn feature_version(&self) -> &str {
        "always-safe-v0"
    }

    async fn predict(&self, candidates: &[PoolId]) -> HashMap<PoolId, f64> {
        candidates.iter().cloned().map(|p| (p, 0.0)).collect()
    }
}

/// Scores by instance-family size tier and a coarse price signal:
/// bigger, pricier instances are treated as under more contention and
/// thus riskier.
pub struct FamilyStressRiskModel;

impl FamilyStressRiskModel {
    fn base_score(instance_type: &str) -> f64 {
        if instance_type.ends_with(".metal") || instance_type.ends_with(".24xlarge") {
            0.35
        } else if instance_type.ends_with(".12xlarge") || instance_type.ends_with(".16xlarge") {
            0.25
        } else if instance_type.ends_with(".4xlarge") || instance_type.ends_with(".8xlarge") {
            0.15
        } else {
            0.08
        }
    }
}

#[async_trait]
impl RiskModel for FamilyStressRiskModel {
    fn feature_version(&self) -> &str {
        "family-stress-v1"
    }

    async fn predict(&self, candidates: &[PoolId]) -> HashMap<PoolId, f64> {
        candidates
            .iter()
            .cloned()
            .map(|p| {
                let score = sanitize(Self::base_score(p.instance_type()));
                (p, score)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_nan_and_out_of_range() {
        assert_eq!(sanitize(f64::NAN), FALLBACK_CRASH_PROBABILITY);
        assert_eq!(sanitize(f64::INFINITY), FALLBACK_CRASH_PROBABILITY);
        assert_eq!(sanitize(1.5), FALLBACK_CRASH_PROBABILITY);
        assert_eq!(sanitize(0.3), 0.3);
    }

    #[tokio::test]
    async fn always_safe_returns_zero() {
        let pool: PoolId = "us-east-1a:c5.large".parse().unwrap();
        let model = AlwaysSafeRiskModel;
        let scores = model.predict(&[pool.clone()]).await;
        assert_eq!(scores[&pool], 0.0);
    }
}
