//! Layer 3: risk model stage. The "brain" — enriches
//! every valid candidate with a crash probability.

use std::sync::Arc;

use async_trait::async_trait;
use spot_core::{Error, PoolId};
use spot_providers::RiskModel;

use crate::context::Context;
use crate::stage::Stage;

/// Fallback when the model has nothing to say about a pool.
const FALLBACK_CRASH_PROBABILITY: f64 = 0.50;

pub struct RiskModelStage {
    model: Arc<dyn RiskModel>,
}

impl RiskModelStage {
    pub fn new(model: Arc<dyn RiskModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Stage for RiskModelStage {
    fn name(&self) -> &str {
        "RiskModel"
    }

    fn skippable(&self) -> bool {
        false
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let pools: Vec<PoolId> = ctx
            .valid_candidates()
            .filter_map(|c| PoolId::new(c.availability_zone.clone(), c.instance_type.clone()).ok())
            .collect();

        if pools.is_empty() {
            ctx.log(self.name(), "no valid candidates to score");
            return Ok(());
        }

        let predictions = self.model.predict(&pools).await;

        for candidate in ctx.valid_candidates_mut() {
            let pool = PoolId::new(
                candidate.availability_zone.clone(),
                candidate.instance_type.clone(),
            )
            .ok();

            let score = pool
                .and_then(|p| predictions.get(&p).copied())
                .unwrap_or(FALLBACK_CRASH_PROBABILITY);

            candidate.crash_probability = Some(score);
        }

        let risks: Vec<f64> = ctx
            .valid_candidates()
            .filter_map(|c| c.crash_probability)
            .collect();

        if !risks.is_empty() {
            let min = risks.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = risks.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let avg = risks.iter().sum::<f64>() / risks.len() as f64;
            ctx.log(
                self.name(),
                format!("risk distribution: min={min:.2} avg={avg:.2} max={max:.2}"),
            );
        }

        Ok(())
    }
}
