//! Layer 2: spot advisor filter. Rejects pools with a
//! historical interrupt rate at or above the configured threshold.

use std::sync::Arc;

use async_trait::async_trait;
use spot_core::Error;
use spot_providers::SpotAdvisor;

use crate::context::Context;
use crate::stage::Stage;

/// Fallback used when the advisor has no opinion on a pool.
const DEFAULT_INTERRUPT_RATE: f64 = 0.10;

pub struct SpotAdvisorFilter {
    advisor: Arc<dyn SpotAdvisor>,
    threshold: f64,
}

impl SpotAdvisorFilter {
    pub fn new(advisor: Arc<dyn SpotAdvisor>, threshold: f64) -> Self {
        Self { advisor, threshold }
    }
}

#[async_trait]
impl Stage for SpotAdvisorFilter {
    fn name(&self) -> &str {
        "SpotAdvisorFilter"
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let mut filtered = 0;

        for candidate in ctx.valid_candidates_mut() {
            let rate = self
                .advisor
                .interrupt_rate(&candidate.instance_type, &candidate.availability_zone)
                .await
                .unwrap_or(DEFAULT_INTERRUPT_RATE);

            candidate.historic_interrupt_rate = Some(rate);

            if rate >= self.threshold {
                candidate.invalidate(format!(
                    "historic interrupt rate >= threshold: {rate:.3} >= {:.3}",
                    self.threshold
                ));
                filtered += 1;
            }
        }

        ctx.log(self.name(), format!("filtered {filtered} candidates"));
        Ok(())
    }
}
