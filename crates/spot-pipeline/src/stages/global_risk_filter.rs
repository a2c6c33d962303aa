//! Layer 2: global-risk filter. Consults the Global Risk
//! Tracker so a pool poisoned by someone else's production interruption
//! is never offered as a candidate to anyone.

use async_trait::async_trait;
use spot_core::Error;
use spot_risk::{GlobalRiskTracker, RiskRepository};

use crate::context::Context;
use crate::stage::Stage;

pub struct GlobalRiskFilter<R: RiskRepository + 'static> {
    tracker: std::sync::Arc<GlobalRiskTracker<R>>,
}

impl<R: RiskRepository + 'static> GlobalRiskFilter<R> {
    pub fn new(tracker: std::sync::Arc<GlobalRiskTracker<R>>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl<R: RiskRepository + 'static> Stage for GlobalRiskFilter<R> {
    fn name(&self) -> &str {
        "GlobalRiskFilter"
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let mut filtered = 0;

        for candidate in ctx.valid_candidates_mut() {
            let pool = match spot_core::PoolId::new(
                candidate.availability_zone.clone(),
                candidate.instance_type.clone(),
            ) {
                Ok(p) => p,
                Err(e) => {
                    candidate.invalidate(format!("invalid pool id: {e}"));
                    filtered += 1;
                    continue;
                }
            };

            let (safe, events) = self.tracker.is_pool_safe(&pool).await?;
            if !safe {
                candidate.invalidate(format!("poisoned pool: {} active events", events.len()));
                filtered += 1;
            }
        }

        ctx.log(self.name(), format!("filtered {filtered} poisoned candidates"));
        Ok(())
    }
}
