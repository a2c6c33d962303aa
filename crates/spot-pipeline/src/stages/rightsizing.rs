//! Layer 2: right-sizing expander. K8s-only; the input
//! adapter already enumerates oversized instances, so this stage's job
//! is to cap how far above the request they may go and flag them so
//! downstream waste-cost math accounts for the slack. Downsizing is
//! out of scope — only upsize via `rightsize_multiplier` is defined.

use async_trait::async_trait;
use spot_core::Error;

use crate::context::{Context, InputRequest};
use crate::stage::Stage;

pub struct RightsizingExpander {
    multiplier: f64,
}

impl RightsizingExpander {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

#[async_trait]
impl Stage for RightsizingExpander {
    fn name(&self) -> &str {
        "RightsizingExpander"
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let reqs = match &ctx.input {
            InputRequest::Test { .. } => {
                ctx.log(self.name(), "test mode: rightsizing not applicable");
                return Ok(());
            }
            InputRequest::Kubernetes {
                resource_requirements,
                ..
            } => resource_requirements.clone(),
        };

        let Some(min_vcpu) = reqs.min_vcpu else {
            ctx.log(self.name(), "no min_vcpu specified, skipping");
            return Ok(());
        };

        let max_vcpu = reqs.vcpu * self.multiplier;
        let mut capped = 0;

        for candidate in ctx.valid_candidates_mut() {
            let Some(vcpu) = candidate.vcpu else {
                continue;
            };
            if vcpu > max_vcpu {
                candidate.invalidate(format!(
                    "exceeds rightsize multiplier: {vcpu} vcpu > {max_vcpu} vcpu"
                ));
                capped += 1;
            } else if vcpu > reqs.vcpu {
                candidate.is_rightsized = true;
            }
        }

        let _ = min_vcpu;
        ctx.log(
            self.name(),
            format!("capped {capped} oversized candidates above {max_vcpu} vcpu"),
        );
        Ok(())
    }
}
