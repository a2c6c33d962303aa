//! Layer 4: bin packing. K8s-only waste-cost calculation.
//! Test mode always yields `waste_cost = 0`.

use async_trait::async_trait;
use spot_core::Error;

use crate::context::{Context, InputRequest};
use crate::stage::Stage;

pub struct BinPackingCalculator;

#[async_trait]
impl Stage for BinPackingCalculator {
    fn name(&self) -> &str {
        "BinPacking"
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let reqs = match &ctx.input {
            InputRequest::Test { .. } => {
                for candidate in &mut ctx.candidates {
                    candidate.waste_cost = Some(0.0);
                }
                ctx.log(self.name(), "test mode: waste cost is 0 for all candidates");
                return Ok(());
            }
            InputRequest::Kubernetes {
                resource_requirements,
                ..
            } => resource_requirements.clone(),
        };

        for candidate in ctx.valid_candidates_mut() {
            let Some(vcpu) = candidate.vcpu else {
                candidate.waste_cost = Some(0.0);
                continue;
            };
            let waste_fraction = if vcpu > 0.0 {
                (1.0 - reqs.vcpu / vcpu).max(0.0)
            } else {
                0.0
            };
            candidate.waste_cost = Some(candidate.spot_price * waste_fraction);
        }

        ctx.log(self.name(), "calculated waste cost for valid candidates");
        Ok(())
    }
}
