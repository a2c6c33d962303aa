//! Layer 2: hardware compatibility filter. A no-op in
//! test mode — the single candidate already satisfies the host's own
//! hardware; in K8s mode this is a defensive second pass in case an
//! upstream adapter relaxed its own check.

use async_trait::async_trait;
use spot_core::Error;

use crate::context::{Context, InputRequest};
use crate::stage::Stage;

pub struct HardwareFilter;

#[async_trait]
impl Stage for HardwareFilter {
    fn name(&self) -> &str {
        "HardwareFilter"
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let reqs = match &ctx.input {
            InputRequest::Test { .. } => {
                ctx.log(self.name(), "test mode: no hardware filtering needed");
                return Ok(());
            }
            InputRequest::Kubernetes {
                resource_requirements,
                ..
            } => resource_requirements.clone(),
        };

        let mut filtered = 0;
        for candidate in ctx.valid_candidates_mut() {
            let vcpu_ok = candidate.vcpu.map(|v| v >= reqs.vcpu).unwrap_or(false);
            let mem_ok = candidate
                .memory_gb
                .map(|m| m >= reqs.memory_gb)
                .unwrap_or(false);
            let arch_ok = candidate
                .architecture
                .as_deref()
                .map(|a| a == reqs.architecture)
                .unwrap_or(false);

            if !(vcpu_ok && mem_ok && arch_ok) {
                candidate.invalidate("hardware requirements not met");
                filtered += 1;
            }
        }

        ctx.log(self.name(), format!("filtered {filtered} candidates"));
        Ok(())
    }
}
