//! Layer 4: safety gate. Final check before ranking —
//! strictly greater than the threshold is filtered, equality passes.

use async_trait::async_trait;
use spot_core::Error;

use crate::context::Context;
use crate::stage::Stage;

pub struct SafetyGate {
    threshold: f64,
}

impl SafetyGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Stage for SafetyGate {
    fn name(&self) -> &str {
        "SafetyGate"
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let mut filtered = 0;

        for candidate in ctx.valid_candidates_mut() {
            match candidate.crash_probability {
                None => {
                    candidate.invalidate("no risk score available");
                    filtered += 1;
                }
                Some(p) if p > self.threshold => {
                    candidate.invalidate(format!(
                        "crash probability too high: {p:.2} > {:.2}",
                        self.threshold
                    ));
                    filtered += 1;
                }
                Some(_) => {}
            }
        }

        ctx.log(self.name(), format!("filtered {filtered} candidates as too risky"));
        Ok(())
    }
}
