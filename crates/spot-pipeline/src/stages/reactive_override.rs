//! Layer 5: reactive override — the final decision stage.
//! AWS signals take priority over the ML-ranked decision; this is the
//! safety net that guarantees an immediate response to AWS warnings.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use spot_core::Error;
use spot_providers::{Signal, SignalProvider};

use crate::context::{Context, InputRequest, Verdict};
use crate::stage::Stage;

pub struct ReactiveOverride {
    signal_provider: Arc<dyn SignalProvider>,
    max_crash_probability: f64,
}

impl ReactiveOverride {
    pub fn new(signal_provider: Arc<dyn SignalProvider>, max_crash_probability: f64) -> Self {
        Self {
            signal_provider,
            max_crash_probability,
        }
    }
}

#[async_trait]
impl Stage for ReactiveOverride {
    fn name(&self) -> &str {
        "AWSSignalOverride"
    }

    fn skippable(&self) -> bool {
        false
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let signal = self.signal_provider.check().await;
        ctx.aws_signal = signal;
        ctx.signal_checked_at = Some(Utc::now());

        match signal {
            Signal::Termination => {
                ctx.verdict = Verdict::Evacuate;
                ctx.selected = current_candidate(ctx).cloned();
                ctx.reason = "AWS termination notice".to_string();
                ctx.log(self.name(), "termination notice: EVACUATE, skipping ranking");
                return Ok(());
            }
            Signal::Rebalance => {
                let top = ctx.valid_candidates().next().cloned();
                ctx.verdict = Verdict::Drain;
                ctx.reason = "AWS rebalance recommendation".to_string();
                ctx.selected = top;
                ctx.log(self.name(), "rebalance recommendation: DRAIN");
                return Ok(());
            }
            Signal::None => {}
        }

        match &ctx.input {
            InputRequest::Test { .. } => {
                let current_safe = current_candidate(ctx)
                    .and_then(|c| c.crash_probability)
                    .map(|p| p < self.max_crash_probability)
                    .unwrap_or(false);

                if current_safe {
                    ctx.verdict = Verdict::Stay;
                    ctx.reason = "current instance is safe".to_string();
                    ctx.selected = current_candidate(ctx).cloned();
                } else {
                    let top = ctx.valid_candidates().next().cloned();
                    if top.is_some() {
                        ctx.verdict = Verdict::Switch;
                        ctx.reason = "current instance is risky".to_string();
                        ctx.selected = top;
                    } else {
                        ctx.verdict = Verdict::Stay;
                        ctx.reason = "no alternatives".to_string();
                        ctx.selected = current_candidate(ctx).cloned();
                    }
                }
            }
            InputRequest::Kubernetes { .. } => {
                let top = ctx.valid_candidates().next().cloned();
                if let Some(candidate) = top {
                    ctx.verdict = Verdict::Switch;
                    ctx.reason = format!(
                        "selected best candidate: {}@{}",
                        candidate.instance_type, candidate.availability_zone
                    );
                    ctx.selected = Some(candidate);
                } else {
                    ctx.verdict = Verdict::Stay;
                    ctx.reason = "no candidates".to_string();
                    ctx.selected = None;
                }
            }
        }

        // SWITCH to the candidate already held is normalized to STAY.
        if ctx.verdict == Verdict::Switch {
            if let (InputRequest::Test { current_instance_type, current_availability_zone, .. }, Some(selected)) =
                (&ctx.input, &ctx.selected)
            {
                if selected.matches(current_instance_type, current_availability_zone) {
                    ctx.verdict = Verdict::Stay;
                    ctx.reason = "current optimal".to_string();
                }
            }
        }

        ctx.log(self.name(), format!("decision: {:?}", ctx.verdict));
        Ok(())
    }
}

fn current_candidate<'a>(ctx: &'a Context) -> Option<&'a crate::context::Candidate> {
    match &ctx.input {
        InputRequest::Test {
            current_instance_type,
            current_availability_zone,
            ..
        } => ctx
            .candidates
            .iter()
            .find(|c| c.matches(current_instance_type, current_availability_zone)),
        InputRequest::Kubernetes { .. } => None,
    }
}
