//! Stage trait and the orchestrator that runs a configured sequence of
//! them over a shared `Context`.

use async_trait::async_trait;

use crate::context::Context;

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Required stages always run even if a deployment's config tries
    /// to skip them (Input, RiskModel, ReactiveOverride, Actuator).
    fn skippable(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), spot_core::Error>;
}

/// Runs every configured stage over one `Context`, trapping stage
/// errors so the pipeline always produces a verdict.
pub struct PipelineOrchestrator {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineOrchestrator {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn add_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub async fn execute(&self, mut ctx: Context) -> Context {
        tracing::debug!(stage_count = self.stages.len(), "pipeline execution starting");

        for stage in &self.stages {
            match stage.process(&mut ctx).await {
                Ok(()) => {
                    tracing::debug!(
                        stage = stage.name(),
                        valid = ctx.valid_count(),
                        total = ctx.candidates.len(),
                        "stage completed"
                    );
                }
                Err(err) => {
                    tracing::warn!(stage = stage.name(), error = %err, "stage failed, continuing");
                    ctx.log(stage.name(), format!("ERROR: {err}"));
                }
            }
        }

        if ctx.trace.is_empty() {
            ctx.log("orchestrator", "no stages configured");
        }

        tracing::debug!(verdict = ?ctx.verdict, "pipeline execution complete");
        ctx
    }
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
