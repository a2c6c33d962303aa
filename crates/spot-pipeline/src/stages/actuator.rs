//! Layer 6: actuators. Each executes the final decision;
//! failure leaves the verdict standing but is reported to the caller so
//! the Agent/Server can mark the triggering command FAILED.

use async_trait::async_trait;
use spot_core::Error;

use crate::context::Context;
use crate::stage::Stage;

#[async_trait]
pub trait Actuator: Send + Sync {
    fn name(&self) -> &str;

    /// Executes the decision recorded on `ctx`. Returns `Ok(true)` on
    /// success, `Ok(false)` on a handled failure (verdict stands,
    /// command marked FAILED upstream), and `Err` only for errors the
    /// orchestrator's own trapping should record.
    async fn execute(&self, ctx: &Context) -> Result<bool, Error>;
}

/// Records the intended action without any side effect. Used in shadow
/// mode and for dry runs.
pub struct LogActuator;

#[async_trait]
impl Actuator for LogActuator {
    fn name(&self) -> &str {
        "Log"
    }

    async fn execute(&self, ctx: &Context) -> Result<bool, Error> {
        tracing::info!(
            verdict = ?ctx.verdict,
            reason = %ctx.reason,
            selected = ?ctx.selected.as_ref().map(|c| format!("{}@{}", c.instance_type, c.availability_zone)),
            "log actuator recorded decision"
        );
        Ok(true)
    }
}

/// Wraps any `Actuator` as a pipeline `Stage`, so it plugs into the
/// orchestrator's stage list alongside the filters and rankers.
pub struct ActuatorStage {
    actuator: Box<dyn Actuator>,
}

impl ActuatorStage {
    pub fn new(actuator: Box<dyn Actuator>) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl Stage for ActuatorStage {
    fn name(&self) -> &str {
        self.actuator.name()
    }

    fn skippable(&self) -> bool {
        false
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let succeeded = self.actuator.execute(ctx).await?;
        if !succeeded {
            ctx.log(self.actuator.name(), "actuator reported failure; verdict stands");
            return Err(Error::ExecutionFailure(format!(
                "{} actuator failed to apply verdict {:?}",
                self.actuator.name(),
                ctx.verdict
            )));
        }
        ctx.log(self.actuator.name(), "actuator applied verdict");
        Ok(())
    }
}
