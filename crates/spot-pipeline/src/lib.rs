//! The staged decision pipeline: takes an
//! [`InputRequest`](context::InputRequest), runs it through an ordered
//! list of stages over a shared [`Context`](context::Context), and
//! produces a [`Verdict`](context::Verdict) with a chosen target pool.

pub mod context;
pub mod stage;
pub mod stages;

pub use context::{Candidate, Context, InputRequest, ResourceRequirements, TraceEntry, Verdict};
pub use stage::{PipelineOrchestrator, Stage};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spot_providers::price::PriceProvider;
    use spot_providers::risk_model::RiskModel;
    use spot_providers::signal::{Signal, SignalProvider};
    use spot_providers::{InstanceMetadataProvider, StaticInstanceMetadataProvider};

    use crate::context::{Context, InputRequest, Verdict};
    use crate::stage::PipelineOrchestrator;
    use crate::stages::*;

    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedPriceProvider {
        prices: HashMap<(String, String), (f64, f64)>,
    }

    #[async_trait]
    impl PriceProvider for FixedPriceProvider {
        async fn spot(&self, instance_type: &str, az: &str) -> Result<f64, spot_core::Error> {
            self.prices
                .get(&(instance_type.to_string(), az.to_string()))
                .map(|(spot, _)| *spot)
                .ok_or_else(|| spot_core::Error::DataGap("no price".to_string()))
        }

        async fn on_demand(&self, instance_type: &str) -> Result<f64, spot_core::Error> {
            self.prices
                .iter()
                .find(|((ty, _), _)| ty == instance_type)
                .map(|(_, (_, od))| *od)
                .ok_or_else(|| spot_core::Error::DataGap("no price".to_string()))
        }
    }

    struct FixedRiskModel {
        scores: HashMap<String, f64>,
    }

    #[async_trait]
    impl RiskModel for FixedRiskModel {
        fn feature_version(&self) -> &str {
            "test-v0"
        }

        async fn predict(
            &self,
            candidates: &[spot_core::PoolId],
        ) -> HashMap<spot_core::PoolId, f64> {
            candidates
                .iter()
                .cloned()
                .map(|p| {
                    let key = p.to_string();
                    let score = self.scores.get(&key).copied().unwrap_or(0.5);
                    (p, score)
                })
                .collect()
        }
    }

    struct NoSignal;

    #[async_trait]
    impl SignalProvider for NoSignal {
        async fn check(&self) -> Signal {
            Signal::None
        }
    }

    fn build_orchestrator(
        price_provider: Arc<dyn PriceProvider>,
        risk_model: Arc<dyn RiskModel>,
    ) -> PipelineOrchestrator {
        let metadata: Arc<dyn InstanceMetadataProvider> =
            Arc::new(StaticInstanceMetadataProvider::default());
        let advisor: Arc<dyn spot_providers::SpotAdvisor> =
            Arc::new(spot_providers::advisor::StaticSpotAdvisor);
        let signal: Arc<dyn SignalProvider> = Arc::new(NoSignal);

        PipelineOrchestrator::new()
            .add_stage(Box::new(SingleInstanceInputAdapter::new(
                price_provider.clone(),
                metadata.clone(),
            )))
            .add_stage(Box::new(HardwareFilter))
            .add_stage(Box::new(SpotAdvisorFilter::new(advisor, 0.20)))
            .add_stage(Box::new(RiskModelStage::new(risk_model)))
            .add_stage(Box::new(SafetyGate::new(0.85)))
            .add_stage(Box::new(BinPackingCalculator))
            .add_stage(Box::new(YieldRanker))
            .add_stage(Box::new(ReactiveOverride::new(signal, 0.85)))
            .add_stage(Box::new(ActuatorStage::new(Box::new(LogActuator))))
    }

    #[tokio::test]
    async fn s1_test_mode_stay() {
        let mut prices = HashMap::new();
        prices.insert(
            ("c5.large".to_string(), "us-east-1a".to_string()),
            (0.028, 0.085),
        );

        let orchestrator = build_orchestrator(
            Arc::new(FixedPriceProvider { prices }),
            Arc::new(FixedRiskModel {
                scores: [("us-east-1a:c5.large".to_string(), 0.20)].into_iter().collect(),
            }),
        );

        let ctx = Context::new(InputRequest::Test {
            current_instance_type: "c5.large".to_string(),
            current_availability_zone: "us-east-1a".to_string(),
            current_instance_id: None,
        });

        let result = orchestrator.execute(ctx).await;
        assert_eq!(result.verdict, Verdict::Stay);
        assert_eq!(result.reason, "current optimal");
    }

    #[tokio::test]
    async fn termination_signal_forces_evacuate() {
        struct AlwaysTerminate;

        #[async_trait]
        impl SignalProvider for AlwaysTerminate {
            async fn check(&self) -> Signal {
                Signal::Termination
            }
        }

        let mut prices = HashMap::new();
        prices.insert(
            ("c5.large".to_string(), "us-east-1a".to_string()),
            (0.028, 0.085),
        );

        let metadata: Arc<dyn InstanceMetadataProvider> =
            Arc::new(StaticInstanceMetadataProvider::default());
        let advisor: Arc<dyn spot_providers::SpotAdvisor> =
            Arc::new(spot_providers::advisor::StaticSpotAdvisor);

        let orchestrator = PipelineOrchestrator::new()
            .add_stage(Box::new(SingleInstanceInputAdapter::new(
                Arc::new(FixedPriceProvider { prices }),
                metadata,
            )))
            .add_stage(Box::new(HardwareFilter))
            .add_stage(Box::new(SpotAdvisorFilter::new(advisor, 0.20)))
            .add_stage(Box::new(RiskModelStage::new(Arc::new(FixedRiskModel {
                scores: HashMap::new(),
            }))))
            .add_stage(Box::new(SafetyGate::new(0.85)))
            .add_stage(Box::new(BinPackingCalculator))
            .add_stage(Box::new(YieldRanker))
            .add_stage(Box::new(ReactiveOverride::new(Arc::new(AlwaysTerminate), 0.85)))
            .add_stage(Box::new(ActuatorStage::new(Box::new(LogActuator))));

        let ctx = Context::new(InputRequest::Test {
            current_instance_type: "c5.large".to_string(),
            current_availability_zone: "us-east-1a".to_string(),
            current_instance_id: None,
        });

        let result = orchestrator.execute(ctx).await;
        assert_eq!(result.verdict, Verdict::Evacuate);
    }

    #[tokio::test]
    async fn empty_candidates_yields_stay() {
        let ctx = Context::new(InputRequest::Kubernetes {
            resource_requirements: crate::context::ResourceRequirements {
                vcpu: 64.0,
                memory_gb: 512.0,
                architecture: "x86_64".to_string(),
                min_vcpu: None,
                max_vcpu: None,
            },
            region: "us-east-1".to_string(),
        });

        let metadata: Arc<dyn InstanceMetadataProvider> =
            Arc::new(StaticInstanceMetadataProvider::default());
        let price_provider: Arc<dyn PriceProvider> =
            Arc::new(FixedPriceProvider { prices: HashMap::new() });

        let orchestrator = PipelineOrchestrator::new()
            .add_stage(Box::new(K8sInputAdapter::new(
                price_provider,
                metadata,
                vec!["us-east-1a".to_string()],
            )))
            .add_stage(Box::new(HardwareFilter))
            .add_stage(Box::new(RiskModelStage::new(Arc::new(FixedRiskModel {
                scores: HashMap::new(),
            }))))
            .add_stage(Box::new(SafetyGate::new(0.85)))
            .add_stage(Box::new(BinPackingCalculator))
            .add_stage(Box::new(YieldRanker))
            .add_stage(Box::new(ReactiveOverride::new(Arc::new(NoSignal), 0.85)))
            .add_stage(Box::new(ActuatorStage::new(Box::new(LogActuator))));

        let result = orchestrator.execute(ctx).await;
        assert_eq!(result.verdict, Verdict::Stay);
    }
}
