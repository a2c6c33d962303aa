//! Layer 1: input adapters. Selection is by `input.mode` —
//! here, by which `InputRequest` variant the context carries.

use std::sync::Arc;

use async_trait::async_trait;
use spot_core::Error;
use spot_providers::{InstanceMetadataProvider, PriceProvider};

use crate::context::{Candidate, Context, InputRequest};
use crate::stage::Stage;

/// "I am running this instance. Am I safe?" — single candidate, the
/// instance currently held.
pub struct SingleInstanceInputAdapter {
    price_provider: Arc<dyn PriceProvider>,
    metadata_provider: Arc<dyn InstanceMetadataProvider>,
}

impl SingleInstanceInputAdapter {
    pub fn new(
        price_provider: Arc<dyn PriceProvider>,
        metadata_provider: Arc<dyn InstanceMetadataProvider>,
    ) -> Self {
        Self {
            price_provider,
            metadata_provider,
        }
    }
}

#[async_trait]
impl Stage for SingleInstanceInputAdapter {
    fn name(&self) -> &str {
        "SingleInstanceInput"
    }

    fn skippable(&self) -> bool {
        false
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let (instance_type, az) = match &ctx.input {
            InputRequest::Test {
                current_instance_type,
                current_availability_zone,
                ..
            } => (
                current_instance_type.clone(),
                current_availability_zone.clone(),
            ),
            InputRequest::Kubernetes { .. } => {
                return Err(Error::Validation(
                    "SingleInstanceInputAdapter requires a Test-mode request".to_string(),
                ))
            }
        };

        let spot_price = self.price_provider.spot(&instance_type, &az).await?;
        let on_demand_price = self.price_provider.on_demand(&instance_type).await?;
        let metadata = self.metadata_provider.metadata(&instance_type).await?;

        let mut candidate = Candidate::new(instance_type, az, spot_price, on_demand_price);
        candidate.vcpu = Some(metadata.vcpu as f64);
        candidate.memory_gb = Some(metadata.memory_gb);
        candidate.architecture = Some(metadata.architecture.to_string());

        ctx.log(self.name(), "loaded current instance as sole candidate");
        ctx.candidates = vec![candidate];
        Ok(())
    }
}

/// "A workload needs these resources. Find the best pool." — enumerates
/// every (type, AZ) pair in the region whose hardware satisfies the
/// request.
pub struct K8sInputAdapter {
    price_provider: Arc<dyn PriceProvider>,
    metadata_provider: Arc<dyn InstanceMetadataProvider>,
    availability_zones: Vec<String>,
}

impl K8sInputAdapter {
    pub fn new(
        price_provider: Arc<dyn PriceProvider>,
        metadata_provider: Arc<dyn InstanceMetadataProvider>,
        availability_zones: Vec<String>,
    ) -> Self {
        Self {
            price_provider,
            metadata_provider,
            availability_zones,
        }
    }
}

#[async_trait]
impl Stage for K8sInputAdapter {
    fn name(&self) -> &str {
        "K8sInput"
    }

    fn skippable(&self) -> bool {
        false
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let reqs = match &ctx.input {
            InputRequest::Kubernetes {
                resource_requirements,
                ..
            } => resource_requirements.clone(),
            InputRequest::Test { .. } => {
                return Err(Error::Validation(
                    "K8sInputAdapter requires a Kubernetes-mode request".to_string(),
                ))
            }
        };

        let instance_types = self.metadata_provider.all_types().await;
        let mut candidates = Vec::new();

        for instance_type in &instance_types {
            let metadata = match self.metadata_provider.metadata(instance_type).await {
                Ok(m) => m,
                Err(_) => continue,
            };

            if (metadata.vcpu as f64) < reqs.vcpu {
                continue;
            }
            if metadata.memory_gb < reqs.memory_gb {
                continue;
            }
            if metadata.architecture != reqs.architecture {
                continue;
            }
            if let Some(max_vcpu) = reqs.max_vcpu {
                if (metadata.vcpu as f64) > max_vcpu {
                    continue;
                }
            }

            let on_demand_price = match self.price_provider.on_demand(instance_type).await {
                Ok(p) => p,
                Err(_) => continue,
            };

            for az in &self.availability_zones {
                // Missing prices drop the candidate silently.
                let spot_price = match self.price_provider.spot(instance_type, az).await {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let mut candidate =
                    Candidate::new(instance_type.clone(), az.clone(), spot_price, on_demand_price);
                candidate.vcpu = Some(metadata.vcpu as f64);
                candidate.memory_gb = Some(metadata.memory_gb);
                candidate.architecture = Some(metadata.architecture.to_string());
                candidate.is_rightsized = (metadata.vcpu as f64) > reqs.vcpu;

                candidates.push(candidate);
            }
        }

        ctx.log(
            self.name(),
            format!("loaded {} candidates", candidates.len()),
        );
        ctx.candidates = candidates;
        Ok(())
    }
}
