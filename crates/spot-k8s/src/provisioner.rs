//! Cloud-side half of the atomic switch: requesting a new spot instance
//! and terminating the old one.

use async_trait::async_trait;
use aws_sdk_ec2::types::{InstanceType, ResourceType, Tag, TagSpecification};
use spot_core::Error;

/// Abstraction over the cloud API calls the atomic switch needs, so
/// [`crate::atomic_switch::AtomicSwitch`] can be unit tested against a
/// fake.
#[async_trait]
pub trait InstanceProvisioner: Send + Sync {
    /// Launches one instance of `instance_type` in `az`, tagged so the
    /// resulting Kubernetes node can be matched back to it. Returns the
    /// cloud instance id.
    async fn launch(&self, instance_type: &str, az: &str) -> Result<String, Error>;

    /// Terminates `cloud_instance_id`. Retried by the caller on
    /// transient errors.
    async fn terminate(&self, cloud_instance_id: &str) -> Result<(), Error>;
}

pub struct Ec2InstanceProvisioner {
    client: aws_sdk_ec2::Client,
    ami_id: String,
    subnet_by_az: std::collections::HashMap<String, String>,
}

impl Ec2InstanceProvisioner {
    pub fn new(
        client: aws_sdk_ec2::Client,
        ami_id: String,
        subnet_by_az: std::collections::HashMap<String, String>,
    ) -> Self {
        Self {
            client,
            ami_id,
            subnet_by_az,
        }
    }
}

#[async_trait]
impl InstanceProvisioner for Ec2InstanceProvisioner {
    async fn launch(&self, instance_type: &str, az: &str) -> Result<String, Error> {
        let subnet_id = self.subnet_by_az.get(az).ok_or_else(|| {
            Error::Validation(format!("no subnet configured for availability zone {az}"))
        })?;

        let instance_type: InstanceType = InstanceType::from(instance_type);

        let tag = Tag::builder()
            .key("spot-control-plane/managed")
            .value("true")
            .build();
        let tag_spec = TagSpecification::builder()
            .resource_type(ResourceType::Instance)
            .tags(tag)
            .build();

        let output = self
            .client
            .run_instances()
            .image_id(&self.ami_id)
            .instance_type(instance_type)
            .subnet_id(subnet_id)
            .min_count(1)
            .max_count(1)
            .instance_market_options(
                aws_sdk_ec2::types::InstanceMarketOptionsRequest::builder()
                    .market_type(aws_sdk_ec2::types::MarketType::Spot)
                    .build(),
            )
            .tag_specifications(tag_spec)
            .send()
            .await
            .map_err(|e| Error::TransientUpstream(format!("ec2 run_instances: {e}")))?;

        output
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .map(|id| id.to_string())
            .ok_or_else(|| Error::TransientUpstream("run_instances returned no instance".into()))
    }

    async fn terminate(&self, cloud_instance_id: &str) -> Result<(), Error> {
        self.client
            .terminate_instances()
            .instance_ids(cloud_instance_id)
            .send()
            .await
            .map_err(|e| Error::TransientUpstream(format!("ec2 terminate_instances: {e}")))?;
        Ok(())
    }
}
