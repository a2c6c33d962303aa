//! Instance hardware metadata providers.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spot_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub vcpu: u32,
    pub memory_gb: f64,
    pub architecture: &'static str,
}

#[async_trait]
pub trait InstanceMetadataProvider: Send + Sync {
    /// Hardware spec for `instance_type`. `Error::DataGap` when unknown.
    async fn metadata(&self, instance_type: &str) -> Result<InstanceMetadata, Error>;

    /// All instance types known to this provider, for K8s-mode enumeration.
    async fn all_types(&self) -> Vec<String>;
}

pub struct StaticInstanceMetadataProvider {
    table: HashMap<&'static str, InstanceMetadata>,
}

impl Default for StaticInstanceMetadataProvider {
    fn default() -> Self {
        let entries = [
            ("c5.large", 2, 4.0),
            ("c5.xlarge", 4, 8.0),
            ("c5.2xlarge", 8, 16.0),
            ("c5.4xlarge", 16, 32.0),
            ("m5.large", 2, 8.0),
            ("m5.xlarge", 4, 16.0),
            ("m5.2xlarge", 8, 32.0),
            ("r5.large", 2, 16.0),
            ("r5.xlarge", 4, 32.0),
            ("t3.micro", 2, 1.0),
            ("t3.small", 2, 2.0),
            ("t3.medium", 2, 4.0),
            ("t3.large", 2, 8.0),
        ];

        let table = entries
            .into_iter()
            .map(|(ty, vcpu, mem)| {
                (
                    ty,
                    InstanceMetadata {
                        vcpu,
                        memory_gb: mem,
                        architecture: "x86_64",
                    },
                )
            })
            .collect();

        Self { table }
    }
}

#[async_trait]
impl InstanceMetadataProvider for StaticInstanceMetadataProvider {
    async fn metadata(&self, instance_type: &str) -> Result<InstanceMetadata, Error> {
        self.table
            .get(instance_type)
            .copied()
            .ok_or_else(|| Error::DataGap(format!("unknown instance type {instance_type}")))
    }

    async fn all_types(&self) -> Vec<String> {
        self.table.keys().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_type_resolves() {
        let p = StaticInstanceMetadataProvider::default();
        let m = p.metadata("c5.large").await.unwrap();
        assert_eq!(m.vcpu, 2);
    }

    #[tokio::test]
    async fn unknown_type_is_data_gap() {
        let p = StaticInstanceMetadataProvider::default();
        assert!(p.metadata("z9.huge").await.is_err());
    }
}
