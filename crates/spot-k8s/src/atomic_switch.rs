//! The Kubernetes atomic switch: scale out a replacement
//! node, cordon and drain the outgoing one, then terminate it. Each
//! step's failure mode is distinct — scale-out failure rolls back,
//! drain failure leaves the old node cordoned but alive, and only a
//! fully successful drain authorizes termination.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, EvictParams, ListParams, Patch, PatchParams};
use kube::Client;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use spot_core::backoff::Backoff;
use spot_core::Error;
use spot_pipeline::context::Context;
use spot_pipeline::stages::actuator::Actuator;

use crate::provisioner::InstanceProvisioner;

const SCALE_OUT_TIMEOUT: StdDuration = StdDuration::from_secs(300);
const DRAIN_TIMEOUT: StdDuration = StdDuration::from_secs(300);
const CORDON_ATTEMPTS: u32 = 3;
const CORDON_RETRY_DELAY: StdDuration = StdDuration::from_secs(2);
const TERMINATE_ATTEMPTS: u32 = 3;
const EVICT_RETRY_DELAY: StdDuration = StdDuration::from_secs(10);
const NODE_POLL_INTERVAL: StdDuration = StdDuration::from_secs(5);

/// Binds the atomic switch to the specific node/instance it is
/// responsible for retiring. `InputRequest::Kubernetes` carries no node
/// identity, so this is fixed at construction time rather than read off
/// `Context` — one in-flight switch per managed node.
pub struct AtomicSwitch<P: InstanceProvisioner> {
    kube: Client,
    provisioner: Arc<P>,
    old_node_name: String,
    old_cloud_instance_id: String,
}

impl<P: InstanceProvisioner> AtomicSwitch<P> {
    pub fn new(
        kube: Client,
        provisioner: Arc<P>,
        old_node_name: String,
        old_cloud_instance_id: String,
    ) -> Self {
        Self {
            kube,
            provisioner,
            old_node_name,
            old_cloud_instance_id,
        }
    }

    /// Runs the full sequence. `Ok(true)` means the switch completed:
    /// the new node is in service and the old instance is gone.
    /// `Ok(false)` is a handled failure (rollback already applied where
    /// that step defines one); `Err` is unexpected.
    pub async fn run(&self, instance_type: &str, az: &str) -> Result<bool, Error> {
        let cloud_instance_id = match self.scale_out(instance_type, az).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "scale-out failed, nothing to roll back");
                return Ok(false);
            }
        };

        if let Err(e) = self.wait_node_ready(&cloud_instance_id).await {
            warn!(error = %e, cloud_instance_id, "replacement node never became ready, rolling back");
            if let Err(rollback_err) = self.provisioner.terminate(&cloud_instance_id).await {
                warn!(error = %rollback_err, "rollback termination also failed");
            }
            return Ok(false);
        }

        if let Err(e) = self.cordon().await {
            warn!(error = %e, node = %self.old_node_name, "cordon failed");
            return Ok(false);
        }

        let fully_drained = self.drain().await?;
        if !fully_drained {
            warn!(node = %self.old_node_name, "drain did not complete within timeout, leaving old node cordoned");
            return Ok(false);
        }

        if let Err(e) = self.terminate_old().await {
            warn!(error = %e, "terminate failed after successful drain");
            return Ok(false);
        }

        info!(
            node = %self.old_node_name,
            new_cloud_instance_id = %cloud_instance_id,
            "atomic switch complete"
        );
        Ok(true)
    }

    async fn scale_out(&self, instance_type: &str, az: &str) -> Result<String, Error> {
        self.provisioner.launch(instance_type, az).await
    }

    /// Polls for a node whose `providerID` references `cloud_instance_id`
    /// and whose `Ready` condition is `True`, up to [`SCALE_OUT_TIMEOUT`].
    async fn wait_node_ready(&self, cloud_instance_id: &str) -> Result<(), Error> {
        let nodes: Api<Node> = Api::all(self.kube.clone());
        let deadline = Instant::now() + SCALE_OUT_TIMEOUT;

        loop {
            let list = nodes
                .list(&ListParams::default())
                .await
                .map_err(|e| Error::TransientUpstream(format!("list nodes: {e}")))?;

            let ready = list.items.iter().any(|node| {
                let matches_instance = node
                    .spec
                    .as_ref()
                    .and_then(|s| s.provider_id.as_ref())
                    .map(|id| id.contains(cloud_instance_id))
                    .unwrap_or(false);
                let is_ready = node
                    .status
                    .as_ref()
                    .and_then(|s| s.conditions.as_ref())
                    .map(|conds| {
                        conds
                            .iter()
                            .any(|c| c.type_ == "Ready" && c.status == "True")
                    })
                    .unwrap_or(false);
                matches_instance && is_ready
            });

            if ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::TransientUpstream(format!(
                    "node for {cloud_instance_id} not ready after {SCALE_OUT_TIMEOUT:?}"
                )));
            }
            sleep(NODE_POLL_INTERVAL).await;
        }
    }

    /// Marks the old node unschedulable, retrying transient API errors.
    async fn cordon(&self) -> Result<(), Error> {
        let nodes: Api<Node> = Api::all(self.kube.clone());
        let patch = serde_json::json!({ "spec": { "unschedulable": true } });
        let params = PatchParams::apply("spot-control-plane");

        let mut last_err = None;
        for _attempt in 0..CORDON_ATTEMPTS {
            match nodes
                .patch(&self.old_node_name, &params, &Patch::Merge(&patch))
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    sleep(CORDON_RETRY_DELAY).await;
                }
            }
        }
        Err(Error::TransientUpstream(format!(
            "cordon {} failed after {CORDON_ATTEMPTS} attempts: {}",
            self.old_node_name,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Evicts every non-DaemonSet, non-mirror pod from the old node.
    /// Returns `Ok(true)` iff every evictable pod is gone before
    /// [`DRAIN_TIMEOUT`] elapses.
    async fn drain(&self) -> Result<bool, Error> {
        let all_pods: Api<Pod> = Api::all(self.kube.clone());
        let deadline = Instant::now() + DRAIN_TIMEOUT;

        let list = all_pods
            .list(&ListParams::default().fields(&format!(
                "spec.nodeName={}",
                self.old_node_name
            )))
            .await
            .map_err(|e| Error::TransientUpstream(format!("list pods on node: {e}")))?;

        let targets: Vec<(String, String)> = list
            .items
            .iter()
            .filter(|p| !Self::is_exempt(p))
            .filter_map(|p| {
                let name = p.metadata.name.clone()?;
                let ns = p.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
                Some((ns, name))
            })
            .collect();

        let mut remaining: HashMap<(String, String), u32> =
            targets.into_iter().map(|t| (t, 0)).collect();

        while !remaining.is_empty() {
            if Instant::now() >= deadline {
                return Ok(false);
            }

            let keys: Vec<(String, String)> = remaining.keys().cloned().collect();
            for (ns, name) in &keys {
                let pod_api: Api<Pod> = Api::namespaced(self.kube.clone(), ns);
                match pod_api.evict(name, &EvictParams::default()).await {
                    Ok(_) => {}
                    Err(kube::Error::Api(resp)) if resp.code == 429 => {
                        // disruption budget refused the eviction, retry later
                        *remaining.get_mut(&(ns.clone(), name.clone())).unwrap() += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, pod = %name, "eviction call failed, will retry");
                        continue;
                    }
                }

                // confirm the pod actually left the node, not just accepted eviction
                if pod_api.get(name).await.is_err() {
                    remaining.remove(&(ns.clone(), name.clone()));
                }
            }

            if remaining.is_empty() {
                break;
            }
            sleep(EVICT_RETRY_DELAY).await;
        }

        Ok(true)
    }

    fn is_exempt(pod: &Pod) -> bool {
        let owner_is_daemonset = pod
            .metadata
            .owner_references
            .as_ref()
            .map(|owners| owners.iter().any(|o| o.kind == "DaemonSet"))
            .unwrap_or(false);
        let is_mirror = pod
            .metadata
            .annotations
            .as_ref()
            .map(|a| a.contains_key("kubernetes.io/config.mirror"))
            .unwrap_or(false);
        owner_is_daemonset || is_mirror
    }

    /// Terminates the old cloud instance, retrying transient errors.
    async fn terminate_old(&self) -> Result<(), Error> {
        let mut backoff = Backoff::new(StdDuration::from_secs(1), StdDuration::from_secs(10));
        let mut last_err = None;
        for _attempt in 0..TERMINATE_ATTEMPTS {
            match self.provisioner.terminate(&self.old_cloud_instance_id).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retriable() => {
                    last_err = Some(e);
                    sleep(backoff.next_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            Error::TransientUpstream("terminate failed with no recorded error".into())
        }))
    }
}

/// Plugs [`AtomicSwitch`] into the pipeline as an [`Actuator`]. Only
/// fires on `Switch`/`Drain`/`Evacuate` verdicts with a selected
/// candidate; anything else is a no-op success (nothing to apply).
pub struct K8sSwitchActuator<P: InstanceProvisioner> {
    switch: AtomicSwitch<P>,
}

impl<P: InstanceProvisioner> K8sSwitchActuator<P> {
    pub fn new(switch: AtomicSwitch<P>) -> Self {
        Self { switch }
    }
}

#[async_trait]
impl<P: InstanceProvisioner + Send + Sync> Actuator for K8sSwitchActuator<P> {
    fn name(&self) -> &str {
        "K8sAtomicSwitch"
    }

    async fn execute(&self, ctx: &Context) -> Result<bool, Error> {
        use spot_pipeline::context::Verdict;

        if !matches!(ctx.verdict, Verdict::Switch | Verdict::Drain | Verdict::Evacuate) {
            return Ok(true);
        }
        let Some(selected) = ctx.selected.as_ref() else {
            return Ok(true);
        };

        self.switch
            .run(&selected.instance_type, &selected.availability_zone)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    #[test]
    fn daemonset_pod_is_exempt_from_drain() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("kube-proxy-abc".to_string()),
                owner_references: Some(vec![OwnerReference {
                    kind: "DaemonSet".to_string(),
                    name: "kube-proxy".to_string(),
                    api_version: "apps/v1".to_string(),
                    uid: "uid".to_string(),
                    controller: Some(true),
                    block_owner_deletion: None,
                }]),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(AtomicSwitch::<crate::provisioner::Ec2InstanceProvisioner>::is_exempt(&pod));
    }

    #[test]
    fn mirror_pod_is_exempt_from_drain() {
        let mut annotations = std::collections::BTreeMap::new();
        annotations.insert("kubernetes.io/config.mirror".to_string(), "hash".to_string());
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("static-pod".to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(AtomicSwitch::<crate::provisioner::Ec2InstanceProvisioner>::is_exempt(&pod));
    }

    #[test]
    fn ordinary_pod_is_not_exempt() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!AtomicSwitch::<crate::provisioner::Ec2InstanceProvisioner>::is_exempt(&pod));
    }
}
