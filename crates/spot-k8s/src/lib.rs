//! Kubernetes atomic switch: the cloud+cluster actuator that
//! replaces one spot node with another without ever going node-down
//! before the replacement is proven ready.

pub mod atomic_switch;
pub mod provisioner;

pub use atomic_switch::{AtomicSwitch, K8sSwitchActuator};
pub use provisioner::{Ec2InstanceProvisioner, InstanceProvisioner};
