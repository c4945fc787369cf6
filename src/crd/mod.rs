//! Custom Resource Definitions for the VPC infrastructure provider
//!
//! `VpcCluster` and `VpcMachine` are owned by this provider. The `capi`
//! module holds read-only views of the Cluster API objects that own them.

pub mod capi;
mod types;
mod vpc_cluster;
mod vpc_machine;

pub use types::{set_condition, Condition, ConditionStatus, READY_CONDITION};
pub use vpc_cluster::{
    VpcCluster, VpcClusterSpec, VpcClusterStatus, VpcReference, CLUSTER_FINALIZER,
};
pub use vpc_machine::{
    NetworkInterface, VpcMachine, VpcMachineSpec, VpcMachineStatus, MACHINE_FINALIZER,
};
