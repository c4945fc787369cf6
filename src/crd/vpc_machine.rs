//! VpcMachine Custom Resource Definition
//!
//! A VpcMachine is the infrastructure half of a Cluster API `Machine`: one
//! virtual server instance attached to a subnet of the cluster's VPC.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Finalizer held on a VpcMachine until its instance has been deleted
pub const MACHINE_FINALIZER: &str = "vpcmachine.infrastructure.cluster.x-k8s.io";

/// Desired state of a VpcMachine
///
/// Example:
/// ```yaml
/// apiVersion: infrastructure.cluster.x-k8s.io/v1alpha3
/// kind: VpcMachine
/// metadata:
///   name: capi-demo-cp-0
/// spec:
///   name: capi-demo-cp-0
///   image: r134-ed3f775f-ad7e-4e37-ae62-7199b4988b00
///   zone: us-south-3
///   profile: bx2-8x32
///   primaryNetworkInterface:
///     subnet: 0737-27299d09-1d95-4a9d-a491-a6949fb4b43e
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "VpcMachine",
    plural = "vpcmachines",
    namespaced,
    status = "VpcMachineStatus",
    printcolumn = r#"{"name":"Instance","type":"string","jsonPath":".status.instanceId"}"#,
    printcolumn = r#"{"name":"Zone","type":"string","jsonPath":".spec.zone"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VpcMachineSpec {
    /// Instance name. Falls back to the resource name when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Id of the OS image installed on the instance
    pub image: String,

    /// Zone the instance is placed in (e.g. us-south-3)
    pub zone: String,

    /// Instance profile (e.g. bx2-8x32 for 8 vCPUs / 32 GB)
    pub profile: String,

    /// Primary network interface placement
    pub primary_network_interface: NetworkInterface,
}

/// Network interface placement for an instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Subnet id
    pub subnet: String,
}

/// Observed state of a VpcMachine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpcMachineStatus {
    /// Provider-assigned instance id, set only after a successful create-or-find
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// True once the instance exists. Not reset by a later failed pass; the
    /// `Ready` condition reports the outcome of the latest pass.
    #[serde(default)]
    pub ready: bool,

    /// Conditions representing the machine infrastructure state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl VpcMachine {
    /// Name the instance is created under
    pub fn instance_name(&self) -> String {
        if self.spec.name.is_empty() {
            self.name_any()
        } else {
            self.spec.name.clone()
        }
    }

    /// Id of the converged instance, if one has been observed
    pub fn instance_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.instance_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Mutable status, created on first use
    pub fn status_mut(&mut self) -> &mut VpcMachineStatus {
        self.status.get_or_insert_with(Default::default)
    }
}
