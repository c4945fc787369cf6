//! VpcCluster Custom Resource Definition
//!
//! A VpcCluster is the infrastructure half of a Cluster API `Cluster`: it
//! describes the VPC network the cluster's machines are placed in.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Finalizer held on a VpcCluster until its VPC has been deleted
pub const CLUSTER_FINALIZER: &str = "vpccluster.infrastructure.cluster.x-k8s.io";

/// Desired state of a VpcCluster
///
/// Example:
/// ```yaml
/// apiVersion: infrastructure.cluster.x-k8s.io/v1alpha3
/// kind: VpcCluster
/// metadata:
///   name: capi-demo
///   namespace: default
/// spec:
///   vpc: capi-demo-vpc
///   resourceGroup: 4f1e0e5c0e8a4c6f9b5e3b3f0d2a1c9e
///   region: us-south
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "VpcCluster",
    plural = "vpcclusters",
    namespaced,
    status = "VpcClusterStatus",
    printcolumn = r#"{"name":"VPC","type":"string","jsonPath":".spec.vpc"}"#,
    printcolumn = r#"{"name":"VPC ID","type":"string","jsonPath":".status.vpc.id"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VpcClusterSpec {
    /// Name of the VPC network to converge on
    pub vpc: String,

    /// Resource group id the VPC is created in
    pub resource_group: String,

    /// Region the service endpoint belongs to (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Observed identity of a VPC network
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct VpcReference {
    /// Provider-assigned VPC id
    pub id: String,
    /// VPC name
    pub name: String,
}

/// Observed state of a VpcCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpcClusterStatus {
    /// The converged VPC, set only after a successful create-or-find
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc: Option<VpcReference>,

    /// True once the VPC exists. Not reset by a later failed pass; the
    /// `Ready` condition reports the outcome of the latest pass.
    #[serde(default)]
    pub ready: bool,

    /// Conditions representing the cluster infrastructure state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl VpcCluster {
    /// Id of the converged VPC, if one has been observed
    pub fn network_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.vpc.as_ref())
            .map(|v| v.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Mutable status, created on first use
    pub fn status_mut(&mut self) -> &mut VpcClusterStatus {
        self.status.get_or_insert_with(Default::default)
    }
}
