//! Cluster scope: converges a VpcCluster's VPC network

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Scope, ScopeKind, ScopedResource};
use crate::crd::{Condition, VpcCluster, VpcClusterStatus};
use crate::store::ResourceStore;
use crate::vpc::{find_by_name, Vpc, VpcPrototype};
use crate::Result;

/// Scope bound to a VpcCluster
pub type ClusterScope<'a> = Scope<'a, VpcCluster>;

#[async_trait]
impl ScopedResource for VpcCluster {
    const KIND: ScopeKind = ScopeKind::Cluster;
    type Status = VpcClusterStatus;

    fn observed(&self) -> Option<&VpcClusterStatus> {
        self.status.as_ref()
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status_mut().conditions
    }

    async fn write_finalizers(store: &dyn ResourceStore, resource: &Self) -> Result<Self> {
        store.patch_vpc_cluster(resource).await
    }

    async fn write_status(store: &dyn ResourceStore, resource: &Self) -> Result<Self> {
        store.update_vpc_cluster_status(resource).await
    }
}

impl ClusterScope<'_> {
    /// Find the VPC named `desired_name`, creating it if none exists.
    ///
    /// A VPC that already carries the name counts as converged and is
    /// returned untouched. The resource's status is left to the caller.
    pub async fn ensure_network(&self, desired_name: &str) -> Result<Vpc> {
        let existing = self
            .client()
            .list_vpcs()
            .await
            .map_err(|e| self.label(e))?;

        if let Some(vpc) = find_by_name(existing, desired_name) {
            debug!(vpc_cluster = %self.key(), vpc = %vpc.id, "VPC already exists");
            return Ok(vpc);
        }

        let prototype = VpcPrototype::new(desired_name, &self.resource().spec.resource_group);
        let vpc = self
            .client()
            .create_vpc(&prototype)
            .await
            .map_err(|e| self.label(e))?;
        info!(vpc_cluster = %self.key(), vpc = %vpc.id, name = desired_name, "created VPC");
        Ok(vpc)
    }

    /// Delete the VPC with the given id
    pub async fn delete_network(&self, network_id: &str) -> Result<()> {
        self.client()
            .delete_vpc(network_id)
            .await
            .map_err(|e| self.label(e))?;
        info!(vpc_cluster = %self.key(), vpc = network_id, "deleted VPC");
        Ok(())
    }
}
