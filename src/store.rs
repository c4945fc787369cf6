//! Resource store adapter
//!
//! Read and patch access to the provider's own resources and the Cluster API
//! owner objects. The controllers only talk to the API server through
//! [`ResourceStore`], which keeps them testable against mocks.

use std::fmt;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde_json::{json, Map, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::capi::{Cluster, Machine};
use crate::crd::{VpcCluster, VpcMachine};
use crate::{Result, FIELD_MANAGER};

/// Namespaced name of a resource
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ObjectKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object. Cluster-scoped objects get an empty namespace.
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Access to the resources a reconciliation pass reads and writes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a VpcCluster; `None` if it does not exist
    async fn get_vpc_cluster(&self, key: &ObjectKey) -> Result<Option<VpcCluster>>;

    /// Get a VpcMachine; `None` if it does not exist
    async fn get_vpc_machine(&self, key: &ObjectKey) -> Result<Option<VpcMachine>>;

    /// Get a CAPI Cluster; `None` if it does not exist
    async fn get_capi_cluster(&self, key: &ObjectKey) -> Result<Option<Cluster>>;

    /// Get a CAPI Machine; `None` if it does not exist
    async fn get_capi_machine(&self, key: &ObjectKey) -> Result<Option<Machine>>;

    /// Merge-patch the VpcCluster's finalizers, guarded by its resourceVersion.
    ///
    /// Returns the object as stored after the patch.
    async fn patch_vpc_cluster(&self, cluster: &VpcCluster) -> Result<VpcCluster>;

    /// Merge-patch the VpcCluster's status subresource
    ///
    /// Returns the object as stored after the patch.
    async fn update_vpc_cluster_status(&self, cluster: &VpcCluster) -> Result<VpcCluster>;

    /// Merge-patch the VpcMachine's finalizers, guarded by its resourceVersion.
    ///
    /// Returns the object as stored after the patch.
    async fn patch_vpc_machine(&self, machine: &VpcMachine) -> Result<VpcMachine>;

    /// Merge-patch the VpcMachine's status subresource
    ///
    /// Returns the object as stored after the patch.
    async fn update_vpc_machine_status(&self, machine: &VpcMachine) -> Result<VpcMachine>;
}

/// Merge patch replacing the finalizer list.
///
/// A merge patch replaces lists wholesale, so the resourceVersion is sent
/// along to turn a concurrent finalizer edit into a conflict instead of a
/// lost update.
pub(crate) fn finalizer_patch<K: Resource>(obj: &K) -> Value {
    let mut metadata = Map::new();
    metadata.insert("finalizers".to_string(), json!(obj.finalizers()));
    if let Some(rv) = obj.resource_version() {
        metadata.insert("resourceVersion".to_string(), json!(rv));
    }
    json!({ "metadata": metadata })
}

/// Real store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a new KubeStore wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_vpc_cluster(&self, key: &ObjectKey) -> Result<Option<VpcCluster>> {
        let api: Api<VpcCluster> = self.api(&key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_vpc_machine(&self, key: &ObjectKey) -> Result<Option<VpcMachine>> {
        let api: Api<VpcMachine> = self.api(&key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_capi_cluster(&self, key: &ObjectKey) -> Result<Option<Cluster>> {
        let api: Api<Cluster> = self.api(&key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_capi_machine(&self, key: &ObjectKey) -> Result<Option<Machine>> {
        let api: Api<Machine> = self.api(&key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn patch_vpc_cluster(&self, cluster: &VpcCluster) -> Result<VpcCluster> {
        let key = ObjectKey::of(cluster);
        let api: Api<VpcCluster> = self.api(&key.namespace);
        let patched = api
            .patch(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&finalizer_patch(cluster)),
            )
            .await?;
        debug!(vpc_cluster = %key, finalizers = ?patched.finalizers(), "patched finalizers");
        Ok(patched)
    }

    async fn update_vpc_cluster_status(&self, cluster: &VpcCluster) -> Result<VpcCluster> {
        let key = ObjectKey::of(cluster);
        let api: Api<VpcCluster> = self.api(&key.namespace);
        let patch = json!({ "status": cluster.status });
        let patched = api
            .patch_status(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        debug!(vpc_cluster = %key, "patched status");
        Ok(patched)
    }

    async fn patch_vpc_machine(&self, machine: &VpcMachine) -> Result<VpcMachine> {
        let key = ObjectKey::of(machine);
        let api: Api<VpcMachine> = self.api(&key.namespace);
        let patched = api
            .patch(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&finalizer_patch(machine)),
            )
            .await?;
        debug!(vpc_machine = %key, finalizers = ?patched.finalizers(), "patched finalizers");
        Ok(patched)
    }

    async fn update_vpc_machine_status(&self, machine: &VpcMachine) -> Result<VpcMachine> {
        let key = ObjectKey::of(machine);
        let api: Api<VpcMachine> = self.api(&key.namespace);
        let patch = json!({ "status": machine.status });
        let patched = api
            .patch_status(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        debug!(vpc_machine = %key, "patched status");
        Ok(patched)
    }
}
