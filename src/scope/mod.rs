//! Reconciliation scopes
//!
//! A [`Scope`] binds exactly one resource to one provider session for the
//! duration of a reconciliation pass. It exposes the idempotent converge and
//! teardown operations for its kind, and writes the resource's finalizers and
//! status back through the store when the pass ends.
//!
//! Construction is shared: [`Scope::new`] takes [`ScopeParams`] for any
//! [`ScopedResource`] and the kind-specific operations live in `cluster` and
//! `machine`.

mod cluster;
mod machine;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use tracing::debug;

use crate::config::VpcCredentials;
use crate::crd::Condition;
use crate::store::{ObjectKey, ResourceStore};
use crate::vpc::{SessionFactory, VpcClient};
use crate::{Error, Result};

pub use cluster::ClusterScope;
pub use machine::MachineScope;

/// Which kind of resource a scope is bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// A VpcCluster and its network
    Cluster,
    /// A VpcMachine and its instance
    Machine,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Machine => write!(f, "machine"),
        }
    }
}

/// A resource a scope can be bound to
#[async_trait]
pub trait ScopedResource: Resource + Clone + Send + Sync + 'static {
    /// Kind tag of the scope
    const KIND: ScopeKind;

    /// Observed-state type of the resource
    type Status: Clone + PartialEq + Send + Sync;

    /// Current observed state, if any
    fn observed(&self) -> Option<&Self::Status>;

    /// Status conditions, creating the status on first use
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    /// Write the finalizer list, returning the stored object
    async fn write_finalizers(store: &dyn ResourceStore, resource: &Self) -> Result<Self>;

    /// Write the status subresource, returning the stored object
    async fn write_status(store: &dyn ResourceStore, resource: &Self) -> Result<Self>;
}

/// Inputs to [`Scope::new`]
pub struct ScopeParams<'a, R> {
    /// Store the resource is written back through
    pub store: Arc<dyn ResourceStore>,
    /// Opens the provider session for this pass
    pub sessions: &'a dyn SessionFactory,
    /// Credentials the session is opened with
    pub credentials: &'a VpcCredentials,
    /// The resource being reconciled
    pub resource: &'a mut R,
}

/// One resource bound to one provider session for a single pass
pub struct Scope<'a, R: ScopedResource> {
    store: Arc<dyn ResourceStore>,
    client: Arc<dyn VpcClient>,
    resource: &'a mut R,
    key: ObjectKey,
    written_finalizers: Vec<String>,
    written_status: Option<R::Status>,
}

impl<'a, R: ScopedResource> Scope<'a, R> {
    /// Validate the resource and open a provider session for it.
    ///
    /// Fails with `Error::Scope` if the session cannot be established, before
    /// anything has been mutated.
    pub async fn new(params: ScopeParams<'a, R>) -> Result<Self> {
        let ScopeParams {
            store,
            sessions,
            credentials,
            resource,
        } = params;

        let key = ObjectKey::of(&*resource);
        if key.name.is_empty() || key.namespace.is_empty() {
            return Err(Error::validation(format!(
                "{} resource must have a name and namespace",
                R::KIND
            )));
        }

        let client = sessions.connect(credentials).await.map_err(|e| match e {
            Error::Scope(_) => e,
            other => Error::scope(format!("{} {}: {}", R::KIND, key, other)),
        })?;
        debug!(kind = %R::KIND, resource = %key, "opened provider session");

        Ok(Self {
            store,
            client,
            written_finalizers: resource.finalizers().to_vec(),
            written_status: resource.observed().cloned(),
            resource,
            key,
        })
    }

    /// Namespaced name of the bound resource
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// The bound resource
    pub fn resource(&self) -> &R {
        &*self.resource
    }

    /// Mutable access to the bound resource
    pub fn resource_mut(&mut self) -> &mut R {
        &mut *self.resource
    }

    pub(crate) fn client(&self) -> &dyn VpcClient {
        self.client.as_ref()
    }

    /// Attach the provider call's failure to this scope's resource
    pub(crate) fn label(&self, err: Error) -> Error {
        err.for_resource(self.key.to_string())
    }

    /// True if the resource carries the finalizer
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.resource.finalizers().iter().any(|f| f == finalizer)
    }

    /// Add the finalizer and write it through the store right away.
    ///
    /// Returns false if it was already present.
    pub async fn add_finalizer(&mut self, finalizer: &str) -> Result<bool> {
        if self.has_finalizer(finalizer) {
            return Ok(false);
        }
        self.resource.finalizers_mut().push(finalizer.to_string());
        let stored = match R::write_finalizers(self.store.as_ref(), &*self.resource).await {
            Ok(stored) => stored,
            Err(e) => {
                self.remove_finalizer(finalizer);
                return Err(e);
            }
        };
        self.refresh_version(&stored);
        self.written_finalizers = self.resource.finalizers().to_vec();
        debug!(resource = %self.key, finalizer, "added finalizer");
        Ok(true)
    }

    /// Drop the finalizer from the in-memory resource. Written by [`Scope::persist`].
    pub fn remove_finalizer(&mut self, finalizer: &str) {
        self.resource.finalizers_mut().retain(|f| f != finalizer);
    }

    /// Write whatever the pass changed back through the store.
    ///
    /// Status goes first: dropping the last finalizer of a deleting resource
    /// lets the API server remove it, after which status can no longer be
    /// written. Calling this again without further changes writes nothing.
    ///
    /// The finalizer write is guarded by the resourceVersion its list was
    /// based on, so a finalizer edit made by someone else since then turns
    /// into a conflict.
    pub async fn persist(&mut self) -> Result<()> {
        if self.resource.observed() != self.written_status.as_ref() {
            let stored = R::write_status(self.store.as_ref(), &*self.resource).await?;
            if stored.finalizers() == self.written_finalizers.as_slice() {
                self.refresh_version(&stored);
            }
            self.written_status = self.resource.observed().cloned();
        }

        if self.resource.finalizers() != self.written_finalizers.as_slice() {
            let stored = R::write_finalizers(self.store.as_ref(), &*self.resource).await?;
            self.refresh_version(&stored);
            self.written_finalizers = self.resource.finalizers().to_vec();
        }
        Ok(())
    }

    fn refresh_version(&mut self, stored: &R) {
        if let Some(rv) = stored.resource_version() {
            self.resource.meta_mut().resource_version = Some(rv);
        }
    }
}
