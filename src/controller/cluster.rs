//! VpcCluster controller
//!
//! Converges the VPC network named by a VpcCluster and holds a finalizer on
//! it until that network has been deleted.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::{finish_pass, outcome_action, Context, ReconcileOutcome};
use crate::crd::capi::capi_owner;
use crate::crd::{set_condition, Condition, VpcCluster, VpcReference, CLUSTER_FINALIZER};
use crate::scope::{ClusterScope, Scope, ScopeParams};
use crate::store::ObjectKey;
use crate::{Error, Result};

/// Reconcile a VpcCluster
///
/// The object handed in by the watcher only supplies the key; the pass
/// re-reads the current state from the store.
#[instrument(skip(cluster, ctx), fields(vpc_cluster = %cluster.name_any()))]
pub async fn reconcile_cluster(cluster: Arc<VpcCluster>, ctx: Arc<Context>) -> Result<Action> {
    info!("reconciling VpcCluster");
    let key = ObjectKey::of(cluster.as_ref());
    reconcile_cluster_key(&key, &ctx).await.map(outcome_action)
}

/// Run one reconciliation pass for the VpcCluster with the given key
pub async fn reconcile_cluster_key(key: &ObjectKey, ctx: &Context) -> Result<ReconcileOutcome> {
    let Some(mut cluster) = ctx.store.get_vpc_cluster(key).await? else {
        debug!(vpc_cluster = %key, "VpcCluster not found");
        return Ok(ReconcileOutcome::Done);
    };

    if let Some(owner) = capi_owner(&cluster.metadata, "Cluster") {
        debug!(vpc_cluster = %key, cluster = %owner.name, "owned by CAPI Cluster");
    }

    let deleting = cluster.metadata.deletion_timestamp.is_some();
    if deleting && !cluster.finalizers().iter().any(|f| f == CLUSTER_FINALIZER) {
        debug!(vpc_cluster = %key, "deleting without finalizer, nothing to do");
        return Ok(ReconcileOutcome::Done);
    }

    let mut scope = Scope::new(ScopeParams {
        store: ctx.store.clone(),
        sessions: ctx.sessions.as_ref(),
        credentials: &ctx.credentials,
        resource: &mut cluster,
    })
    .await?;

    if deleting {
        let body = delete_cluster(&mut scope).await;
        finish_pass(&mut scope, body, "DeleteFailed").await?;
    } else {
        let body = converge_cluster(&mut scope).await;
        finish_pass(&mut scope, body, "ProvisionFailed").await?;
    }
    Ok(ReconcileOutcome::Done)
}

async fn converge_cluster(scope: &mut ClusterScope<'_>) -> Result<()> {
    if scope.add_finalizer(CLUSTER_FINALIZER).await? {
        info!(vpc_cluster = %scope.key(), "added finalizer");
    }

    let desired = scope.resource().spec.vpc.clone();
    if desired.is_empty() {
        return Err(Error::validation("spec.vpc must not be empty"));
    }

    let vpc = scope.ensure_network(&desired).await?;

    let message = format!("VPC {} is available", vpc.id);
    let status = scope.resource_mut().status_mut();
    status.vpc = Some(VpcReference {
        id: vpc.id,
        name: vpc.name,
    });
    status.ready = true;
    set_condition(
        &mut status.conditions,
        Condition::ready("VpcAvailable", message),
    );
    Ok(())
}

async fn delete_cluster(scope: &mut ClusterScope<'_>) -> Result<()> {
    match scope.resource().network_id().map(str::to_string) {
        Some(id) => scope.delete_network(&id).await?,
        None => info!(vpc_cluster = %scope.key(), "no VPC recorded, nothing to delete"),
    }
    scope.remove_finalizer(CLUSTER_FINALIZER);
    info!(vpc_cluster = %scope.key(), "removed finalizer");
    Ok(())
}
