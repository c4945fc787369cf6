//! VpcMachine controller
//!
//! Converges the instance described by a VpcMachine once its owners are
//! linked and the parent VpcCluster's network exists. A finalizer is held
//! until the instance has been deleted.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::{finish_pass, outcome_action, Context, ReconcileOutcome};
use crate::crd::capi::{capi_owner, cluster_name_label, CLUSTER_NAME_LABEL};
use crate::crd::{set_condition, Condition, VpcCluster, VpcMachine, MACHINE_FINALIZER};
use crate::scope::{MachineScope, Scope, ScopeParams};
use crate::store::ObjectKey;
use crate::{Error, Result};

/// Reconcile a VpcMachine
#[instrument(skip(machine, ctx), fields(vpc_machine = %machine.name_any()))]
pub async fn reconcile_machine(machine: Arc<VpcMachine>, ctx: Arc<Context>) -> Result<Action> {
    info!("reconciling VpcMachine");
    let key = ObjectKey::of(machine.as_ref());
    reconcile_machine_key(&key, &ctx).await.map(outcome_action)
}

/// Run one reconciliation pass for the VpcMachine with the given key
pub async fn reconcile_machine_key(key: &ObjectKey, ctx: &Context) -> Result<ReconcileOutcome> {
    let Some(mut machine) = ctx.store.get_vpc_machine(key).await? else {
        debug!(vpc_machine = %key, "VpcMachine not found");
        return Ok(ReconcileOutcome::Done);
    };

    let deleting = machine.metadata.deletion_timestamp.is_some();
    if deleting {
        if !machine.finalizers().iter().any(|f| f == MACHINE_FINALIZER) {
            debug!(vpc_machine = %key, "deleting without finalizer, nothing to do");
            return Ok(ReconcileOutcome::Done);
        }
    } else {
        let parent = match resolve_parent(&machine, key, ctx).await {
            Ok(parent) => parent,
            Err(Error::RelationshipUnresolved(reason)) => {
                info!(vpc_machine = %key, %reason, "owners not linked yet");
                return Ok(ReconcileOutcome::Skipped(reason));
            }
            Err(e) => return Err(e),
        };

        if parent.network_id().is_none() {
            let reason = format!("waiting for VpcCluster {} network", parent.name_any());
            info!(vpc_machine = %key, %reason, "parent not ready");
            return Ok(ReconcileOutcome::Skipped(reason));
        }
    }

    let mut scope = Scope::new(ScopeParams {
        store: ctx.store.clone(),
        sessions: ctx.sessions.as_ref(),
        credentials: &ctx.credentials,
        resource: &mut machine,
    })
    .await?;

    if deleting {
        let body = delete_machine(&mut scope).await;
        finish_pass(&mut scope, body, "DeleteFailed").await?;
    } else {
        let body = converge_machine(&mut scope).await;
        finish_pass(&mut scope, body, "ProvisionFailed").await?;
    }
    Ok(ReconcileOutcome::Done)
}

/// Follow VpcMachine -> Machine -> Cluster -> VpcCluster.
///
/// Any missing link is reported as `RelationshipUnresolved`.
async fn resolve_parent(machine: &VpcMachine, key: &ObjectKey, ctx: &Context) -> Result<VpcCluster> {
    let owner = capi_owner(&machine.metadata, "Machine")
        .ok_or_else(|| Error::unresolved("no owning Machine yet"))?;

    let capi_machine = ctx
        .store
        .get_capi_machine(&ObjectKey::new(&key.namespace, &owner.name))
        .await?
        .ok_or_else(|| Error::unresolved(format!("Machine {} not found", owner.name)))?;

    // Same key machines_for_cluster matches on
    let cluster_name = cluster_name_label(&machine.metadata)
        .ok_or_else(|| Error::unresolved(format!("no {CLUSTER_NAME_LABEL} label yet")))?;
    let owner_cluster = capi_machine.spec.cluster_name.as_str();
    if !owner_cluster.is_empty() && owner_cluster != cluster_name {
        return Err(Error::unresolved(format!(
            "labelled for Cluster {cluster_name} but Machine {} belongs to {owner_cluster}",
            owner.name
        )));
    }

    let cluster = ctx
        .store
        .get_capi_cluster(&ObjectKey::new(&key.namespace, cluster_name))
        .await?
        .ok_or_else(|| Error::unresolved(format!("Cluster {cluster_name} not found")))?;

    let infra_name = cluster
        .infrastructure_name()
        .ok_or_else(|| Error::unresolved(format!("Cluster {cluster_name} has no infrastructureRef")))?;

    ctx.store
        .get_vpc_cluster(&ObjectKey::new(&key.namespace, infra_name))
        .await?
        .ok_or_else(|| Error::unresolved(format!("VpcCluster {infra_name} not found")))
}

async fn converge_machine(scope: &mut MachineScope<'_>) -> Result<()> {
    if scope.add_finalizer(MACHINE_FINALIZER).await? {
        info!(vpc_machine = %scope.key(), "added finalizer");
    }

    let machine = scope.resource();
    let name = machine.instance_name();
    let spec = machine.spec.clone();
    let subnet = spec.primary_network_interface.subnet;
    for (field, value) in [
        ("image", &spec.image),
        ("zone", &spec.zone),
        ("profile", &spec.profile),
        ("primaryNetworkInterface.subnet", &subnet),
    ] {
        if value.is_empty() {
            return Err(Error::validation(format!("spec.{field} must not be empty")));
        }
    }

    let instance = scope
        .ensure_instance(&name, &spec.image, &spec.profile, &spec.zone, &subnet)
        .await?;

    let message = format!("instance {} exists", instance.id);
    let status = scope.resource_mut().status_mut();
    status.instance_id = Some(instance.id);
    status.ready = true;
    set_condition(
        &mut status.conditions,
        Condition::ready("InstanceAvailable", message),
    );
    Ok(())
}

async fn delete_machine(scope: &mut MachineScope<'_>) -> Result<()> {
    match scope.resource().instance_id().map(str::to_string) {
        Some(id) => match scope.get_instance(&id).await {
            Ok(_) => scope.delete_instance(&id).await?,
            Err(e) if e.is_not_found() => {
                info!(vpc_machine = %scope.key(), instance = %id, "instance already gone");
            }
            Err(e) => return Err(e),
        },
        None => info!(vpc_machine = %scope.key(), "no instance recorded, nothing to delete"),
    }
    scope.remove_finalizer(MACHINE_FINALIZER);
    info!(vpc_machine = %scope.key(), "removed finalizer");
    Ok(())
}

/// VpcMachines to re-reconcile when a VpcCluster changes.
///
/// Machines wait for their cluster's network; this maps a VpcCluster to the
/// machines of the same CAPI cluster so they are re-queued once it appears.
pub fn machines_for_cluster(
    cluster: &VpcCluster,
    machines: &[Arc<VpcMachine>],
) -> Vec<ObjectRef<VpcMachine>> {
    let Some(cluster_name) = capi_owner(&cluster.metadata, "Cluster")
        .map(|owner| owner.name.as_str())
        .or_else(|| cluster_name_label(&cluster.metadata))
    else {
        return vec![];
    };

    let namespace = cluster.namespace();
    machines
        .iter()
        .filter(|m| m.namespace() == namespace)
        .filter(|m| cluster_name_label(&m.metadata) == Some(cluster_name))
        .map(|m| ObjectRef::from_obj(m.as_ref()))
        .collect()
}
