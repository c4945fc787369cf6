//! Integration tests for CRD operations
//!
//! These tests tell the story of how cluster operators interact with VpcCluster
//! and VpcMachine resources through the Kubernetes API.

use std::sync::Arc;

use kube::api::{Api, ListParams, PostParams};
use kube::ResourceExt;

use capi_vpc::controller::machines_for_cluster;
use capi_vpc::crd::capi::CLUSTER_NAME_LABEL;
use capi_vpc::crd::{VpcCluster, VpcMachine};

use super::helpers::{
    cleanup_cluster, cleanup_machine, ensure_test_cluster, sample_cluster, sample_machine,
    TEST_NAMESPACE,
};

// =============================================================================
// VpcCluster Stories
// =============================================================================

/// Story: Operator declares the network a workload cluster lives in
///
/// The spec is persisted as written and no status exists until a controller
/// has converged the VPC.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_operator_creates_vpc_cluster() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<VpcCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-cluster-create";
    cleanup_cluster(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_cluster(name))
        .await
        .expect("failed to create VpcCluster");

    assert_eq!(created.name_any(), name);
    assert_eq!(created.spec.vpc, "crd-cluster-create-vpc");
    assert_eq!(created.spec.region.as_deref(), Some("us-south"));
    assert_eq!(created.network_id(), None);

    let fetched = api.get(name).await.expect("failed to get VpcCluster");
    assert_eq!(fetched.spec, created.spec);

    cleanup_cluster(&client, name).await;
}

/// Story: Status written by the main resource endpoint is dropped
///
/// The CRD declares a status subresource, so only the status endpoint can set
/// the observed VPC.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_status_is_a_subresource() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<VpcCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-cluster-status";
    cleanup_cluster(&client, name).await;

    let mut cluster = sample_cluster(name);
    cluster.status_mut().ready = true;
    let created = api
        .create(&PostParams::default(), &cluster)
        .await
        .expect("failed to create VpcCluster");

    assert!(
        created.status.map(|s| !s.ready).unwrap_or(true),
        "status must not be settable through the main endpoint"
    );

    cleanup_cluster(&client, name).await;
}

// =============================================================================
// VpcMachine Stories
// =============================================================================

/// Story: Operator declares a machine without an explicit instance name
///
/// The instance is named after the resource.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_operator_creates_vpc_machine() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<VpcMachine> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-machine-create";
    cleanup_machine(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_machine(name))
        .await
        .expect("failed to create VpcMachine");

    assert_eq!(created.instance_name(), name);
    assert_eq!(created.spec.primary_network_interface.subnet, "0737-subnet");
    assert_eq!(created.instance_id(), None);

    cleanup_machine(&client, name).await;
}

/// Story: A VpcCluster change finds the machines of the same CAPI cluster
///
/// Machines waiting for their network are re-queued through this mapping,
/// so it must work on objects as the API server returns them.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_cluster_change_maps_to_labelled_machines() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let clusters: Api<VpcCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let machines: Api<VpcMachine> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let (cluster_name, member, stranger) = ("crd-map-cluster", "crd-map-member", "crd-map-other");
    cleanup_cluster(&client, cluster_name).await;
    cleanup_machine(&client, member).await;
    cleanup_machine(&client, stranger).await;

    let mut cluster = sample_cluster(cluster_name);
    cluster
        .labels_mut()
        .insert(CLUSTER_NAME_LABEL.to_string(), "capi-demo".to_string());
    let cluster = clusters
        .create(&PostParams::default(), &cluster)
        .await
        .expect("failed to create VpcCluster");

    let mut labelled = sample_machine(member);
    labelled
        .labels_mut()
        .insert(CLUSTER_NAME_LABEL.to_string(), "capi-demo".to_string());
    machines
        .create(&PostParams::default(), &labelled)
        .await
        .expect("failed to create VpcMachine");
    let mut other = sample_machine(stranger);
    other
        .labels_mut()
        .insert(CLUSTER_NAME_LABEL.to_string(), "another-cluster".to_string());
    machines
        .create(&PostParams::default(), &other)
        .await
        .expect("failed to create VpcMachine");

    let listed: Vec<Arc<VpcMachine>> = machines
        .list(&ListParams::default())
        .await
        .expect("failed to list VpcMachines")
        .items
        .into_iter()
        .map(Arc::new)
        .collect();
    let refs = machines_for_cluster(&cluster, &listed);
    let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec![member]);

    cleanup_machine(&client, member).await;
    cleanup_machine(&client, stranger).await;
    cleanup_cluster(&client, cluster_name).await;
}
