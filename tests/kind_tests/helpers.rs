//! Test helpers for integration tests
//!
//! Provides utilities for managing the kind cluster and test resources.

use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, Config, CustomResourceExt};
use tokio::sync::OnceCell;
use tokio::time::sleep;

use capi_vpc::crd::{NetworkInterface, VpcCluster, VpcClusterSpec, VpcMachine, VpcMachineSpec};
use capi_vpc::FIELD_MANAGER;

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "capi-vpc-integration-test";

/// Namespace every test resource is created in
pub const TEST_NAMESPACE: &str = "capi-vpc-test";

/// Global lock to ensure cluster is created only once
static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Track if the CRDs have been installed (async-safe)
static CRDS_INSTALLED: OnceCell<Result<(), String>> = OnceCell::const_new();

/// Check if a kind cluster with the given name exists
pub fn kind_cluster_exists(name: &str) -> bool {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .expect("failed to run kind");

    let clusters = String::from_utf8_lossy(&output.stdout);
    clusters.lines().any(|line| line.trim() == name)
}

/// Create a kind cluster for testing
pub fn create_kind_cluster(name: &str) -> Result<(), String> {
    if kind_cluster_exists(name) {
        println!("Kind cluster '{name}' already exists, reusing it");
        return Ok(());
    }

    println!("Creating kind cluster '{name}'...");
    let output = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "failed to create kind cluster: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    println!("Kind cluster '{name}' created successfully");
    Ok(())
}

/// Install the VpcCluster and VpcMachine CRDs plus the test namespace
pub async fn install_crds(client: &Client) -> Result<(), kube::Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in [VpcCluster::crd(), VpcMachine::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        println!("Installing CRD {name}...");
        crds.patch(&name, &params, &Patch::Apply(&crd)).await?;
    }

    let namespaces: Api<Namespace> = Api::all(client.clone());
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    namespaces
        .patch(TEST_NAMESPACE, &params, &Patch::Apply(&namespace))
        .await?;

    // Wait for the CRDs to be established
    sleep(Duration::from_secs(2)).await;

    println!("CRDs installed successfully");
    Ok(())
}

/// Create a Kubernetes client connected to the test cluster
pub async fn create_test_client() -> Result<Client, String> {
    let context_name = format!("kind-{TEST_CLUSTER_NAME}");

    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(context_name),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster is ready (thread-safe, cluster created once)
///
/// Returns a fresh Client for each call.
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let cluster_result = CLUSTER_INIT.get_or_init(|| create_kind_cluster(TEST_CLUSTER_NAME));
    cluster_result.clone()?;

    let client = create_test_client().await?;

    let crd_result = CRDS_INSTALLED
        .get_or_init(|| async {
            let client = create_test_client().await?;
            install_crds(&client)
                .await
                .map_err(|e| format!("failed to install CRDs: {e}"))
        })
        .await;
    crd_result.clone()?;

    Ok(client)
}

// =============================================================================
// Resource Fixtures
// =============================================================================

/// A VpcCluster in the test namespace
pub fn sample_cluster(name: &str) -> VpcCluster {
    let mut cluster = VpcCluster::new(
        name,
        VpcClusterSpec {
            vpc: format!("{name}-vpc"),
            resource_group: "rg-integration".to_string(),
            region: Some("us-south".to_string()),
        },
    );
    cluster.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    cluster
}

/// A VpcMachine in the test namespace
pub fn sample_machine(name: &str) -> VpcMachine {
    let mut machine = VpcMachine::new(
        name,
        VpcMachineSpec {
            name: String::new(),
            image: "r134-image".to_string(),
            zone: "us-south-3".to_string(),
            profile: "bx2-8x32".to_string(),
            primary_network_interface: NetworkInterface {
                subnet: "0737-subnet".to_string(),
            },
        },
    );
    machine.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    machine
}

/// Delete a VpcCluster, clearing finalizers so it does not linger
pub async fn cleanup_cluster(client: &Client, name: &str) {
    let api: Api<VpcCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let clear = serde_json::json!({ "metadata": { "finalizers": null } });
    let _ = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&clear))
        .await;
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Delete a VpcMachine, clearing finalizers so it does not linger
pub async fn cleanup_machine(client: &Client, name: &str) {
    let api: Api<VpcMachine> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let clear = serde_json::json!({ "metadata": { "finalizers": null } });
    let _ = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&clear))
        .await;
    let _ = api.delete(name, &DeleteParams::default()).await;
}
