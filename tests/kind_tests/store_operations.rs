//! Integration tests for the store the reconcilers write through
//!
//! These tests tell the story of a reconciliation pass from the API server's
//! point of view: finalizers guarded by resourceVersion, status written via
//! the subresource, and a whole VpcCluster lifecycle driven against a mock
//! VPC endpoint.

use std::time::Duration;

use kube::api::{Api, DeleteParams, PostParams};
use kube::ResourceExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use capi_vpc::config::{ControllerConfig, VpcCredentials};
use capi_vpc::controller::{reconcile_cluster_key, Context, ReconcileOutcome};
use capi_vpc::crd::{Condition, VpcCluster, VpcReference, CLUSTER_FINALIZER};
use capi_vpc::store::{KubeStore, ObjectKey, ResourceStore};
use capi_vpc::Error;

use super::helpers::{
    cleanup_cluster, create_test_client, ensure_test_cluster, sample_cluster, TEST_NAMESPACE,
};

// =============================================================================
// Finalizer Stories
// =============================================================================

/// Story: A finalizer patch lands and bumps the resourceVersion
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_finalizer_patch_is_persisted() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<VpcCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let store = KubeStore::new(client.clone());
    let name = "store-finalizer";
    cleanup_cluster(&client, name).await;

    let mut created = api
        .create(&PostParams::default(), &sample_cluster(name))
        .await
        .expect("failed to create VpcCluster");
    let before = created.resource_version();

    created.finalizers_mut().push(CLUSTER_FINALIZER.to_string());
    let patched = store
        .patch_vpc_cluster(&created)
        .await
        .expect("finalizer patch");

    assert_eq!(patched.finalizers(), &[CLUSTER_FINALIZER.to_string()]);
    assert_ne!(patched.resource_version(), before);

    cleanup_cluster(&client, name).await;
}

/// Story: Two writers race on the finalizer list
///
/// The second writer still holds the old resourceVersion, so its patch is
/// refused instead of silently replacing the first writer's list.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_stale_finalizer_patch_conflicts() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<VpcCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let store = KubeStore::new(client.clone());
    let name = "store-conflict";
    cleanup_cluster(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_cluster(name))
        .await
        .expect("failed to create VpcCluster");

    let mut first = created.clone();
    first.finalizers_mut().push("example.com/first".to_string());
    store.patch_vpc_cluster(&first).await.expect("first patch");

    let mut stale = created;
    stale.finalizers_mut().push(CLUSTER_FINALIZER.to_string());
    match store.patch_vpc_cluster(&stale).await {
        Err(Error::Kube(kube::Error::Api(resp))) => assert_eq!(resp.code, 409),
        other => panic!("expected conflict, got {other:?}"),
    }

    cleanup_cluster(&client, name).await;
}

// =============================================================================
// Status Stories
// =============================================================================

/// Story: The observed VPC is written through the status subresource
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_status_patch_is_persisted() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<VpcCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let store = KubeStore::new(client.clone());
    let name = "store-status";
    cleanup_cluster(&client, name).await;

    let mut created = api
        .create(&PostParams::default(), &sample_cluster(name))
        .await
        .expect("failed to create VpcCluster");

    let status = created.status_mut();
    status.vpc = Some(VpcReference {
        id: "r006-1234".to_string(),
        name: "store-status-vpc".to_string(),
    });
    status.ready = true;
    status.conditions.push(Condition::ready("VpcAvailable", "ok"));
    store
        .update_vpc_cluster_status(&created)
        .await
        .expect("status patch");

    let fetched = store
        .get_vpc_cluster(&ObjectKey::new(TEST_NAMESPACE, name))
        .await
        .expect("get")
        .expect("VpcCluster exists");
    assert_eq!(fetched.network_id(), Some("r006-1234"));
    let conditions = fetched.status.map(|s| s.conditions).unwrap_or_default();
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].reason, "VpcAvailable");

    cleanup_cluster(&client, name).await;
}

/// Story: Reading a resource that does not exist is not an error
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_missing_resource_reads_as_none() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let store = KubeStore::new(client);

    let missing = store
        .get_vpc_machine(&ObjectKey::new(TEST_NAMESPACE, "store-never-created"))
        .await
        .expect("get");
    assert!(missing.is_none());
}

// =============================================================================
// Lifecycle Story
// =============================================================================

/// Story: A VpcCluster is converged, then deleted, against a mock VPC endpoint
///
/// The first pass adds the finalizer and records the created VPC. Deleting the
/// resource leaves it terminating until the next pass deletes the VPC and
/// releases the finalizer.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_vpc_cluster_lifecycle() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<VpcCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "store-lifecycle";
    cleanup_cluster(&client, name).await;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "kind-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/vpcs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vpcs": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/vpcs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "r006-kind",
            "name": "store-lifecycle-vpc",
            "status": "pending"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/vpcs/r006-kind"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = Context::builder(
        create_test_client().await.expect("client"),
        VpcCredentials::new(server.uri(), "kind-key", server.uri()),
    )
    .config(ControllerConfig {
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    })
    .build();
    let key = ObjectKey::new(TEST_NAMESPACE, name);

    api.create(&PostParams::default(), &sample_cluster(name))
        .await
        .expect("failed to create VpcCluster");

    // Act: first pass converges the network
    let outcome = reconcile_cluster_key(&key, &ctx).await.expect("converge");
    assert_eq!(outcome, ReconcileOutcome::Done);

    let converged = api.get(name).await.expect("get");
    assert_eq!(converged.finalizers(), &[CLUSTER_FINALIZER.to_string()]);
    assert_eq!(converged.network_id(), Some("r006-kind"));
    assert!(converged.status.as_ref().is_some_and(|s| s.ready));

    // Act: delete, then reconcile the terminating resource
    api.delete(name, &DeleteParams::default())
        .await
        .expect("delete");
    let terminating = api.get(name).await.expect("held by finalizer");
    assert!(terminating.metadata.deletion_timestamp.is_some());

    reconcile_cluster_key(&key, &ctx).await.expect("teardown");

    let gone = api.get_opt(name).await.expect("get_opt");
    assert!(gone.is_none(), "finalizer should have been released");
}
