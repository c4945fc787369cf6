//! capi-vpc - Cluster API infrastructure provider for VPC networks and instances

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use capi_vpc::config::{ControllerConfig, VpcCredentials};
use capi_vpc::controller::{
    error_policy, machines_for_cluster, reconcile_cluster, reconcile_machine, Context,
};
use capi_vpc::crd::{VpcCluster, VpcMachine};
use capi_vpc::FIELD_MANAGER;

/// capi-vpc - Cluster API infrastructure provider for VPC networks and instances
#[derive(Parser)]
#[command(name = "capi-vpc", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the VpcCluster and VpcMachine controllers
    ///
    /// Installs the CRDs, then reconciles until SIGTERM/SIGINT.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Args)]
struct ControllerArgs {
    /// Identity-and-access endpoint the API key is exchanged at
    #[arg(long, env = "IAM_ENDPOINT", default_value = "https://iam.cloud.ibm.com")]
    iam_endpoint: String,

    /// API key for the VPC account
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    /// Regional VPC service endpoint (e.g. https://us-south.iaas.cloud.ibm.com)
    #[arg(long, env = "SERVICE_ENDPOINT")]
    service_endpoint: String,

    /// Timeout for a single VPC or IAM request, in seconds
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// Delay before a failed reconciliation is retried, in seconds
    #[arg(long, default_value = "30")]
    error_requeue_secs: u64,
}

impl ControllerArgs {
    fn credentials(&self) -> VpcCredentials {
        VpcCredentials::new(&self.iam_endpoint, &self.api_key, &self.service_endpoint)
    }

    fn config(&self) -> ControllerConfig {
        ControllerConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let cluster_crd = serde_yaml::to_string(&VpcCluster::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize VpcCluster CRD: {}", e))?;
        let machine_crd = serde_yaml::to_string(&VpcMachine::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize VpcMachine CRD: {}", e))?;
        println!("{cluster_crd}---\n{machine_crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => anyhow::bail!("no command given; run `capi-vpc controller` or `capi-vpc --crd`"),
    }
}

/// Ensure the VpcCluster and VpcMachine CRDs are installed
///
/// Uses server-side apply so the CRD versions always match the binary.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in [VpcCluster::crd(), VpcMachine::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("All CRDs installed/updated");
    Ok(())
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("capi-vpc controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let credentials = args.credentials();
    tracing::info!(
        iam_endpoint = %credentials.iam_endpoint,
        service_endpoint = %credentials.service_endpoint,
        "Using VPC endpoints"
    );
    let ctx = Arc::new(
        Context::builder(client.clone(), credentials)
            .config(args.config())
            .build(),
    );

    let clusters: Api<VpcCluster> = Api::all(client.clone());
    let machines: Api<VpcMachine> = Api::all(client);

    tracing::info!("Starting controllers...");
    tracing::info!("  - VpcCluster controller");
    tracing::info!("  - VpcMachine controller");

    let cluster_controller = Controller::new(clusters.clone(), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile_cluster, error_policy::<VpcCluster>, ctx.clone())
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "VpcCluster reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "VpcCluster reconciliation error");
                }
            }
        });

    // Machines skipped while their cluster's network is pending are re-queued
    // when the VpcCluster changes
    let machine_controller = Controller::new(machines, WatcherConfig::default());
    let machine_store = machine_controller.store();
    let machine_controller = machine_controller
        .watches(clusters, WatcherConfig::default(), move |cluster| {
            machines_for_cluster(&cluster, &machine_store.state())
        })
        .shutdown_on_signal()
        .run(reconcile_machine, error_policy::<VpcMachine>, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "VpcMachine reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "VpcMachine reconciliation error");
                }
            }
        });

    tokio::select! {
        _ = cluster_controller => {
            tracing::info!("VpcCluster controller completed");
        }
        _ = machine_controller => {
            tracing::info!("VpcMachine controller completed");
        }
    }

    tracing::info!("capi-vpc controller shutting down");
    Ok(())
}
