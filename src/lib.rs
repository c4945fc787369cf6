//! capi-vpc - Cluster API infrastructure provider for VPC networks and instances
//!
//! Reconciles `VpcCluster` and `VpcMachine` resources against a VPC cloud
//! provider: each cluster converges on one named VPC network, each machine on
//! one named virtual server instance inside it.
//!
//! # Architecture
//!
//! A reconciliation pass is driven per resource by the kube-runtime scheduler:
//! - The controller reads the resource through a [`store::ResourceStore`]
//! - A [`scope::Scope`] binds it to a fresh provider session ([`vpc::VpcClient`])
//! - The scope converges (find-by-name, else create) or tears down
//! - Status and finalizers are written back when the pass ends
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (VpcCluster, VpcMachine, CAPI owner views)
//! - [`controller`] - Reconciliation state machines and controller context
//! - [`scope`] - Per-pass binding of one resource to one provider session
//! - [`store`] - Kubernetes resource store adapter
//! - [`vpc`] - VPC REST API client and IAM session factory
//! - [`config`] - Credentials and controller settings
//! - [`error`] - Error types for the provider

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod scope;
pub mod store;
pub mod vpc;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every write to the API server
pub const FIELD_MANAGER: &str = "capi-vpc";
