//! VPC cloud API client
//!
//! [`VpcClient`] is the capability the scopes converge through. It is
//! implemented once ([`VpcApiClient`] over the REST API) and shared by
//! reference, so cluster and machine scopes never carry their own copies.
//! A fresh session is opened per reconciliation pass by a [`SessionFactory`].

mod client;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::config::VpcCredentials;
use crate::Result;

pub use client::{IamSessionFactory, VpcApiClient, API_VERSION};

/// A VPC network
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Vpc {
    /// Provider-assigned id
    pub id: String,
    /// Unique name within the account
    pub name: String,
    /// Lifecycle status reported by the provider (e.g. "available")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Cloud resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
}

/// A virtual server instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Instance {
    /// Provider-assigned id
    pub id: String,
    /// Unique name within the account
    pub name: String,
    /// Lifecycle status reported by the provider (e.g. "running")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Zone the instance runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<NameReference>,
}

/// Reference to a provider object by id
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct IdReference {
    /// Object id
    pub id: String,
}

/// Reference to a provider object by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct NameReference {
    /// Object name
    pub name: String,
}

/// Request body for creating a VPC
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct VpcPrototype {
    /// VPC name
    pub name: String,
    /// Resource group the VPC is created in
    pub resource_group: IdReference,
}

impl VpcPrototype {
    /// Build a prototype for the given name and resource group id
    pub fn new(name: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_group: IdReference {
                id: resource_group.into(),
            },
        }
    }
}

/// Primary network interface of a new instance
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct NetworkInterfacePrototype {
    /// Subnet the interface is attached to
    pub subnet: IdReference,
}

/// Request body for creating an instance
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct InstancePrototype {
    /// Instance name
    pub name: String,
    /// OS image
    pub image: IdReference,
    /// Instance profile (flavor)
    pub profile: NameReference,
    /// Placement zone
    pub zone: NameReference,
    /// Primary network interface
    pub primary_network_interface: NetworkInterfacePrototype,
}

impl InstancePrototype {
    /// Build a prototype from the machine's desired placement
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        profile: impl Into<String>,
        zone: impl Into<String>,
        subnet_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image: IdReference { id: image.into() },
            profile: NameReference {
                name: profile.into(),
            },
            zone: NameReference { name: zone.into() },
            primary_network_interface: NetworkInterfacePrototype {
                subnet: IdReference {
                    id: subnet_id.into(),
                },
            },
        }
    }
}

/// Operations against the remote VPC provider
///
/// Every call is a single remote round trip. Implementations never retry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VpcClient: Send + Sync {
    /// List every VPC visible to the account
    async fn list_vpcs(&self) -> Result<Vec<Vpc>>;

    /// Create a VPC
    async fn create_vpc(&self, prototype: &VpcPrototype) -> Result<Vpc>;

    /// Delete a VPC by id
    async fn delete_vpc(&self, id: &str) -> Result<()>;

    /// List every instance visible to the account
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Create an instance
    async fn create_instance(&self, prototype: &InstancePrototype) -> Result<Instance>;

    /// Get an instance by id. Fails with `NotFound` if it does not exist.
    async fn get_instance(&self, id: &str) -> Result<Instance>;

    /// Delete an instance by id
    async fn delete_instance(&self, id: &str) -> Result<()>;
}

/// Opens one provider session per reconciliation pass
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Authenticate and return a client bound to the session.
    ///
    /// Fails with `Error::Scope` when the session cannot be established.
    async fn connect(&self, credentials: &VpcCredentials) -> Result<Arc<dyn VpcClient>>;
}

/// Objects addressable by their unique name
pub trait Named {
    /// The object's name
    fn name(&self) -> &str;
}

impl Named for Vpc {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Instance {
    fn name(&self) -> &str {
        &self.name
    }
}

/// First object whose name equals `name`.
///
/// This is a linear scan over a full listing, so every convergence call costs
/// O(n) in the number of objects in the account. Acceptable for the fleet
/// sizes this provider targets; a name-filtered list call would be needed
/// beyond that.
pub fn find_by_name<T: Named>(items: Vec<T>, name: &str) -> Option<T> {
    items.into_iter().find(|item| item.name() == name)
}
