//! Machine scope: converges a VpcMachine's instance

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Scope, ScopeKind, ScopedResource};
use crate::crd::{Condition, VpcMachine, VpcMachineStatus};
use crate::store::ResourceStore;
use crate::vpc::{find_by_name, Instance, InstancePrototype};
use crate::Result;

/// Scope bound to a VpcMachine
pub type MachineScope<'a> = Scope<'a, VpcMachine>;

#[async_trait]
impl ScopedResource for VpcMachine {
    const KIND: ScopeKind = ScopeKind::Machine;
    type Status = VpcMachineStatus;

    fn observed(&self) -> Option<&VpcMachineStatus> {
        self.status.as_ref()
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status_mut().conditions
    }

    async fn write_finalizers(store: &dyn ResourceStore, resource: &Self) -> Result<Self> {
        store.patch_vpc_machine(resource).await
    }

    async fn write_status(store: &dyn ResourceStore, resource: &Self) -> Result<Self> {
        store.update_vpc_machine_status(resource).await
    }
}

impl MachineScope<'_> {
    /// Find the instance named `desired_name`, creating it if none exists.
    ///
    /// An existing instance with that name is returned as-is even if its
    /// placement differs from the requested one.
    pub async fn ensure_instance(
        &self,
        desired_name: &str,
        image: &str,
        profile: &str,
        zone: &str,
        subnet_id: &str,
    ) -> Result<Instance> {
        let existing = self
            .client()
            .list_instances()
            .await
            .map_err(|e| self.label(e))?;

        if let Some(instance) = find_by_name(existing, desired_name) {
            debug!(vpc_machine = %self.key(), instance = %instance.id, "instance already exists");
            return Ok(instance);
        }

        let prototype = InstancePrototype::new(desired_name, image, profile, zone, subnet_id);
        let instance = self
            .client()
            .create_instance(&prototype)
            .await
            .map_err(|e| self.label(e))?;
        info!(
            vpc_machine = %self.key(),
            instance = %instance.id,
            name = desired_name,
            zone,
            profile,
            "created instance"
        );
        Ok(instance)
    }

    /// Look up an instance by id. Fails with `NotFound` if it does not exist.
    pub async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        self.client()
            .get_instance(instance_id)
            .await
            .map_err(|e| self.label(e))
    }

    /// Delete the instance with the given id
    pub async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.client()
            .delete_instance(instance_id)
            .await
            .map_err(|e| self.label(e))?;
        info!(vpc_machine = %self.key(), instance = instance_id, "deleted instance");
        Ok(())
    }
}
