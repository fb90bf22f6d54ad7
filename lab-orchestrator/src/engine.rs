//! Engine façade: the caller-facing lab operations.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use lab_config::Tunables;
use lab_core::error::{LabError, Result};
use lab_platform::{PlatformGateway, PowerState};
use serde::Serialize;
use tracing::info;

use crate::allocator::{self, VmidAllocator};
use crate::clone::{self, CreatedVm};
use crate::gate::Gate;
use crate::group::GroupId;
use crate::inventory::Inventory;
use crate::lifecycle::{self, PowerReport, TeardownReport};
use crate::poll::PollBudget;
use crate::reconcile::{self, ReconcileReport};
use crate::tags;

/// Parameters for instantiating a lab group.
#[derive(Debug, Clone)]
pub struct InstantiateRequest {
    pub lab_group: String,
    pub vlan_zone: String,
    pub vlan_tag: u32,
    /// Explicit instance number; allocated from the inventory when
    /// absent.
    pub instance: Option<u32>,
}

/// Outcome of an instantiate operation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub group: GroupId,
    pub vnet: String,
    pub created: Vec<CreatedVm>,
}

/// The lab orchestration engine.
///
/// Owns the gateway handle, the two operation gates, and the polling
/// budget. Each method is one sequential unit of work; there is no
/// parallelism across templates or members within an operation.
///
/// Known consistency gap, kept from the original protocol: the creation
/// and deletion gates are independent of each other, and start/stop and
/// reconcile take no gate at all, so those may race with create/delete.
pub struct LabEngine {
    gateway: Arc<dyn PlatformGateway>,
    create_gate: Gate,
    delete_gate: Gate,
    budget: PollBudget,
}

impl LabEngine {
    pub fn new(gateway: Arc<dyn PlatformGateway>, tunables: &Tunables) -> Self {
        let wait = Duration::from_secs(tunables.gate_wait_secs);
        Self {
            gateway,
            create_gate: Gate::new("create", wait),
            delete_gate: Gate::new("delete", wait),
            budget: PollBudget::from_tunables(tunables),
        }
    }

    /// Rewrites the lab-group tag list in a template's description.
    pub async fn tag_template(&self, vmid: u32, lab_groups: &[String]) -> Result<()> {
        let inventory = self.inventory().await?;
        let vm = inventory
            .find_vm(vmid)
            .ok_or_else(|| LabError::NotFound(format!("template {vmid} not found")))?;
        let description = tags::encode_groups(&vm.description, lab_groups);
        self.gateway
            .set_vm_config(&vm.node, vmid, &[("description", description.as_str())])
            .await?;
        info!(vmid, groups = lab_groups.len(), "template tags updated");
        Ok(())
    }

    /// Creates a vnet and clones every template tagged for the lab group
    /// into it. Runs under the creation gate: snapshot, allocation, and
    /// all clones happen without another create interleaving.
    pub async fn instantiate(&self, request: &InstantiateRequest) -> Result<CreateReport> {
        let _gate = self.create_gate.acquire().await?;

        let inventory = self.inventory().await?;
        let instance = request
            .instance
            .unwrap_or_else(|| inventory.next_instance(&request.lab_group));
        let group = GroupId::new(request.lab_group.clone(), instance);

        let templates: Vec<_> = inventory
            .templates_tagged(&request.lab_group)
            .into_iter()
            .cloned()
            .collect();
        if templates.is_empty() {
            return Err(LabError::NotFound(format!(
                "no templates tagged for lab group '{}'",
                request.lab_group
            )));
        }

        let vnet = allocator::next_vnet_name(&inventory.vnets);
        info!(%group, vnet = %vnet, zone = %request.vlan_zone, tag = request.vlan_tag, "creating lab network");
        self.gateway
            .create_vnet(&vnet, &request.vlan_zone, request.vlan_tag)
            .await?;
        self.gateway.apply_sdn().await?;

        let mut vmids = VmidAllocator::new(instance, &inventory.existing_ids());
        let mut created = Vec::new();
        for template in &templates {
            let vm = clone::clone_template(
                &self.gateway,
                &self.budget,
                &group,
                &vnet,
                template,
                &mut vmids,
            )
            .await?;
            created.push(vm);
        }

        info!(%group, count = created.len(), "lab instantiated");
        Ok(CreateReport {
            group,
            vnet,
            created,
        })
    }

    /// Converges the group's tagged membership to the requested id set.
    pub async fn reconcile(
        &self,
        group: &GroupId,
        requested: &BTreeSet<u32>,
    ) -> Result<ReconcileReport> {
        reconcile::reconcile(&self.gateway, group, requested).await
    }

    /// Starts or stops every member not already in the desired state.
    pub async fn set_power(&self, group: &GroupId, desired: PowerState) -> Result<PowerReport> {
        lifecycle::set_power(&self.gateway, group, desired).await
    }

    /// Stops, confirms, and deletes every member, then the group vnet.
    /// Runs under the deletion gate.
    pub async fn teardown(&self, group: &GroupId) -> Result<TeardownReport> {
        let _gate = self.delete_gate.acquire().await?;
        lifecycle::teardown(&self.gateway, &self.budget, group).await
    }

    /// One decoded snapshot of the cluster.
    pub async fn inventory(&self) -> Result<Inventory> {
        Inventory::scan(self.gateway.as_ref()).await
    }
}
