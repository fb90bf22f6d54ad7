//! Bulk lifecycle control for a resolved group.
//!
//! Start and stop are fire-and-forget batches. Teardown runs a per-member
//! state machine (stop, confirm stopped, delete) and only removes the
//! shared vnet once every member is gone; a member that refuses to stop
//! blocks the vnet and its own deletion, never its siblings'.

use std::sync::Arc;

use lab_core::error::{LabError, Result};
use lab_platform::{PlatformGateway, PowerState};
use serde::Serialize;
use tracing::{info, warn};

use crate::group::GroupId;
use crate::inventory::Inventory;
use crate::poll::{self, PollBudget};
use crate::MemberFailure;

/// VMs a start/stop batch sent commands to. Fire-and-forget: the command
/// was issued, convergence is not confirmed.
#[derive(Debug, Clone, Serialize)]
pub struct PowerReport {
    pub group: GroupId,
    pub commanded: Vec<u32>,
}

/// Outcome of a group teardown.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    pub group: GroupId,
    pub deleted: Vec<u32>,
    pub failures: Vec<MemberFailure>,
    pub vnet: Option<String>,
    pub vnet_deleted: bool,
    pub vnet_error: Option<String>,
}

pub(crate) async fn set_power(
    gateway: &Arc<dyn PlatformGateway>,
    group: &GroupId,
    desired: PowerState,
) -> Result<PowerReport> {
    let inventory = Inventory::scan(gateway.as_ref()).await?;
    let members = inventory.members(group);
    if members.is_empty() {
        return Err(LabError::NotFound(format!(
            "no VMs tagged for group {group}"
        )));
    }

    let mut commanded = Vec::new();
    for vm in members {
        if vm.power == desired {
            continue;
        }
        match desired {
            PowerState::Running => gateway.start_vm(&vm.node, vm.vmid).await?,
            PowerState::Stopped => gateway.stop_vm(&vm.node, vm.vmid).await?,
            PowerState::Unknown => continue,
        }
        commanded.push(vm.vmid);
    }
    info!(%group, desired = %desired, count = commanded.len(), "power commands issued");
    Ok(PowerReport {
        group: group.clone(),
        commanded,
    })
}

pub(crate) async fn teardown(
    gateway: &Arc<dyn PlatformGateway>,
    budget: &PollBudget,
    group: &GroupId,
) -> Result<TeardownReport> {
    let inventory = Inventory::scan(gateway.as_ref()).await?;
    let members = inventory.members(group);
    if members.is_empty() {
        return Err(LabError::NotFound(format!(
            "no VMs tagged for group {group}"
        )));
    }
    let vnet = inventory.group_vnet(group);

    let mut deleted = Vec::new();
    let mut failures = Vec::new();

    for vm in &members {
        match delete_member(gateway, budget, &vm.node, vm.vmid, vm.power).await {
            Ok(()) => deleted.push(vm.vmid),
            Err(e) => {
                warn!(vmid = vm.vmid, node = %vm.node, error = %e, "teardown of member failed");
                failures.push(MemberFailure {
                    vmid: vm.vmid,
                    node: vm.node.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    // The shared vnet goes last, and only when every member is gone;
    // a leftover VM still references it as a bridge.
    let mut vnet_deleted = false;
    let mut vnet_error = None;
    if let Some(ref vnet_name) = vnet {
        if failures.is_empty() {
            match delete_vnet(gateway, vnet_name).await {
                Ok(()) => vnet_deleted = true,
                Err(e) => {
                    warn!(vnet = %vnet_name, error = %e, "vnet deletion failed");
                    vnet_error = Some(e.to_string());
                }
            }
        } else {
            info!(vnet = %vnet_name, "keeping vnet: not all members were deleted");
        }
    }

    info!(%group, deleted = deleted.len(), failed = failures.len(), vnet_deleted, "teardown finished");
    Ok(TeardownReport {
        group: group.clone(),
        deleted,
        failures,
        vnet,
        vnet_deleted,
        vnet_error,
    })
}

/// Stop-and-confirm state machine for one member, then delete it.
async fn delete_member(
    gateway: &Arc<dyn PlatformGateway>,
    budget: &PollBudget,
    node: &str,
    vmid: u32,
    power: PowerState,
) -> Result<()> {
    if power == PowerState::Running {
        gateway.stop_vm(node, vmid).await?;

        let stopped = {
            let gateway = Arc::clone(gateway);
            let node = node.to_string();
            poll::await_condition(budget, move || {
                let gateway = Arc::clone(&gateway);
                let node = node.clone();
                async move {
                    let state = gateway.power_state(&node, vmid).await?;
                    Ok((state == PowerState::Stopped).then_some(()))
                }
            })
            .await?
        };
        if stopped.is_none() {
            return Err(LabError::Convergence {
                vmid,
                node: node.to_string(),
                waiting_for: "power state 'stopped'".to_string(),
            });
        }
    }
    gateway.delete_vm(node, vmid).await
}

async fn delete_vnet(gateway: &Arc<dyn PlatformGateway>, vnet: &str) -> Result<()> {
    gateway.delete_vnet(vnet).await?;
    gateway.apply_sdn().await
}
