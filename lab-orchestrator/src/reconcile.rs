//! Group reconciliation: converge tagged membership to a requested set.
//!
//! Membership changes are tag operations, not destructive ones: adding a
//! VM rewrites its description and rebinds its interface; removing one
//! clears the instance marker and touches nothing else. Failures are
//! collected per member so a re-run can finish what a partial failure
//! left undone.

use std::collections::BTreeSet;
use std::sync::Arc;

use lab_core::error::{LabError, Result};
use lab_platform::{rebind_bridge, PlatformGateway};
use serde::Serialize;
use tracing::{info, warn};

use crate::group::GroupId;
use crate::inventory::Inventory;
use crate::tags;
use crate::MemberFailure;

/// Outcome of one reconcile run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub group: GroupId,
    pub vnet: String,
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
    pub failures: Vec<MemberFailure>,
}

impl ReconcileReport {
    /// True when the run changed nothing and nothing failed.
    pub fn converged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failures.is_empty()
    }
}

pub(crate) async fn reconcile(
    gateway: &Arc<dyn PlatformGateway>,
    group: &GroupId,
    requested: &BTreeSet<u32>,
) -> Result<ReconcileReport> {
    let inventory = Inventory::scan(gateway.as_ref()).await?;

    let members = inventory.members(group);
    if members.is_empty() {
        return Err(LabError::NotFound(format!(
            "no VMs tagged for group {group}"
        )));
    }
    // The group network comes from a member's bridge binding; without one
    // the group cannot be converged onto its vnet.
    let vnet = inventory.group_vnet(group).ok_or_else(|| {
        LabError::NotFound(format!("group {group} has no resolvable vnet"))
    })?;

    let current: BTreeSet<u32> = members.iter().map(|vm| vm.vmid).collect();
    let to_add: Vec<u32> = requested.difference(&current).copied().collect();
    let to_remove: Vec<u32> = current.difference(requested).copied().collect();
    info!(%group, adds = to_add.len(), removes = to_remove.len(), "reconciling group");

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut failures = Vec::new();

    for vmid in to_add {
        let Some(vm) = inventory.find_vm(vmid) else {
            failures.push(MemberFailure {
                vmid,
                node: String::new(),
                error: format!("VM {vmid} not found on any node"),
            });
            continue;
        };
        let description = tags::set_instance_marker(&vm.description, group, true);
        let mut updates = vec![("description", description)];
        if let Some(line) = vm.net0.as_deref().and_then(|net0| rebind_bridge(net0, &vnet)) {
            updates.push(("net0", line));
        }
        let update_refs: Vec<(&str, &str)> =
            updates.iter().map(|(k, v)| (*k, v.as_str())).collect();
        match gateway.set_vm_config(&vm.node, vmid, &update_refs).await {
            Ok(()) => added.push(vmid),
            Err(e) => {
                warn!(vmid, node = %vm.node, error = %e, "failed to add member");
                failures.push(MemberFailure {
                    vmid,
                    node: vm.node.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    for vmid in to_remove {
        // Removal targets come from the current member set, so the
        // record always exists in this snapshot.
        let Some(vm) = inventory.find_vm(vmid) else {
            continue;
        };
        let description = tags::clear_instance_marker(&vm.description);
        match gateway
            .set_vm_config(&vm.node, vmid, &[("description", description.as_str())])
            .await
        {
            Ok(()) => removed.push(vmid),
            Err(e) => {
                warn!(vmid, node = %vm.node, error = %e, "failed to remove member");
                failures.push(MemberFailure {
                    vmid,
                    node: vm.node.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(ReconcileReport {
        group: group.clone(),
        vnet,
        added,
        removed,
        failures,
    })
}
