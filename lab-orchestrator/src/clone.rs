//! Clone workflow: template to running group member.
//!
//! Per template: re-validate the allocated vmid against a fresh listing,
//! issue the clone with the instance marker in its description, poll
//! until the clone materializes, then rebind its primary interface to
//! the group vnet keeping the model/MAC prefix.

use std::collections::BTreeSet;
use std::sync::Arc;

use lab_core::error::{LabError, Result};
use lab_platform::{rebind_bridge, CloneRequest, PlatformGateway};
use serde::Serialize;
use tracing::{debug, info};

use crate::allocator::VmidAllocator;
use crate::group::GroupId;
use crate::inventory::VmRecord;
use crate::poll::{self, PollBudget};
use crate::tags;

/// One VM created by an instantiate operation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedVm {
    pub vmid: u32,
    pub name: String,
    pub node: String,
}

/// Every vmid currently visible on the cluster.
pub(crate) async fn list_all_ids(gateway: &dyn PlatformGateway) -> Result<BTreeSet<u32>> {
    let mut ids = BTreeSet::new();
    for node in gateway.list_nodes().await? {
        for vm in gateway.list_vms(&node.node).await? {
            ids.insert(vm.vmid);
        }
    }
    Ok(ids)
}

/// Clones one template into the group, fully network-isolated.
pub(crate) async fn clone_template(
    gateway: &Arc<dyn PlatformGateway>,
    budget: &PollBudget,
    group: &GroupId,
    vnet: &str,
    template: &VmRecord,
    allocator: &mut VmidAllocator,
) -> Result<CreatedVm> {
    let mut vmid = allocator.allocate();

    // The snapshot behind the allocator may be stale by now; check the
    // chosen id against a fresh listing before the irreversible call.
    let fresh = list_all_ids(gateway.as_ref()).await?;
    if fresh.contains(&vmid) {
        debug!(vmid, "allocated id taken since snapshot, reallocating");
        allocator.observe(fresh);
        vmid = allocator.allocate();
    }

    let name = format!(
        "{}-{}-{}",
        group.lab_name.to_lowercase(),
        template.name,
        vmid
    );
    let request = CloneRequest {
        newid: vmid,
        name: name.clone(),
        description: tags::instance_marker(group, false),
        full: false,
    };
    info!(template = template.vmid, vmid, name = %name, "cloning template");
    gateway
        .clone_vm(&template.node, template.vmid, &request)
        .await?;

    // The clone happens asynchronously on the platform side; wait for
    // its configuration to become readable.
    let config = {
        let gateway = Arc::clone(gateway);
        let node = template.node.clone();
        poll::await_condition(budget, move || {
            let gateway = Arc::clone(&gateway);
            let node = node.clone();
            async move {
                match gateway.get_vm_config(&node, vmid).await {
                    Ok(config) => Ok(Some(config)),
                    Err(LabError::NotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            }
        })
        .await?
    }
    .ok_or_else(|| LabError::Convergence {
        vmid,
        node: template.node.clone(),
        waiting_for: "clone to materialize".to_string(),
    })?;

    // Rebind the primary interface to the group vnet, preserving the
    // device model and MAC the platform generated.
    if let Some(line) = config.net0().and_then(|net0| rebind_bridge(net0, vnet)) {
        gateway
            .set_vm_config(&template.node, vmid, &[("net0", line.as_str())])
            .await?;
    }

    Ok(CreatedVm {
        vmid,
        name,
        node: template.node.clone(),
    })
}
