//! Decoded cluster inventory.
//!
//! Group identity lives only in description strings, so every operation
//! starts from one full scan: list the nodes, list the VMs, fetch each
//! VM's configuration, and decode the tags once. All group-membership
//! matching goes through this snapshot; nothing else in the engine parses
//! descriptions or interface lines on its own.

use std::collections::BTreeSet;

use lab_core::error::{LabError, Result};
use lab_platform::{NicConfig, NodeInfo, PlatformGateway, PowerState, VnetInfo};
use tracing::debug;

use crate::group::GroupId;
use crate::tags::{self, LabTags};

/// One VM with its tags already decoded.
#[derive(Debug, Clone)]
pub struct VmRecord {
    pub node: String,
    pub vmid: u32,
    pub name: String,
    pub power: PowerState,
    pub template: bool,
    pub description: String,
    pub net0: Option<String>,
    pub tags: LabTags,
}

impl VmRecord {
    /// True when this VM's decoded marker matches the group identity.
    pub fn in_group(&self, group: &GroupId) -> bool {
        self.tags.lab_name.as_deref() == Some(group.lab_name.as_str())
            && self.tags.instance == Some(group.instance)
    }

    /// Decoded primary network interface, if one is configured.
    pub fn nic(&self) -> Option<NicConfig> {
        self.net0.as_deref().and_then(NicConfig::parse)
    }

    /// The bridge the primary interface is bound to.
    pub fn bridge(&self) -> Option<String> {
        self.nic().and_then(|nic| nic.bridge().map(str::to_string))
    }
}

/// One decoded snapshot of the whole cluster.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub nodes: Vec<NodeInfo>,
    pub vms: Vec<VmRecord>,
    pub vnets: Vec<VnetInfo>,
}

impl Inventory {
    /// Scans every node and decodes every VM. Fails fatally when the
    /// platform reports no nodes: there is nothing to allocate against.
    pub async fn scan(gateway: &dyn PlatformGateway) -> Result<Self> {
        let nodes = gateway.list_nodes().await?;
        if nodes.is_empty() {
            return Err(LabError::NoNodes);
        }

        let mut vms = Vec::new();
        for node in &nodes {
            for summary in gateway.list_vms(&node.node).await? {
                let config = match gateway.get_vm_config(&node.node, summary.vmid).await {
                    Ok(config) => config,
                    // The VM vanished between listing and config read;
                    // the snapshot simply does not include it.
                    Err(LabError::NotFound(_)) => {
                        debug!(vmid = summary.vmid, node = %node.node, "VM disappeared during scan");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let description = config.description().to_string();
                vms.push(VmRecord {
                    node: node.node.clone(),
                    vmid: summary.vmid,
                    name: summary.name.clone().unwrap_or_else(|| "vm".to_string()),
                    power: summary.power(),
                    template: summary.template || config.is_template(),
                    net0: config.net0().map(str::to_string),
                    tags: tags::decode(&description),
                    description,
                });
            }
        }

        let vnets = gateway.list_vnets().await?;
        Ok(Self { nodes, vms, vnets })
    }

    /// Every vmid present in the snapshot.
    pub fn existing_ids(&self) -> BTreeSet<u32> {
        self.vms.iter().map(|vm| vm.vmid).collect()
    }

    pub fn find_vm(&self, vmid: u32) -> Option<&VmRecord> {
        self.vms.iter().find(|vm| vm.vmid == vmid)
    }

    /// All member VMs of a group (templates never count as members).
    pub fn members(&self, group: &GroupId) -> Vec<&VmRecord> {
        self.vms
            .iter()
            .filter(|vm| !vm.template && vm.in_group(group))
            .collect()
    }

    /// Templates tagged into a lab group.
    pub fn templates_tagged(&self, lab_group: &str) -> Vec<&VmRecord> {
        self.vms
            .iter()
            .filter(|vm| vm.template && vm.tags.lab_groups.iter().any(|g| g == lab_group))
            .collect()
    }

    /// The group's vnet, recovered from the first member with a bridge
    /// binding. Members are assumed consistent; the engine preserves that
    /// invariant but never verifies it.
    pub fn group_vnet(&self, group: &GroupId) -> Option<String> {
        self.members(group).iter().find_map(|vm| vm.bridge())
    }

    /// Next instance number for a lab: highest decoded instance plus one,
    /// starting at 1.
    pub fn next_instance(&self, lab_name: &str) -> u32 {
        self.vms
            .iter()
            .filter(|vm| vm.tags.lab_name.as_deref() == Some(lab_name))
            .filter_map(|vm| vm.tags.instance)
            .max()
            .map(|n| n + 1)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vmid: u32, description: &str, template: bool, net0: Option<&str>) -> VmRecord {
        VmRecord {
            node: "pve1".to_string(),
            vmid,
            name: format!("vm{vmid}"),
            power: PowerState::Stopped,
            template,
            description: description.to_string(),
            net0: net0.map(str::to_string),
            tags: tags::decode(description),
        }
    }

    fn snapshot(vms: Vec<VmRecord>) -> Inventory {
        Inventory {
            nodes: vec![NodeInfo {
                node: "pve1".to_string(),
                status: None,
            }],
            vms,
            vnets: Vec::new(),
        }
    }

    #[test]
    fn members_exclude_templates_and_other_groups() {
        let inventory = snapshot(vec![
            record(100, "LabGroups:[web]", true, None),
            record(1000, "Lab: web | Instance: 1", false, None),
            record(1001, "Lab: web | Instance: 2", false, None),
            record(1002, "Lab: db | Instance: 1", false, None),
        ]);
        let group = GroupId::new("web", 1);
        let members: Vec<u32> = inventory.members(&group).iter().map(|vm| vm.vmid).collect();
        assert_eq!(members, vec![1000]);
    }

    #[test]
    fn group_vnet_comes_from_member_bridge() {
        let inventory = snapshot(vec![record(
            1000,
            "Lab: web | Instance: 1",
            false,
            Some("virtio=AA:BB:CC:DD:EE:FF,bridge=vnet4"),
        )]);
        assert_eq!(
            inventory.group_vnet(&GroupId::new("web", 1)).as_deref(),
            Some("vnet4")
        );
        assert_eq!(inventory.group_vnet(&GroupId::new("db", 1)), None);
    }

    #[test]
    fn next_instance_counts_only_the_named_lab() {
        let inventory = snapshot(vec![
            record(1000, "Lab: web | Instance: 1", false, None),
            record(2000, "Lab: web | Instance: 2", false, None),
            record(3000, "Lab: db | Instance: 9", false, None),
        ]);
        assert_eq!(inventory.next_instance("web"), 3);
        assert_eq!(inventory.next_instance("db"), 10);
        assert_eq!(inventory.next_instance("unseen"), 1);
    }
}
