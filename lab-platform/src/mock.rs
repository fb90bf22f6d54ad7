//! In-memory gateway for engine tests.
//!
//! Unlike a stub that answers `Ok(())` to everything, this mock keeps real
//! cluster state (nodes, VMs, vnets) so tests can drive the whole
//! clone/reconcile/teardown protocol and then inspect the outcome. Clone
//! materialization delay and stuck-on-stop VMs are configurable to
//! exercise the polling paths.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use lab_core::error::{LabError, Result};

use crate::types::{CloneRequest, NodeInfo, PowerState, VmConfigMap, VmSummary, VnetInfo};
use crate::PlatformGateway;

#[derive(Debug, Clone)]
struct MockVm {
    node: String,
    name: String,
    config: BTreeMap<String, String>,
    power: PowerState,
    template: bool,
    /// Refuses stop commands, to simulate a wedged guest.
    stuck_running: bool,
    /// Config reads that still return not-found, to simulate the
    /// asynchronous clone not having materialized yet.
    materialize_after: u32,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: Vec<String>,
    vms: BTreeMap<u32, MockVm>,
    vnets: Vec<VnetInfo>,
    clone_delay: u32,
    sdn_applies: u32,
}

#[derive(Debug, Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    pub fn add_node(&self, node: &str) {
        self.state().nodes.push(node.to_string());
    }

    pub fn add_template(&self, node: &str, vmid: u32, name: &str, description: &str, net0: &str) {
        let mut config = BTreeMap::new();
        config.insert("description".to_string(), description.to_string());
        config.insert("net0".to_string(), net0.to_string());
        config.insert("template".to_string(), "1".to_string());
        self.state().vms.insert(
            vmid,
            MockVm {
                node: node.to_string(),
                name: name.to_string(),
                config,
                power: PowerState::Stopped,
                template: true,
                stuck_running: false,
                materialize_after: 0,
            },
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_vm(
        &self,
        node: &str,
        vmid: u32,
        name: &str,
        description: &str,
        net0: &str,
        power: PowerState,
    ) {
        let mut config = BTreeMap::new();
        config.insert("description".to_string(), description.to_string());
        config.insert("net0".to_string(), net0.to_string());
        self.state().vms.insert(
            vmid,
            MockVm {
                node: node.to_string(),
                name: name.to_string(),
                config,
                power,
                template: false,
                stuck_running: false,
                materialize_after: 0,
            },
        );
    }

    pub fn add_vnet(&self, vnet: &str, zone: &str, tag: u32) {
        self.state().vnets.push(VnetInfo {
            vnet: vnet.to_string(),
            zone: Some(zone.to_string()),
            tag: Some(tag),
        });
    }

    /// Makes every future clone invisible to config reads for `polls`
    /// attempts.
    pub fn set_clone_delay(&self, polls: u32) {
        self.state().clone_delay = polls;
    }

    /// Makes a VM ignore stop commands.
    pub fn set_stuck(&self, vmid: u32) {
        if let Some(vm) = self.state().vms.get_mut(&vmid) {
            vm.stuck_running = true;
        }
    }

    pub fn has_vm(&self, vmid: u32) -> bool {
        self.state().vms.contains_key(&vmid)
    }

    pub fn vm_name(&self, vmid: u32) -> Option<String> {
        self.state().vms.get(&vmid).map(|vm| vm.name.clone())
    }

    pub fn vm_node(&self, vmid: u32) -> Option<String> {
        self.state().vms.get(&vmid).map(|vm| vm.node.clone())
    }

    pub fn vm_power(&self, vmid: u32) -> Option<PowerState> {
        self.state().vms.get(&vmid).map(|vm| vm.power)
    }

    pub fn vm_description(&self, vmid: u32) -> Option<String> {
        self.state()
            .vms
            .get(&vmid)
            .and_then(|vm| vm.config.get("description").cloned())
    }

    pub fn vm_net0(&self, vmid: u32) -> Option<String> {
        self.state()
            .vms
            .get(&vmid)
            .and_then(|vm| vm.config.get("net0").cloned())
    }

    pub fn vnet_names(&self) -> Vec<String> {
        self.state().vnets.iter().map(|v| v.vnet.clone()).collect()
    }

    pub fn sdn_apply_count(&self) -> u32 {
        self.state().sdn_applies
    }
}

fn vnet_in_use(state: &MockState, vnet: &str) -> bool {
    let needle = format!("bridge={vnet}");
    state.vms.values().any(|vm| {
        vm.config.get("net0").is_some_and(|net0| {
            net0.split(',')
                .any(|seg| seg == needle)
        })
    })
}

#[async_trait]
impl PlatformGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(self
            .state()
            .nodes
            .iter()
            .map(|node| NodeInfo {
                node: node.clone(),
                status: Some("online".to_string()),
            })
            .collect())
    }

    async fn list_vms(&self, node: &str) -> Result<Vec<VmSummary>> {
        Ok(self
            .state()
            .vms
            .iter()
            .filter(|(_, vm)| vm.node == node)
            .map(|(vmid, vm)| VmSummary {
                vmid: *vmid,
                name: Some(vm.name.clone()),
                status: Some(vm.power.to_string()),
                template: vm.template,
            })
            .collect())
    }

    async fn get_vm_config(&self, node: &str, vmid: u32) -> Result<VmConfigMap> {
        let mut state = self.state();
        let vm = state
            .vms
            .get_mut(&vmid)
            .filter(|vm| vm.node == node)
            .ok_or_else(|| LabError::NotFound(format!("VM {vmid} on {node}")))?;
        if vm.materialize_after > 0 {
            vm.materialize_after -= 1;
            return Err(LabError::NotFound(format!("VM {vmid} on {node}")));
        }
        Ok(vm.config.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn set_vm_config(&self, node: &str, vmid: u32, updates: &[(&str, &str)]) -> Result<()> {
        let mut state = self.state();
        let vm = state
            .vms
            .get_mut(&vmid)
            .filter(|vm| vm.node == node)
            .ok_or_else(|| LabError::NotFound(format!("VM {vmid} on {node}")))?;
        for (key, value) in updates {
            vm.config.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn clone_vm(&self, node: &str, template: u32, request: &CloneRequest) -> Result<()> {
        let mut state = self.state();
        if state.vms.contains_key(&request.newid) {
            return Err(LabError::Platform(format!(
                "unable to create VM {}: already exists",
                request.newid
            )));
        }
        let source = state
            .vms
            .get(&template)
            .filter(|vm| vm.node == node && vm.template)
            .ok_or_else(|| LabError::NotFound(format!("template {template} on {node}")))?;

        let mut config = source.config.clone();
        config.remove("template");
        config.insert("description".to_string(), request.description.clone());

        let clone = MockVm {
            node: node.to_string(),
            name: request.name.clone(),
            config,
            power: PowerState::Stopped,
            template: false,
            stuck_running: false,
            materialize_after: state.clone_delay,
        };
        state.vms.insert(request.newid, clone);
        Ok(())
    }

    async fn power_state(&self, node: &str, vmid: u32) -> Result<PowerState> {
        self.state()
            .vms
            .get(&vmid)
            .filter(|vm| vm.node == node)
            .map(|vm| vm.power)
            .ok_or_else(|| LabError::NotFound(format!("VM {vmid} on {node}")))
    }

    async fn start_vm(&self, node: &str, vmid: u32) -> Result<()> {
        let mut state = self.state();
        let vm = state
            .vms
            .get_mut(&vmid)
            .filter(|vm| vm.node == node)
            .ok_or_else(|| LabError::NotFound(format!("VM {vmid} on {node}")))?;
        vm.power = PowerState::Running;
        Ok(())
    }

    async fn stop_vm(&self, node: &str, vmid: u32) -> Result<()> {
        let mut state = self.state();
        let vm = state
            .vms
            .get_mut(&vmid)
            .filter(|vm| vm.node == node)
            .ok_or_else(|| LabError::NotFound(format!("VM {vmid} on {node}")))?;
        if !vm.stuck_running {
            vm.power = PowerState::Stopped;
        }
        Ok(())
    }

    async fn delete_vm(&self, node: &str, vmid: u32) -> Result<()> {
        let mut state = self.state();
        let vm = state
            .vms
            .get(&vmid)
            .filter(|vm| vm.node == node)
            .ok_or_else(|| LabError::NotFound(format!("VM {vmid} on {node}")))?;
        if vm.power == PowerState::Running {
            return Err(LabError::Platform(format!(
                "VM {vmid} is running, refusing to delete"
            )));
        }
        state.vms.remove(&vmid);
        Ok(())
    }

    async fn list_vnets(&self) -> Result<Vec<VnetInfo>> {
        Ok(self.state().vnets.clone())
    }

    async fn create_vnet(&self, vnet: &str, zone: &str, tag: u32) -> Result<()> {
        let mut state = self.state();
        if state.vnets.iter().any(|v| v.vnet == vnet) {
            return Err(LabError::Platform(format!("vnet {vnet} already exists")));
        }
        state.vnets.push(VnetInfo {
            vnet: vnet.to_string(),
            zone: Some(zone.to_string()),
            tag: Some(tag),
        });
        Ok(())
    }

    async fn delete_vnet(&self, vnet: &str) -> Result<()> {
        let mut state = self.state();
        if !state.vnets.iter().any(|v| v.vnet == vnet) {
            return Err(LabError::NotFound(format!("vnet {vnet}")));
        }
        if vnet_in_use(&state, vnet) {
            return Err(LabError::Platform(format!("vnet {vnet} is in use")));
        }
        state.vnets.retain(|v| v.vnet != vnet);
        Ok(())
    }

    async fn apply_sdn(&self) -> Result<()> {
        self.state().sdn_applies += 1;
        Ok(())
    }
}
