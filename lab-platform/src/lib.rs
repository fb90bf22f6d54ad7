//! Platform gateway abstraction for the lab orchestration engine.
//!
//! This crate is the only place that talks to the virtualization cluster.
//! It defines the narrow capability trait the engine consumes, the Proxmox
//! VE implementation of it, and (behind the `test-helpers` feature) an
//! in-memory mock with the same observable semantics.

use std::sync::Arc;

use async_trait::async_trait;
use lab_config::PlatformConfig;
use lab_core::error::Result;

pub mod proxmox;
pub mod types;

#[cfg(feature = "test-helpers")]
pub mod mock;

pub use types::{
    rebind_bridge, CloneRequest, NicConfig, NodeInfo, PowerState, VmConfigMap, VmSummary, VnetInfo,
};

/// The capability set the orchestration engine needs from the cluster.
///
/// Every method maps to one platform API call; none of them retry or
/// interpret beyond decoding the wire format. Orchestration-level retries
/// and polling live above this trait.
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    /// Name of the backing implementation (e.g. "proxmox", "mock").
    fn name(&self) -> &'static str;

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>>;

    async fn list_vms(&self, node: &str) -> Result<Vec<VmSummary>>;

    async fn get_vm_config(&self, node: &str, vmid: u32) -> Result<VmConfigMap>;

    /// Write configuration keys back. Only the given keys change.
    async fn set_vm_config(&self, node: &str, vmid: u32, updates: &[(&str, &str)]) -> Result<()>;

    /// Clone a template to a new vmid. The platform performs the clone
    /// asynchronously; the new VM's configuration may not be readable
    /// immediately after this returns.
    async fn clone_vm(&self, node: &str, template: u32, request: &CloneRequest) -> Result<()>;

    async fn power_state(&self, node: &str, vmid: u32) -> Result<PowerState>;

    async fn start_vm(&self, node: &str, vmid: u32) -> Result<()>;

    async fn stop_vm(&self, node: &str, vmid: u32) -> Result<()>;

    async fn delete_vm(&self, node: &str, vmid: u32) -> Result<()>;

    async fn list_vnets(&self) -> Result<Vec<VnetInfo>>;

    async fn create_vnet(&self, vnet: &str, zone: &str, tag: u32) -> Result<()>;

    async fn delete_vnet(&self, vnet: &str) -> Result<()>;

    /// Apply pending SDN changes cluster-wide. Required after vnet
    /// creation or deletion before the change takes effect.
    async fn apply_sdn(&self) -> Result<()>;
}

/// Creates a gateway from the platform configuration.
pub fn get_gateway(config: &PlatformConfig) -> Result<Arc<dyn PlatformGateway>> {
    #[cfg(feature = "test-helpers")]
    if config.host == "mock" {
        return Ok(Arc::new(mock::MockGateway::new()));
    }

    Ok(Arc::new(proxmox::ProxmoxGateway::new(config)?))
}
