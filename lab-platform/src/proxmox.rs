//! Proxmox VE implementation of the platform gateway.
//!
//! Talks to the `api2/json` REST surface with API-token authentication.
//! Each trait method is one HTTP call; write endpoints take form-encoded
//! bodies, which is what the platform expects.

use async_trait::async_trait;
use lab_config::PlatformConfig;
use lab_core::error::{LabError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::types::{CloneRequest, NodeInfo, PowerState, VmConfigMap, VmSummary, VnetInfo};
use crate::PlatformGateway;

/// Response envelope: the platform wraps every payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<String>,
}

pub struct ProxmoxGateway {
    client: reqwest::Client,
    base: String,
}

impl ProxmoxGateway {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let token = format!(
            "PVEAPIToken={}!{}={}",
            config.user, config.token_name, config.token_value
        );
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&token)
            .map_err(|e| LabError::Config(format!("invalid API token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| LabError::Platform(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base: format!("https://{}:{}/api2/json", config.host, config.port),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn check(&self, method: &Method, path: &str, response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        // The platform reports a missing VM config as a 500 with a
        // "does not exist" message rather than a 404.
        if status == reqwest::StatusCode::NOT_FOUND || body.contains("does not exist") {
            return Err(LabError::NotFound(format!("{method} {path}: {status}")));
        }
        Err(LabError::Platform(format!("{method} {path}: {status} {body}")))
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "platform GET");
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| LabError::Platform(format!("GET {path}: {e}")))?;
        let response = self.check(&Method::GET, path, response).await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| LabError::Platform(format!("GET {path}: malformed response: {e}")))?;
        envelope
            .data
            .ok_or_else(|| LabError::Platform(format!("GET {path}: empty response")))
    }

    async fn send_form(&self, method: Method, path: &str, params: &[(&str, &str)]) -> Result<()> {
        debug!(%method, path, "platform write");
        let response = self
            .client
            .request(method.clone(), self.url(path))
            .form(params)
            .send()
            .await
            .map_err(|e| LabError::Platform(format!("{method} {path}: {e}")))?;
        self.check(&method, path, response).await?;
        Ok(())
    }
}

#[async_trait]
impl PlatformGateway for ProxmoxGateway {
    fn name(&self) -> &'static str {
        "proxmox"
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        self.get_data("/nodes").await
    }

    async fn list_vms(&self, node: &str) -> Result<Vec<VmSummary>> {
        self.get_data(&format!("/nodes/{node}/qemu")).await
    }

    async fn get_vm_config(&self, node: &str, vmid: u32) -> Result<VmConfigMap> {
        let raw: serde_json::Map<String, serde_json::Value> = self
            .get_data(&format!("/nodes/{node}/qemu/{vmid}/config"))
            .await?;
        Ok(VmConfigMap::from_json(raw))
    }

    async fn set_vm_config(&self, node: &str, vmid: u32, updates: &[(&str, &str)]) -> Result<()> {
        self.send_form(
            Method::PUT,
            &format!("/nodes/{node}/qemu/{vmid}/config"),
            updates,
        )
        .await
    }

    async fn clone_vm(&self, node: &str, template: u32, request: &CloneRequest) -> Result<()> {
        let newid = request.newid.to_string();
        let full = if request.full { "1" } else { "0" };
        self.send_form(
            Method::POST,
            &format!("/nodes/{node}/qemu/{template}/clone"),
            &[
                ("newid", newid.as_str()),
                ("name", request.name.as_str()),
                ("description", request.description.as_str()),
                ("full", full),
            ],
        )
        .await
    }

    async fn power_state(&self, node: &str, vmid: u32) -> Result<PowerState> {
        let body: StatusBody = self
            .get_data(&format!("/nodes/{node}/qemu/{vmid}/status/current"))
            .await?;
        Ok(body
            .status
            .as_deref()
            .map(PowerState::from_status)
            .unwrap_or(PowerState::Unknown))
    }

    async fn start_vm(&self, node: &str, vmid: u32) -> Result<()> {
        self.send_form(
            Method::POST,
            &format!("/nodes/{node}/qemu/{vmid}/status/start"),
            &[],
        )
        .await
    }

    async fn stop_vm(&self, node: &str, vmid: u32) -> Result<()> {
        self.send_form(
            Method::POST,
            &format!("/nodes/{node}/qemu/{vmid}/status/stop"),
            &[],
        )
        .await
    }

    async fn delete_vm(&self, node: &str, vmid: u32) -> Result<()> {
        self.send_form(Method::DELETE, &format!("/nodes/{node}/qemu/{vmid}"), &[])
            .await
    }

    async fn list_vnets(&self) -> Result<Vec<VnetInfo>> {
        self.get_data("/cluster/sdn/vnets").await
    }

    async fn create_vnet(&self, vnet: &str, zone: &str, tag: u32) -> Result<()> {
        let tag = tag.to_string();
        self.send_form(
            Method::POST,
            "/cluster/sdn/vnets",
            &[("vnet", vnet), ("zone", zone), ("tag", tag.as_str())],
        )
        .await
    }

    async fn delete_vnet(&self, vnet: &str) -> Result<()> {
        self.send_form(Method::DELETE, &format!("/cluster/sdn/vnets/{vnet}"), &[])
            .await
    }

    async fn apply_sdn(&self) -> Result<()> {
        self.send_form(Method::PUT, "/cluster/sdn", &[]).await
    }
}
