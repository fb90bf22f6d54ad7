use std::env;
use std::path::{Path, PathBuf};

use lab_core::error::{LabError, Result};
use serde::{Deserialize, Serialize};

/// Root configuration for the lab tool.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LabConfig {
    /// Connection settings for the virtualization cluster.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Timeouts and retry budgets for orchestration.
    #[serde(default)]
    pub tunables: Tunables,
}

/// Connection settings for the Proxmox cluster.
///
/// Authentication uses an API token; the user string, token id, and token
/// secret combine into the `PVEAPIToken` authorization header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Hostname or address of the cluster API endpoint.
    #[serde(default)]
    pub host: String,

    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// User in `name@realm` form.
    #[serde(default)]
    pub user: String,

    /// API token id.
    #[serde(default)]
    pub token_name: String,

    /// API token secret.
    #[serde(default)]
    pub token_value: String,

    /// Verify the cluster's TLS certificate. Clusters with self-signed
    /// certificates need this off.
    #[serde(default)]
    pub verify_tls: bool,
}

fn default_port() -> u16 {
    8006
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            user: String::new(),
            token_name: String::new(),
            token_value: String::new(),
            verify_tls: false,
        }
    }
}

/// Orchestration timeouts and retry budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    /// Seconds to wait on a create/delete gate before reporting busy.
    #[serde(default = "default_gate_wait_secs")]
    pub gate_wait_secs: u64,

    /// Attempts when polling for an asynchronous platform operation.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    /// Initial delay between poll attempts, in milliseconds.
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,

    /// Ceiling for the poll backoff, in milliseconds.
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,
}

fn default_gate_wait_secs() -> u64 {
    180
}

fn default_poll_attempts() -> u32 {
    10
}

fn default_poll_initial_ms() -> u64 {
    500
}

fn default_poll_max_ms() -> u64 {
    8000
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            gate_wait_secs: default_gate_wait_secs(),
            poll_attempts: default_poll_attempts(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
        }
    }
}

impl LabConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("labctl").join("config.yaml"))
    }

    /// Load configuration: file if present, then `LAB_*` env overrides.
    ///
    /// A missing file is not an error; env-only setups are common on
    /// automation hosts.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match file {
            Some(ref p) if p.exists() => Self::from_file(p)?,
            Some(ref p) if path.is_some() => {
                return Err(LabError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            _ => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&raw)
            .map_err(|e| LabError::Config(format!("{}: {}", path.display(), e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("LAB_PLATFORM_HOST") {
            self.platform.host = host;
        }
        if let Ok(user) = env::var("LAB_PLATFORM_USER") {
            self.platform.user = user;
        }
        if let Ok(name) = env::var("LAB_PLATFORM_TOKEN_NAME") {
            self.platform.token_name = name;
        }
        if let Ok(value) = env::var("LAB_PLATFORM_TOKEN_VALUE") {
            self.platform.token_value = value;
        }
        if let Ok(port) = env::var("LAB_PLATFORM_PORT") {
            if let Ok(port) = port.parse() {
                self.platform.port = port;
            }
        }
        if let Ok(verify) = env::var("LAB_PLATFORM_VERIFY_TLS") {
            self.platform.verify_tls = matches!(verify.as_str(), "1" | "true" | "yes");
        }
    }

    /// Reject configs that cannot possibly reach a cluster.
    pub fn validate(&self) -> Result<()> {
        if self.platform.host.is_empty() {
            return Err(LabError::Config(
                "platform.host is not set (or LAB_PLATFORM_HOST)".into(),
            ));
        }
        if self.platform.user.is_empty() || self.platform.token_name.is_empty() {
            return Err(LabError::Config(
                "platform credentials are incomplete: user and token_name are required".into(),
            ));
        }
        Ok(())
    }
}
