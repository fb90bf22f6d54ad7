//! Typed views of the platform's wire objects.
//!
//! Raw strings stop at this boundary: the engine only ever sees these
//! decoded forms.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// One cluster node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// One entry from a per-node VM listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSummary {
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// The platform reports the template flag as 0/1.
    #[serde(default, deserialize_with = "de_int_flag")]
    pub template: bool,
}

impl VmSummary {
    pub fn power(&self) -> PowerState {
        self.status
            .as_deref()
            .map(PowerState::from_status)
            .unwrap_or(PowerState::Unknown)
    }
}

/// VM power state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Running,
    Stopped,
    Unknown,
}

impl PowerState {
    pub fn from_status(status: &str) -> Self {
        match status {
            "running" => PowerState::Running,
            "stopped" => PowerState::Stopped,
            _ => PowerState::Unknown,
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Running => write!(f, "running"),
            PowerState::Stopped => write!(f, "stopped"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// An SDN virtual network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VnetInfo {
    pub vnet: String,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default, deserialize_with = "de_opt_u32")]
    pub tag: Option<u32>,
}

/// Flat key/value view of a VM's full configuration.
///
/// The platform mixes strings and numbers in the config JSON; everything
/// is normalized to strings here because the engine treats config values
/// as opaque lines except where a dedicated accessor exists.
#[derive(Debug, Clone, Default)]
pub struct VmConfigMap {
    values: BTreeMap<String, String>,
}

impl VmConfigMap {
    pub fn from_json(map: serde_json::Map<String, serde_json::Value>) -> Self {
        let values = map
            .into_iter()
            .map(|(k, v)| {
                let s = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, s)
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn description(&self) -> &str {
        self.get("description").unwrap_or("")
    }

    /// The primary network interface line, if any.
    pub fn net0(&self) -> Option<&str> {
        self.get("net0")
    }

    pub fn is_template(&self) -> bool {
        self.get("template") == Some("1")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VmConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Parameters for cloning a template into a new VM.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub newid: u32,
    pub name: String,
    pub description: String,
    /// Full copy instead of a linked clone.
    pub full: bool,
}

/// Decoded primary network interface line.
///
/// Wire grammar: `<model>=<mac>,<key>=<value>,...`. The first segment is
/// the device model and MAC; the rest are options such as `bridge=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicConfig {
    pub model: String,
    pub mac: String,
    pub options: Vec<(String, String)>,
}

impl NicConfig {
    pub fn parse(line: &str) -> Option<Self> {
        let mut segments = line.split(',');
        let head = segments.next()?;
        let (model, mac) = head.split_once('=')?;
        if model.is_empty() || mac.is_empty() {
            return None;
        }
        let options = segments
            .filter_map(|seg| seg.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Some(Self {
            model: model.to_string(),
            mac: mac.to_string(),
            options,
        })
    }

    pub fn bridge(&self) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == "bridge")
            .map(|(_, v)| v.as_str())
    }
}

/// Rewrites an interface line to bind a different bridge, keeping the
/// model/MAC prefix and dropping stale options.
pub fn rebind_bridge(line: &str, bridge: &str) -> Option<String> {
    let head = line.split(',').next()?;
    if !head.contains('=') {
        return None;
    }
    Some(format!("{head},bridge={bridge}"))
}

fn de_int_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s == "1",
        _ => false,
    })
}

fn de_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as u32),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    })
}
