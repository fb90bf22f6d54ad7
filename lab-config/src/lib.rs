//! Configuration for the lab orchestration tool.
//!
//! Settings load from a YAML file (`~/.config/labctl/config.yaml` by
//! default) and can be overridden per-field with `LAB_*` environment
//! variables, which is how the platform credentials are normally supplied.

pub mod config;

pub use config::{LabConfig, PlatformConfig, Tunables};
