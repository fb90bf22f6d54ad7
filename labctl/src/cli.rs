// CLI argument parsing and definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "labctl")]
#[command(about = "Provision and tear down VM lab groups on a Proxmox cluster")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a custom configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Manage lab templates
    Template {
        #[command(subcommand)]
        command: TemplateCommand,
    },
    /// Create, reconcile, and tear down lab groups
    Lab {
        #[command(subcommand)]
        command: LabCommand,
    },
    /// Inspect cluster inventory
    Vm {
        #[command(subcommand)]
        command: VmCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum TemplateCommand {
    /// Rewrite the lab-group tags in a template's description
    Tag {
        /// VM id of the template
        vmid: u32,
        /// Comma-separated group names; an empty list clears the tags
        #[arg(long, value_delimiter = ',')]
        groups: Vec<String>,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum LabCommand {
    /// Clone every template of a lab group onto a fresh isolated vnet
    Create {
        /// Lab group name (e.g. "web")
        lab_group: String,
        /// VLAN zone for the new vnet
        #[arg(long)]
        zone: String,
        /// VLAN tag for the new vnet
        #[arg(long)]
        tag: u32,
        /// Explicit instance number (next free one when omitted)
        #[arg(long)]
        instance: Option<u32>,
    },
    /// Converge a group's membership to the given VM ids
    Reconcile {
        /// Group identity (e.g. "web_cloned1")
        group: String,
        /// Comma-separated VM ids the group should consist of
        #[arg(long, value_delimiter = ',')]
        members: Vec<u32>,
    },
    /// Start every member of a group
    Start {
        /// Group identity (e.g. "web_cloned1")
        group: String,
    },
    /// Stop every member of a group
    Stop {
        /// Group identity (e.g. "web_cloned1")
        group: String,
    },
    /// Stop and delete every member, then the group's vnet
    Delete {
        /// Group identity (e.g. "web_cloned1")
        group: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum VmCommand {
    /// List all VMs with their decoded lab tags
    List,
}
