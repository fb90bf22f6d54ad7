//! Lab orchestration engine.
//!
//! Provisions and tears down groups of cloned VMs ("labs") on a cluster
//! that has no native concept of a lab: group membership is encoded as
//! text in each VM's description field, identifiers are allocated from
//! inventory snapshots, and two timeout-bounded gates serialize the
//! create-class and delete-class operations that make that snapshot
//! read-then-act pattern safe.
//!
//! The crate is consumed by the `labctl` binary but has no terminal or
//! HTTP concerns of its own; everything talks to the cluster through the
//! `lab-platform` gateway trait.

use serde::Serialize;

pub mod allocator;
pub mod clone;
pub mod engine;
pub mod gate;
pub mod group;
pub mod inventory;
pub mod lifecycle;
pub mod poll;
pub mod reconcile;
pub mod tags;

pub use clone::CreatedVm;
pub use engine::{CreateReport, InstantiateRequest, LabEngine};
pub use group::GroupId;
pub use inventory::{Inventory, VmRecord};
pub use lifecycle::{PowerReport, TeardownReport};
pub use reconcile::ReconcileReport;
pub use tags::LabTags;

/// One member that a batch operation could not process.
///
/// Batch operations (reconcile, teardown) collect these instead of
/// aborting: one stuck VM must not block work on its siblings.
#[derive(Debug, Clone, Serialize)]
pub struct MemberFailure {
    pub vmid: u32,
    pub node: String,
    pub error: String,
}
