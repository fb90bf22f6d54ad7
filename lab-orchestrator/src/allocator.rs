//! Identifier allocation from inventory snapshots.
//!
//! There is no reservation table anywhere: vnet numbers and VM ids are
//! both derived by scanning the current inventory and taking the next
//! free value. That makes allocation exactly as correct as the snapshot
//! is current, which is why the engine holds the creation gate around
//! scan-and-allocate and re-validates ids right before cloning.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use lab_platform::VnetInfo;

static VNET_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^vnet(\d+)$").unwrap());

/// Next unused vnet name: highest existing `vnet<N>` plus one. Numbers
/// only grow; gaps are never reused.
pub fn next_vnet_name(vnets: &[VnetInfo]) -> String {
    let highest = vnets
        .iter()
        .filter_map(|v| VNET_NAME_RE.captures(&v.vnet))
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("vnet{}", highest + 1)
}

/// Hands out VM ids for one lab instance.
///
/// The candidate base is `instance * 1000`; each grant walks past every
/// id already in the snapshot and every id this allocator has already
/// handed out, so ids within one allocation pass are mutually exclusive.
#[derive(Debug)]
pub struct VmidAllocator {
    taken: BTreeSet<u32>,
    cursor: u32,
}

impl VmidAllocator {
    pub fn new(instance: u32, existing: &BTreeSet<u32>) -> Self {
        Self {
            taken: existing.clone(),
            cursor: instance * 1000,
        }
    }

    /// Grants the next free id.
    pub fn allocate(&mut self) -> u32 {
        while self.taken.contains(&self.cursor) {
            self.cursor += 1;
        }
        let vmid = self.cursor;
        self.taken.insert(vmid);
        self.cursor += 1;
        vmid
    }

    /// Folds a fresher id listing into the taken set, for re-validation
    /// between snapshot and the irreversible clone call.
    pub fn observe(&mut self, ids: impl IntoIterator<Item = u32>) {
        self.taken.extend(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vnet(name: &str) -> VnetInfo {
        VnetInfo {
            vnet: name.to_string(),
            zone: None,
            tag: None,
        }
    }

    #[test]
    fn vnet_numbering_skips_gaps_upward() {
        let vnets = vec![vnet("vnet1"), vnet("vnet3"), vnet("vnet7")];
        assert_eq!(next_vnet_name(&vnets), "vnet8");
    }

    #[test]
    fn vnet_numbering_starts_at_one() {
        assert_eq!(next_vnet_name(&[]), "vnet1");
        // Names not matching the pattern are ignored.
        assert_eq!(next_vnet_name(&[vnet("vmbr0"), vnet("lan")]), "vnet1");
    }

    #[test]
    fn vmid_block_starts_at_instance_base() {
        let existing = BTreeSet::new();
        let mut alloc = VmidAllocator::new(2, &existing);
        assert_eq!(alloc.allocate(), 2000);
        assert_eq!(alloc.allocate(), 2001);
    }

    #[test]
    fn vmid_allocation_walks_past_used_ids() {
        let existing: BTreeSet<u32> = [1000, 1001, 1003].into_iter().collect();
        let mut alloc = VmidAllocator::new(1, &existing);
        assert_eq!(alloc.allocate(), 1002);
        assert_eq!(alloc.allocate(), 1004);
        assert_eq!(alloc.allocate(), 1005);
    }

    #[test]
    fn vmid_grants_are_disjoint_from_snapshot_and_each_other() {
        let existing: BTreeSet<u32> = (3000..3050).step_by(3).collect();
        let mut alloc = VmidAllocator::new(3, &existing);
        let mut granted = BTreeSet::new();
        for _ in 0..40 {
            let vmid = alloc.allocate();
            assert!(!existing.contains(&vmid));
            assert!(granted.insert(vmid), "id {vmid} granted twice");
        }
    }

    #[test]
    fn observe_blocks_freshly_seen_ids() {
        let existing = BTreeSet::new();
        let mut alloc = VmidAllocator::new(1, &existing);
        alloc.observe([1000, 1001]);
        assert_eq!(alloc.allocate(), 1002);
    }
}
