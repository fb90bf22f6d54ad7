//! Codec for the group metadata embedded in VM description fields.
//!
//! The cluster offers no custom-metadata API, so group membership rides
//! inside the free-form description as two independent text patterns:
//!
//! - `LabGroups:[name1,name2,...]` tags a template with the lab groups it
//!   belongs to;
//! - `Lab: <name> | Instance: <n>` marks a VM as a member of one lab
//!   instance. Qualifier words after the name (e.g. `added`) are ignored
//!   for matching but preserved in storage.
//!
//! This module is the only place that understands either grammar. It
//! decodes into [`LabTags`] and never fails: malformed content is treated
//! as absent. Encoding preserves all unrelated description text verbatim,
//! since operators put their own notes in the same field.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::group::GroupId;

static GROUPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"LabGroups:\[(.*?)\]").unwrap());
static GROUPS_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"LabGroups:\[.*?\]\n?").unwrap());
static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Lab: (?P<name>[^|\n]+?) \| Instance: (?P<instance>\d+)").unwrap());
static MARKER_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Lab: [^|\n]+\| Instance: \d+\n?").unwrap());

/// Qualifier words that may trail the lab name inside the marker.
const QUALIFIERS: &[&str] = &["added"];

/// Group metadata decoded from one description field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabTags {
    /// Lab groups a template belongs to (templates only).
    pub lab_groups: Vec<String>,
    /// Lab name from the instance marker, qualifiers stripped.
    pub lab_name: Option<String>,
    /// Instance number from the instance marker.
    pub instance: Option<u32>,
}

/// Decodes both patterns out of a description. Never fails.
pub fn decode(description: &str) -> LabTags {
    let lab_groups = GROUPS_RE
        .captures(description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|inner| !inner.is_empty())
        .map(|inner| inner.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    let (lab_name, instance) = match MARKER_RE.captures(description) {
        Some(caps) => {
            let name = strip_qualifiers(caps["name"].trim());
            let instance = caps["instance"].parse().ok();
            (Some(name.to_string()), instance)
        }
        None => (None, None),
    };

    LabTags {
        lab_groups,
        lab_name,
        instance,
    }
}

fn strip_qualifiers(raw: &str) -> &str {
    let mut name = raw;
    loop {
        let trimmed = name.trim_end();
        let Some((head, tail)) = trimmed.rsplit_once(' ') else {
            return trimmed;
        };
        if QUALIFIERS.contains(&tail) {
            name = head;
        } else {
            return trimmed;
        }
    }
}

/// Replaces the bracketed group list, leaving everything else untouched.
///
/// Idempotent: encoding the same list twice yields the same text.
pub fn encode_groups(existing: &str, lab_groups: &[String]) -> String {
    let mut description = GROUPS_LINE_RE.replace_all(existing, "").trim().to_string();
    if !lab_groups.is_empty() {
        let tag = format!("LabGroups:[{}]", lab_groups.join(","));
        if description.is_empty() {
            description = tag;
        } else {
            description = format!("{description}\n{tag}");
        }
    }
    description
}

/// Renders the instance membership marker for a group.
pub fn instance_marker(group: &GroupId, added: bool) -> String {
    if added {
        format!(
            "Lab: {} added | Instance: {}",
            group.lab_name, group.instance
        )
    } else {
        format!("Lab: {} | Instance: {}", group.lab_name, group.instance)
    }
}

/// Writes the instance marker into a description, replacing any previous
/// marker and preserving the rest of the text.
pub fn set_instance_marker(existing: &str, group: &GroupId, added: bool) -> String {
    let description = clear_instance_marker(existing);
    let marker = instance_marker(group, added);
    if description.is_empty() {
        marker
    } else {
        format!("{description}\n{marker}")
    }
}

/// Removes the instance marker only; group-list tagging and all other
/// text stay untouched.
pub fn clear_instance_marker(existing: &str) -> String {
    MARKER_LINE_RE.replace_all(existing, "").trim().to_string()
}
