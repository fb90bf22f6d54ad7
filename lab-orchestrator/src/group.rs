//! Lab group identity.

use std::fmt;
use std::str::FromStr;

use lab_core::error::LabError;
use serde::Serialize;

/// Identity of one lab instance: `(lab_name, instance_number)`.
///
/// A group is not a stored entity; it exists only as the set of VMs whose
/// decoded description matches this pair. The caller-facing rendering is
/// `<lab_name>_cloned<instance_number>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupId {
    pub lab_name: String,
    pub instance: u32,
}

impl GroupId {
    pub fn new(lab_name: impl Into<String>, instance: u32) -> Self {
        Self {
            lab_name: lab_name.into(),
            instance,
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_cloned{}", self.lab_name, self.instance)
    }
}

impl FromStr for GroupId {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lab_name, instance) = s.rsplit_once("_cloned").ok_or_else(|| {
            LabError::InvalidInput(format!(
                "invalid group identity '{s}', expected <lab_name>_cloned<instance>"
            ))
        })?;
        if lab_name.is_empty() {
            return Err(LabError::InvalidInput(format!(
                "invalid group identity '{s}': empty lab name"
            )));
        }
        let instance = instance.parse().map_err(|_| {
            LabError::InvalidInput(format!(
                "invalid group identity '{s}': instance must be a number"
            ))
        })?;
        Ok(Self {
            lab_name: lab_name.to_string(),
            instance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_caller_facing_identity() {
        let group: GroupId = "web_cloned1".parse().expect("parses");
        assert_eq!(group.lab_name, "web");
        assert_eq!(group.instance, 1);
        assert_eq!(group.to_string(), "web_cloned1");
    }

    #[test]
    fn lab_name_may_contain_underscores() {
        let group: GroupId = "red_team_cloned12".parse().expect("parses");
        assert_eq!(group.lab_name, "red_team");
        assert_eq!(group.instance, 12);
    }

    #[test]
    fn rejects_malformed_identities() {
        assert!("web".parse::<GroupId>().is_err());
        assert!("_cloned1".parse::<GroupId>().is_err());
        assert!("web_clonedx".parse::<GroupId>().is_err());
    }
}
