//! Value Objects - identifiers and enumerated capabilities shared by every crate

use crate::error::WorkbenchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric project identifier assigned by the project store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(u32);

impl ProjectId {
    /// Wrap a raw identifier
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability that can be enabled for a project
///
/// Ordering is stable and used for deterministic reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTag {
    /// Batch jobs
    Jobs,
    /// Interactive notebook servers
    Notebook,
    /// Stream-processing topics
    Streaming,
    /// Model-serving endpoints
    Serving,
    /// Library/dependency management environment
    Dependencies,
    /// SQL warehouse database
    Warehouse,
    /// Cross-cluster dataset sharing
    Sharing,
}

impl ServiceTag {
    /// All tags in declaration order
    pub const ALL: [ServiceTag; 7] = [
        Self::Jobs,
        Self::Notebook,
        Self::Streaming,
        Self::Serving,
        Self::Dependencies,
        Self::Warehouse,
        Self::Sharing,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Notebook => "notebook",
            Self::Streaming => "streaming",
            Self::Serving => "serving",
            Self::Dependencies => "dependencies",
            Self::Warehouse => "warehouse",
            Self::Sharing => "sharing",
        }
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceTag {
    type Err = WorkbenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == wanted)
            .ok_or_else(|| WorkbenchError::UnknownService(s.to_string()))
    }
}

/// Authenticated caller of a workbench operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Login identity (email)
    pub email: String,
    /// Short platform username, used to derive filesystem identities
    pub username: String,
}

impl Actor {
    /// Create new actor
    pub fn new(email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
        }
    }

    /// Filesystem identity of this actor inside a project
    pub fn project_identity(&self, project_name: &str) -> String {
        format!("{}__{}", project_name, self.username)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_tag_parse_is_case_insensitive() {
        assert_eq!("JOBS".parse::<ServiceTag>().unwrap(), ServiceTag::Jobs);
        assert_eq!(" Notebook ".parse::<ServiceTag>().unwrap(), ServiceTag::Notebook);
        assert!(matches!(
            "tensorboard".parse::<ServiceTag>(),
            Err(WorkbenchError::UnknownService(s)) if s == "tensorboard"
        ));
    }

    #[test]
    fn test_project_identity() {
        let actor = Actor::new("ada@example.com", "ada");
        assert_eq!(actor.project_identity("genomics"), "genomics__ada");
    }
}
