//! Project Data Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use workbench_common::{ProjectId, ServiceTag, WorkbenchError, WorkbenchResult};

/// Longest accepted project name
pub const MAX_NAME_LEN: usize = 32;

/// Project lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectState {
    Active,
    Deleting,
    Deleted,
}

/// Tenant workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Store-assigned id
    pub id: ProjectId,
    /// Unique name
    pub name: String,
    /// Owner email
    pub owner: String,
    /// Free text
    pub description: String,
    /// Data kept until this instant, if set
    pub retention_until: Option<DateTime<Utc>>,
    /// Enabled services
    pub services: BTreeSet<ServiceTag>,
    /// Lifecycle state
    pub state: ProjectState,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Check if service is enabled
    pub fn has_service(&self, tag: ServiceTag) -> bool {
        self.services.contains(&tag)
    }

    /// Tags from `requested` that are not yet enabled, deduplicated, in request order
    pub fn missing_services(&self, requested: &[ServiceTag]) -> Vec<ServiceTag> {
        let mut seen = BTreeSet::new();
        requested
            .iter()
            .copied()
            .filter(|tag| !self.has_service(*tag) && seen.insert(*tag))
            .collect()
    }

    /// Check if owned by actor email
    pub fn is_owned_by(&self, email: &str) -> bool {
        self.owner == email
    }
}

/// Caller-supplied definition of a new project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub name: String,
    pub description: String,
    pub retention_until: Option<DateTime<Utc>>,
}

impl ProjectDefinition {
    /// Create definition with a name and description
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            retention_until: None,
        }
    }

    /// Set retention
    pub fn with_retention(mut self, until: DateTime<Utc>) -> Self {
        self.retention_until = Some(until);
        self
    }

    /// Validate against naming rules and the reserved-name list
    pub fn validate(&self, reserved: &[String]) -> WorkbenchResult<()> {
        validate_name(&self.name)?;
        if reserved.iter().any(|r| r.eq_ignore_ascii_case(&self.name)) {
            return Err(WorkbenchError::InvalidDefinition(format!(
                "'{}' is a reserved name",
                self.name
            )));
        }
        Ok(())
    }
}

/// Project names: 1..=32 chars of `[A-Za-z0-9_]`, starting with a letter,
/// without a double underscore
pub fn validate_name(name: &str) -> WorkbenchResult<()> {
    let invalid = |why: &str| Err(WorkbenchError::InvalidDefinition(format!("name {}", why)));

    let first = match name.chars().next() {
        Some(c) => c,
        None => return invalid("cannot be empty"),
    };
    if name.len() > MAX_NAME_LEN {
        return invalid("exceeds 32 characters");
    }
    if !first.is_ascii_alphabetic() {
        return invalid("must start with a letter");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return invalid("may only contain letters, digits and '_'");
    }
    // "__" separates project and user in filesystem identities
    if name.contains("__") {
        return invalid("may not contain '__'");
    }
    Ok(())
}

/// Record handed to the store to create a project
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub owner: String,
    pub description: String,
    pub retention_until: Option<DateTime<Utc>>,
}

impl NewProject {
    pub fn from_definition(definition: &ProjectDefinition, owner: &str) -> Self {
        Self {
            name: definition.name.clone(),
            owner: owner.to_string(),
            description: definition.description.clone(),
            retention_until: definition.retention_until,
        }
    }

    /// Materialize with an id; services start empty
    pub fn into_project(self, id: ProjectId) -> Project {
        Project {
            id,
            name: self.name,
            owner: self.owner,
            description: self.description,
            retention_until: self.retention_until,
            services: BTreeSet::new(),
            state: ProjectState::Active,
            created_at: Utc::now(),
        }
    }
}

/// Project update request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectUpdate {
    pub description: Option<String>,
    pub retention_until: Option<DateTime<Utc>>,
    pub services: Vec<ServiceTag>,
}

/// Single applied change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectChange {
    Description,
    Retention,
    ServiceEnabled(ServiceTag),
}

/// Result of an update; no changes means nothing to update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub project: Project,
    pub changes: Vec<ProjectChange>,
}

impl UpdateOutcome {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// What went wrong while tearing a project down
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovalReport {
    pub project: Option<ProjectId>,
    /// Services whose teardown failed, with the cause
    pub service_failures: Vec<(ServiceTag, String)>,
    /// Filesystem cleanup failure, if any
    pub artifact_failure: Option<String>,
}

impl RemovalReport {
    pub fn is_clean(&self) -> bool {
        self.service_failures.is_empty() && self.artifact_failure.is_none()
    }
}
