//! Error types for Workbench
//!
//! Every variant carries enough context (project id, service tag, remote
//! address) to diagnose a failure. None of them carry passwords or key bytes.

use crate::types::{ProjectId, ServiceTag};
use thiserror::Error;

/// Workbench error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkbenchError {
    /// No project with this id
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// No project with this name
    #[error("project not found: {0}")]
    ProjectNameNotFound(String),

    /// Project name already taken
    #[error("project name already in use: {0}")]
    ProjectNameConflict(String),

    /// Project definition rejected by validation
    #[error("invalid project definition: {0}")]
    InvalidDefinition(String),

    /// Operation not allowed in the project's current lifecycle state
    #[error("project {project} is not active")]
    ProjectInactive {
        /// Project id
        project: ProjectId,
    },

    /// Service name does not map to a known tag
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// Owner reached the project limit, or a compute charge would exceed the quota
    #[error("quota exceeded for {subject}: limit {limit}")]
    QuotaExceeded {
        /// Owner email or project id
        subject: String,
        /// The limit that was hit
        limit: u64,
    },

    /// Quota record missing or incomplete
    #[error("quota missing or incomplete for project {0}")]
    QuotaInconsistent(ProjectId),

    /// A service activation failed
    #[error("activation of service {tag} failed: {cause}")]
    ServiceActivationFailed {
        /// Failing service
        tag: ServiceTag,
        /// Underlying cause
        cause: String,
    },

    /// Bad password or forbidden actor
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Certificate download failed
    #[error("certificate download failed for project {project}: {cause}")]
    DownloadError {
        /// Project id
        project: ProjectId,
        /// Underlying cause
        cause: String,
    },

    /// Remote sharing is not configured on this node
    #[error("remote sharing subsystem not ready: {0}")]
    SubsystemNotReady(String),

    /// Remote cluster unreachable or answered garbage
    #[error("communication with {address} failed: {cause}")]
    CommunicationFailure {
        /// Remote cluster address
        address: String,
        /// Underlying cause
        cause: String,
    },

    /// Dataset does not exist
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    /// Dataset exists but is not public
    #[error("dataset is not public: {0}")]
    DatasetNotPublic(String),

    /// Dataset identifier that cannot name a single dataset
    #[error("invalid dataset id: {0:?}")]
    InvalidDatasetId(String),

    /// Dataset already shared with the destination project
    #[error("dataset {dataset} already shared with project {project}")]
    DatasetAlreadyShared {
        /// Dataset name
        dataset: String,
        /// Destination project
        project: ProjectId,
    },

    /// Distributed filesystem error
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// Persistence error
    #[error("storage error: {0}")]
    Storage(String),

    /// Baseline artifact seeding failed
    #[error("seeding failed for project {project}: {cause}")]
    Seeding {
        /// Project id
        project: ProjectId,
        /// Underlying cause
        cause: String,
    },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl WorkbenchError {
    /// Service this error is attributed to, if any
    pub fn service(&self) -> Option<ServiceTag> {
        match self {
            Self::ServiceActivationFailed { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    /// Whether the error was raised by up-front validation (no side effects)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ProjectNotFound(_)
                | Self::ProjectNameNotFound(_)
                | Self::ProjectNameConflict(_)
                | Self::InvalidDefinition(_)
                | Self::UnknownService(_)
                | Self::QuotaExceeded { .. }
                | Self::AccessDenied(_)
                | Self::InvalidDatasetId(_)
        )
    }
}

/// Result type for Workbench
pub type WorkbenchResult<T> = Result<T, WorkbenchError>;
