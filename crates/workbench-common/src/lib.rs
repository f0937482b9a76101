//! Workbench Common - shared types for the project provisioning controller
//!
//! - Error taxonomy ([`WorkbenchError`])
//! - Identifiers and service tags
//! - Explicit configuration ([`WorkbenchConfig`])
//! - Tracing subscriber setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{
    CertificateConfig, LoggingConfig, ProvisioningConfig, QuotaConfig, SharingConfig,
    WorkbenchConfig,
};
pub use error::{WorkbenchError, WorkbenchResult};
pub use types::{Actor, ProjectId, ServiceTag};
