//! Workbench Project Provisioner
//!
//! Lifecycle of multi-tenant projects: creation, service activation, quotas,
//! certificate downloads and teardown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      PROJECT PROVISIONER                         │
//! │   validate ─▶ persist ─▶ sessions ─▶ quotas ─▶ seed ─▶ fan-out   │
//! │                                                          │       │
//! │  ┌───────────────────────────────────────────────────────▼────┐  │
//! │  │                 SERVICE ACTIVATION REGISTRY                │  │
//! │  │   jobs │ notebook │ streaming │ serving │ ... (tasks)      │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! │          join all ─▶ success │ first failure ─▶ compensate       │
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │ Quota Manager│  │ FS Sessions  │  │ Certificate Lifecycle  │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![allow(dead_code)]

pub mod activation;
pub mod certs;
pub mod datasets;
pub mod fs;
pub mod model;
pub mod provisioner;
pub mod quota;
pub mod seeding;
pub mod starter;
pub mod store;

pub use activation::{
    ActivationContext, ActivationHandle, ActivationRegistry, ActivationReport, ServiceActivator,
    ServiceBackend, StandardActivator,
};
pub use certs::{
    Authenticator, CertificateLifecycleManager, CertificateMaterial, CertificateSource,
    CredentialBundle, MaterializedBundle, Notifier,
};
pub use datasets::{DatasetCatalog, DatasetImporter, InMemoryDatasetCatalog, SharedDataset};
pub use fs::{FilesystemSession, FilesystemSessionManager, FsBackend, InMemoryFs, SessionPair};
pub use model::{Project, ProjectDefinition, ProjectState, ProjectUpdate, RemovalReport, UpdateOutcome};
pub use provisioner::ProjectProvisioner;
pub use quota::{ComputeKind, InMemoryQuotaStore, PriceMultiplier, QuotaManager, QuotaSnapshot, QuotaStore};
pub use seeding::{BaselineLayoutSeeder, ProjectSeeder};
pub use starter::StarterKind;
pub use store::{InMemoryProjectStore, ProjectStore};
