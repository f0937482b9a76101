//! Project Quotas and Compute Pricing
//!
//! Counters live in an external store with single-record isolation; this
//! module only reads, validates and writes them back.

use crate::store::ProjectStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use workbench_common::{ProjectId, QuotaConfig, WorkbenchError, WorkbenchResult};

/// Stored quota counters; limits may be missing on a broken project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub storage_used_bytes: u64,
    pub storage_limit_bytes: Option<u64>,
    pub compute_used_secs: f64,
    pub compute_limit_secs: Option<u64>,
}

/// Validated view of a project's quotas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub project: ProjectId,
    pub storage_used_bytes: u64,
    pub storage_limit_bytes: u64,
    pub compute_used_secs: f64,
    pub compute_limit_secs: u64,
    pub multipliers: Vec<PriceMultiplier>,
}

impl QuotaSnapshot {
    /// Remaining compute seconds, never negative
    pub fn compute_remaining_secs(&self) -> f64 {
        (self.compute_limit_secs as f64 - self.compute_used_secs).max(0.0)
    }

    /// Storage utilization percentage
    pub fn storage_utilization(&self) -> f64 {
        if self.storage_limit_bytes == 0 {
            return 100.0;
        }
        (self.storage_used_bytes as f64 / self.storage_limit_bytes as f64) * 100.0
    }
}

/// Kind of compute being charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeKind {
    Cpu,
    Gpu,
}

/// Cost multiplier for one compute kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceMultiplier {
    pub kind: ComputeKind,
    pub multiplier: f64,
}

/// Quota persistence
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn get(&self, project: ProjectId) -> WorkbenchResult<Option<QuotaRecord>>;
    async fn put(&self, project: ProjectId, record: QuotaRecord) -> WorkbenchResult<()>;
    async fn remove(&self, project: ProjectId) -> WorkbenchResult<()>;
}

/// In-memory quota store (for testing and development)
#[derive(Default)]
pub struct InMemoryQuotaStore {
    records: RwLock<HashMap<ProjectId, QuotaRecord>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get(&self, project: ProjectId) -> WorkbenchResult<Option<QuotaRecord>> {
        Ok(self.records.read().get(&project).cloned())
    }

    async fn put(&self, project: ProjectId, record: QuotaRecord) -> WorkbenchResult<()> {
        self.records.write().insert(project, record);
        Ok(())
    }

    async fn remove(&self, project: ProjectId) -> WorkbenchResult<()> {
        self.records.write().remove(&project);
        Ok(())
    }
}

/// Reads and validates project quotas
pub struct QuotaManager {
    config: QuotaConfig,
    quotas: Arc<dyn QuotaStore>,
    projects: Arc<dyn ProjectStore>,
}

impl QuotaManager {
    pub fn new(config: QuotaConfig, quotas: Arc<dyn QuotaStore>, projects: Arc<dyn ProjectStore>) -> Self {
        Self {
            config,
            quotas,
            projects,
        }
    }

    /// Current quotas. Missing limits are an error, never "unlimited".
    pub async fn get_quotas(&self, project: ProjectId) -> WorkbenchResult<QuotaSnapshot> {
        if self.projects.find(project).await?.is_none() {
            return Err(WorkbenchError::ProjectNotFound(project));
        }
        let record = self.quotas.get(project).await?.unwrap_or_default();
        let (storage_limit, compute_limit) =
            match (record.storage_limit_bytes, record.compute_limit_secs) {
                (Some(storage), Some(compute)) => (storage, compute),
                _ => {
                    tracing::warn!(project_id = %project, "quota record missing or incomplete");
                    return Err(WorkbenchError::QuotaInconsistent(project));
                }
            };

        Ok(QuotaSnapshot {
            project,
            storage_used_bytes: record.storage_used_bytes,
            storage_limit_bytes: storage_limit,
            compute_used_secs: record.compute_used_secs,
            compute_limit_secs: compute_limit,
            multipliers: self.get_price_multipliers(),
        })
    }

    /// Multipliers ordered by compute kind
    pub fn get_price_multipliers(&self) -> Vec<PriceMultiplier> {
        vec![
            PriceMultiplier {
                kind: ComputeKind::Cpu,
                multiplier: self.config.cpu_multiplier,
            },
            PriceMultiplier {
                kind: ComputeKind::Gpu,
                multiplier: self.config.gpu_multiplier,
            },
        ]
    }

    fn multiplier(&self, kind: ComputeKind) -> f64 {
        match kind {
            ComputeKind::Cpu => self.config.cpu_multiplier,
            ComputeKind::Gpu => self.config.gpu_multiplier,
        }
    }

    /// Write default limits for a freshly created project
    pub async fn initialize(&self, project: ProjectId) -> WorkbenchResult<()> {
        self.quotas
            .put(
                project,
                QuotaRecord {
                    storage_used_bytes: 0,
                    storage_limit_bytes: Some(self.config.storage_bytes),
                    compute_used_secs: 0.0,
                    compute_limit_secs: Some(self.config.compute_secs),
                },
            )
            .await
    }

    /// Charge `seconds` of `kind` compute, priced by its multiplier
    ///
    /// Usage is left unchanged if the charge would cross the limit.
    pub async fn charge_compute(
        &self,
        project: ProjectId,
        seconds: f64,
        kind: ComputeKind,
    ) -> WorkbenchResult<QuotaSnapshot> {
        let mut snapshot = self.get_quotas(project).await?;
        let cost = seconds.max(0.0) * self.multiplier(kind);
        let used = snapshot.compute_used_secs + cost;
        if used > snapshot.compute_limit_secs as f64 {
            return Err(WorkbenchError::QuotaExceeded {
                subject: format!("project {}", project),
                limit: snapshot.compute_limit_secs,
            });
        }

        self.quotas
            .put(
                project,
                QuotaRecord {
                    storage_used_bytes: snapshot.storage_used_bytes,
                    storage_limit_bytes: Some(snapshot.storage_limit_bytes),
                    compute_used_secs: used,
                    compute_limit_secs: Some(snapshot.compute_limit_secs),
                },
            )
            .await?;
        snapshot.compute_used_secs = used;
        Ok(snapshot)
    }

    /// Drop the quota record of a removed project
    pub async fn remove(&self, project: ProjectId) -> WorkbenchResult<()> {
        self.quotas.remove(project).await
    }
}
