//! Public Dataset Import
//!
//! A public dataset of one project can be shared read-only into another.

use crate::store::ProjectStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use workbench_common::{Actor, ProjectId, WorkbenchError, WorkbenchResult};

/// Dataset owned by a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    pub project: ProjectId,
    pub description: String,
    pub public: bool,
}

/// Who may modify a shared dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditPermission {
    OwnerOnly,
    Members,
}

/// Dataset made visible in a project other than its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedDataset {
    pub id: Uuid,
    pub dataset: String,
    pub source: ProjectId,
    pub destination: ProjectId,
    pub shared: bool,
    pub permission: EditPermission,
    pub description: String,
    pub shared_by: String,
    pub shared_at: DateTime<Utc>,
}

/// Dataset metadata persistence
#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    async fn find(&self, project: ProjectId, name: &str) -> WorkbenchResult<Option<Dataset>>;

    /// Record a share; `DatasetAlreadyShared` if the destination has it already
    async fn share(&self, shared: SharedDataset) -> WorkbenchResult<SharedDataset>;

    async fn shared_with(&self, destination: ProjectId) -> WorkbenchResult<Vec<SharedDataset>>;
}

/// In-memory dataset catalog (for testing and development)
#[derive(Default)]
pub struct InMemoryDatasetCatalog {
    datasets: DashMap<(ProjectId, String), Dataset>,
    shares: DashMap<(ProjectId, ProjectId, String), SharedDataset>,
}

impl InMemoryDatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset of `project`
    pub fn register(&self, project: ProjectId, name: &str, description: &str, public: bool) -> Dataset {
        let dataset = Dataset {
            id: Uuid::new_v4(),
            name: name.to_string(),
            project,
            description: description.to_string(),
            public,
        };
        self.datasets.insert((project, name.to_string()), dataset.clone());
        dataset
    }
}

#[async_trait]
impl DatasetCatalog for InMemoryDatasetCatalog {
    async fn find(&self, project: ProjectId, name: &str) -> WorkbenchResult<Option<Dataset>> {
        Ok(self
            .datasets
            .get(&(project, name.to_string()))
            .map(|d| d.value().clone()))
    }

    async fn share(&self, shared: SharedDataset) -> WorkbenchResult<SharedDataset> {
        let key = (shared.destination, shared.source, shared.dataset.clone());
        match self.shares.entry(key) {
            Entry::Occupied(_) => Err(WorkbenchError::DatasetAlreadyShared {
                dataset: shared.dataset,
                project: shared.destination,
            }),
            Entry::Vacant(slot) => {
                slot.insert(shared.clone());
                Ok(shared)
            }
        }
    }

    async fn shared_with(&self, destination: ProjectId) -> WorkbenchResult<Vec<SharedDataset>> {
        let mut shared: Vec<_> = self
            .shares
            .iter()
            .filter(|entry| entry.key().0 == destination)
            .map(|entry| entry.value().clone())
            .collect();
        shared.sort_by(|a, b| a.shared_at.cmp(&b.shared_at).then_with(|| a.dataset.cmp(&b.dataset)));
        Ok(shared)
    }
}

/// Imports public datasets between projects
pub struct DatasetImporter {
    projects: Arc<dyn ProjectStore>,
    catalog: Arc<dyn DatasetCatalog>,
}

impl DatasetImporter {
    pub fn new(projects: Arc<dyn ProjectStore>, catalog: Arc<dyn DatasetCatalog>) -> Self {
        Self { projects, catalog }
    }

    /// Share `dataset_name` of `source_project` into `destination`
    pub async fn import_public(
        &self,
        destination: ProjectId,
        source_project: &str,
        dataset_name: &str,
        actor: &Actor,
    ) -> WorkbenchResult<SharedDataset> {
        let destination = self
            .projects
            .find(destination)
            .await?
            .ok_or(WorkbenchError::ProjectNotFound(destination))?;
        let source = self
            .projects
            .find_by_name(source_project)
            .await?
            .ok_or_else(|| WorkbenchError::ProjectNameNotFound(source_project.to_string()))?;

        let qualified = format!("{}::{}", source.name, dataset_name);
        let dataset = self
            .catalog
            .find(source.id, dataset_name)
            .await?
            .ok_or_else(|| WorkbenchError::DatasetNotFound(qualified.clone()))?;
        if !dataset.public {
            return Err(WorkbenchError::DatasetNotPublic(qualified));
        }

        let shared = self
            .catalog
            .share(SharedDataset {
                id: Uuid::new_v4(),
                dataset: dataset.name,
                source: source.id,
                destination: destination.id,
                shared: true,
                permission: EditPermission::OwnerOnly,
                description: dataset.description,
                shared_by: actor.email.clone(),
                shared_at: Utc::now(),
            })
            .await?;
        tracing::info!(
            project_id = %destination.id,
            source = %source.id,
            dataset = %shared.dataset,
            "public dataset imported"
        );
        Ok(shared)
    }

    /// Datasets shared into a project
    pub async fn shared_with(&self, destination: ProjectId) -> WorkbenchResult<Vec<SharedDataset>> {
        self.catalog.shared_with(destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewProject, ProjectDefinition};
    use crate::store::InMemoryProjectStore;

    struct Fixture {
        importer: DatasetImporter,
        source: ProjectId,
        destination: ProjectId,
        actor: Actor,
    }

    async fn fixture() -> Fixture {
        let projects = Arc::new(InMemoryProjectStore::new());
        let source = projects
            .create(NewProject::from_definition(&ProjectDefinition::new("genomes", ""), "bob@example.com"))
            .await
            .unwrap();
        let destination = projects
            .create(NewProject::from_definition(&ProjectDefinition::new("alpha", ""), "ada@example.com"))
            .await
            .unwrap();
        let catalog = Arc::new(InMemoryDatasetCatalog::new());
        catalog.register(source.id, "reference", "GRCh38 reference genome", true);
        catalog.register(source.id, "raw_reads", "unpublished reads", false);
        Fixture {
            importer: DatasetImporter::new(projects, catalog),
            source: source.id,
            destination: destination.id,
            actor: Actor::new("ada@example.com", "ada"),
        }
    }

    #[tokio::test]
    async fn test_import_public_dataset() {
        let f = fixture().await;

        let shared = f
            .importer
            .import_public(f.destination, "genomes", "reference", &f.actor)
            .await
            .unwrap();

        assert_eq!(shared.source, f.source);
        assert!(shared.shared);
        assert_eq!(shared.permission, EditPermission::OwnerOnly);
        assert_eq!(shared.description, "GRCh38 reference genome");
        assert_eq!(f.importer.shared_with(f.destination).await.unwrap(), vec![shared]);
    }

    #[tokio::test]
    async fn test_import_rejections() {
        let f = fixture().await;

        let private = f
            .importer
            .import_public(f.destination, "genomes", "raw_reads", &f.actor)
            .await
            .unwrap_err();
        assert_eq!(private, WorkbenchError::DatasetNotPublic("genomes::raw_reads".into()));

        let missing = f
            .importer
            .import_public(f.destination, "genomes", "nope", &f.actor)
            .await
            .unwrap_err();
        assert!(matches!(missing, WorkbenchError::DatasetNotFound(_)));

        let no_source = f
            .importer
            .import_public(f.destination, "ghost", "reference", &f.actor)
            .await
            .unwrap_err();
        assert!(matches!(no_source, WorkbenchError::ProjectNameNotFound(_)));

        f.importer
            .import_public(f.destination, "genomes", "reference", &f.actor)
            .await
            .unwrap();
        let twice = f
            .importer
            .import_public(f.destination, "genomes", "reference", &f.actor)
            .await
            .unwrap_err();
        assert!(matches!(twice, WorkbenchError::DatasetAlreadyShared { .. }));
    }
}
