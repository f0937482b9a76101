//! Project Store - persistence abstraction
//!
//! The persistence engine is external. All this core relies on is atomic
//! single-record writes; nothing here spans several records in one
//! transaction.

use crate::model::{NewProject, Project};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use workbench_common::{ProjectId, WorkbenchError, WorkbenchResult};

/// Project persistence
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Get project by id
    async fn find(&self, id: ProjectId) -> WorkbenchResult<Option<Project>>;

    /// Get project by unique name
    async fn find_by_name(&self, name: &str) -> WorkbenchResult<Option<Project>>;

    /// Insert a new project. Fails with `ProjectNameConflict` if the name is taken.
    async fn create(&self, record: NewProject) -> WorkbenchResult<Project>;

    /// Overwrite an existing project record
    async fn save(&self, project: &Project) -> WorkbenchResult<()>;

    /// Delete a project record
    async fn delete(&self, id: ProjectId) -> WorkbenchResult<()>;

    /// All projects owned by an email
    async fn owned_by(&self, owner: &str) -> WorkbenchResult<Vec<Project>>;
}

/// In-memory project store (for testing and development)
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
    next_id: AtomicU32,
}

impl InMemoryProjectStore {
    /// Empty store; ids start at 1
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Get project count
    pub fn count(&self) -> usize {
        self.projects.read().len()
    }
}

impl Default for InMemoryProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn find(&self, id: ProjectId) -> WorkbenchResult<Option<Project>> {
        Ok(self.projects.read().get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> WorkbenchResult<Option<Project>> {
        Ok(self
            .projects
            .read()
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn create(&self, record: NewProject) -> WorkbenchResult<Project> {
        // Check and insert under one write lock so the name check is atomic.
        let mut projects = self.projects.write();
        if projects.values().any(|p| p.name == record.name) {
            return Err(WorkbenchError::ProjectNameConflict(record.name));
        }
        let id = ProjectId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let project = record.into_project(id);
        projects.insert(id, project.clone());
        Ok(project)
    }

    async fn save(&self, project: &Project) -> WorkbenchResult<()> {
        let mut projects = self.projects.write();
        match projects.get_mut(&project.id) {
            Some(existing) => {
                *existing = project.clone();
                Ok(())
            }
            None => Err(WorkbenchError::ProjectNotFound(project.id)),
        }
    }

    async fn delete(&self, id: ProjectId) -> WorkbenchResult<()> {
        self.projects
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(WorkbenchError::ProjectNotFound(id))
    }

    async fn owned_by(&self, owner: &str) -> WorkbenchResult<Vec<Project>> {
        let mut owned: Vec<_> = self
            .projects
            .read()
            .values()
            .filter(|p| p.is_owned_by(owner))
            .cloned()
            .collect();
        owned.sort_by_key(|p| p.id);
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectDefinition;

    fn record(name: &str, owner: &str) -> NewProject {
        NewProject::from_definition(&ProjectDefinition::new(name, "test"), owner)
    }

    #[tokio::test]
    async fn test_create_find_delete() {
        let store = InMemoryProjectStore::new();

        let project = store.create(record("alpha", "ada@example.com")).await.unwrap();
        assert_eq!(store.count(), 1);
        assert!(project.services.is_empty());

        let by_name = store.find_by_name("alpha").await.unwrap().unwrap();
        assert_eq!(by_name.id, project.id);

        store.delete(project.id).await.unwrap();
        assert!(store.find(project.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(project.id).await,
            Err(WorkbenchError::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let store = InMemoryProjectStore::new();
        store.create(record("alpha", "ada@example.com")).await.unwrap();

        let err = store.create(record("alpha", "bob@example.com")).await.unwrap_err();
        assert_eq!(err, WorkbenchError::ProjectNameConflict("alpha".into()));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_save_requires_existing_record() {
        let store = InMemoryProjectStore::new();
        let mut project = tokio_test::block_on(store.create(record("alpha", "ada@example.com"))).unwrap();
        project.description = "updated".into();
        tokio_test::assert_ok!(tokio_test::block_on(store.save(&project)));

        let ghost = record("ghost", "ada@example.com").into_project(ProjectId::new(99));
        tokio_test::assert_err!(tokio_test::block_on(store.save(&ghost)));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_owned_by() {
        let store = InMemoryProjectStore::new();
        store.create(record("alpha", "ada@example.com")).await.unwrap();
        store.create(record("beta", "bob@example.com")).await.unwrap();
        store.create(record("gamma", "ada@example.com")).await.unwrap();

        let names: Vec<_> = store
            .owned_by("ada@example.com")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["alpha", "gamma"]);
    }
}
