//! Baseline project layout and tour artifacts

use crate::fs::{FsAccess, SessionPair};
use crate::model::Project;
use crate::starter::StarterKind;
use async_trait::async_trait;
use workbench_common::{WorkbenchError, WorkbenchResult};

/// Writes and removes a project's filesystem artifacts
#[async_trait]
pub trait ProjectSeeder: Send + Sync {
    /// Create the baseline layout of a new project
    async fn seed_project(&self, project: &Project, root: &str, sessions: &SessionPair) -> WorkbenchResult<()>;

    /// Add the walkthrough files of a starter project
    async fn write_tour(&self, project: &Project, root: &str, kind: StarterKind, user: &FsAccess) -> WorkbenchResult<()>;

    /// Remove everything below the project root
    async fn remove_project(&self, project: &Project, root: &str, admin: &FsAccess) -> WorkbenchResult<()>;
}

/// Root directory owned by the superuser, a README written as the owner
pub struct BaselineLayoutSeeder;

impl BaselineLayoutSeeder {
    fn seeding(project: &Project, e: WorkbenchError) -> WorkbenchError {
        WorkbenchError::Seeding {
            project: project.id,
            cause: e.to_string(),
        }
    }
}

#[async_trait]
impl ProjectSeeder for BaselineLayoutSeeder {
    async fn seed_project(&self, project: &Project, root: &str, sessions: &SessionPair) -> WorkbenchResult<()> {
        sessions
            .admin
            .access()
            .mkdirs(root)
            .map_err(|e| Self::seeding(project, e))?;

        let readme = format!("# {}\n\n{}\n", project.name, project.description);
        sessions
            .user
            .access()
            .write(&format!("{}/README.md", root), readme.as_bytes())
            .map_err(|e| Self::seeding(project, e))?;
        tracing::debug!(project_id = %project.id, root, "baseline layout seeded");
        Ok(())
    }

    async fn write_tour(&self, project: &Project, root: &str, kind: StarterKind, user: &FsAccess) -> WorkbenchResult<()> {
        let tour = format!(
            "# {}\n\n{}.\n\nServices: {}\n",
            project.name,
            kind.description(),
            kind.services()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        user.mkdirs(&format!("{}/TestJob", root))
            .and_then(|_| user.write(&format!("{}/TestJob/README.md", root), tour.as_bytes()))
            .map_err(|e| Self::seeding(project, e))
    }

    async fn remove_project(&self, project: &Project, root: &str, admin: &FsAccess) -> WorkbenchResult<()> {
        if !admin.exists(root)? {
            return Ok(());
        }
        admin.remove_recursive(root).map_err(|e| Self::seeding(project, e))
    }
}
