//! Project Provisioner
//!
//! Orchestrates the project lifecycle. Creation persists the record,
//! initializes quotas, seeds the layout and fans out one activation per
//! requested service. A failure after persistence is compensated in reverse:
//! completed activations are deprovisioned, artifacts, quotas and record
//! removed, and the original error returned.

use crate::activation::{join_all, ActivationContext, ActivationRegistry, ActivationReport};
use crate::fs::{FilesystemSessionManager, SessionPair};
use crate::model::{
    NewProject, Project, ProjectChange, ProjectDefinition, ProjectState, ProjectUpdate, RemovalReport,
    UpdateOutcome,
};
use crate::quota::QuotaManager;
use crate::seeding::ProjectSeeder;
use crate::starter::StarterKind;
use crate::store::ProjectStore;
use std::sync::Arc;
use workbench_common::{Actor, ProjectId, ProvisioningConfig, ServiceTag, WorkbenchError, WorkbenchResult};

/// Provisioning stopped after the record was persisted
struct Aborted {
    error: WorkbenchError,
    /// Activations that completed before the failure
    completed: Vec<ServiceTag>,
}

impl From<WorkbenchError> for Aborted {
    fn from(error: WorkbenchError) -> Self {
        Self {
            error,
            completed: Vec::new(),
        }
    }
}

/// Project lifecycle orchestrator
pub struct ProjectProvisioner {
    config: ProvisioningConfig,
    projects: Arc<dyn ProjectStore>,
    quotas: Arc<QuotaManager>,
    sessions: FilesystemSessionManager,
    registry: Arc<ActivationRegistry>,
    seeder: Arc<dyn ProjectSeeder>,
}

impl ProjectProvisioner {
    pub fn new(
        config: ProvisioningConfig,
        projects: Arc<dyn ProjectStore>,
        quotas: Arc<QuotaManager>,
        sessions: FilesystemSessionManager,
        registry: Arc<ActivationRegistry>,
        seeder: Arc<dyn ProjectSeeder>,
    ) -> Self {
        Self {
            config,
            projects,
            quotas,
            sessions,
            registry,
            seeder,
        }
    }

    /// Create a project and activate `services` for it
    pub async fn create_project(
        &self,
        definition: &ProjectDefinition,
        owner: &Actor,
        services: &[ServiceTag],
    ) -> WorkbenchResult<Project> {
        self.create_with(definition, owner, services, None).await
    }

    /// Create the demo project of `kind` for `owner`
    pub async fn create_starter_project(&self, kind: StarterKind, owner: &Actor) -> WorkbenchResult<Project> {
        let definition = ProjectDefinition::new(kind.project_name(owner), kind.description());
        self.create_with(&definition, owner, kind.services(), Some(kind)).await
    }

    async fn create_with(
        &self,
        definition: &ProjectDefinition,
        owner: &Actor,
        services: &[ServiceTag],
        tour: Option<StarterKind>,
    ) -> WorkbenchResult<Project> {
        self.validate_new(definition, owner).await?;

        let project = self
            .projects
            .create(NewProject::from_definition(definition, &owner.email))
            .await?;
        tracing::info!(project_id = %project.id, name = %project.name, owner = %owner, "project created");

        let root = self.sessions.project_root(&project.name);
        let sessions = match self.sessions.open_for_project(&project.name, owner) {
            Ok(sessions) => sessions,
            Err(e) => {
                self.discard(&project).await;
                return Err(e);
            }
        };

        let result = match self.provision(&project, owner, &root, &sessions, services, tour).await {
            Ok(project) => Ok(project),
            Err(aborted) => {
                tracing::warn!(
                    project_id = %project.id,
                    error = %aborted.error,
                    "project provisioning failed, rolling back"
                );
                self.deprovision(&self.context(&project, owner, &root, &sessions), &aborted.completed)
                    .await;
                if let Err(e) = self
                    .seeder
                    .remove_project(&project, &root, sessions.admin.access())
                    .await
                {
                    tracing::error!(project_id = %project.id, error = %e, "failed to remove project artifacts");
                }
                self.discard(&project).await;
                Err(aborted.error)
            }
        };
        sessions.release();
        result
    }

    /// Checks that have no side effects
    async fn validate_new(&self, definition: &ProjectDefinition, owner: &Actor) -> WorkbenchResult<()> {
        definition.validate(&self.config.reserved_names)?;

        let limit = self.config.max_projects_per_owner;
        let owned = self.projects.owned_by(&owner.email).await?;
        if owned.len() >= limit as usize {
            return Err(WorkbenchError::QuotaExceeded {
                subject: owner.email.clone(),
                limit: u64::from(limit),
            });
        }
        if self.projects.find_by_name(&definition.name).await?.is_some() {
            return Err(WorkbenchError::ProjectNameConflict(definition.name.clone()));
        }
        Ok(())
    }

    async fn provision(
        &self,
        project: &Project,
        owner: &Actor,
        root: &str,
        sessions: &SessionPair,
        services: &[ServiceTag],
        tour: Option<StarterKind>,
    ) -> Result<Project, Aborted> {
        self.quotas.initialize(project.id).await?;
        self.seeder.seed_project(project, root, sessions).await?;

        let requested = project.missing_services(services);
        let report = self.activate(project, owner, root, sessions, &requested).await;
        if let Some(error) = report.first_failure().cloned() {
            return Err(Aborted {
                error,
                completed: report.completed,
            });
        }

        let mut provisioned = project.clone();
        provisioned.services.extend(report.completed.iter().copied());
        let finished = match tour {
            Some(kind) => {
                self.seeder
                    .write_tour(&provisioned, root, kind, sessions.user.access())
                    .await
            }
            None => Ok(()),
        };
        let finished = match finished {
            Ok(()) => self.projects.save(&provisioned).await,
            Err(e) => Err(e),
        };
        if let Err(error) = finished {
            return Err(Aborted {
                error,
                completed: report.completed,
            });
        }
        Ok(provisioned)
    }

    /// Enable the services from `services` that are not enabled yet
    ///
    /// On failure the record is left as it was and whatever completed in
    /// this call is deprovisioned.
    pub async fn update_services(
        &self,
        project_id: ProjectId,
        services: &[ServiceTag],
        actor: &Actor,
    ) -> WorkbenchResult<Project> {
        let project = self.active_project(project_id).await?;
        let delta = project.missing_services(services);
        if delta.is_empty() {
            return Ok(project);
        }

        let root = self.sessions.project_root(&project.name);
        let sessions = self.sessions.open_for_project(&project.name, actor)?;
        let report = self.activate(&project, actor, &root, &sessions, &delta).await;

        let mut updated = project.clone();
        updated.services.extend(report.completed.iter().copied());
        let result = match report.first_failure().cloned() {
            Some(e) => Err(e),
            None => self.projects.save(&updated).await.map(|_| updated),
        };
        if let Err(e) = &result {
            tracing::warn!(project_id = %project_id, error = %e, "service update failed, rolling back");
            self.deprovision(&self.context(&project, actor, &root, &sessions), &report.completed)
                .await;
        }
        sessions.release();
        result
    }

    /// Apply description and retention changes, then enable new services
    pub async fn update_project(
        &self,
        project_id: ProjectId,
        update: ProjectUpdate,
        actor: &Actor,
    ) -> WorkbenchResult<UpdateOutcome> {
        let mut project = self.active_project(project_id).await?;
        let mut changes = Vec::new();

        if let Some(description) = update.description {
            if description != project.description {
                project.description = description;
                changes.push(ProjectChange::Description);
            }
        }
        if let Some(until) = update.retention_until {
            if project.retention_until != Some(until) {
                project.retention_until = Some(until);
                changes.push(ProjectChange::Retention);
            }
        }
        if !changes.is_empty() {
            self.projects.save(&project).await?;
        }

        let before = project.services.clone();
        let project = self.update_services(project_id, &update.services, actor).await?;
        changes.extend(
            project
                .services
                .difference(&before)
                .map(|tag| ProjectChange::ServiceEnabled(*tag)),
        );

        if changes.is_empty() {
            tracing::debug!(project_id = %project_id, "nothing to update");
        }
        Ok(UpdateOutcome { project, changes })
    }

    /// Delete a project and everything it owns
    ///
    /// Only the owner may do this. Teardown failures are collected in the
    /// report; the record is removed regardless. If the final delete fails
    /// the record stays behind marked `Deleted` and the call can be retried.
    pub async fn remove_project(&self, actor: &Actor, project_id: ProjectId) -> WorkbenchResult<RemovalReport> {
        let mut project = self.project(project_id).await?;
        if !project.is_owned_by(&actor.email) {
            return Err(WorkbenchError::AccessDenied(format!(
                "{} does not own project {}",
                actor.email, project.name
            )));
        }
        project.state = ProjectState::Deleting;
        self.projects.save(&project).await?;

        let mut report = RemovalReport {
            project: Some(project_id),
            ..Default::default()
        };
        let root = self.sessions.project_root(&project.name);
        match self.sessions.open_for_project(&project.name, actor) {
            Ok(sessions) => {
                let ctx = self.context(&project, actor, &root, &sessions);
                for tag in project.services.iter().rev() {
                    if let Err(e) = self.registry.deactivate(*tag, &ctx).await {
                        tracing::warn!(project_id = %project_id, service = %tag, error = %e, "service teardown failed");
                        report.service_failures.push((*tag, e.to_string()));
                    }
                }
                if let Err(e) = self
                    .seeder
                    .remove_project(&project, &root, sessions.admin.access())
                    .await
                {
                    tracing::warn!(project_id = %project_id, error = %e, "failed to remove project artifacts");
                    report.artifact_failure = Some(e.to_string());
                }
                sessions.release();
            }
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "no filesystem session for teardown");
                report
                    .service_failures
                    .extend(project.services.iter().map(|tag| (*tag, e.to_string())));
                report.artifact_failure = Some(e.to_string());
            }
        }

        if let Err(e) = self.quotas.remove(project_id).await {
            tracing::warn!(project_id = %project_id, error = %e, "failed to remove quotas");
        }
        project.state = ProjectState::Deleted;
        if let Err(e) = self.projects.save(&project).await {
            tracing::warn!(project_id = %project_id, error = %e, "failed to mark project deleted");
        }
        self.projects.delete(project_id).await?;
        tracing::info!(project_id = %project_id, clean = report.is_clean(), "project removed");
        Ok(report)
    }

    /// Project by id
    pub async fn project(&self, id: ProjectId) -> WorkbenchResult<Project> {
        self.projects
            .find(id)
            .await?
            .ok_or(WorkbenchError::ProjectNotFound(id))
    }

    /// Project by name
    pub async fn project_by_name(&self, name: &str) -> WorkbenchResult<Project> {
        self.projects
            .find_by_name(name)
            .await?
            .ok_or_else(|| WorkbenchError::ProjectNameNotFound(name.to_string()))
    }

    /// Projects owned by `owner`, by id
    pub async fn projects_owned_by(&self, owner: &str) -> WorkbenchResult<Vec<Project>> {
        self.projects.owned_by(owner).await
    }

    async fn active_project(&self, id: ProjectId) -> WorkbenchResult<Project> {
        let project = self.project(id).await?;
        if project.state != ProjectState::Active {
            return Err(WorkbenchError::ProjectInactive { project: id });
        }
        Ok(project)
    }

    fn context(&self, project: &Project, actor: &Actor, root: &str, sessions: &SessionPair) -> ActivationContext {
        ActivationContext {
            project: project.clone(),
            actor: actor.clone(),
            admin: sessions.admin.share(),
            user: sessions.user.share(),
            project_root: root.to_string(),
        }
    }

    async fn activate(
        &self,
        project: &Project,
        actor: &Actor,
        root: &str,
        sessions: &SessionPair,
        services: &[ServiceTag],
    ) -> ActivationReport {
        if services.is_empty() {
            return ActivationReport::default();
        }
        let ctx = Arc::new(self.context(project, actor, root, sessions));
        join_all(self.registry.dispatch_all(services, ctx)).await
    }

    /// Best effort, newest first
    async fn deprovision(&self, ctx: &ActivationContext, completed: &[ServiceTag]) {
        for tag in completed.iter().rev() {
            if let Err(e) = self.registry.deactivate(*tag, ctx).await {
                tracing::error!(project_id = %ctx.project.id, service = %tag, error = %e, "failed to deprovision service");
            }
        }
    }

    /// Drop quotas and record; failures are logged
    async fn discard(&self, project: &Project) {
        if let Err(e) = self.quotas.remove(project.id).await {
            tracing::error!(project_id = %project.id, error = %e, "failed to remove quotas");
        }
        if let Err(e) = self.projects.delete(project.id).await {
            tracing::error!(project_id = %project.id, error = %e, "failed to delete project record");
        }
    }
}
