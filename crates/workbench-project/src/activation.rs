//! Service Activation Registry
//!
//! Explicit mapping from [`ServiceTag`] to the routine that provisions the
//! service for a project. Activations run as spawned tasks; the caller
//! collects their [`ActivationHandle`]s and joins on all of them.

use crate::fs::FsAccess;
use crate::model::Project;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use workbench_common::{Actor, ServiceTag, WorkbenchError, WorkbenchResult};

/// Everything an activation may touch
#[derive(Debug, Clone)]
pub struct ActivationContext {
    pub project: Project,
    pub actor: Actor,
    /// Privileged filesystem view
    pub admin: FsAccess,
    /// Actor's project identity
    pub user: FsAccess,
    /// Project root directory
    pub project_root: String,
}

/// Provisions one service for a project
#[async_trait]
pub trait ServiceActivator: Send + Sync {
    /// Tag this activator serves
    fn tag(&self) -> ServiceTag;

    /// Provision; a project that already has the service is a no-op success
    async fn activate(&self, ctx: &ActivationContext) -> WorkbenchResult<()>;

    /// Tear the service down again
    async fn deactivate(&self, ctx: &ActivationContext) -> WorkbenchResult<()>;
}

/// Downstream service implementation (notebook server, broker, ...)
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    async fn provision(&self, project: &Project, actor: &Actor) -> WorkbenchResult<()>;
    async fn teardown(&self, project: &Project) -> WorkbenchResult<()>;
}

/// Project datasets each service needs
pub fn service_datasets(tag: ServiceTag) -> &'static [&'static str] {
    match tag {
        ServiceTag::Jobs => &["Resources", "Logs"],
        ServiceTag::Notebook => &["Jupyter"],
        ServiceTag::Serving => &["Models"],
        ServiceTag::Streaming
        | ServiceTag::Dependencies
        | ServiceTag::Warehouse
        | ServiceTag::Sharing => &[],
    }
}

/// Creates the service's datasets, then hands over to its backend
pub struct StandardActivator {
    tag: ServiceTag,
    backend: Option<Arc<dyn ServiceBackend>>,
}

impl StandardActivator {
    pub fn new(tag: ServiceTag) -> Self {
        Self { tag, backend: None }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ServiceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }
}

#[async_trait]
impl ServiceActivator for StandardActivator {
    fn tag(&self) -> ServiceTag {
        self.tag
    }

    async fn activate(&self, ctx: &ActivationContext) -> WorkbenchResult<()> {
        if ctx.project.has_service(self.tag) {
            return Ok(());
        }
        for dataset in service_datasets(self.tag) {
            let path = format!("{}/{}", ctx.project_root, dataset);
            if !ctx.user.exists(&path)? {
                ctx.user.mkdirs(&path)?;
            }
        }
        if let Some(backend) = &self.backend {
            backend.provision(&ctx.project, &ctx.actor).await?;
        }
        Ok(())
    }

    async fn deactivate(&self, ctx: &ActivationContext) -> WorkbenchResult<()> {
        if let Some(backend) = &self.backend {
            backend.teardown(&ctx.project).await?;
        }
        for dataset in service_datasets(self.tag) {
            let path = format!("{}/{}", ctx.project_root, dataset);
            if ctx.admin.exists(&path)? {
                ctx.admin.remove_recursive(&path)?;
            }
        }
        Ok(())
    }
}

/// Attribute a failure to the service that raised it
fn attribute(tag: ServiceTag, error: WorkbenchError) -> WorkbenchError {
    match error {
        WorkbenchError::ServiceActivationFailed { .. } => error,
        other => WorkbenchError::ServiceActivationFailed {
            tag,
            cause: other.to_string(),
        },
    }
}

/// One dispatched activation
pub struct ActivationHandle {
    tag: ServiceTag,
    task: JoinHandle<WorkbenchResult<()>>,
}

impl ActivationHandle {
    pub fn tag(&self) -> ServiceTag {
        self.tag
    }

    /// Wait for a terminal state
    pub async fn wait(self) -> WorkbenchResult<ServiceTag> {
        let tag = self.tag;
        match self.task.await {
            Ok(Ok(())) => Ok(tag),
            Ok(Err(e)) => Err(attribute(tag, e)),
            Err(e) => Err(WorkbenchError::ServiceActivationFailed {
                tag,
                cause: if e.is_panic() {
                    "activation task panicked".into()
                } else {
                    "activation task cancelled".into()
                },
            }),
        }
    }
}

/// Outcome of joining a set of activations
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Tags that activated, in dispatch order
    pub completed: Vec<ServiceTag>,
    /// Failures, in dispatch order
    pub failures: Vec<WorkbenchError>,
}

impl ActivationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failure reported to the caller
    pub fn first_failure(&self) -> Option<&WorkbenchError> {
        self.failures.first()
    }
}

/// Wait for every handle to reach a terminal state
///
/// All handles are awaited even after a failure so no activation is left
/// running unobserved.
pub async fn join_all(handles: Vec<ActivationHandle>) -> ActivationReport {
    let mut report = ActivationReport::default();
    for handle in handles {
        match handle.wait().await {
            Ok(tag) => report.completed.push(tag),
            Err(e) => report.failures.push(e),
        }
    }
    report
}

/// Tag → activator
pub struct ActivationRegistry {
    activators: HashMap<ServiceTag, Arc<dyn ServiceActivator>>,
}

impl ActivationRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            activators: HashMap::new(),
        }
    }

    /// [`StandardActivator`] without backend for every tag
    pub fn standard() -> Self {
        Self::standard_with_backends(HashMap::new())
    }

    /// [`StandardActivator`] for every tag, wired to the given backends
    pub fn standard_with_backends(mut backends: HashMap<ServiceTag, Arc<dyn ServiceBackend>>) -> Self {
        let mut registry = Self::new();
        for tag in ServiceTag::ALL {
            let activator = match backends.remove(&tag) {
                Some(backend) => StandardActivator::new(tag).with_backend(backend),
                None => StandardActivator::new(tag),
            };
            registry.register(Arc::new(activator));
        }
        registry
    }

    /// Register, replacing any activator for the same tag
    pub fn register(&mut self, activator: Arc<dyn ServiceActivator>) -> &mut Self {
        self.activators.insert(activator.tag(), activator);
        self
    }

    pub fn get(&self, tag: ServiceTag) -> Option<Arc<dyn ServiceActivator>> {
        self.activators.get(&tag).cloned()
    }

    /// Spawn one activation
    pub fn dispatch(&self, tag: ServiceTag, ctx: Arc<ActivationContext>) -> ActivationHandle {
        let activator = self.get(tag);
        let task = tokio::spawn(async move {
            let activator = activator.ok_or_else(|| WorkbenchError::ServiceActivationFailed {
                tag,
                cause: "no activator registered".into(),
            })?;
            activator.activate(&ctx).await?;
            tracing::info!(project_id = %ctx.project.id, service = %tag, "service activated");
            Ok::<(), WorkbenchError>(())
        });
        ActivationHandle { tag, task }
    }

    /// Spawn every activation before any is awaited
    pub fn dispatch_all(&self, tags: &[ServiceTag], ctx: Arc<ActivationContext>) -> Vec<ActivationHandle> {
        tags.iter()
            .map(|tag| self.dispatch(*tag, ctx.clone()))
            .collect()
    }

    /// Tear one service down, failures attributed to the tag
    pub async fn deactivate(&self, tag: ServiceTag, ctx: &ActivationContext) -> WorkbenchResult<()> {
        let activator = self.get(tag).ok_or_else(|| WorkbenchError::ServiceActivationFailed {
            tag,
            cause: "no activator registered".into(),
        })?;
        activator.deactivate(ctx).await.map_err(|e| attribute(tag, e))
    }
}

impl Default for ActivationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
