//! Distributed Filesystem Sessions
//!
//! Every request acquires its own sessions and releases them before it
//! returns. A [`FilesystemSession`] closes its handle exactly once: through
//! [`FilesystemSession::close`] or, if that never happens, when dropped.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use workbench_common::{Actor, WorkbenchError, WorkbenchResult};

/// Opaque handle to an open filesystem client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsHandle {
    id: u64,
    identity: String,
}

impl FsHandle {
    pub fn new(id: u64, identity: impl Into<String>) -> Self {
        Self {
            id,
            identity: identity.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl fmt::Display for FsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.identity, self.id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("handle {0} is not connected")]
    NotConnected(String),
    #[error("{identity} may not modify {path}")]
    PermissionDenied { identity: String, path: String },
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<FsError> for WorkbenchError {
    fn from(e: FsError) -> Self {
        WorkbenchError::Filesystem(e.to_string())
    }
}

/// Client side of the shared distributed filesystem
pub trait FsBackend: Send + Sync {
    /// Open a client acting as `identity`
    fn connect(&self, identity: &str) -> Result<FsHandle, FsError>;

    /// Release a client
    fn disconnect(&self, handle: &FsHandle) -> Result<(), FsError>;

    /// Create a directory and its missing ancestors
    fn mkdirs(&self, handle: &FsHandle, path: &str) -> Result<(), FsError>;

    /// Create or replace a file
    fn write(&self, handle: &FsHandle, path: &str, contents: &[u8]) -> Result<(), FsError>;

    /// Check if a path exists
    fn exists(&self, handle: &FsHandle, path: &str) -> Result<bool, FsError>;

    /// Remove a path and everything below it
    fn remove_recursive(&self, handle: &FsHandle, path: &str) -> Result<(), FsError>;
}

/// Non-owning view of an open session, cheap to clone into spawned tasks
///
/// Using it after the owning session closed fails with `NotConnected`.
#[derive(Clone)]
pub struct FsAccess {
    backend: Arc<dyn FsBackend>,
    handle: FsHandle,
}

impl FsAccess {
    pub fn identity(&self) -> &str {
        self.handle.identity()
    }

    pub fn mkdirs(&self, path: &str) -> WorkbenchResult<()> {
        Ok(self.backend.mkdirs(&self.handle, path)?)
    }

    pub fn write(&self, path: &str, contents: &[u8]) -> WorkbenchResult<()> {
        Ok(self.backend.write(&self.handle, path, contents)?)
    }

    pub fn exists(&self, path: &str) -> WorkbenchResult<bool> {
        Ok(self.backend.exists(&self.handle, path)?)
    }

    pub fn remove_recursive(&self, path: &str) -> WorkbenchResult<()> {
        Ok(self.backend.remove_recursive(&self.handle, path)?)
    }
}

impl fmt::Debug for FsAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsAccess").field("handle", &self.handle).finish()
    }
}

/// Scoped filesystem session: (identity, handle), open until closed or dropped
pub struct FilesystemSession {
    access: FsAccess,
    open: bool,
}

impl FilesystemSession {
    pub fn identity(&self) -> &str {
        self.access.identity()
    }

    /// Operations on the open session
    pub fn access(&self) -> &FsAccess {
        &self.access
    }

    /// Clone a view for work that runs while this session stays open
    pub fn share(&self) -> FsAccess {
        self.access.clone()
    }

    /// Close explicitly and report the outcome
    pub fn close(mut self) -> WorkbenchResult<()> {
        self.open = false;
        self.access
            .backend
            .disconnect(&self.access.handle)
            .map_err(Into::into)
    }
}

impl Drop for FilesystemSession {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.access.backend.disconnect(&self.access.handle) {
            tracing::warn!(handle = %self.access.handle, error = %e, "failed to release filesystem session");
        }
    }
}

impl fmt::Debug for FilesystemSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesystemSession")
            .field("handle", &self.access.handle)
            .field("open", &self.open)
            .finish()
    }
}

/// Admin + project-identity sessions acquired for one provisioning call
#[derive(Debug)]
pub struct SessionPair {
    pub admin: FilesystemSession,
    pub user: FilesystemSession,
}

impl SessionPair {
    /// Close both; failures are logged, never raised
    pub fn release(self) {
        let Self { admin, user } = self;
        for session in [user, admin] {
            let handle = session.access.handle.clone();
            if let Err(e) = session.close() {
                tracing::warn!(handle = %handle, error = %e, "failed to release filesystem session");
            }
        }
    }
}

/// Acquires filesystem sessions. Nothing is cached between requests.
#[derive(Clone)]
pub struct FilesystemSessionManager {
    backend: Arc<dyn FsBackend>,
    superuser: String,
    projects_root: String,
}

impl FilesystemSessionManager {
    pub fn new(
        backend: Arc<dyn FsBackend>,
        superuser: impl Into<String>,
        projects_root: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            superuser: superuser.into(),
            projects_root: projects_root.into(),
        }
    }

    /// Open a privileged session
    pub fn open_admin(&self) -> WorkbenchResult<FilesystemSession> {
        self.open_as(&self.superuser)
    }

    /// Open a session acting as `identity`
    pub fn open_as(&self, identity: &str) -> WorkbenchResult<FilesystemSession> {
        let handle = self.backend.connect(identity)?;
        tracing::debug!(handle = %handle, "filesystem session opened");
        Ok(FilesystemSession {
            access: FsAccess {
                backend: self.backend.clone(),
                handle,
            },
            open: true,
        })
    }

    /// Admin session plus the actor's identity inside `project_name`
    ///
    /// If the second open fails the first session is released by its guard.
    pub fn open_for_project(&self, project_name: &str, actor: &Actor) -> WorkbenchResult<SessionPair> {
        let admin = self.open_admin()?;
        let user = self.open_as(&actor.project_identity(project_name))?;
        Ok(SessionPair { admin, user })
    }

    /// Root directory of a project
    pub fn project_root(&self, project_name: &str) -> String {
        format!("{}/{}", self.projects_root, project_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// In-memory filesystem (for testing and development)
///
/// The superuser may write anywhere. Any other identity of the form
/// `<project>__<user>` may only write under its project's root.
pub struct InMemoryFs {
    superuser: String,
    projects_root: String,
    nodes: RwLock<BTreeMap<String, Node>>,
    handles: DashMap<u64, String>,
    next_handle: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
    fail_removals: AtomicBool,
}

impl InMemoryFs {
    pub fn new(superuser: impl Into<String>, projects_root: impl Into<String>) -> Self {
        Self {
            superuser: superuser.into(),
            projects_root: projects_root.into(),
            nodes: RwLock::new(BTreeMap::new()),
            handles: DashMap::new(),
            next_handle: AtomicU64::new(1),
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            fail_removals: AtomicBool::new(false),
        }
    }

    /// Sessions opened so far
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions closed so far
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions currently open
    pub fn live(&self) -> usize {
        self.handles.len()
    }

    /// Make every `remove_recursive` fail
    pub fn set_fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    /// Contents of a file, bypassing permissions
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.read().get(path) {
            Some(Node::File(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Whether any node exists at path, bypassing permissions
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.read().contains_key(path)
    }

    fn check_connected(&self, handle: &FsHandle) -> Result<(), FsError> {
        match self.handles.get(&handle.id) {
            Some(identity) if *identity == handle.identity => Ok(()),
            _ => Err(FsError::NotConnected(handle.to_string())),
        }
    }

    fn check_writable(&self, handle: &FsHandle, path: &str) -> Result<(), FsError> {
        self.check_connected(handle)?;
        if handle.identity == self.superuser {
            return Ok(());
        }
        let allowed = handle
            .identity
            .split_once("__")
            .map(|(project, _)| {
                let root = format!("{}/{}", self.projects_root, project);
                path == root || path.starts_with(&format!("{}/", root))
            })
            .unwrap_or(false);
        if allowed {
            Ok(())
        } else {
            Err(FsError::PermissionDenied {
                identity: handle.identity.clone(),
                path: path.to_string(),
            })
        }
    }

    fn insert_dirs(nodes: &mut BTreeMap<String, Node>, path: &str) {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }
}

impl FsBackend for InMemoryFs {
    fn connect(&self, identity: &str) -> Result<FsHandle, FsError> {
        if identity.is_empty() {
            return Err(FsError::Backend("empty identity".into()));
        }
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(id, identity.to_string());
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FsHandle::new(id, identity))
    }

    fn disconnect(&self, handle: &FsHandle) -> Result<(), FsError> {
        self.handles
            .remove(&handle.id)
            .ok_or_else(|| FsError::NotConnected(handle.to_string()))?;
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn mkdirs(&self, handle: &FsHandle, path: &str) -> Result<(), FsError> {
        self.check_writable(handle, path)?;
        Self::insert_dirs(&mut self.nodes.write(), path);
        Ok(())
    }

    fn write(&self, handle: &FsHandle, path: &str, contents: &[u8]) -> Result<(), FsError> {
        self.check_writable(handle, path)?;
        let mut nodes = self.nodes.write();
        if let Some((parent, _)) = path.rsplit_once('/') {
            Self::insert_dirs(&mut nodes, parent);
        }
        nodes.insert(path.to_string(), Node::File(contents.to_vec()));
        Ok(())
    }

    fn exists(&self, handle: &FsHandle, path: &str) -> Result<bool, FsError> {
        self.check_connected(handle)?;
        Ok(self.nodes.read().contains_key(path))
    }

    fn remove_recursive(&self, handle: &FsHandle, path: &str) -> Result<(), FsError> {
        self.check_writable(handle, path)?;
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(FsError::Backend(format!("remove {} rejected", path)));
        }
        let prefix = format!("{}/", path);
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        nodes.retain(|key, _| key != path && !key.starts_with(&prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (Arc<InMemoryFs>, FilesystemSessionManager) {
        let fs = Arc::new(InMemoryFs::new("workbench", "/Projects"));
        let mgr = FilesystemSessionManager::new(fs.clone(), "workbench", "/Projects");
        (fs, mgr)
    }

    #[test]
    fn test_session_closed_once_on_drop() {
        let (fs, mgr) = manager();
        {
            let session = mgr.open_admin().unwrap();
            session.access().mkdirs("/Projects/alpha").unwrap();
            assert_eq!(fs.live(), 1);
        }
        assert_eq!(fs.opened(), 1);
        assert_eq!(fs.closed(), 1);
        assert_eq!(fs.live(), 0);
    }

    #[test]
    fn test_explicit_close_does_not_double_release() {
        let (fs, mgr) = manager();
        let session = mgr.open_as("alpha__ada").unwrap();
        session.close().unwrap();
        assert_eq!(fs.closed(), 1);
    }

    #[test]
    fn test_shared_access_fails_after_close() {
        let (_fs, mgr) = manager();
        let session = mgr.open_admin().unwrap();
        let view = session.share();
        drop(session);
        assert!(matches!(
            view.mkdirs("/Projects/late"),
            Err(WorkbenchError::Filesystem(_))
        ));
    }

    #[test]
    fn test_project_identity_confined_to_project_root() {
        let (fs, mgr) = manager();
        let pair = mgr
            .open_for_project("alpha", &Actor::new("ada@example.com", "ada"))
            .unwrap();

        pair.user.access().write("/Projects/alpha/README.md", b"hi").unwrap();
        assert!(pair.user.access().write("/Projects/beta/README.md", b"hi").is_err());
        pair.admin.access().mkdirs("/Projects/beta").unwrap();

        assert_eq!(fs.read("/Projects/alpha/README.md").unwrap(), b"hi".to_vec());
        assert!(fs.contains("/Projects/alpha"));

        pair.release();
        assert_eq!(fs.opened(), 2);
        assert_eq!(fs.closed(), 2);
    }

    #[test]
    fn test_remove_recursive() {
        let (fs, mgr) = manager();
        let admin = mgr.open_admin().unwrap();
        admin.access().write("/Projects/alpha/Logs/a.log", b"x").unwrap();
        admin.access().mkdirs("/Projects/alphabet").unwrap();

        admin.access().remove_recursive("/Projects/alpha").unwrap();
        assert!(!fs.contains("/Projects/alpha"));
        assert!(!fs.contains("/Projects/alpha/Logs/a.log"));
        assert!(fs.contains("/Projects/alphabet"));
    }
}
