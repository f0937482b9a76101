//! Certificate Lifecycle
//!
//! A download materializes the actor's project certificates into a
//! request-scoped directory, encodes them for transport and erases the local
//! copy before returning. [`MaterializedBundle`] owns that directory and
//! erases it on drop if nobody did it explicitly.

use crate::store::ProjectStore;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use workbench_common::{
    Actor, CertificateConfig, ProjectId, WorkbenchError, WorkbenchResult,
};
use zeroize::Zeroizing;

const KEYSTORE_SUFFIX: &str = "__kstore";
const TRUSTSTORE_SUFFIX: &str = "__tstore";
const PASSWORD_SUFFIX: &str = "__cert.key";

/// Keystore, truststore and the password protecting them
pub struct CertificateMaterial {
    pub keystore: Zeroizing<Vec<u8>>,
    pub truststore: Zeroizing<Vec<u8>>,
    pub password: Zeroizing<String>,
}

impl CertificateMaterial {
    pub fn new(keystore: Vec<u8>, truststore: Vec<u8>, password: String) -> Self {
        Self {
            keystore: Zeroizing::new(keystore),
            truststore: Zeroizing::new(truststore),
            password: Zeroizing::new(password),
        }
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("keystore", &format_args!("<{} bytes>", self.keystore.len()))
            .field("truststore", &format_args!("<{} bytes>", self.truststore.len()))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What the caller receives
pub struct CredentialBundle {
    pub keystore_base64: String,
    pub truststore_base64: String,
    pub password: Zeroizing<String>,
    /// Keystore format, e.g. "jks"
    pub format: String,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("format", &self.format)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Issues certificates for a (user, project) pair
#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn fetch(&self, username: &str, project_name: &str) -> WorkbenchResult<CertificateMaterial>;
}

/// Password check for the downloading user
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify_password(&self, identity: &str, password: &str) -> WorkbenchResult<bool>;
}

/// Out-of-band delivery to a user (mail, in-app message)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, sender: &str, recipient: &str, subject: &str, body: &str) -> WorkbenchResult<()>;
}

/// Certificates written to a private local directory
///
/// Erasure overwrites every file with zeros before removing the directory.
pub struct MaterializedBundle {
    dir: Option<TempDir>,
    prefix: String,
}

impl MaterializedBundle {
    /// Write `material` into a fresh directory below `root`
    pub fn create(root: &Path, prefix: &str, format: &str, material: &CertificateMaterial) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", prefix))
            .tempdir_in(root)?;
        let bundle = Self {
            dir: Some(dir),
            prefix: format!("{}.{}", prefix, format),
        };
        // From here on a failed write still erases through Drop.
        fs::write(bundle.keystore_path()?, material.keystore.as_slice())?;
        fs::write(bundle.truststore_path()?, material.truststore.as_slice())?;
        fs::write(bundle.password_path()?, material.password.as_bytes())?;
        Ok(bundle)
    }

    /// Directory holding the material, while not erased
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    fn file(&self, suffix: &str) -> io::Result<PathBuf> {
        let dir = self
            .path()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "bundle already erased"))?;
        Ok(dir.join(format!("{}{}", self.prefix, suffix)))
    }

    fn keystore_path(&self) -> io::Result<PathBuf> {
        self.file(KEYSTORE_SUFFIX)
    }

    fn truststore_path(&self) -> io::Result<PathBuf> {
        self.file(TRUSTSTORE_SUFFIX)
    }

    fn password_path(&self) -> io::Result<PathBuf> {
        self.file(PASSWORD_SUFFIX)
    }

    pub fn read_keystore(&self) -> io::Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(fs::read(self.keystore_path()?)?))
    }

    pub fn read_truststore(&self) -> io::Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(fs::read(self.truststore_path()?)?))
    }

    pub fn read_password(&self) -> io::Result<Zeroizing<String>> {
        Ok(Zeroizing::new(fs::read_to_string(self.password_path()?)?))
    }

    /// Overwrite and remove everything; idempotent
    pub fn erase(mut self) -> io::Result<()> {
        self.erase_in_place()
    }

    fn erase_in_place(&mut self) -> io::Result<()> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => return Ok(()),
        };
        let overwritten = overwrite_files(dir.path());
        // Removal happens even if an overwrite failed.
        let removed = dir.close();
        overwritten.and(removed)
    }
}

fn overwrite_files(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let len = fs::metadata(&path)?.len() as usize;
        let mut file = OpenOptions::new().write(true).open(&path)?;
        file.write_all(&vec![0u8; len])?;
        file.sync_all()?;
    }
    Ok(())
}

impl Drop for MaterializedBundle {
    fn drop(&mut self) {
        if let Err(e) = self.erase_in_place() {
            tracing::warn!(error = %e, "failed to erase local certificate material");
        }
    }
}

/// Serves certificate downloads
pub struct CertificateLifecycleManager {
    config: CertificateConfig,
    reserved_identities: Vec<String>,
    site_identity: String,
    projects: Arc<dyn ProjectStore>,
    source: Arc<dyn CertificateSource>,
    authenticator: Arc<dyn Authenticator>,
    notifier: Arc<dyn Notifier>,
}

impl CertificateLifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CertificateConfig,
        reserved_identities: Vec<String>,
        site_identity: impl Into<String>,
        projects: Arc<dyn ProjectStore>,
        source: Arc<dyn CertificateSource>,
        authenticator: Arc<dyn Authenticator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            reserved_identities,
            site_identity: site_identity.into(),
            projects,
            source,
            authenticator,
            notifier,
        }
    }

    /// Hand the actor their project certificates
    ///
    /// Local material is erased before this returns, on success and failure.
    pub async fn download_credentials(
        &self,
        project_id: ProjectId,
        actor: &Actor,
        password: &str,
    ) -> WorkbenchResult<CredentialBundle> {
        if self.reserved_identities.iter().any(|r| r == &actor.email) {
            tracing::warn!(project_id = %project_id, "certificate download by reserved identity rejected");
            return Err(WorkbenchError::AccessDenied(format!(
                "{} may not download certificates",
                actor.email
            )));
        }
        if !self.authenticator.verify_password(&actor.email, password).await? {
            tracing::warn!(project_id = %project_id, actor = %actor, "certificate download with bad credentials");
            return Err(WorkbenchError::AccessDenied("invalid credentials".into()));
        }
        let project = self
            .projects
            .find(project_id)
            .await?
            .ok_or(WorkbenchError::ProjectNotFound(project_id))?;

        let download_error = |cause: String| WorkbenchError::DownloadError {
            project: project_id,
            cause,
        };

        let material = self
            .source
            .fetch(&actor.username, &project.name)
            .await
            .map_err(|e| download_error(e.to_string()))?;

        // File I/O and the zero overwrite stay off the async workers.
        let root = self.config.local_root.clone();
        let prefix = actor.project_identity(&project.name);
        let keystore_format = self.config.keystore_format.clone();
        let (keystore_base64, truststore_base64, cert_password) =
            tokio::task::spawn_blocking(move || materialize_and_encode(&root, &prefix, &keystore_format, material))
                .await
                .map_err(|e| download_error(format!("certificate task failed: {}", e)))?
                .map_err(|e| download_error(e.to_string()))?;

        let body = format!(
            "Your password for the certificates of project {} is: {}",
            project.name,
            cert_password.as_str()
        );
        let body = Zeroizing::new(body);
        if let Err(e) = self
            .notifier
            .notify(&self.site_identity, &actor.email, "Certificate password", &body)
            .await
        {
            tracing::warn!(project_id = %project_id, error = %e, "could not deliver certificate password");
        }

        tracing::info!(project_id = %project_id, actor = %actor, "certificates downloaded");
        Ok(CredentialBundle {
            keystore_base64,
            truststore_base64,
            password: cert_password,
            format: self.config.keystore_format.clone(),
        })
    }
}

type Encoded = (String, String, Zeroizing<String>);

/// Write, read back and erase; runs on the blocking pool
fn materialize_and_encode(root: &Path, prefix: &str, format: &str, material: CertificateMaterial) -> io::Result<Encoded> {
    let bundle = MaterializedBundle::create(root, prefix, format, &material)?;
    drop(material);
    let encoded = encode(&bundle);
    if let Err(e) = bundle.erase() {
        tracing::warn!(error = %e, "failed to erase local certificate material");
    }
    encoded
}

fn encode(bundle: &MaterializedBundle) -> io::Result<Encoded> {
    let keystore = bundle.read_keystore()?;
    let truststore = bundle.read_truststore()?;
    let password = bundle.read_password()?;
    Ok((STANDARD.encode(&*keystore), STANDARD.encode(&*truststore), password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewProject, ProjectDefinition};
    use crate::store::InMemoryProjectStore;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        fetched: AtomicUsize,
        offline: bool,
    }

    #[async_trait]
    impl CertificateSource for FixedSource {
        async fn fetch(&self, _username: &str, _project_name: &str) -> WorkbenchResult<CertificateMaterial> {
            self.fetched.fetch_add(1, Ordering::SeqCst);
            if self.offline {
                return Err(WorkbenchError::Storage("certificate authority unreachable".into()));
            }
            Ok(CertificateMaterial::new(b"keystore".to_vec(), b"truststore".to_vec(), "s3cret".into()))
        }
    }

    struct Password(&'static str);

    #[async_trait]
    impl Authenticator for Password {
        async fn verify_password(&self, _identity: &str, password: &str) -> WorkbenchResult<bool> {
            Ok(password == self.0)
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn notify(&self, sender: &str, recipient: &str, _subject: &str, _body: &str) -> WorkbenchResult<()> {
            if self.fail {
                return Err(WorkbenchError::Storage("smtp down".into()));
            }
            self.sent.lock().push((sender.to_string(), recipient.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        manager: CertificateLifecycleManager,
        root: tempfile::TempDir,
        source: Arc<FixedSource>,
        outbox: Arc<Outbox>,
        project: ProjectId,
    }

    async fn fixture(fail_notify: bool) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let local_root = root.path().join("certs");
        fixture_with(root, local_root, false, fail_notify).await
    }

    async fn fixture_with(
        root: tempfile::TempDir,
        local_root: PathBuf,
        source_offline: bool,
        fail_notify: bool,
    ) -> Fixture {
        let projects = Arc::new(InMemoryProjectStore::new());
        let project = projects
            .create(NewProject::from_definition(&ProjectDefinition::new("alpha", ""), "ada@example.com"))
            .await
            .unwrap();
        let source = Arc::new(FixedSource {
            fetched: AtomicUsize::new(0),
            offline: source_offline,
        });
        let outbox = Arc::new(Outbox {
            fail: fail_notify,
            ..Default::default()
        });
        let config = CertificateConfig {
            local_root,
            keystore_format: "jks".into(),
        };
        let manager = CertificateLifecycleManager::new(
            config,
            vec!["agent@workbench.local".into()],
            "admin@workbench.local",
            projects,
            source.clone(),
            Arc::new(Password("hunter2")),
            outbox.clone(),
        );
        Fixture {
            manager,
            root,
            source,
            outbox,
            project: project.id,
        }
    }

    fn local_entries(root: &Path) -> usize {
        match fs::read_dir(root.join("certs")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn test_download_encodes_and_erases() {
        let f = fixture(false).await;
        let actor = Actor::new("ada@example.com", "ada");

        let bundle = f.manager.download_credentials(f.project, &actor, "hunter2").await.unwrap();

        assert_eq!(bundle.keystore_base64, STANDARD.encode(b"keystore"));
        assert_eq!(bundle.truststore_base64, STANDARD.encode(b"truststore"));
        assert_eq!(bundle.password.as_str(), "s3cret");
        assert_eq!(bundle.format, "jks");
        assert_eq!(local_entries(f.root.path()), 0);
        assert_eq!(
            f.outbox.sent.lock().clone(),
            vec![("admin@workbench.local".to_string(), "ada@example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_notification_failure_still_succeeds() {
        let f = fixture(true).await;
        let actor = Actor::new("ada@example.com", "ada");

        assert!(f.manager.download_credentials(f.project, &actor, "hunter2").await.is_ok());
        assert_eq!(local_entries(f.root.path()), 0);
    }

    #[tokio::test]
    async fn test_wrong_password_materializes_nothing() {
        let f = fixture(false).await;
        let actor = Actor::new("ada@example.com", "ada");

        let err = f.manager.download_credentials(f.project, &actor, "nope").await.unwrap_err();

        assert!(matches!(err, WorkbenchError::AccessDenied(_)));
        assert_eq!(f.source.fetched.load(Ordering::SeqCst), 0);
        assert!(!f.root.path().join("certs").exists());
    }

    #[tokio::test]
    async fn test_reserved_identity_rejected() {
        let f = fixture(false).await;
        let agent = Actor::new("agent@workbench.local", "agent");

        let err = f.manager.download_credentials(f.project, &agent, "hunter2").await.unwrap_err();
        assert!(matches!(err, WorkbenchError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let f = fixture(false).await;
        let actor = Actor::new("ada@example.com", "ada");
        let missing = ProjectId::new(42);

        let err = f.manager.download_credentials(missing, &actor, "hunter2").await.unwrap_err();
        assert_eq!(err, WorkbenchError::ProjectNotFound(missing));
    }

    #[tokio::test]
    async fn test_source_failure_is_download_error() {
        let root = tempfile::tempdir().unwrap();
        let local_root = root.path().join("certs");
        let f = fixture_with(root, local_root, true, false).await;
        let actor = Actor::new("ada@example.com", "ada");

        let err = f.manager.download_credentials(f.project, &actor, "hunter2").await.unwrap_err();

        assert!(matches!(err, WorkbenchError::DownloadError { project, .. } if project == f.project));
        assert_eq!(f.source.fetched.load(Ordering::SeqCst), 1);
        assert_eq!(local_entries(f.root.path()), 0);
        assert!(f.outbox.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_local_root_is_download_error() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let f = fixture_with(root, blocker.join("certs"), false, false).await;
        let actor = Actor::new("ada@example.com", "ada");

        let err = f.manager.download_credentials(f.project, &actor, "hunter2").await.unwrap_err();

        assert!(matches!(err, WorkbenchError::DownloadError { project, .. } if project == f.project));
        assert!(blocker.is_file());
        assert_eq!(local_entries(f.root.path()), 0);
        assert!(f.outbox.sent.lock().is_empty());
    }

    #[test]
    fn test_materialize_and_encode_leaves_nothing() {
        let root = tempfile::tempdir().unwrap();
        let material = CertificateMaterial::new(vec![7; 8], vec![9; 8], "pw".into());

        let (keystore, truststore, password) =
            materialize_and_encode(root.path(), "alpha__ada", "jks", material).unwrap();

        assert_eq!(keystore, STANDARD.encode([7u8; 8]));
        assert_eq!(truststore, STANDARD.encode([9u8; 8]));
        assert_eq!(password.as_str(), "pw");
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_bundle_erased_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let material = CertificateMaterial::new(vec![1; 16], vec![2; 16], "pw".into());
        let path = {
            let bundle = MaterializedBundle::create(root.path(), "alpha__ada", "jks", &material).unwrap();
            let path = bundle.path().unwrap().to_path_buf();
            assert_eq!(fs::read_dir(&path).unwrap().count(), 3);
            assert_eq!(bundle.read_password().unwrap().as_str(), "pw");
            path
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let material = CertificateMaterial::new(vec![1; 4], vec![2; 4], "topsecret".into());
        assert!(!format!("{:?}", material).contains("topsecret"));
    }
}
