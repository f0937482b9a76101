//! Workbench Configuration
//!
//! One explicit value, loaded once and handed to every component at
//! construction time. Every field has a default so a partial TOML file is
//! enough.

use crate::error::{WorkbenchError, WorkbenchResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Project creation rules
    pub provisioning: ProvisioningConfig,
    /// Default quotas and pricing
    pub quotas: QuotaConfig,
    /// Certificate download settings
    pub certificates: CertificateConfig,
    /// Remote dataset sharing
    pub sharing: SharingConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl WorkbenchConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> WorkbenchResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkbenchError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> WorkbenchResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| WorkbenchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> WorkbenchResult<()> {
        if self.provisioning.max_projects_per_owner == 0 {
            return Err(WorkbenchError::Config(
                "provisioning.max_projects_per_owner must be positive".into(),
            ));
        }
        if self.provisioning.superuser.is_empty() {
            return Err(WorkbenchError::Config("provisioning.superuser must be set".into()));
        }
        if self.quotas.cpu_multiplier <= 0.0 || self.quotas.gpu_multiplier <= 0.0 {
            return Err(WorkbenchError::Config("price multipliers must be positive".into()));
        }
        if self.sharing.enabled && self.sharing.request_timeout_secs == 0 {
            return Err(WorkbenchError::Config(
                "sharing.request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Project creation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Max projects a single owner may hold
    pub max_projects_per_owner: u32,
    /// Names that can never be used for a project
    pub reserved_names: Vec<String>,
    /// System identities that may never download credentials
    pub reserved_identities: Vec<String>,
    /// Sender identity for in-app notifications
    pub site_identity: String,
    /// Privileged filesystem identity
    pub superuser: String,
    /// Directory holding one subtree per project
    pub projects_root: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_projects_per_owner: 10,
            reserved_names: vec![
                "admin".into(),
                "projects".into(),
                "user".into(),
                "system".into(),
            ],
            reserved_identities: vec!["agent@workbench.local".into()],
            site_identity: "admin@workbench.local".into(),
            superuser: "workbench".into(),
            projects_root: "/Projects".into(),
        }
    }
}

/// Default quotas and compute pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Storage limit for new projects
    pub storage_bytes: u64,
    /// Compute-time limit for new projects
    pub compute_secs: u64,
    /// Cost multiplier for CPU seconds
    pub cpu_multiplier: f64,
    /// Cost multiplier for GPU seconds
    pub gpu_multiplier: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            storage_bytes: 200 * 1024 * 1024 * 1024,
            compute_secs: 1_000_000,
            cpu_multiplier: 1.0,
            gpu_multiplier: 4.0,
        }
    }
}

/// Certificate download settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Local directory under which request-scoped bundles are materialized
    pub local_root: PathBuf,
    /// Keystore format label returned to clients
    pub keystore_format: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            local_root: std::env::temp_dir().join("workbench-certs"),
            keystore_format: "jks".into(),
        }
    }
}

/// Remote dataset sharing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    /// Whether this node takes part in remote sharing at all
    pub enabled: bool,
    /// Address other clusters use to reach this one
    pub local_cluster_address: Option<String>,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            local_cluster_address: None,
            request_timeout_secs: 30,
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Colored output
    pub ansi: bool,
    /// Include the module path of each event
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            ansi: true,
            with_target: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = WorkbenchConfig::from_toml_str(
            r#"
            [provisioning]
            max_projects_per_owner = 3

            [sharing]
            enabled = true
            local_cluster_address = "https://cluster-a:8443"
            "#,
        )
        .unwrap();

        assert_eq!(config.provisioning.max_projects_per_owner, 3);
        assert_eq!(config.provisioning.superuser, "workbench");
        assert_eq!(config.quotas, QuotaConfig::default());
        assert!(config.sharing.enabled);
        assert_eq!(config.sharing.request_timeout_secs, 30);
    }

    #[test]
    fn test_rejects_zero_project_limit() {
        let err = WorkbenchConfig::from_toml_str("[provisioning]\nmax_projects_per_owner = 0\n")
            .unwrap_err();
        assert!(matches!(err, WorkbenchError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workbench.toml");
        std::fs::write(&path, "[quotas]\ngpu_multiplier = 6.5\n").unwrap();

        let config = WorkbenchConfig::load(&path).unwrap();
        assert_eq!(config.quotas.gpu_multiplier, 6.5);

        let missing = WorkbenchConfig::load(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(WorkbenchError::Config(_))));
    }
}
