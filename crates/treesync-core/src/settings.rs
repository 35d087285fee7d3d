//! Worker/project-level settings, including the optional private addendum.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::Recipe;
use crate::error::{Result, SyncError};

/// Placeholder that an endpoint template must contain.
pub const REPOSITORY_NAME_PLACEHOLDER: &str = "${repository_name}";

/// Worker-level settings, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// FTP URL of the artifact store used for archive transfers.
    pub artifacts_ftp_url: String,

    /// Store-side directory used for "latest" pointer updates.
    pub artifacts_dir: PathBuf,

    /// Parallelism hint passed to the manifest-sync tool.
    #[serde(default = "default_sync_jobs")]
    pub sync_jobs: u32,

    /// Manifest group tag of the repositories backed by LFS objects.
    #[serde(default = "default_lfs_group")]
    pub lfs_repo_group: String,

    /// Directory where CA certificates are installed on the worker.
    ///
    /// Must be an absolute path: the LFS client does not expand `~` in the
    /// transport configuration it reads back.
    #[serde(default = "default_cacert_dir")]
    pub cacert_dir: PathBuf,

    /// SDK recipes a product build consumes and produces.
    #[serde(default)]
    pub sdk_recipes: Vec<Recipe>,

    /// Cache recipes a product build consumes and produces.
    #[serde(default)]
    pub cache_recipes: Vec<Recipe>,

    /// Optional private addendum; each field independently gates a branch.
    #[serde(default)]
    pub private: Option<PrivateSettings>,
}

fn default_sync_jobs() -> u32 {
    4
}

fn default_lfs_group() -> String {
    "lfs".to_string()
}

fn default_cacert_dir() -> PathBuf {
    PathBuf::from("/var/lib/treesync/git-cacerts")
}

impl WorkerSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| SyncError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let settings: WorkerSettings =
            toml::from_str(&raw).map_err(|e| SyncError::Settings {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        settings.validate(path)?;
        Ok(settings)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.artifacts_ftp_url.is_empty() {
            return Err(SyncError::Settings {
                path: path.to_path_buf(),
                reason: "artifacts_ftp_url must not be empty".to_string(),
            });
        }
        if let Some(private) = &self.private {
            if let Some(template) = &private.lfs_endpoint_template {
                template.validate()?;
            }
        }
        Ok(())
    }

    /// Custom CA certificates for HTTPS remotes, if configured.
    pub fn https_cacerts(&self) -> Option<&BTreeMap<String, PathBuf>> {
        self.private
            .as_ref()
            .map(|p| &p.https_cacerts)
            .filter(|m| !m.is_empty())
    }

    /// The alternative LFS endpoint template, if configured.
    pub fn lfs_endpoint_template(&self) -> Option<&EndpointTemplate> {
        self.private
            .as_ref()
            .and_then(|p| p.lfs_endpoint_template.as_ref())
    }
}

/// Private settings addendum.
///
/// Absence of either field skips the corresponding behavior branch; it must
/// never cause a failure by itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateSettings {
    /// Remote URL pattern to CA certificate file path.
    #[serde(default)]
    pub https_cacerts: BTreeMap<String, PathBuf>,

    /// Alternative LFS transport endpoint, parameterized by repository name.
    #[serde(default)]
    pub lfs_endpoint_template: Option<EndpointTemplate>,
}

/// URL template carrying a `${repository_name}` placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EndpointTemplate(String);

impl EndpointTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = EndpointTemplate(template.into());
        template.validate()?;
        Ok(template)
    }

    fn validate(&self) -> Result<()> {
        if !self.0.contains(REPOSITORY_NAME_PLACEHOLDER) {
            return Err(SyncError::InvalidEndpointTemplate {
                template: self.0.clone(),
                reason: format!("missing {REPOSITORY_NAME_PLACEHOLDER} placeholder"),
            });
        }
        Ok(())
    }

    /// Substitute the repository-name placeholder.
    ///
    /// The replacement may itself be a shell-side placeholder (e.g.
    /// `${REPO_PROJECT}`) expanded later by the per-repository iteration tool.
    pub fn substitute(&self, repository_name: &str) -> String {
        self.0.replace(REPOSITORY_NAME_PLACEHOLDER, repository_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
            artifacts_ftp_url = "ftp://artifacts.internal"
            artifacts_dir = "/srv/artifacts"
            sdk_recipes = [
                { product = "os", name = "sdk" },
                { product = "os", name = "sdk_debian" },
            ]
            cache_recipes = [
                { product = "os", name = "core" },
                { product = "os", name = "efiboot" },
            ]

            [private]
            lfs_endpoint_template = "https://lfs.internal/${repository_name}"

            [private.https_cacerts]
            "https://git.internal" = "/etc/ssl/private-ca.pem"
        "#
    }

    #[test]
    fn test_load_full_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_toml().as_bytes()).unwrap();

        let settings = WorkerSettings::load(file.path()).unwrap();
        assert_eq!(settings.sync_jobs, 4);
        assert_eq!(settings.lfs_repo_group, "lfs");
        assert_eq!(settings.sdk_recipes.len(), 2);
        assert!(settings.https_cacerts().is_some());
        assert!(settings.lfs_endpoint_template().is_some());
    }

    #[test]
    fn test_absent_private_settings_skip_branches() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
                artifacts_ftp_url = "ftp://artifacts.internal"
                artifacts_dir = "/srv/artifacts"
            "#,
        )
        .unwrap();

        let settings = WorkerSettings::load(file.path()).unwrap();
        assert!(settings.private.is_none());
        assert!(settings.https_cacerts().is_none());
        assert!(settings.lfs_endpoint_template().is_none());
    }

    #[test]
    fn test_empty_cacert_map_counts_as_absent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
                artifacts_ftp_url = "ftp://artifacts.internal"
                artifacts_dir = "/srv/artifacts"

                [private]
            "#,
        )
        .unwrap();

        let settings = WorkerSettings::load(file.path()).unwrap();
        assert!(settings.https_cacerts().is_none());
    }

    #[test]
    fn test_template_without_placeholder_rejected_at_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
                artifacts_ftp_url = "ftp://artifacts.internal"
                artifacts_dir = "/srv/artifacts"

                [private]
                lfs_endpoint_template = "https://lfs.internal/fixed"
            "#,
        )
        .unwrap();

        let err = WorkerSettings::load(file.path()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidEndpointTemplate { .. }));
    }

    #[test]
    fn test_template_substitution() {
        let template =
            EndpointTemplate::new("https://lfs.internal/${repository_name}/objects").unwrap();
        assert_eq!(
            template.substitute("${REPO_PROJECT}"),
            "https://lfs.internal/${REPO_PROJECT}/objects"
        );
        assert_eq!(
            template.substitute("core-os"),
            "https://lfs.internal/core-os/objects"
        );
    }
}
