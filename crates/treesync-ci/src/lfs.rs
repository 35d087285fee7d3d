//! LFS transport filter controller.
//!
//! Wraps every read/write of the worker-wide filter state behind one
//! controller so the synchronizer never inspects raw tool state. The
//! effective state is carried as an explicit value with a defined lifecycle
//! per build: each mode branch establishes its required state
//! unconditionally at entry, and every pass leaves the filters installed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use treesync_core::{Result, SyncError, WorkerSettings};

use crate::command::{CommandExecutor, CommandSpec};

/// Placeholder the per-repository iteration tool expands to the project name.
pub const REPO_PROJECT_PLACEHOLDER: &str = "${REPO_PROJECT}";

/// Effective state of the LFS transport filters on this worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LfsFilterState {
    /// Unknown at pass entry; treated as dirty.
    Unknown,

    /// Filters installed at the worker (user) level.
    GloballyInstalled,

    /// Filters uninstalled at the worker level; repositories synchronized in
    /// this state will not auto-fetch LFS objects.
    GloballyUninstalled,

    /// Filters reinstalled inside every checked-out repository after a
    /// global uninstall.
    InstalledInAllRepositories,
}

/// Controller for the external LFS client and its filter state.
pub struct LfsFilterController {
    executor: Arc<dyn CommandExecutor>,
    repo_group: String,
    state: LfsFilterState,
}

impl LfsFilterController {
    pub fn new(executor: Arc<dyn CommandExecutor>, settings: &WorkerSettings) -> Self {
        Self {
            executor,
            repo_group: settings.lfs_repo_group.clone(),
            state: LfsFilterState::Unknown,
        }
    }

    /// Current filter state as tracked across this pass.
    pub fn state(&self) -> LfsFilterState {
        self.state
    }

    /// Install the filters globally. Idempotent: safe against an
    /// already-installed state.
    pub async fn install_globally(&mut self) -> Result<()> {
        let spec = CommandSpec::new("git").args(["lfs", "install", "--skip-repo", "--force"]);
        self.executor
            .run(&spec)
            .await?
            .into_step_result("install git-lfs filters")?;
        self.state = LfsFilterState::GloballyInstalled;
        info!(state = ?self.state, "LFS filters installed globally");
        Ok(())
    }

    /// Uninstall the filters globally so no repository auto-fetches objects.
    ///
    /// The user-level uninstall must succeed; the system-level uninstall is
    /// best-effort since sandboxed workers often lack the permission.
    pub async fn uninstall_globally(&mut self) -> Result<()> {
        let user = CommandSpec::new("git").args(["lfs", "uninstall"]);
        self.executor
            .run(&user)
            .await?
            .into_step_result("uninstall git-lfs filters")?;

        let system = CommandSpec::new("sudo").args(["git", "lfs", "uninstall", "--system"]);
        match self.executor.run(&system).await {
            Ok(outcome) if outcome.success() => {}
            Ok(outcome) => {
                warn!(
                    exit_code = outcome.exit_code,
                    "system-level LFS uninstall failed; continuing"
                );
            }
            Err(e) => {
                warn!(error = %e, "system-level LFS uninstall could not run; continuing");
            }
        }

        self.state = LfsFilterState::GloballyUninstalled;
        info!(state = ?self.state, "LFS filters uninstalled globally");
        Ok(())
    }

    /// Reinstall the filters inside every checked-out repository.
    ///
    /// Required after a global uninstall, before any endpoint override or
    /// object pull.
    pub async fn install_in_all_repositories(&mut self) -> Result<()> {
        let spec = CommandSpec::new("repo").args(["forall", "-c", "git", "lfs", "install"]);
        self.executor
            .run(&spec)
            .await?
            .into_step_result("install git-lfs filters in all projects")?;
        self.state = LfsFilterState::InstalledInAllRepositories;
        info!(state = ?self.state, "LFS filters installed in all repositories");
        Ok(())
    }

    /// Point the LFS transport of the designated repository group at the
    /// alternative endpoint.
    ///
    /// Fails fast when the worker settings carry no template; the override
    /// has no effect in repositories whose filters were not reinstalled, so
    /// a state other than [`LfsFilterState::InstalledInAllRepositories`] is
    /// reported loudly.
    pub async fn override_endpoint(&mut self, settings: &WorkerSettings) -> Result<()> {
        let template = settings.lfs_endpoint_template().ok_or_else(|| {
            SyncError::ConfigurationMissing(
                "cannot override the LFS endpoint: no alternative endpoint template configured"
                    .to_string(),
            )
        })?;

        if self.state != LfsFilterState::InstalledInAllRepositories {
            warn!(
                state = ?self.state,
                "overriding LFS endpoint without per-repository filters installed this pass"
            );
        }

        let url = template.substitute(REPO_PROJECT_PLACEHOLDER);
        let config = format!("git config lfs.url \"{url}\"");
        let spec = CommandSpec::new("repo").args([
            "forall",
            "-g",
            self.repo_group.as_str(),
            "-c",
            config.as_str(),
        ]);
        self.executor
            .run(&spec)
            .await?
            .into_step_result("setup git-lfs endpoint")?;
        info!(group = %self.repo_group, "LFS endpoint overridden");
        Ok(())
    }

    /// Fetch and check out LFS objects for the designated repository group.
    pub async fn pull_objects(&mut self) -> Result<()> {
        let spec = CommandSpec::new("repo").args([
            "forall",
            "-g",
            self.repo_group.as_str(),
            "-c",
            "git",
            "lfs",
            "pull",
        ]);
        self.executor
            .run(&spec)
            .await?
            .into_step_result("pull git-lfs objects")?;
        info!(group = %self.repo_group, "LFS objects pulled");
        Ok(())
    }
}
