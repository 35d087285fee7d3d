//! Step engine: evaluates conditions and dispatches actions.
//!
//! Strictly sequential; each action is a blocking external-command
//! invocation (or a local filesystem operation). A halting failure stops
//! the pass, a warning failure is logged and tolerated, a flunking failure
//! lets the remaining steps run but marks the pass failed.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use treesync_core::{
    artifact_path, sanitize_path_component, ArtifactCategory, Result, Shard, SyncError,
    WorkerSettings,
};

use crate::command::{CommandExecutor, CommandSpec};
use crate::ledger;
use crate::lfs::LfsFilterController;
use crate::step::{FailureMode, RunState, StepAction, StepOutcome, StepStatus, SyncStep};
use crate::transfer::TransferGateway;
use crate::workspace;

/// Aggregate result of one plan segment.
#[derive(Debug, Default)]
pub struct EngineOutcome {
    pub outcomes: Vec<StepOutcome>,
    pub halted: bool,
    pub flunked: bool,
}

impl EngineOutcome {
    /// Whether execution may proceed to the next segment.
    pub fn can_continue(&self) -> bool {
        !self.halted
    }
}

/// Executes declarative step plans against the external tools.
pub struct StepEngine {
    executor: Arc<dyn CommandExecutor>,
    gateway: TransferGateway,
    lfs: LfsFilterController,
    settings: WorkerSettings,
    workspace: PathBuf,
}

impl StepEngine {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        settings: WorkerSettings,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        let workspace = workspace.into();
        let gateway = TransferGateway::new(executor.clone(), &settings, &workspace);
        let lfs = LfsFilterController::new(executor.clone(), &settings);
        Self {
            executor,
            gateway,
            lfs,
            settings,
            workspace,
        }
    }

    /// The LFS controller, exposed for state assertions in tests.
    pub fn lfs(&self) -> &LfsFilterController {
        &self.lfs
    }

    /// Run one plan segment, accumulating outcomes into `acc`.
    pub async fn run_steps(&mut self, steps: &[SyncStep], state: &mut RunState, acc: &mut EngineOutcome) {
        for step in steps {
            if acc.halted {
                break;
            }
            if !step.condition.holds(state) {
                debug!(step = %step.name, "step skipped");
                acc.outcomes.push(StepOutcome {
                    name: step.name.clone(),
                    status: StepStatus::Skipped,
                    detail: None,
                });
                continue;
            }

            info!(step = %step.name, description = %step.description, "executing step");
            match self.apply(step, state).await {
                Ok(()) => acc.outcomes.push(StepOutcome {
                    name: step.name.clone(),
                    status: StepStatus::Succeeded,
                    detail: None,
                }),
                Err(e) => match step.on_failure {
                    FailureMode::Halt => {
                        error!(step = %step.name, error = %e, "step failed; halting");
                        acc.outcomes.push(StepOutcome {
                            name: step.name.clone(),
                            status: StepStatus::Failed,
                            detail: Some(e.to_string()),
                        });
                        acc.halted = true;
                    }
                    FailureMode::Warn => {
                        warn!(step = %step.name, error = %e, "step failed; continuing");
                        acc.outcomes.push(StepOutcome {
                            name: step.name.clone(),
                            status: StepStatus::Warned,
                            detail: Some(e.to_string()),
                        });
                    }
                    FailureMode::Flunk => {
                        warn!(step = %step.name, error = %e, "step failed; run flunked");
                        acc.outcomes.push(StepOutcome {
                            name: step.name.clone(),
                            status: StepStatus::Failed,
                            detail: Some(e.to_string()),
                        });
                        acc.flunked = true;
                    }
                },
            }
        }
    }

    async fn apply(&mut self, step: &SyncStep, state: &mut RunState) -> Result<()> {
        let ctx = state.ctx.clone();
        match &step.action {
            StepAction::CleanupWorkspace => {
                let script = workspace::cleanup_script(ctx.flags.force_quicksync_download);
                let spec = CommandSpec::bash(script).cwd(&self.workspace);
                self.executor.run(&spec).await?.into_step_result(&step.name)?;
                Ok(())
            }

            StepAction::InstallHttpsCaCert { url_pattern, cert_path } => {
                let filename = format!("cacert-{}.pem", sanitize_path_component(url_pattern));
                let installed = self.settings.cacert_dir.join(&filename);
                fs::create_dir_all(&self.settings.cacert_dir)?;
                fs::copy(cert_path, &installed)?;

                // The LFS client re-parses the transport configuration on
                // its own; it supports neither URL wildcards nor `~` paths,
                // hence the absolute install path.
                let key = format!("http.{url_pattern}.sslCAInfo");
                let value = installed.display().to_string();
                let spec = CommandSpec::new("git")
                    .args(["config", "--global", key.as_str(), value.as_str()]);
                self.executor.run(&spec).await?.into_step_result(&step.name)?;
                Ok(())
            }

            StepAction::LfsInstallGlobally => self.lfs.install_globally().await,
            StepAction::LfsUninstallGlobally => self.lfs.uninstall_globally().await,
            StepAction::LfsInstallInAllRepositories => {
                self.lfs.install_in_all_repositories().await
            }
            StepAction::LfsOverrideEndpoint => self.lfs.override_endpoint(&self.settings).await,
            StepAction::LfsPullObjects => self.lfs.pull_objects().await,

            StepAction::RepoInitAndSync { lfs_skip_download_errors } => {
                let jobs = format!("-j{}", self.settings.sync_jobs);
                let mut init = CommandSpec::new("repo")
                    .args([
                        "init",
                        "-u",
                        ctx.repository_url.as_str(),
                        "-b",
                        ctx.branch.as_str(),
                    ])
                    .cwd(&self.workspace);
                let mut sync = CommandSpec::new("repo")
                    .args(["sync", jobs.as_str()])
                    .cwd(&self.workspace);
                if *lfs_skip_download_errors {
                    init = init.env("GIT_LFS_SKIP_DOWNLOAD_ERRORS", "1");
                    sync = sync.env("GIT_LFS_SKIP_DOWNLOAD_ERRORS", "1");
                }
                self.executor.run(&init).await?.into_step_result(&step.name)?;
                self.executor.run(&sync).await?.into_step_result(&step.name)?;
                Ok(())
            }

            StepAction::RepoSyncDelta => {
                let jobs = format!("-j{}", self.settings.sync_jobs);
                let spec = CommandSpec::new("repo")
                    .args(["sync", jobs.as_str()])
                    .cwd(&self.workspace);
                self.executor.run(&spec).await?.into_step_result(&step.name)?;
                Ok(())
            }

            StepAction::ProbeQuicksyncArchives => {
                state.missing_quicksync =
                    workspace::probe_missing_quicksync_archives(&self.workspace);
                Ok(())
            }

            StepAction::DownloadQuicksyncArchive(category) => {
                let provider = ctx.quicksync_provider()?;
                let filename = category
                    .archive_filename()
                    .expect("quicksync categories carry archive filenames");
                let remote = artifact_path("/", *category, provider, Shard::Latest, &[filename]);
                self.gateway.download(&remote).await
            }

            StepAction::ExtractQuicksyncArchive(category) => {
                let filename = category
                    .archive_filename()
                    .expect("quicksync categories carry archive filenames");
                let spec = CommandSpec::new("bsdtar")
                    .args(["-xvf", filename])
                    .cwd(&self.workspace);
                self.executor.run(&spec).await?.into_step_result(&step.name)?;
                Ok(())
            }

            StepAction::WriteLocalManifest => {
                let xml = ctx.flags.local_manifest_xml.as_deref().ok_or_else(|| {
                    SyncError::ConfigurationMissing(
                        "local manifest application requested without manifest XML".to_string(),
                    )
                })?;
                workspace::write_local_manifest(&self.workspace, xml)
            }

            StepAction::ArchiveRepoDir => {
                let filename = ArtifactCategory::RepoDir.archive_filename().unwrap();
                let spec = CommandSpec::new("bsdtar")
                    .args(["-cvf", filename, ".repo"])
                    .cwd(&self.workspace);
                self.executor.run(&spec).await?.into_step_result(&step.name)?;
                Ok(())
            }

            StepAction::ArchiveGitLfsDirs => {
                let spec =
                    CommandSpec::bash(workspace::archive_lfs_dirs_script()).cwd(&self.workspace);
                self.executor.run(&spec).await?.into_step_result(&step.name)?;
                Ok(())
            }

            StepAction::UploadQuicksyncArchive(category) => {
                let filename = category
                    .archive_filename()
                    .expect("quicksync categories carry archive filenames");
                let remote_dir = artifact_path(
                    "/",
                    *category,
                    &ctx.builder_name,
                    Shard::BuildNumber(ctx.build_number),
                    &[],
                );
                self.gateway.upload(&[filename], &remote_dir).await
            }

            StepAction::PublishLatestPointer(category) => {
                self.gateway
                    .publish_latest_pointer(*category, &ctx.builder_name, ctx.build_number)
                    .await
            }

            StepAction::ProbeProducedArtifacts => {
                state.produced = ledger::probe_produced(&self.workspace)?;
                Ok(())
            }

            StepAction::UploadProducedArtifacts(category) => {
                let local = ledger::output_dir(&self.workspace, *category);
                let remote_dir = artifact_path(
                    "/",
                    *category,
                    &ctx.builder_name,
                    Shard::BuildNumber(ctx.build_number),
                    &[],
                );
                self.gateway.upload_dir(&local, &remote_dir).await
            }

            StepAction::DownloadRecipeArtifact { category, recipe } => {
                let provider = ledger::reuse_provider(&ctx, *category)?;
                let filename = category.recipe_archive_filename(recipe).ok_or_else(|| {
                    SyncError::ConfigurationMissing(format!(
                        "category {category} has no recipe archives"
                    ))
                })?;
                let remote =
                    artifact_path("/", *category, provider, Shard::Latest, &[filename.as_str()]);
                self.gateway.download(&remote).await
            }

            StepAction::RunBuildCommand { command } => {
                let (program, args) = command.split_first().ok_or_else(|| {
                    SyncError::ConfigurationMissing("empty build command".to_string())
                })?;
                let mut spec = CommandSpec::new(program)
                    .args(args.iter().cloned())
                    .cwd(&self.workspace);
                for (key, value) in ledger::build_env(&ctx.flags) {
                    spec = spec.env(key, value);
                }
                self.executor.run(&spec).await?.into_step_result(&step.name)?;
                Ok(())
            }
        }
    }
}
