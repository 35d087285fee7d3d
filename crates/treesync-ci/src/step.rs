//! Declarative synchronization steps.
//!
//! Each orchestration step is data: a condition over the run state plus an
//! action, with an explicit failure severity. Plans are plain `Vec<SyncStep>`
//! values, so the whole state machine can be tested by enumerating flag
//! combinations without touching any external tool.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use treesync_core::{ArtifactCategory, BuildContext, Recipe};

/// Severity of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureMode {
    /// Halt the pass immediately; the pass fails.
    Halt,

    /// Log a warning and continue; the pass still succeeds.
    Warn,

    /// Continue with the remaining steps but mark the pass failed.
    Flunk,
}

/// Predicate deciding whether a step runs, evaluated at execution time
/// against the run state (never at plan-construction time, since probe
/// steps feed later conditions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepCondition {
    Always,

    /// The `cleanup_workspace` flag is set.
    CleanupRequested,

    /// The `force_quicksync_download` flag is NOT set (probe guard).
    UnlessForcedQuicksyncDownload,

    /// Forced download, or the probe reported this archive absent.
    QuicksyncDownloadWanted(ArtifactCategory),

    /// `use_local_manifest` is set and manifest XML was supplied.
    LocalManifestProvided,

    /// The category's produce flag is set AND its output directory was
    /// probed non-empty.
    ProducedAndRequested(ArtifactCategory),

    /// The category's reuse flag is set.
    ReuseRequested(ArtifactCategory),
}

/// Mutable state threaded through one pass.
///
/// Probe steps write here; conditions read from here.
#[derive(Debug, Clone)]
pub struct RunState {
    pub ctx: BuildContext,
    pub workspace: PathBuf,

    /// Quicksync archives the presence probe reported absent. Stays empty
    /// when the probe was skipped (forced download) or failed.
    pub missing_quicksync: BTreeSet<ArtifactCategory>,

    /// Output categories the production probe reported non-empty. Stays
    /// empty when the probe failed.
    pub produced: BTreeSet<ArtifactCategory>,
}

impl RunState {
    pub fn new(ctx: BuildContext, workspace: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            workspace: workspace.into(),
            missing_quicksync: BTreeSet::new(),
            produced: BTreeSet::new(),
        }
    }
}

impl StepCondition {
    /// Evaluate against the current run state.
    pub fn holds(&self, state: &RunState) -> bool {
        let flags = &state.ctx.flags;
        match self {
            StepCondition::Always => true,
            StepCondition::CleanupRequested => flags.cleanup_workspace,
            StepCondition::UnlessForcedQuicksyncDownload => !flags.force_quicksync_download,
            StepCondition::QuicksyncDownloadWanted(category) => {
                flags.force_quicksync_download || state.missing_quicksync.contains(category)
            }
            StepCondition::LocalManifestProvided => flags.local_manifest_provided(),
            StepCondition::ProducedAndRequested(category) => {
                let requested = match category {
                    ArtifactCategory::Sdks => flags.produce_sdks_artifacts,
                    ArtifactCategory::Cache => flags.produce_cache_artifacts,
                    ArtifactCategory::Build => flags.produce_build_artifacts,
                    _ => false,
                };
                requested && state.produced.contains(category)
            }
            StepCondition::ReuseRequested(category) => match category {
                ArtifactCategory::Sdks => flags.reuse_sdks_artifacts,
                ArtifactCategory::Cache => flags.reuse_cache_artifacts,
                _ => false,
            },
        }
    }
}

/// What a step does when its condition holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Wipe the workspace (keeping the quicksync archives unless a forced
    /// download is requested).
    CleanupWorkspace,

    /// Install one CA certificate for an HTTPS remote into the worker's
    /// transport configuration.
    InstallHttpsCaCert {
        url_pattern: String,
        cert_path: PathBuf,
    },

    LfsInstallGlobally,
    LfsUninstallGlobally,
    LfsInstallInAllRepositories,
    LfsOverrideEndpoint,
    LfsPullObjects,

    /// Full manifest-driven synchronization: init from the manifest
    /// URL/branch, then sync every project (full depth, all branches).
    RepoInitAndSync { lfs_skip_download_errors: bool },

    /// Delta synchronization pass after the local manifest override.
    RepoSyncDelta,

    /// Probe which quicksync archives are absent locally.
    ProbeQuicksyncArchives,

    DownloadQuicksyncArchive(ArtifactCategory),
    ExtractQuicksyncArchive(ArtifactCategory),

    /// Write the supplied manifest XML to the local-manifest override
    /// location.
    WriteLocalManifest,

    /// Archive the manifest tool's metadata directory.
    ArchiveRepoDir,

    /// Archive every repository's ".git/lfs" directory.
    ArchiveGitLfsDirs,

    UploadQuicksyncArchive(ArtifactCategory),
    PublishLatestPointer(ArtifactCategory),

    /// Probe which output categories the downstream build left non-empty.
    ProbeProducedArtifacts,

    UploadProducedArtifacts(ArtifactCategory),

    /// Download one recipe archive from the providing builder's latest
    /// pointer.
    DownloadRecipeArtifact {
        category: ArtifactCategory,
        recipe: Recipe,
    },

    /// Run the downstream build command with the produce/reuse flags
    /// exported in its environment.
    RunBuildCommand { command: Vec<String> },
}

/// One declarative orchestration step.
#[derive(Debug, Clone)]
pub struct SyncStep {
    pub name: String,
    pub description: String,
    pub on_failure: FailureMode,
    pub condition: StepCondition,
    pub action: StepAction,
}

impl SyncStep {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        condition: StepCondition,
        action: StepAction,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            on_failure: FailureMode::Halt,
            condition,
            action,
        }
    }

    pub fn on_failure(mut self, mode: FailureMode) -> Self {
        self.on_failure = mode;
        self
    }
}

/// Result of one step's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,

    /// Failure detail when the step did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Terminal status of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Skipped,
    Warned,
    Failed,
}
