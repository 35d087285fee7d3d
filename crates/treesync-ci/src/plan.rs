//! Plan builders: the orchestration sequences as data.
//!
//! Plans branch on configuration presence (CA certificates, alternative
//! endpoint template) and on the synchronization mode exactly once, at
//! construction; all per-build flag gating stays in step conditions so it is
//! evaluated against the run state at execution time.

use treesync_core::{ArtifactCategory, BuildContext, WorkerSettings};

use crate::step::{FailureMode, StepAction, StepCondition, SyncStep};

/// CI step names are capped; the overflow is dropped, not ellipsized.
const MAX_STEP_NAME: usize = 50;

fn step_name(name: impl Into<String>) -> String {
    let mut name = name.into();
    if name.len() > MAX_STEP_NAME {
        name.truncate(MAX_STEP_NAME);
    }
    name
}

/// The workspace cleanup step, gated on the `cleanup_workspace` flag.
pub fn cleanup_steps() -> Vec<SyncStep> {
    vec![SyncStep::new(
        "cleanup workspace",
        "cleanup workspace",
        StepCondition::CleanupRequested,
        StepAction::CleanupWorkspace,
    )]
}

/// Preparation steps of the from-scratch branch, up to (excluding) the main
/// synchronization.
pub fn prepare_from_scratch_steps(settings: &WorkerSettings) -> Vec<SyncStep> {
    let mut steps = Vec::new();

    // Declare the CA certificates in the worker environment before
    // proceeding. This path never executes in quicksync mode.
    if let Some(cacerts) = settings.https_cacerts() {
        for (url_pattern, cert_path) in cacerts {
            steps.push(SyncStep::new(
                step_name(format!("setup custom cacert for {url_pattern}")),
                "set up a CA certificate for HTTPS git remotes",
                StepCondition::Always,
                StepAction::InstallHttpsCaCert {
                    url_pattern: url_pattern.clone(),
                    cert_path: cert_path.clone(),
                },
            ));
        }
    }

    if settings.lfs_endpoint_template().is_some() {
        // The advertised endpoints must not be consulted: disable the
        // filters before the sync, then fetch manually from the
        // alternative endpoint afterwards.
        steps.push(SyncStep::new(
            "uninstall git-lfs filters",
            "uninstall the LFS filters globally to prevent automatic fetch",
            StepCondition::Always,
            StepAction::LfsUninstallGlobally,
        ));
    } else {
        // Safety net against a dirty worker state.
        steps.push(SyncStep::new(
            "install git-lfs filters",
            "install the LFS filters globally",
            StepCondition::Always,
            StepAction::LfsInstallGlobally,
        ));
    }

    steps
}

/// Preparation steps of the quicksync branch, up to (excluding) the main
/// synchronization.
pub fn prepare_from_quicksync_steps() -> Vec<SyncStep> {
    let mut steps = vec![
        // Objects come from the local cache; nothing may auto-fetch.
        SyncStep::new(
            "uninstall git-lfs filters",
            "uninstall the LFS filters globally to prevent automatic fetch",
            StepCondition::Always,
            StepAction::LfsUninstallGlobally,
        ),
        SyncStep::new(
            step_name("assert which quicksync artifact download is required"),
            "probe which quicksync archives are absent locally",
            StepCondition::UnlessForcedQuicksyncDownload,
            StepAction::ProbeQuicksyncArchives,
        )
        .on_failure(FailureMode::Warn),
    ];

    for category in ArtifactCategory::QUICKSYNC {
        steps.push(SyncStep::new(
            step_name(format!("retrieve {category} artifact")),
            format!("retrieve the {category} archive from the artifact store"),
            StepCondition::QuicksyncDownloadWanted(category),
            StepAction::DownloadQuicksyncArchive(category),
        ));
    }

    steps.push(SyncStep::new(
        "extract repo directory",
        "extract the repo metadata archive in the current working tree",
        StepCondition::Always,
        StepAction::ExtractQuicksyncArchive(ArtifactCategory::RepoDir),
    ));

    steps
}

/// The main synchronization step. Never shallow, all branches, fixed
/// parallelism; the skip-on-error override is set whenever the filters were
/// globally uninstalled beforehand.
pub fn repo_sync_step(lfs_skip_download_errors: bool) -> SyncStep {
    SyncStep::new(
        "repo init and sync",
        "synchronize the source tree with the manifest tool",
        StepCondition::Always,
        StepAction::RepoInitAndSync {
            lfs_skip_download_errors,
        },
    )
}

/// From-scratch steps after the main synchronization: only needed when the
/// alternative endpoint is configured (otherwise the sync already fetched
/// the objects from the advertised endpoints).
pub fn post_sync_from_scratch_steps(settings: &WorkerSettings) -> Vec<SyncStep> {
    if settings.lfs_endpoint_template().is_none() {
        return Vec::new();
    }
    vec![
        SyncStep::new(
            step_name("install git-lfs filters in all projects"),
            "install the LFS filters retrospectively in all projects",
            StepCondition::Always,
            StepAction::LfsInstallInAllRepositories,
        ),
        SyncStep::new(
            "setup git-lfs endpoint",
            "override the LFS endpoint with the alternative endpoint URL",
            StepCondition::Always,
            StepAction::LfsOverrideEndpoint,
        ),
        SyncStep::new(
            "pull git-lfs objects",
            "fetch and checkout the LFS objects",
            StepCondition::Always,
            StepAction::LfsPullObjects,
        ),
    ]
}

/// Quicksync steps after the main synchronization: restore the object
/// directories, re-enable the filters, then pull to reconcile any delta
/// against a partial or prior snapshot.
pub fn post_sync_from_quicksync_steps(settings: &WorkerSettings) -> Vec<SyncStep> {
    let mut steps = vec![
        SyncStep::new(
            "extract git-lfs directories",
            "extract the LFS directories archive in the current working tree",
            StepCondition::Always,
            StepAction::ExtractQuicksyncArchive(ArtifactCategory::GitLfsDirs),
        ),
        SyncStep::new(
            step_name("install git-lfs filters in all projects"),
            "install the LFS filters retrospectively in all projects",
            StepCondition::Always,
            StepAction::LfsInstallInAllRepositories,
        ),
    ];
    if settings.lfs_endpoint_template().is_some() {
        steps.push(SyncStep::new(
            "setup git-lfs endpoint",
            "override the LFS endpoint with the alternative endpoint URL",
            StepCondition::Always,
            StepAction::LfsOverrideEndpoint,
        ));
    }
    steps.push(SyncStep::new(
        "pull git-lfs objects",
        "fetch and checkout the LFS objects",
        StepCondition::Always,
        StepAction::LfsPullObjects,
    ));
    steps
}

/// Common tail: apply the local manifest override and re-synchronize. Both
/// steps are silent no-ops when the flags are absent.
pub fn local_manifest_steps() -> Vec<SyncStep> {
    vec![
        SyncStep::new(
            "apply local-manifest",
            "apply local-manifest if specified by the build flags",
            StepCondition::LocalManifestProvided,
            StepAction::WriteLocalManifest,
        ),
        SyncStep::new(
            "local-manifest delta sync",
            "re-run the synchronization so the override takes effect",
            StepCondition::LocalManifestProvided,
            StepAction::RepoSyncDelta,
        ),
    ]
}

/// Produce and publish the quicksync artifact pair for reuse by other
/// builders.
pub fn quicksync_publish_steps() -> Vec<SyncStep> {
    let mut steps = vec![
        SyncStep::new(
            "archive repo directory",
            "archive the repo metadata directory for quicker synchronizations",
            StepCondition::Always,
            StepAction::ArchiveRepoDir,
        ),
        SyncStep::new(
            "archive git lfs directories",
            "archive the LFS directories for quicker synchronizations",
            StepCondition::Always,
            StepAction::ArchiveGitLfsDirs,
        ),
    ];
    for category in ArtifactCategory::QUICKSYNC {
        steps.push(SyncStep::new(
            step_name(format!("save {category} quick-sync artifact")),
            format!("save the {category} archive on the artifact store"),
            StepCondition::Always,
            StepAction::UploadQuicksyncArchive(category),
        ));
    }
    for category in ArtifactCategory::QUICKSYNC {
        steps.push(SyncStep::new(
            step_name(format!("symlink latest {category} artifacts")),
            format!("point the latest {category} pointer at this build"),
            StepCondition::Always,
            StepAction::PublishLatestPointer(category),
        ));
    }
    steps
}

/// Pre-build reuse downloads from the providing builders' latest pointers.
pub fn reuse_steps(settings: &WorkerSettings) -> Vec<SyncStep> {
    let mut steps = Vec::new();
    for recipe in &settings.sdk_recipes {
        steps.push(SyncStep::new(
            step_name(format!("retrieve {recipe} SDK artifact")),
            format!("retrieve the SDK artifact for \"{recipe}\" from the providing builder"),
            StepCondition::ReuseRequested(ArtifactCategory::Sdks),
            StepAction::DownloadRecipeArtifact {
                category: ArtifactCategory::Sdks,
                recipe: recipe.clone(),
            },
        ));
    }
    for recipe in &settings.cache_recipes {
        steps.push(SyncStep::new(
            step_name(format!("retrieve {recipe} cache artifact")),
            format!("retrieve the cache artifact for \"{recipe}\" from the providing builder"),
            StepCondition::ReuseRequested(ArtifactCategory::Cache),
            StepAction::DownloadRecipeArtifact {
                category: ArtifactCategory::Cache,
                recipe: recipe.clone(),
            },
        ));
    }
    steps
}

/// Post-build production ledger: probe what exists, then upload and publish
/// the categories that are both present and requested.
pub fn produced_upload_steps() -> Vec<SyncStep> {
    let mut steps = vec![SyncStep::new(
        step_name("assert which artifact have been produced"),
        "probe which output directories the build left non-empty",
        StepCondition::Always,
        StepAction::ProbeProducedArtifacts,
    )
    .on_failure(FailureMode::Warn)];

    for category in ArtifactCategory::PRODUCIBLE {
        steps.push(SyncStep::new(
            step_name(format!("save {category} artifact on store")),
            format!("save the {category} artifact archives on the artifact store"),
            StepCondition::ProducedAndRequested(category),
            StepAction::UploadProducedArtifacts(category),
        ));
        steps.push(SyncStep::new(
            step_name(format!("symlink latest {category} artifacts")),
            format!("point the latest {category} pointer at this build"),
            StepCondition::ProducedAndRequested(category),
            StepAction::PublishLatestPointer(category),
        ));
    }
    steps
}

/// The downstream build command, with the produce/reuse flags exported.
///
/// A failing build flunks the run without halting it, so the production
/// ledger still persists whatever was produced.
pub fn build_command_step(command: Vec<String>) -> SyncStep {
    SyncStep::new(
        "complete build",
        "run the downstream build with the artifact flags exported",
        StepCondition::Always,
        StepAction::RunBuildCommand { command },
    )
    .on_failure(FailureMode::Flunk)
}

/// The full acquisition plan, flattened. Mirrors the segment sequence the
/// synchronizer executes; exposed for plan-shape tests.
pub fn sync_plan(ctx: &BuildContext, settings: &WorkerSettings) -> Vec<SyncStep> {
    let mut steps = cleanup_steps();
    if ctx.flags.use_quicksync_artifacts {
        steps.extend(prepare_from_quicksync_steps());
        steps.push(repo_sync_step(true));
        steps.extend(post_sync_from_quicksync_steps(settings));
    } else {
        steps.extend(prepare_from_scratch_steps(settings));
        steps.push(repo_sync_step(settings.lfs_endpoint_template().is_some()));
        steps.extend(post_sync_from_scratch_steps(settings));
    }
    steps.extend(local_manifest_steps());
    steps
}
