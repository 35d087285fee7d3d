//! treesync: source-tree synchronization and artifact-cache orchestration
//! for manifest-driven OS builds.
//!
//! ## Commands
//!
//! - `sync`: acquire the source tree (from scratch or from quicksync
//!   artifacts)
//! - `publish-quicksync`: archive and upload the quicksync artifact pair
//! - `reuse`: download upstream SDK/cache artifacts before the build
//! - `publish-artifacts`: upload the build's produced artifacts
//! - `run-build`: run the downstream build between the reuse and
//!   publication passes
//!
//! Every build flag can also be supplied by the invoking CI engine through
//! the environment (`TREESYNC_*` variables).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use treesync_ci::{init_tracing, ShellExecutor, SourceTreeSynchronizer, SyncReport};
use treesync_core::{BuildContext, BuildFlags, WorkerSettings};

#[derive(Parser)]
#[command(name = "treesync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Source-tree synchronization and artifact-cache orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the worker settings file (TOML)
    #[arg(long, global = true, env = "TREESYNC_SETTINGS", default_value = "treesync.toml")]
    settings: PathBuf,

    /// Workspace directory the source tree lives in
    #[arg(long, global = true, env = "TREESYNC_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Per-build identity and flags, as handed over by the invoking CI engine.
#[derive(Args, Debug)]
struct BuildArgs {
    /// Manifest repository URL
    #[arg(long, env = "TREESYNC_REPOSITORY")]
    repository: String,

    /// Manifest branch
    #[arg(long, env = "TREESYNC_BRANCH")]
    branch: String,

    /// Name of this builder
    #[arg(long, env = "TREESYNC_BUILDER_NAME")]
    builder_name: String,

    /// Current build number
    #[arg(long, env = "TREESYNC_BUILD_NUMBER")]
    build_number: Option<u64>,

    /// Wipe the workspace before synchronizing
    #[arg(long, env = "TREESYNC_CLEANUP_WORKSPACE")]
    cleanup_workspace: bool,

    /// Bootstrap the tree from quicksync artifacts instead of the network
    #[arg(long, env = "TREESYNC_USE_QUICKSYNC_ARTIFACTS")]
    use_quicksync_artifacts: bool,

    /// Re-download both quicksync archives even if present locally
    #[arg(long, env = "TREESYNC_FORCE_QUICKSYNC_DOWNLOAD")]
    force_quicksync_download: bool,

    /// Apply a local manifest override after the main synchronization
    #[arg(long, env = "TREESYNC_USE_LOCAL_MANIFEST")]
    use_local_manifest: bool,

    /// Literal manifest XML for the local manifest override
    #[arg(long, env = "TREESYNC_LOCAL_MANIFEST_XML")]
    local_manifest_xml: Option<String>,

    #[arg(long, env = "TREESYNC_PRODUCE_SDKS_ARTIFACTS")]
    produce_sdks_artifacts: bool,

    #[arg(long, env = "TREESYNC_PRODUCE_CACHE_ARTIFACTS")]
    produce_cache_artifacts: bool,

    #[arg(long, env = "TREESYNC_PRODUCE_BUILD_ARTIFACTS")]
    produce_build_artifacts: bool,

    #[arg(long, env = "TREESYNC_REUSE_SDKS_ARTIFACTS")]
    reuse_sdks_artifacts: bool,

    #[arg(long, env = "TREESYNC_REUSE_CACHE_ARTIFACTS")]
    reuse_cache_artifacts: bool,

    /// Builder whose latest quicksync artifacts seed this build
    #[arg(long, env = "TREESYNC_QUICKSYNC_FROM")]
    quicksync_from: Option<String>,

    /// Builder whose latest SDK artifacts are reused
    #[arg(long, env = "TREESYNC_SDKS_FROM")]
    sdks_from: Option<String>,

    /// Builder whose latest cache artifacts are reused
    #[arg(long, env = "TREESYNC_CACHE_FROM")]
    cache_from: Option<String>,
}

impl BuildArgs {
    fn into_context(self) -> BuildContext {
        let mut ctx = BuildContext::new(self.repository, self.branch, self.builder_name)
            .with_flags(BuildFlags {
                cleanup_workspace: self.cleanup_workspace,
                use_quicksync_artifacts: self.use_quicksync_artifacts,
                force_quicksync_download: self.force_quicksync_download,
                use_local_manifest: self.use_local_manifest,
                local_manifest_xml: self.local_manifest_xml,
                produce_sdks_artifacts: self.produce_sdks_artifacts,
                produce_cache_artifacts: self.produce_cache_artifacts,
                produce_build_artifacts: self.produce_build_artifacts,
                reuse_sdks_artifacts: self.reuse_sdks_artifacts,
                reuse_cache_artifacts: self.reuse_cache_artifacts,
            });
        ctx.build_number = self.build_number;
        ctx.quicksync_from = self.quicksync_from;
        ctx.sdks_from = self.sdks_from;
        ctx.cache_from = self.cache_from;
        ctx
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire the source tree for this build
    Sync {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Archive and upload the quicksync artifact pair for other builders
    PublishQuicksync {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Download upstream SDK/cache artifacts before the build
    Reuse {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Upload the artifacts the build produced and update latest pointers
    PublishArtifacts {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Run the downstream build command with the artifact flags exported
    RunBuild {
        #[command(flatten)]
        build: BuildArgs,

        /// Build command and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let settings = WorkerSettings::load(&cli.settings)
        .with_context(|| format!("failed to load settings from {}", cli.settings.display()))?;

    let executor = Arc::new(ShellExecutor::new());
    let synchronizer = |ctx: BuildContext| {
        SourceTreeSynchronizer::new(executor.clone(), settings.clone(), ctx, &cli.workspace)
    };

    let report = match cli.command {
        Commands::Sync { build } => synchronizer(build.into_context()).synchronize().await,
        Commands::PublishQuicksync { build } => {
            synchronizer(build.into_context())
                .publish_quicksync_artifacts()
                .await
        }
        Commands::Reuse { build } => {
            synchronizer(build.into_context())
                .reuse_upstream_artifacts()
                .await
        }
        Commands::PublishArtifacts { build } => {
            synchronizer(build.into_context())
                .publish_produced_artifacts()
                .await
        }
        Commands::RunBuild { build, command } => {
            synchronizer(build.into_context()).run_build(command).await
        }
    };

    finish(report)
}

fn finish(report: SyncReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.success {
        match report.failed_step() {
            Some(step) => bail!(
                "step '{}' failed: {}",
                step.name,
                step.detail.as_deref().unwrap_or("unknown error")
            ),
            None => bail!("pass failed"),
        }
    }
    Ok(())
}
