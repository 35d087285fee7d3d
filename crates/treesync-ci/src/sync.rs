//! Source tree synchronizer: the per-build state machine.
//!
//! One pass per build. The mode is decided once from the
//! `use_quicksync_artifacts` flag and never re-evaluated; each branch
//! establishes its required LFS filter state unconditionally at entry, since
//! a retried pipeline run inherits unknown worker state.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use treesync_core::{BuildContext, WorkerSettings};

use crate::command::CommandExecutor;
use crate::engine::{EngineOutcome, StepEngine};
use crate::plan;
use crate::step::{RunState, StepOutcome, StepStatus, SyncStep};

/// How the source tree is acquired; fixed for the duration of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FromScratch,
    FromQuicksyncArtifacts,
}

impl SyncMode {
    /// Entry decision: caller-supplied flag, not auto-detected.
    pub fn decide(ctx: &BuildContext) -> Self {
        if ctx.flags.use_quicksync_artifacts {
            SyncMode::FromQuicksyncArtifacts
        } else {
            SyncMode::FromScratch
        }
    }
}

/// Phases of one synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    DecideMode,
    PrepareFromScratch,
    PrepareFromQuicksync,
    RepoSyncExecuted,
    LocalManifestApplied,
    Done,
    Failed,
}

/// Serializable result of one orchestrator pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub builder_name: String,

    /// Acquisition mode, absent for artifact-only passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,

    pub phase: SyncPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
    pub success: bool,
}

impl SyncReport {
    pub fn executed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Succeeded)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Skipped)
            .count()
    }

    /// The failing step, if any.
    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}

/// Orchestrates the acquisition and artifact passes of one build.
pub struct SourceTreeSynchronizer {
    engine: StepEngine,
    settings: WorkerSettings,
    state: RunState,
}

impl SourceTreeSynchronizer {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        settings: WorkerSettings,
        ctx: BuildContext,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        let workspace = workspace.into();
        let engine = StepEngine::new(executor, settings.clone(), &workspace);
        let state = RunState::new(ctx, workspace);
        Self {
            engine,
            settings,
            state,
        }
    }

    /// The engine, exposed for state assertions in tests.
    pub fn engine(&self) -> &StepEngine {
        &self.engine
    }

    /// Run one full acquisition pass.
    pub async fn synchronize(&mut self) -> SyncReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut acc = EngineOutcome::default();
        let mut phase;

        let mode = SyncMode::decide(&self.state.ctx);
        info!(run_id = %run_id, ?mode, builder = %self.state.ctx.builder_name, "starting synchronization pass");

        let prepare: Vec<SyncStep>;
        let lfs_skip;
        let post: Vec<SyncStep>;
        match mode {
            SyncMode::FromScratch => {
                phase = SyncPhase::PrepareFromScratch;
                prepare = plan::prepare_from_scratch_steps(&self.settings);
                lfs_skip = self.settings.lfs_endpoint_template().is_some();
                post = plan::post_sync_from_scratch_steps(&self.settings);
            }
            SyncMode::FromQuicksyncArtifacts => {
                phase = SyncPhase::PrepareFromQuicksync;
                prepare = plan::prepare_from_quicksync_steps();
                lfs_skip = true;
                post = plan::post_sync_from_quicksync_steps(&self.settings);
            }
        }

        self.engine
            .run_steps(&plan::cleanup_steps(), &mut self.state, &mut acc)
            .await;
        self.engine.run_steps(&prepare, &mut self.state, &mut acc).await;

        if acc.can_continue() {
            self.engine
                .run_steps(&[plan::repo_sync_step(lfs_skip)], &mut self.state, &mut acc)
                .await;
            if acc.can_continue() {
                phase = SyncPhase::RepoSyncExecuted;
            }
        }

        self.engine.run_steps(&post, &mut self.state, &mut acc).await;

        if acc.can_continue() {
            self.engine
                .run_steps(&plan::local_manifest_steps(), &mut self.state, &mut acc)
                .await;
            if acc.can_continue() {
                phase = SyncPhase::LocalManifestApplied;
            }
        }

        self.finish(run_id, started_at, Some(mode), phase, acc)
    }

    /// Produce and publish the quicksync artifact pair.
    pub async fn publish_quicksync_artifacts(&mut self) -> SyncReport {
        self.artifact_pass(plan::quicksync_publish_steps()).await
    }

    /// Pre-build reuse downloads from the providing builders.
    pub async fn reuse_upstream_artifacts(&mut self) -> SyncReport {
        let steps = plan::reuse_steps(&self.settings);
        self.artifact_pass(steps).await
    }

    /// Post-build production ledger: upload what was produced and requested.
    pub async fn publish_produced_artifacts(&mut self) -> SyncReport {
        self.artifact_pass(plan::produced_upload_steps()).await
    }

    /// Run the downstream build between the reuse and production passes.
    ///
    /// A failing build command flunks the run without halting it, so the
    /// production ledger still persists partial outputs.
    pub async fn run_build(&mut self, command: Vec<String>) -> SyncReport {
        let mut steps = plan::reuse_steps(&self.settings);
        steps.push(plan::build_command_step(command));
        steps.extend(plan::produced_upload_steps());
        self.artifact_pass(steps).await
    }

    async fn artifact_pass(&mut self, steps: Vec<SyncStep>) -> SyncReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut acc = EngineOutcome::default();
        self.engine.run_steps(&steps, &mut self.state, &mut acc).await;
        let phase = if acc.halted || acc.flunked {
            SyncPhase::Failed
        } else {
            SyncPhase::Done
        };
        self.finish(run_id, started_at, None, phase, acc)
    }

    fn finish(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        mode: Option<SyncMode>,
        phase: SyncPhase,
        acc: EngineOutcome,
    ) -> SyncReport {
        let success = !acc.halted && !acc.flunked;
        let phase = match phase {
            SyncPhase::Failed | SyncPhase::Done => phase,
            _ if !success => SyncPhase::Failed,
            _ => SyncPhase::Done,
        };
        let report = SyncReport {
            run_id,
            builder_name: self.state.ctx.builder_name.clone(),
            mode,
            phase,
            started_at,
            finished_at: Utc::now(),
            steps: acc.outcomes,
            success,
        };
        if report.success {
            info!(run_id = %run_id, executed = report.executed_count(), "pass completed");
        } else {
            let failed = report.failed_step().map(|s| s.name.clone()).unwrap_or_default();
            info!(run_id = %run_id, failed_step = %failed, "pass failed");
        }
        report
    }
}
