//! treesync-ci: source-tree synchronization and artifact-cache
//! orchestration.
//!
//! Provides the per-build orchestrator that:
//! - Acquires a manifest-driven source tree from scratch or from quicksync
//!   artifacts
//! - Manages the LFS transport filter state around the synchronization
//! - Moves archive artifacts to and from the remote artifact store
//! - Persists produced build outputs for reuse by later builders

pub mod command;
pub mod engine;
pub mod fakes;
pub mod ledger;
pub mod lfs;
pub mod plan;
pub mod step;
pub mod sync;
pub mod telemetry;
pub mod transfer;
pub mod workspace;

// Re-export key types
pub use command::{CommandExecutor, CommandOutcome, CommandSpec, ShellExecutor};
pub use engine::{EngineOutcome, StepEngine};
pub use lfs::{LfsFilterController, LfsFilterState};
pub use step::{FailureMode, RunState, StepAction, StepCondition, StepOutcome, StepStatus, SyncStep};
pub use sync::{SourceTreeSynchronizer, SyncMode, SyncPhase, SyncReport};
pub use telemetry::init_tracing;
pub use transfer::TransferGateway;
