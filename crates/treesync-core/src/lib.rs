//! treesync-core: domain model for the source-tree synchronization and
//! artifact-cache orchestrator.
//!
//! Contains the pure, I/O-free pieces: the per-build context and flags
//! supplied by the invoking CI engine, the optional private endpoint
//! settings, the artifact category enumeration with store path resolution,
//! and the error taxonomy.

pub mod artifact;
pub mod context;
pub mod error;
pub mod settings;

// Re-export key types
pub use artifact::{
    artifact_path, sanitize_path_component, ArtifactCategory, Shard, LATEST_SHARD,
    UNKNOWN_BUILD_NUMBER,
};
pub use context::{BuildContext, BuildFlags, Recipe};
pub use error::{Result, SyncError};
pub use settings::{EndpointTemplate, PrivateSettings, WorkerSettings};
