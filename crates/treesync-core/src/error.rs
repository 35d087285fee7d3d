//! Error taxonomy for treesync.

use std::path::PathBuf;

/// Errors produced during a synchronization or artifact pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A branch was entered whose prerequisite optional settings are absent.
    #[error("missing configuration: {0}")]
    ConfigurationMissing(String),

    /// An invoked external tool exited non-zero.
    #[error("step '{step}' failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        step: String,
        exit_code: i32,
        stderr: String,
    },

    /// An external tool could not be spawned at all.
    #[error("failed to spawn '{program}': {reason}")]
    CommandSpawn { program: String, reason: String },

    /// A transfer to or from the artifact store failed.
    #[error("artifact transfer failed: {0}")]
    Transfer(String),

    /// A requested artifact does not exist on the store.
    #[error("artifact not found on store: {0}")]
    MissingArtifact(String),

    #[error("invalid endpoint template {template:?}: {reason}")]
    InvalidEndpointTemplate { template: String, reason: String },

    #[error("invalid recipe {0:?}: expected \"product/recipe\"")]
    InvalidRecipe(String),

    #[error("local manifest error: {0}")]
    LocalManifest(String),

    #[error("settings error in {path}: {reason}")]
    Settings { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for treesync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
