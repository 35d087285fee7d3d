//! Artifact production ledger.
//!
//! After the downstream build runs, the ledger inspects the output
//! directories once, and each category is uploaded only when it exists AND
//! its produce flag was set. Absent or unrequested categories are silently
//! skipped. The pre-build reuse path pulls from a caller-specified
//! originating builder, distinct from the consuming builder.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use treesync_core::{ArtifactCategory, BuildContext, BuildFlags, Result, SyncError};

/// Workspace-relative directory the downstream build leaves outputs under.
pub const ARTIFACTS_OUTPUT_DIR: &str = "artifacts";

/// Workspace directory holding one producible category's outputs.
pub fn output_dir(workspace: &Path, category: ArtifactCategory) -> PathBuf {
    workspace.join(ARTIFACTS_OUTPUT_DIR).join(category.as_str())
}

/// Probe which producible categories have a non-empty output directory.
///
/// Computed once per pass; the upload decision for every category reads this
/// set.
pub fn probe_produced(workspace: &Path) -> io::Result<BTreeSet<ArtifactCategory>> {
    let mut produced = BTreeSet::new();
    for category in ArtifactCategory::PRODUCIBLE {
        let dir = output_dir(workspace, category);
        let non_empty = match std::fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_some(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e),
        };
        debug!(%category, dir = %dir.display(), non_empty, "produced artifact probe");
        if non_empty {
            produced.insert(category);
        }
    }
    Ok(produced)
}

/// The providing builder for a reusable category.
pub fn reuse_provider<'a>(ctx: &'a BuildContext, category: ArtifactCategory) -> Result<&'a str> {
    let provider = match category {
        ArtifactCategory::Sdks => ctx.sdks_from.as_deref(),
        ArtifactCategory::Cache => ctx.cache_from.as_deref(),
        _ => None,
    };
    provider.ok_or_else(|| {
        SyncError::ConfigurationMissing(format!(
            "reuse of {category} artifacts requested but no providing builder name given"
        ))
    })
}

/// Environment handed to the downstream build step: the six produce/reuse
/// flags as `0`/`1` variables.
pub fn build_env(flags: &BuildFlags) -> BTreeMap<String, String> {
    let as_bit = |b: bool| if b { "1" } else { "0" }.to_string();
    BTreeMap::from([
        ("produce_sdks_artifacts".to_string(), as_bit(flags.produce_sdks_artifacts)),
        ("reuse_sdks_artifacts".to_string(), as_bit(flags.reuse_sdks_artifacts)),
        ("produce_cache_artifacts".to_string(), as_bit(flags.produce_cache_artifacts)),
        ("reuse_cache_artifacts".to_string(), as_bit(flags.reuse_cache_artifacts)),
        ("produce_build_artifacts".to_string(), as_bit(flags.produce_build_artifacts)),
        // Build outputs are terminal; no build ever reuses them.
        ("reuse_build_artifacts".to_string(), "0".to_string()),
    ])
}
