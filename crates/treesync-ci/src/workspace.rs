//! Worker workspace helpers: cleanup, archive production, local manifest.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use treesync_core::{ArtifactCategory, Result, SyncError};

/// Location of the local manifest override inside the synchronized tree.
pub const LOCAL_MANIFEST_RELPATH: &str = ".repo/local_manifests/local_manifest.xml";

/// Build the workspace cleanup script.
///
/// A forced quicksync download wipes everything; otherwise the two quicksync
/// archives are kept so the presence probe can skip their download. Build
/// outputs may be root-owned, hence sudo. The trailing listing eases CI
/// debugging.
pub fn cleanup_script(force_quicksync_download: bool) -> String {
    if force_quicksync_download {
        concat!(
            "echo \"Cleanup workspace completely...\"\n",
            "sudo find . -delete\n",
            "ls -la"
        )
        .to_string()
    } else {
        let repo_dir = ArtifactCategory::RepoDir.archive_filename().unwrap();
        let lfs_dirs = ArtifactCategory::GitLfsDirs.archive_filename().unwrap();
        format!(
            "echo \"Cleanup workspace but keep quick-sync artifacts...\"\n\
             sudo find . -mindepth 1 \\! \\( -path \"./{repo_dir}\" -or -path \"./{lfs_dirs}\" \\) -delete\n\
             ls -la"
        )
    }
}

/// Build the script archiving every repository's ".git/lfs" directory.
///
/// The manifest tool does not cover these directories under its metadata
/// directory, so their paths are collected via a per-repository iteration
/// and archived in one pass.
pub fn archive_lfs_dirs_script() -> String {
    let filename = ArtifactCategory::GitLfsDirs.archive_filename().unwrap();
    format!(
        "readarray -t potential_git_lfs_paths <<< \\\n\
         \x20   \"$(repo forall -c 'echo \"${{REPO_PATH}}/.git/lfs\"')\"\n\
         git_lfs_paths=()\n\
         for path in \"${{potential_git_lfs_paths[@]}}\"; do\n\
         \x20   if [[ -d \"${{path}}\" ]]; then\n\
         \x20       git_lfs_paths+=(\"${{path}}\")\n\
         \x20   fi\n\
         done\n\
         bsdtar -cvf \"{filename}\" \"${{git_lfs_paths[@]}}\""
    )
}

/// Probe which quicksync archives are absent from the workspace.
pub fn probe_missing_quicksync_archives(workspace: &Path) -> BTreeSet<ArtifactCategory> {
    let mut missing = BTreeSet::new();
    for category in ArtifactCategory::QUICKSYNC {
        let filename = category
            .archive_filename()
            .expect("quicksync categories carry archive filenames");
        let present = workspace.join(filename).is_file();
        debug!(%category, filename, present, "quicksync archive probe");
        if !present {
            missing.insert(category);
        }
    }
    missing
}

/// Write the local manifest override into the synchronized tree.
///
/// The caller re-runs a synchronization pass afterwards so the override
/// takes effect.
pub fn write_local_manifest(workspace: &Path, xml: &str) -> Result<()> {
    let path = workspace.join(LOCAL_MANIFEST_RELPATH);
    let dir = path
        .parent()
        .ok_or_else(|| SyncError::LocalManifest("manifest path has no parent".to_string()))?;
    if !workspace.join(".repo").is_dir() {
        return Err(SyncError::LocalManifest(
            "no .repo directory in workspace; synchronize before applying a local manifest"
                .to_string(),
        ));
    }
    fs::create_dir_all(dir)?;
    fs::write(&path, xml)?;
    info!(path = %path.display(), "local manifest written");
    Ok(())
}
