//! Artifact transfer gateway.
//!
//! Archives move between the worker and the artifact store through the
//! external `lftp` client; "latest" pointers are store-side symlinks
//! replaced atomically with `ln -snf`. Script construction is kept in pure
//! functions so transfer behavior is assertable without a store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use treesync_core::{
    artifact_path, ArtifactCategory, Result, Shard, SyncError, WorkerSettings,
};

use crate::command::{CommandExecutor, CommandSpec};

/// Build the lftp script uploading `files` into `remote_dir`.
///
/// The remote directory is created first; `mput` transfers all named files
/// in one session, so a transfer failure fails the whole step.
pub fn upload_script(ftp_url: &str, remote_dir: &str, files: &[&str]) -> String {
    format!(
        "connect {ftp_url}\nmkdir -p {remote_dir}\ncd {remote_dir}\nmput {}",
        files.join(" ")
    )
}

/// Build the lftp script uploading every file of `local_dir` into
/// `remote_dir`.
pub fn upload_dir_script(ftp_url: &str, local_dir: &str, remote_dir: &str) -> String {
    format!(
        "connect {ftp_url}\nlcd {local_dir}\nmkdir -p {remote_dir}\ncd {remote_dir}\nmput *"
    )
}

/// Build the lftp script downloading `remote_file` into the session's local
/// working directory, overwriting any local copy (local state is
/// disposable).
pub fn download_script(ftp_url: &str, remote_file: &str) -> String {
    format!("connect {ftp_url}\nset xfer:clobber yes\nmget {remote_file}")
}

/// Gateway to the remote artifact store.
pub struct TransferGateway {
    executor: Arc<dyn CommandExecutor>,
    ftp_url: String,
    store_dir: PathBuf,
    workspace: PathBuf,
}

impl TransferGateway {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        settings: &WorkerSettings,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            ftp_url: settings.artifacts_ftp_url.clone(),
            store_dir: settings.artifacts_dir.clone(),
            workspace: workspace.into(),
        }
    }

    async fn run_lftp(&self, step: &str, script: String, cwd: &Path) -> Result<()> {
        let spec = CommandSpec::new("lftp").arg("-c").arg(script).cwd(cwd);
        let outcome = self.executor.run(&spec).await?;
        if !outcome.success() {
            return Err(SyncError::Transfer(format!(
                "{step}: lftp exited {}: {}",
                outcome.exit_code, outcome.stderr
            )));
        }
        Ok(())
    }

    /// Upload named files from the workspace into `remote_dir`.
    pub async fn upload(&self, files: &[&str], remote_dir: &str) -> Result<()> {
        let script = upload_script(&self.ftp_url, remote_dir, files);
        info!(remote_dir, ?files, "uploading artifacts");
        self.run_lftp("upload artifacts", script, &self.workspace).await
    }

    /// Upload the whole contents of `local_dir` into `remote_dir`.
    pub async fn upload_dir(&self, local_dir: &Path, remote_dir: &str) -> Result<()> {
        let script = upload_dir_script(
            &self.ftp_url,
            &local_dir.display().to_string(),
            remote_dir,
        );
        info!(local_dir = %local_dir.display(), remote_dir, "uploading artifact directory");
        self.run_lftp("upload artifact directory", script, &self.workspace)
            .await
    }

    /// Download `remote_file` into the workspace, clobbering any local copy.
    ///
    /// A missing remote artifact surfaces as a transfer failure and is
    /// fatal to the requesting pass.
    pub async fn download(&self, remote_file: &str) -> Result<()> {
        let script = download_script(&self.ftp_url, remote_file);
        info!(remote_file, "downloading artifact");
        self.run_lftp("download artifact", script, &self.workspace)
            .await
            .map_err(|e| match e {
                SyncError::Transfer(detail) => {
                    SyncError::MissingArtifact(format!("{remote_file} ({detail})"))
                }
                other => other,
            })
    }

    /// Replace the "latest" pointer of `(category, builder)` with the given
    /// build number.
    ///
    /// `ln -snf` gives atomic replace semantics: the previous pointer is
    /// superseded, never preserved. A failure here is fatal because a stale
    /// pointer silently breaks downstream quicksync restores.
    pub async fn publish_latest_pointer(
        &self,
        category: ArtifactCategory,
        builder_name: &str,
        build_number: Option<u64>,
    ) -> Result<()> {
        let target = Shard::BuildNumber(build_number)
            .segment()
            .expect("build-number shard always renders a segment");
        let link = artifact_path(
            &self.store_dir.display().to_string(),
            category,
            builder_name,
            Shard::Latest,
            &[],
        );
        let spec = CommandSpec::new("ln").args(["-snf", target.as_str(), link.as_str()]);
        let outcome = self.executor.run(&spec).await?;
        if !outcome.success() {
            return Err(SyncError::Transfer(format!(
                "publish latest pointer for {category}: ln exited {}: {}",
                outcome.exit_code, outcome.stderr
            )));
        }
        info!(%category, builder = builder_name, target = %target, "latest pointer published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedExecutor;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            artifacts_ftp_url: "ftp://artifacts.internal".to_string(),
            artifacts_dir: PathBuf::from("/srv/artifacts"),
            sync_jobs: 4,
            lfs_repo_group: "lfs".to_string(),
            cacert_dir: PathBuf::from("/var/lib/treesync/git-cacerts"),
            sdk_recipes: Vec::new(),
            cache_recipes: Vec::new(),
            private: None,
        }
    }

    fn gateway(executor: &Arc<ScriptedExecutor>) -> TransferGateway {
        TransferGateway::new(
            executor.clone() as Arc<dyn CommandExecutor>,
            &settings(),
            "/work",
        )
    }

    #[test]
    fn test_upload_script_creates_directory_before_cd() {
        let script = upload_script("ftp://host", "/repo-dir/b/42", &["repo-dir.tar"]);
        let mkdir = script.find("mkdir -p /repo-dir/b/42").unwrap();
        let cd = script.find("cd /repo-dir/b/42").unwrap();
        assert!(mkdir < cd);
        assert!(script.ends_with("mput repo-dir.tar"));
    }

    #[test]
    fn test_upload_dir_script_changes_local_directory() {
        let script = upload_dir_script("ftp://host", "artifacts/cache", "/cache/b/42");
        assert!(script.contains("lcd artifacts/cache"));
        assert!(script.ends_with("mput *"));
    }

    #[test]
    fn test_download_script_enables_clobber() {
        let script = download_script("ftp://host", "/repo-dir/b/latest/repo-dir.tar");
        assert!(script.contains("set xfer:clobber yes"));
        assert!(script.ends_with("mget /repo-dir/b/latest/repo-dir.tar"));
    }

    #[tokio::test]
    async fn test_upload_runs_lftp_in_workspace() {
        let executor = Arc::new(ScriptedExecutor::new());
        gateway(&executor)
            .upload(&["repo-dir.tar", "git-lfs-dirs.tar"], "/repo-dir/b/7")
            .await
            .unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "lftp");
        assert_eq!(calls[0].cwd.as_deref(), Some(Path::new("/work")));
        assert!(calls[0].args[1].contains("mput repo-dir.tar git-lfs-dirs.tar"));
    }

    #[tokio::test]
    async fn test_download_failure_is_missing_artifact() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.fail_matching("lftp", 1, "mget: Access failed: 550");

        let err = gateway(&executor)
            .download("/cache/provider/latest/cache:os.core.tar")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingArtifact(_)));
    }

    #[tokio::test]
    async fn test_publish_latest_pointer_forces_replace() {
        let executor = Arc::new(ScriptedExecutor::new());
        gateway(&executor)
            .publish_latest_pointer(ArtifactCategory::RepoDir, "my builder", Some(42))
            .await
            .unwrap();

        let lines = executor.call_lines();
        assert_eq!(lines, vec!["ln -snf 42 /srv/artifacts/repo-dir/my_builder/latest"]);
    }

    #[tokio::test]
    async fn test_publish_latest_pointer_unknown_build_number() {
        let executor = Arc::new(ScriptedExecutor::new());
        gateway(&executor)
            .publish_latest_pointer(ArtifactCategory::Cache, "b", None)
            .await
            .unwrap();

        let lines = executor.call_lines();
        assert!(lines[0].contains("ln -snf _unknown_buildnumber_"));
    }

    #[tokio::test]
    async fn test_publish_latest_pointer_failure_is_fatal() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.fail_matching("ln -snf", 1, "permission denied");

        let err = gateway(&executor)
            .publish_latest_pointer(ArtifactCategory::Build, "b", Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transfer(_)));
    }
}
