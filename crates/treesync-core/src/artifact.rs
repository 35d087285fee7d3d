//! Artifact categories and store path resolution.
//!
//! The artifact store is laid out as
//! `<category>/<sanitized-builder-name>/<build-number-or-"latest">/<filename>`.
//! Path resolution is pure string composition so it can be evaluated lazily
//! at step execution time.

use serde::{Deserialize, Serialize};

use crate::context::Recipe;

/// Placeholder shard written when the build number is unknown.
pub const UNKNOWN_BUILD_NUMBER: &str = "_unknown_buildnumber_";

/// Shard segment of the latest pointer.
pub const LATEST_SHARD: &str = "latest";

/// Categories of artifacts handled by the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactCategory {
    /// Archive of the manifest tool's metadata directory (".repo").
    RepoDir,

    /// Archive of the per-repository ".git/lfs" object directories.
    GitLfsDirs,

    /// SDK archives produced by a downstream build.
    Sdks,

    /// Build cache archives produced by a downstream build.
    Cache,

    /// Final build outputs.
    Build,
}

impl ArtifactCategory {
    /// The two categories that together form a quicksync snapshot.
    pub const QUICKSYNC: [ArtifactCategory; 2] =
        [ArtifactCategory::RepoDir, ArtifactCategory::GitLfsDirs];

    /// Categories a downstream build can produce.
    pub const PRODUCIBLE: [ArtifactCategory; 3] = [
        ArtifactCategory::Sdks,
        ArtifactCategory::Cache,
        ArtifactCategory::Build,
    ];

    /// Categories a build can reuse from an upstream builder.
    pub const REUSABLE: [ArtifactCategory; 2] =
        [ArtifactCategory::Sdks, ArtifactCategory::Cache];

    /// Directory segment of this category on the artifact store.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::RepoDir => "repo-dir",
            ArtifactCategory::GitLfsDirs => "git-lfs-dirs",
            ArtifactCategory::Sdks => "sdks",
            ArtifactCategory::Cache => "cache",
            ArtifactCategory::Build => "build",
        }
    }

    /// Canonical archive filename for the quicksync categories. The
    /// producible categories upload whole output directories instead.
    pub fn archive_filename(&self) -> Option<&'static str> {
        match self {
            ArtifactCategory::RepoDir => Some("repo-dir.tar"),
            ArtifactCategory::GitLfsDirs => Some("git-lfs-dirs.tar"),
            _ => None,
        }
    }

    /// Archive filename for a per-recipe artifact of this category.
    ///
    /// Only meaningful for the reusable categories, whose filenames encode
    /// the product and recipe name.
    pub fn recipe_archive_filename(&self, recipe: &Recipe) -> Option<String> {
        match self {
            ArtifactCategory::Sdks => {
                Some(format!("sdk:{}.{}.tar", recipe.product, recipe.name))
            }
            ArtifactCategory::Cache => {
                Some(format!("cache:{}.{}.tar", recipe.product, recipe.name))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shard segment distinguishing artifact instances under a builder directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shard {
    /// No shard segment at all.
    None,

    /// The current build number, or `_unknown_buildnumber_` when the
    /// invoking CI engine did not supply one.
    BuildNumber(Option<u64>),

    /// The "latest" pointer.
    Latest,
}

impl Shard {
    /// The path segment for this shard, or `None` when omitted.
    pub fn segment(&self) -> Option<String> {
        match self {
            Shard::None => None,
            Shard::BuildNumber(Some(n)) => Some(n.to_string()),
            Shard::BuildNumber(None) => Some(UNKNOWN_BUILD_NUMBER.to_string()),
            Shard::Latest => Some(LATEST_SHARD.to_string()),
        }
    }
}

/// Replace every character outside `[A-Za-z0-9.\-_:]` with `_`.
///
/// Known limitation: two distinct raw names may sanitize to the same string
/// and therefore collide on the store. This is accepted, not worked around.
pub fn sanitize_path_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Resolve the store path for an artifact.
///
/// Joins, in fixed order: base path, category segment, sanitized builder
/// name, the optional shard segment, then any extra segments. Deterministic
/// and side-effect-free.
pub fn artifact_path(
    base: &str,
    category: ArtifactCategory,
    builder_name: &str,
    shard: Shard,
    extra: &[&str],
) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(4 + extra.len());
    segments.push(base.trim_end_matches('/').to_string());
    segments.push(category.as_str().to_string());
    segments.push(sanitize_path_component(builder_name));
    if let Some(seg) = shard.segment() {
        segments.push(seg);
    }
    segments.extend(extra.iter().map(|s| s.to_string()));
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_passes_allowed_charset_through() {
        assert_eq!(
            sanitize_path_component("builder.x86_64:release-1"),
            "builder.x86_64:release-1"
        );
    }

    #[test]
    fn test_sanitize_replaces_everything_else() {
        assert_eq!(sanitize_path_component("os builder (fast)/2"), "os_builder__fast__2");
    }

    #[test]
    fn test_sanitized_output_charset() {
        let out = sanitize_path_component("weird name!@#$%^&*()+= with spaces");
        assert!(out
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':')));
    }

    #[test]
    fn test_distinct_names_may_collide_after_sanitizing() {
        // Accepted limitation: collisions are not detected or repaired.
        assert_eq!(sanitize_path_component("a b"), sanitize_path_component("a/b"));
    }

    #[test]
    fn test_path_without_shard_omits_segment() {
        let p = artifact_path("/", ArtifactCategory::Cache, "builder", Shard::None, &[]);
        assert_eq!(p, "/cache/builder");
    }

    #[test]
    fn test_path_with_build_number_shard() {
        let p = artifact_path(
            "/",
            ArtifactCategory::RepoDir,
            "my builder",
            Shard::BuildNumber(Some(42)),
            &[],
        );
        assert_eq!(p, "/repo-dir/my_builder/42");
    }

    #[test]
    fn test_path_with_unknown_build_number() {
        let p = artifact_path(
            "/srv/artifacts",
            ArtifactCategory::Build,
            "b",
            Shard::BuildNumber(None),
            &[],
        );
        assert_eq!(p, "/srv/artifacts/build/b/_unknown_buildnumber_");
    }

    #[test]
    fn test_path_with_latest_shard_and_extra_segments() {
        let p = artifact_path(
            "/",
            ArtifactCategory::GitLfsDirs,
            "provider",
            Shard::Latest,
            &["git-lfs-dirs.tar"],
        );
        assert_eq!(p, "/git-lfs-dirs/provider/latest/git-lfs-dirs.tar");
    }

    #[test]
    fn test_path_contains_only_safe_characters() {
        let p = artifact_path(
            "/",
            ArtifactCategory::Sdks,
            "builder name with spaces",
            Shard::Latest,
            &[],
        );
        assert!(p
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '/')));
    }

    #[test]
    fn test_category_archive_filenames() {
        assert_eq!(
            ArtifactCategory::RepoDir.archive_filename(),
            Some("repo-dir.tar")
        );
        assert_eq!(
            ArtifactCategory::GitLfsDirs.archive_filename(),
            Some("git-lfs-dirs.tar")
        );
        assert_eq!(ArtifactCategory::Sdks.archive_filename(), None);
    }

    #[test]
    fn test_recipe_archive_filenames_encode_product_and_recipe() {
        let recipe = Recipe::parse("os/sdk_debian").unwrap();
        assert_eq!(
            ArtifactCategory::Sdks.recipe_archive_filename(&recipe).unwrap(),
            "sdk:os.sdk_debian.tar"
        );
        assert_eq!(
            ArtifactCategory::Cache.recipe_archive_filename(&recipe).unwrap(),
            "cache:os.sdk_debian.tar"
        );
        assert!(ArtifactCategory::Build.recipe_archive_filename(&recipe).is_none());
    }
}
