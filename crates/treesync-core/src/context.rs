//! Per-build invocation inputs supplied by the CI engine.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Boolean/string flags attached to one build by the invoking CI engine.
///
/// All flags default to off; a build with no flags performs a plain
/// from-scratch synchronization and neither reuses nor produces artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildFlags {
    /// Wipe the workspace before synchronizing.
    pub cleanup_workspace: bool,

    /// Bootstrap the tree from quicksync artifacts instead of the network.
    pub use_quicksync_artifacts: bool,

    /// Re-download both quicksync archives even if present locally.
    pub force_quicksync_download: bool,

    /// Apply a local manifest override after the main synchronization.
    pub use_local_manifest: bool,

    /// Literal manifest XML for the local manifest override.
    pub local_manifest_xml: Option<String>,

    pub produce_sdks_artifacts: bool,
    pub produce_cache_artifacts: bool,
    pub produce_build_artifacts: bool,

    pub reuse_sdks_artifacts: bool,
    pub reuse_cache_artifacts: bool,
}

impl BuildFlags {
    /// Whether the local-manifest tail step has everything it needs.
    pub fn local_manifest_provided(&self) -> bool {
        self.use_local_manifest
            && self
                .local_manifest_xml
                .as_deref()
                .is_some_and(|xml| !xml.trim().is_empty())
    }
}

/// Ambient parameters of one build, immutable for the duration of one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildContext {
    /// Manifest repository URL handed to the manifest-sync tool.
    pub repository_url: String,

    /// Manifest branch.
    pub branch: String,

    /// Identity of the builder running this pass; used for path derivation.
    pub builder_name: String,

    /// Current build number, if the CI engine supplied one.
    pub build_number: Option<u64>,

    pub flags: BuildFlags,

    /// Builder whose latest quicksync artifacts seed this build.
    pub quicksync_from: Option<String>,

    /// Builder whose latest SDK artifacts are reused pre-build.
    pub sdks_from: Option<String>,

    /// Builder whose latest cache artifacts are reused pre-build.
    pub cache_from: Option<String>,
}

impl BuildContext {
    pub fn new(
        repository_url: impl Into<String>,
        branch: impl Into<String>,
        builder_name: impl Into<String>,
    ) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: branch.into(),
            builder_name: builder_name.into(),
            build_number: None,
            flags: BuildFlags::default(),
            quicksync_from: None,
            sdks_from: None,
            cache_from: None,
        }
    }

    pub fn with_build_number(mut self, number: u64) -> Self {
        self.build_number = Some(number);
        self
    }

    pub fn with_flags(mut self, flags: BuildFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The providing builder for quicksync downloads.
    ///
    /// Required whenever `use_quicksync_artifacts` is set; the cross-builder
    /// naming convention itself is a contract of the calling configuration.
    pub fn quicksync_provider(&self) -> Result<&str> {
        self.quicksync_from.as_deref().ok_or_else(|| {
            SyncError::ConfigurationMissing(
                "quicksync mode requested but no providing builder name given".to_string(),
            )
        })
    }
}

/// A `product/recipe` pair identifying one SDK or cache artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub product: String,
    pub name: String,
}

impl Recipe {
    /// Parse a `"product/recipe"` string.
    pub fn parse(spec: &str) -> Result<Self> {
        match spec.split_once('/') {
            Some((product, name)) if !product.is_empty() && !name.is_empty() => Ok(Self {
                product: product.to_string(),
                name: name.to_string(),
            }),
            _ => Err(SyncError::InvalidRecipe(spec.to_string())),
        }
    }
}

impl std::fmt::Display for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.product, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_default_to_off() {
        let flags = BuildFlags::default();
        assert!(!flags.cleanup_workspace);
        assert!(!flags.use_quicksync_artifacts);
        assert!(!flags.force_quicksync_download);
        assert!(!flags.produce_build_artifacts);
        assert!(!flags.reuse_cache_artifacts);
        assert!(!flags.local_manifest_provided());
    }

    #[test]
    fn test_local_manifest_needs_both_flag_and_xml() {
        let mut flags = BuildFlags {
            use_local_manifest: true,
            ..Default::default()
        };
        assert!(!flags.local_manifest_provided());

        flags.local_manifest_xml = Some("  ".to_string());
        assert!(!flags.local_manifest_provided());

        flags.local_manifest_xml = Some("<manifest/>".to_string());
        assert!(flags.local_manifest_provided());

        flags.use_local_manifest = false;
        assert!(!flags.local_manifest_provided());
    }

    #[test]
    fn test_quicksync_provider_required() {
        let ctx = BuildContext::new("https://git.example/manifest", "main", "builder");
        assert!(matches!(
            ctx.quicksync_provider(),
            Err(SyncError::ConfigurationMissing(_))
        ));

        let mut ctx = ctx;
        ctx.quicksync_from = Some("provider-builder".to_string());
        assert_eq!(ctx.quicksync_provider().unwrap(), "provider-builder");
    }

    #[test]
    fn test_recipe_parse() {
        let recipe = Recipe::parse("os/core").unwrap();
        assert_eq!(recipe.product, "os");
        assert_eq!(recipe.name, "core");
        assert_eq!(recipe.to_string(), "os/core");
    }

    #[test]
    fn test_recipe_parse_rejects_malformed() {
        assert!(Recipe::parse("no-slash").is_err());
        assert!(Recipe::parse("/missing-product").is_err());
        assert!(Recipe::parse("missing-name/").is_err());
    }
}
