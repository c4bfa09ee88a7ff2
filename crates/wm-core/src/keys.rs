//! Legacy and canonical blob key layout.
//!
//! Legacy keys are namespaced per owner:
//! `{legacy_root}/{owner}/{resource}/functions/{branch}.js`. Canonical keys
//! drop the owner segment and group artifacts per resource:
//! `{new_root}/{resource}/branches/{branch}/function.js`.

use serde::{Deserialize, Serialize};
use std::fmt;
use wm_connectors::SubResourceKind;

/// A relocatable artifact of a sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A branch's function bundle.
    BranchFunction,
    /// A version's function bundle.
    VersionFunctions,
    /// A version's app config document.
    VersionAppConfig,
}

const BRANCH_ARTIFACTS: &[ArtifactKind] = &[ArtifactKind::BranchFunction];
const VERSION_ARTIFACTS: &[ArtifactKind] =
    &[ArtifactKind::VersionFunctions, ArtifactKind::VersionAppConfig];

impl ArtifactKind {
    /// Artifacts carried by a sub-resource kind, in relocation order.
    pub fn for_sub_resource(kind: SubResourceKind) -> &'static [ArtifactKind] {
        match kind {
            SubResourceKind::Branch => BRANCH_ARTIFACTS,
            SubResourceKind::Version => VERSION_ARTIFACTS,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::BranchFunction | ArtifactKind::VersionFunctions => {
                "application/javascript"
            }
            ArtifactKind::VersionAppConfig => "application/json",
        }
    }

    pub fn sub_resource_kind(&self) -> SubResourceKind {
        match self {
            ArtifactKind::BranchFunction => SubResourceKind::Branch,
            ArtifactKind::VersionFunctions | ArtifactKind::VersionAppConfig => {
                SubResourceKind::Version
            }
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::BranchFunction => write!(f, "branch_function"),
            ArtifactKind::VersionFunctions => write!(f, "version_functions"),
            ArtifactKind::VersionAppConfig => write!(f, "version_appconfig"),
        }
    }
}

/// Old and new key of one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKeys {
    pub old_key: String,
    pub new_key: String,
    pub content_type: &'static str,
}

/// Roots of the legacy and canonical namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    legacy_root: String,
    new_root: String,
}

impl KeyLayout {
    pub fn new(legacy_root: impl Into<String>, new_root: impl Into<String>) -> Self {
        Self {
            legacy_root: legacy_root.into().trim_matches('/').to_string(),
            new_root: new_root.into().trim_matches('/').to_string(),
        }
    }

    /// Legacy key of an artifact.
    pub fn legacy_key(
        &self,
        artifact: ArtifactKind,
        owner_id: &str,
        resource_id: &str,
        sub_id: &str,
    ) -> String {
        let file = match artifact {
            ArtifactKind::BranchFunction => format!("functions/{}.js", sub_id),
            ArtifactKind::VersionFunctions => format!("functions/functions_v{}.js", sub_id),
            ArtifactKind::VersionAppConfig => format!("appconfig/appconfig_v{}.json", sub_id),
        };
        join(&self.legacy_root, &[owner_id, resource_id, &file])
    }

    /// Canonical key of an artifact.
    pub fn new_key(&self, artifact: ArtifactKind, resource_id: &str, sub_id: &str) -> String {
        let file = match artifact {
            ArtifactKind::BranchFunction => format!("branches/{}/function.js", sub_id),
            ArtifactKind::VersionFunctions => format!("versions/{}/functions.js", sub_id),
            ArtifactKind::VersionAppConfig => format!("versions/{}/appconfig.json", sub_id),
        };
        join(&self.new_root, &[resource_id, &file])
    }

    pub fn keys(
        &self,
        artifact: ArtifactKind,
        owner_id: &str,
        resource_id: &str,
        sub_id: &str,
    ) -> ArtifactKeys {
        ArtifactKeys {
            old_key: self.legacy_key(artifact, owner_id, resource_id, sub_id),
            new_key: self.new_key(artifact, resource_id, sub_id),
            content_type: artifact.content_type(),
        }
    }
}

fn join(root: &str, parts: &[&str]) -> String {
    let tail = parts.join("/");
    if root.is_empty() {
        tail
    } else {
        format!("{}/{}", root, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_keys() {
        let layout = KeyLayout::new("public", "public");
        let keys = layout.keys(ArtifactKind::BranchFunction, "u-1", "p-1", "main");
        assert_eq!(keys.old_key, "public/u-1/p-1/functions/main.js");
        assert_eq!(keys.new_key, "public/p-1/branches/main/function.js");
        assert_eq!(keys.content_type, "application/javascript");
    }

    #[test]
    fn test_version_keys() {
        let layout = KeyLayout::new("legacy/", "canonical");
        let functions = layout.keys(ArtifactKind::VersionFunctions, "u-1", "p-1", "3");
        assert_eq!(functions.old_key, "legacy/u-1/p-1/functions/functions_v3.js");
        assert_eq!(functions.new_key, "canonical/p-1/versions/3/functions.js");

        let config = layout.keys(ArtifactKind::VersionAppConfig, "u-1", "p-1", "3");
        assert_eq!(config.old_key, "legacy/u-1/p-1/appconfig/appconfig_v3.json");
        assert_eq!(config.new_key, "canonical/p-1/versions/3/appconfig.json");
        assert_eq!(config.content_type, "application/json");
    }

    #[test]
    fn test_empty_root_has_no_leading_slash() {
        let layout = KeyLayout::new("", "");
        assert_eq!(
            layout.new_key(ArtifactKind::BranchFunction, "p-1", "b"),
            "p-1/branches/b/function.js"
        );
        assert_eq!(
            layout.legacy_key(ArtifactKind::BranchFunction, "u-1", "p-1", "b"),
            "u-1/p-1/functions/b.js"
        );
    }

    #[test]
    fn test_new_key_drops_owner() {
        let layout = KeyLayout::new("r", "r");
        assert_eq!(
            layout.new_key(ArtifactKind::VersionFunctions, "p-1", "2"),
            layout.keys(ArtifactKind::VersionFunctions, "someone-else", "p-1", "2").new_key
        );
    }

    #[test]
    fn test_artifacts_per_kind() {
        assert_eq!(
            ArtifactKind::for_sub_resource(SubResourceKind::Version),
            &[ArtifactKind::VersionFunctions, ArtifactKind::VersionAppConfig]
        );
        assert_eq!(ArtifactKind::for_sub_resource(SubResourceKind::Branch).len(), 1);
        assert_eq!(
            ArtifactKind::VersionAppConfig.sub_resource_kind(),
            SubResourceKind::Version
        );
    }
}
