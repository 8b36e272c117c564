//! API group configuration (`apis.yaml`)
//!
//! ## Example
//! ```yaml
//! groups:
//!   - name: infra.example.io
//!     storageVersion: v1
//!     versions: [v1alpha1, v1beta1, v1]
//!     resources:
//!       - kind: Device
//!         mappings:
//!           v1alpha1:
//!             renames:
//!               - { from: spec.ipAddress, to: spec.ip }
//!     imports:
//!       - module: github.com/acme/netkit
//!         tag: v1.4.0
//!         packages:
//!           - path: types
//!             expose:
//!               - { kind: Link, specFrom: NetSpec, statusFrom: NetStatus }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};
use crate::version::ModuleTag;

/// Root of the API configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApisConfig {
    #[serde(default)]
    pub groups: Vec<ApiGroup>,
}

/// One API group: a hub version plus the spoke versions it serves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGroup {
    #[serde(default)]
    pub name: String,
    /// Hub (storage) version
    #[serde(default)]
    pub storage_version: String,
    /// Served versions, in declaration order
    #[serde(default)]
    pub versions: Vec<String>,
    /// Version used when a request names none (defaults to the storage version)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_version: Option<String>,
    /// Local package root of the group's types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default)]
    pub resources: Vec<ApiResource>,
    #[serde(default)]
    pub imports: Vec<ApiImport>,
}

/// A resource kind and its per-version rename overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    pub kind: String,
    /// Keyed by spoke version
    #[serde(default)]
    pub mappings: BTreeMap<String, VersionMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionMapping {
    #[serde(default)]
    pub renames: Vec<FieldRename>,
}

/// Explicit field rename: spoke field `from` maps to hub field `to`.
///
/// Both sides accept an optional `spec.` / `status.` prefix (default `spec`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRename {
    pub from: String,
    pub to: String,
}

/// An external module whose types stand in for spoke or hub Spec/Status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiImport {
    pub module: String,
    pub tag: String,
    #[serde(default)]
    pub packages: Vec<ImportPackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportPackage {
    /// Package path relative to the module root (empty for the root)
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub expose: Vec<ExposedType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposedType {
    pub kind: String,
    /// Version these types stand in for (defaults to the storage version)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_from: Option<String>,
}

impl ApisConfig {
    /// Parse YAML (JSON is accepted too, being a YAML subset)
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Read a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Validate the whole configuration; the first violation aborts.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(HubError::Config {
                context: "groups".to_string(),
                reason: "at least one API group must be declared".to_string(),
            });
        }

        let mut names = HashSet::new();
        for (index, group) in self.groups.iter().enumerate() {
            group.validate(index)?;
            if !names.insert(group.name.as_str()) {
                return Err(HubError::group_config(index, &group.name, "group name is declared twice"));
            }
        }
        Ok(())
    }
}

impl ApiGroup {
    /// Structural checks for one group, in order.
    pub fn validate(&self, index: usize) -> Result<()> {
        let fail = |reason: String| Err(HubError::group_config(index, &self.name, reason));

        if self.name.trim().is_empty() {
            return fail("name is empty".to_string());
        }
        if self.storage_version.trim().is_empty() {
            return fail("storageVersion is empty".to_string());
        }
        if self.versions.is_empty() {
            return fail("versions list is empty".to_string());
        }
        if !self.versions.contains(&self.storage_version) {
            return fail(format!(
                "storageVersion '{}' is not one of the declared versions {:?}",
                self.storage_version, self.versions
            ));
        }

        let mut seen = HashSet::new();
        for version in &self.versions {
            if version.trim().is_empty() {
                return fail("versions contains an empty entry".to_string());
            }
            if !seen.insert(version.as_str()) {
                return fail(format!("version '{}' is declared twice", version));
            }
        }

        if let Some(preferred) = &self.preferred_version {
            if !self.versions.contains(preferred) {
                return fail(format!("preferredVersion '{}' is not one of the declared versions", preferred));
            }
        }

        let mut kinds = HashSet::new();
        for resource in &self.resources {
            if resource.kind.trim().is_empty() {
                return fail("resource kind is empty".to_string());
            }
            if !kinds.insert(resource.kind.as_str()) {
                return fail(format!("resource kind '{}' is declared twice", resource.kind));
            }
            for (version, mapping) in &resource.mappings {
                if !self.versions.contains(version) {
                    return fail(format!(
                        "{} mappings reference unregistered version '{}'",
                        resource.kind, version
                    ));
                }
                for rename in &mapping.renames {
                    if rename.from.trim().is_empty() || rename.to.trim().is_empty() {
                        return fail(format!("{} {} rename has an empty side", resource.kind, version));
                    }
                }
            }
        }

        for import in &self.imports {
            if import.module.trim().is_empty() {
                return fail("import module path is empty".to_string());
            }
            if let Err(e) = ModuleTag::parse(&import.tag) {
                return fail(format!("import {} has invalid tag '{}': {}", import.module, import.tag, e));
            }
            for package in &import.packages {
                for exposed in &package.expose {
                    if !kinds.contains(exposed.kind.as_str()) {
                        return fail(format!(
                            "import {} exposes unregistered kind '{}'",
                            import.module, exposed.kind
                        ));
                    }
                    if let Some(version) = &exposed.version {
                        if !self.versions.contains(version) {
                            return fail(format!(
                                "import {} exposes {} for unregistered version '{}'",
                                import.module, exposed.kind, version
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
groups:
  - name: infra.example.io
    storageVersion: v1
    versions: [v1alpha1, v1beta1, v1]
    resources:
      - kind: Device
        mappings:
          v1alpha1:
            renames:
              - { from: spec.ipAddress, to: spec.ip }
"#;

    #[test]
    fn test_parse_and_validate() {
        let config = ApisConfig::from_yaml_str(VALID).unwrap();
        config.validate().unwrap();
        let group = &config.groups[0];
        assert_eq!(group.storage_version, "v1");
        assert_eq!(group.resources[0].mappings["v1alpha1"].renames[0].to, "spec.ip");
    }

    #[test]
    fn test_zero_groups_rejected() {
        let config = ApisConfig::from_yaml_str("groups: []").unwrap();
        assert!(matches!(config.validate(), Err(HubError::Config { .. })));
    }

    #[test]
    fn test_storage_version_must_be_declared() {
        let config = ApisConfig::from_yaml_str(
            r#"
groups:
  - name: infra.example.io
    storageVersion: v1
    versions: [v1alpha1, v1beta1, v1]
  - name: net.example.io
    storageVersion: v2
    versions: [v1]
"#,
        )
        .unwrap();
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("groups[1]"));
        assert!(msg.contains("net.example.io"));
        assert!(msg.contains("storageVersion 'v2'"));
    }

    #[test]
    fn test_checks_run_in_order() {
        let empty_name = ApiGroup::default();
        assert!(empty_name.validate(0).unwrap_err().to_string().contains("name is empty"));

        let no_storage = ApiGroup {
            name: "g".into(),
            ..Default::default()
        };
        assert!(no_storage.validate(0).unwrap_err().to_string().contains("storageVersion is empty"));

        let no_versions = ApiGroup {
            name: "g".into(),
            storage_version: "v1".into(),
            ..Default::default()
        };
        assert!(no_versions.validate(0).unwrap_err().to_string().contains("versions list is empty"));
    }

    #[test]
    fn test_preferred_and_mapping_versions_checked() {
        let mut group = ApiGroup {
            name: "g".into(),
            storage_version: "v1".into(),
            versions: vec!["v1".into()],
            preferred_version: Some("v2".into()),
            ..Default::default()
        };
        assert!(group.validate(0).unwrap_err().to_string().contains("preferredVersion"));

        group.preferred_version = None;
        let mut mappings = BTreeMap::new();
        mappings.insert("v0".to_string(), VersionMapping::default());
        group.resources.push(ApiResource {
            kind: "Device".into(),
            mappings,
        });
        assert!(group.validate(0).unwrap_err().to_string().contains("unregistered version 'v0'"));
    }

    #[test]
    fn test_import_tag_checked() {
        let config = ApisConfig::from_yaml_str(
            r#"
groups:
  - name: infra.example.io
    storageVersion: v1
    versions: [v1]
    resources: [{ kind: Link }]
    imports:
      - module: github.com/acme/netkit
        tag: main
"#,
        )
        .unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("invalid tag 'main'"));
    }
}
