//! Schema Version Registry
//!
//! Validated, read-only lookup table over `apis.yaml`: per API group the hub
//! (storage) version, the served spoke versions, the resource kinds, the
//! explicit rename overrides and the types each `(version, kind)` uses for
//! its Spec and Status.
//!
//! Built once at startup and shared by reference (`Arc`) with the generator
//! and the negotiation layer.

pub mod config;

pub use config::{
    ApiGroup, ApiImport, ApiResource, ApisConfig, ExposedType, FieldRename, ImportPackage,
    VersionMapping,
};

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::TypeKey;
use crate::error::Result;

// =============================================================================
// Identifiers
// =============================================================================

/// `(group, version, kind)`: the dispatch key for conversions
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// `group/version`, as used in the envelope's `apiVersion`
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

/// Split an `apiVersion` into `(group, version)`.
///
/// A bare version (`v1`) yields an empty group.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.trim().rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version.trim()),
    }
}

/// Envelope section a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Spec,
    Status,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Spec => "spec",
            Section::Status => "status",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rename endpoint: `spec.ipAddress`, `status.phase` or bare `ipAddress` (spec)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub section: Section,
    pub field: String,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        let path = path.trim();
        if let Some(field) = path.strip_prefix("spec.") {
            return Self {
                section: Section::Spec,
                field: field.to_string(),
            };
        }
        if let Some(field) = path.strip_prefix("status.") {
            return Self {
                section: Section::Status,
                field: field.to_string(),
            };
        }
        Self {
            section: Section::Spec,
            field: path.to_string(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.field)
    }
}

/// Spec/Status type pair used by one `(version, kind)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTypes {
    pub spec: TypeKey,
    pub status: Option<TypeKey>,
    /// Whether the types came from an explicit import, so they must resolve
    pub explicit: bool,
}

fn version_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^v[1-9][0-9]*((alpha|beta)[1-9][0-9]*)?$").ok())
        .as_ref()
}

// =============================================================================
// Registry
// =============================================================================

/// A validated API group
#[derive(Debug, Clone)]
pub struct RegisteredGroup {
    config: ApiGroup,
}

impl RegisteredGroup {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The hub (storage) version
    pub fn hub_version(&self) -> &str {
        &self.config.storage_version
    }

    /// Version served when a request does not name one
    pub fn preferred_version(&self) -> &str {
        self.config
            .preferred_version
            .as_deref()
            .unwrap_or(&self.config.storage_version)
    }

    /// Served versions in declaration order
    pub fn versions(&self) -> &[String] {
        &self.config.versions
    }

    pub fn is_served(&self, version: &str) -> bool {
        self.config.versions.iter().any(|v| v == version)
    }

    /// Local source package root (default: first DNS label of the group name)
    pub fn package(&self) -> &str {
        match &self.config.package {
            Some(package) => package.trim_matches('/'),
            None => self.config.name.split('.').next().unwrap_or(&self.config.name),
        }
    }

    pub fn resources(&self) -> &[ApiResource] {
        &self.config.resources
    }

    pub fn resource(&self, kind: &str) -> Option<&ApiResource> {
        self.config.resources.iter().find(|r| r.kind == kind)
    }

    pub fn imports(&self) -> &[ApiImport] {
        &self.config.imports
    }

    /// Rename overrides for `kind` at spoke `version`
    pub fn renames(&self, kind: &str, version: &str) -> &[FieldRename] {
        self.resource(kind)
            .and_then(|r| r.mappings.get(version))
            .map(|m| m.renames.as_slice())
            .unwrap_or(&[])
    }

    pub fn gvk(&self, version: &str, kind: &str) -> GroupVersionKind {
        GroupVersionKind::new(&self.config.name, version, kind)
    }

    /// Types that carry Spec/Status for `kind` at `version`.
    ///
    /// An import exposing the kind for that version wins; otherwise the local
    /// `<package>/<version>` types `<Kind>Spec` / `<Kind>Status` are used.
    pub fn section_types(&self, version: &str, kind: &str) -> SectionTypes {
        for import in &self.config.imports {
            for package in &import.packages {
                let exposed = package.expose.iter().find(|e| {
                    e.kind == kind && e.version.as_deref().unwrap_or(&self.config.storage_version) == version
                });
                let Some(exposed) = exposed else {
                    continue;
                };

                let module_root = import.module.trim_end_matches('/');
                let path = package.path.trim_matches('/');
                let base = if path.is_empty() {
                    module_root.to_string()
                } else {
                    format!("{}/{}", module_root, path)
                };
                let spec = match &exposed.spec_from {
                    Some(q) => TypeKey::resolve_qualified(q, &base, module_root),
                    None => TypeKey::new(&base, format!("{}Spec", kind)),
                };
                let status = exposed
                    .status_from
                    .as_ref()
                    .map(|q| TypeKey::resolve_qualified(q, &base, module_root));
                return SectionTypes {
                    spec,
                    status,
                    explicit: true,
                };
            }
        }

        let package = format!("{}/{}", self.package(), version);
        SectionTypes {
            spec: TypeKey::new(&package, format!("{}Spec", kind)),
            status: Some(TypeKey::new(&package, format!("{}Status", kind))),
            explicit: false,
        }
    }
}

/// All validated API groups
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    groups: Vec<RegisteredGroup>,
}

impl VersionRegistry {
    /// Validate a configuration and build the registry from it
    pub fn from_config(config: ApisConfig) -> Result<Self> {
        config.validate()?;

        if let Some(pattern) = version_pattern() {
            for group in &config.groups {
                for version in group.versions.iter().filter(|v| !pattern.is_match(v)) {
                    warn!(group = %group.name, version = %version, "version does not follow the vN[alphaN|betaN] convention");
                }
            }
        }

        let groups: Vec<RegisteredGroup> = config
            .groups
            .into_iter()
            .map(|config| RegisteredGroup { config })
            .collect();

        info!(
            groups = groups.len(),
            kinds = groups.iter().map(|g| g.resources().len()).sum::<usize>(),
            "API registry loaded"
        );
        Ok(Self { groups })
    }

    /// Load and validate an `apis.yaml` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(ApisConfig::load(path)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_config(ApisConfig::from_yaml_str(content)?)
    }

    pub fn group(&self, name: &str) -> Option<&RegisteredGroup> {
        self.groups.iter().find(|g| g.name() == name)
    }

    pub fn groups(&self) -> &[RegisteredGroup] {
        &self.groups
    }

    /// Every served `(group, version, kind)`, in configuration order
    pub fn gvks(&self) -> Vec<GroupVersionKind> {
        let mut out = Vec::new();
        for group in &self.groups {
            for resource in group.resources() {
                for version in group.versions() {
                    out.push(group.gvk(version, &resource.kind));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APIS: &str = r#"
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
      - kind: Link
    imports:
      - module: github.com/acme/netkit
        tag: v1.4.0
        packages:
          - path: types
            expose:
              - { kind: Link, specFrom: NetSpec, statusFrom: api/v2.NetStatus }
"#;

    #[test]
    fn test_group_lookup() {
        let registry = VersionRegistry::from_yaml_str(APIS).unwrap();
        let group = registry.group("infra.example.io").unwrap();
        assert_eq!(group.hub_version(), "v1");
        assert_eq!(group.preferred_version(), "v1");
        assert!(group.is_served("v1beta1"));
        assert!(!group.is_served("v9"));
        assert_eq!(group.package(), "infra");
        assert_eq!(group.renames("Device", "v1alpha1").len(), 1);
        assert!(group.renames("Device", "v1beta1").is_empty());
        assert!(registry.group("other.example.io").is_none());
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let err = VersionRegistry::from_yaml_str("groups: []").unwrap_err();
        assert!(err.to_string().contains("at least one API group"));
    }

    #[test]
    fn test_local_section_types() {
        let registry = VersionRegistry::from_yaml_str(APIS).unwrap();
        let group = registry.group("infra.example.io").unwrap();
        let types = group.section_types("v1beta1", "Device");
        assert_eq!(types.spec, TypeKey::new("infra/v1beta1", "DeviceSpec"));
        assert_eq!(types.status, Some(TypeKey::new("infra/v1beta1", "DeviceStatus")));
        assert!(!types.explicit);
    }

    #[test]
    fn test_imported_section_types() {
        let registry = VersionRegistry::from_yaml_str(APIS).unwrap();
        let group = registry.group("infra.example.io").unwrap();
        let types = group.section_types("v1", "Link");
        assert_eq!(types.spec, TypeKey::new("github.com/acme/netkit/types", "NetSpec"));
        assert_eq!(types.status, Some(TypeKey::new("github.com/acme/netkit/api/v2", "NetStatus")));
        assert!(types.explicit);

        // the import only stands in for the storage version
        assert!(!group.section_types("v1alpha1", "Link").explicit);
    }

    #[test]
    fn test_field_path_parse() {
        assert_eq!(
            FieldPath::parse("status.phase"),
            FieldPath {
                section: Section::Status,
                field: "phase".into()
            }
        );
        assert_eq!(FieldPath::parse("ipAddress").section, Section::Spec);
        assert_eq!(FieldPath::parse("spec.ip").to_string(), "spec.ip");
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(split_api_version("infra.example.io/v1beta1"), ("infra.example.io", "v1beta1"));
        assert_eq!(split_api_version("v1"), ("", "v1"));
    }

    #[test]
    fn test_gvks() {
        let registry = VersionRegistry::from_yaml_str(APIS).unwrap();
        let gvks = registry.gvks();
        assert_eq!(gvks.len(), 6);
        assert_eq!(gvks[0].to_string(), "infra.example.io/v1alpha1/Device");
        assert_eq!(gvks[0].api_version(), "infra.example.io/v1alpha1");
    }
}
