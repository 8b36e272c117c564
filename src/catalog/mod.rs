//! Type Catalog
//!
//! Resolves the structural shape of named types: ordered field metadata
//! (name, declared type, wire tag, required flag) keyed by
//! `(package path, type name)`.
//!
//! Entries come from two places:
//! - local source trees, scanned statically ([`Catalog::scan_local_package`])
//! - external modules pinned at a version ([`Catalog::add_module`]) and
//!   resolved from a module cache ([`Catalog::resolve_modules`])
//!
//! The catalog never guesses: a type that was neither scanned locally nor
//! provided by a pinned module is a lookup error.

pub mod scan;
pub mod types;

pub use scan::{parse_struct_tag, scan_source, ScanConfig, ScanSummary, StructTag};
pub use types::{normalize_type, TypeShape, OPAQUE};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HubError, Result};
use crate::version::ModuleTag;

// =============================================================================
// Field and Type Metadata
// =============================================================================

/// Metadata for one wire-visible field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Source-level field name
    pub name: String,
    /// Normalized declared type (see [`types`])
    pub declared_type: String,
    /// Name of the field on the wire
    pub wire_tag: String,
    pub required: bool,
    /// Declared as `Option<T>` (descriptors: tagged `omitempty`)
    #[serde(default)]
    pub optional: bool,
}

impl FieldMeta {
    pub fn shape(&self) -> TypeShape {
        TypeShape::parse(&self.declared_type)
    }
}

/// A struct-shaped type known to the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    /// Owning package path
    pub package: String,
    /// Fields in declaration order
    pub fields: Vec<FieldMeta>,
    /// Has a flattened field, so unknown wire keys are legitimate
    #[serde(default)]
    pub open: bool,
}

impl TypeInfo {
    pub fn key(&self) -> TypeKey {
        TypeKey::new(&self.package, &self.name)
    }

    /// Find a field by wire tag first, then by source name
    pub fn field(&self, ident: &str) -> Option<&FieldMeta> {
        self.fields
            .iter()
            .find(|f| f.wire_tag == ident)
            .or_else(|| self.fields.iter().find(|f| f.name == ident))
    }
}

/// Catalog key: package path plus type name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeKey {
    pub package: String,
    pub name: String,
}

impl TypeKey {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }

    /// Resolve `TypeName` or `sub/package.TypeName`.
    ///
    /// A bare name lives in `base_package`; a qualified name is relative to `module_root`.
    pub fn resolve_qualified(qualified: &str, base_package: &str, module_root: &str) -> Self {
        let qualified = qualified.trim();
        let last_slash = qualified.rfind('/').map(|i| i + 1).unwrap_or(0);
        match qualified[last_slash..].rfind('.') {
            Some(dot) => {
                let dot = last_slash + dot;
                let package = qualified[..dot].trim_matches('/');
                let package = if package.is_empty() {
                    module_root.to_string()
                } else {
                    format!("{}/{}", module_root, package)
                };
                Self::new(package, &qualified[dot + 1..])
            }
            None => Self::new(base_package, qualified),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.package.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.package, self.name)
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Static field/shape resolver.
///
/// Built once (scan, pin, resolve) and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: BTreeMap<TypeKey, TypeInfo>,
    modules: BTreeMap<String, ModuleTag>,
    scan_config: ScanConfig,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_config(mut self, config: ScanConfig) -> Self {
        self.scan_config = config;
        self
    }

    /// Build a catalog from one local source tree
    pub fn load_from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.scan_local_package(dir)?;
        Ok(catalog)
    }

    /// Scan a local source tree; packages are directories relative to `dir`.
    pub fn scan_local_package(&mut self, dir: impl AsRef<Path>) -> Result<ScanSummary> {
        self.scan_tree(dir.as_ref(), None)
    }

    fn scan_tree(&mut self, dir: &Path, prefix: Option<&str>) -> Result<ScanSummary> {
        let (found, summary) = scan::scan_directory(dir, prefix, &self.scan_config)?;
        for info in found {
            self.insert(info);
        }
        info!(
            dir = %dir.display(),
            files = summary.files_scanned,
            types = summary.types_found,
            skipped = summary.skipped.len(),
            "catalog scan complete"
        );
        Ok(summary)
    }

    /// Pin an external module at a version tag.
    ///
    /// Pinning does not resolve fields; it makes later resolution deterministic.
    pub fn add_module(&mut self, module_path: &str, tag: &str) -> Result<()> {
        let module_path = module_path.trim_end_matches('/');
        let parsed = ModuleTag::parse(tag)
            .map_err(|e| HubError::InvalidModuleTag(format!("{} for module {}: {}", tag, module_path, e)))?;

        if let Some(existing) = self.modules.get(module_path) {
            if existing.raw != parsed.raw {
                let note = if existing.is_compatible_with(&parsed) {
                    "same major version"
                } else {
                    "incompatible major version"
                };
                return Err(HubError::InvalidModuleTag(format!(
                    "module {} is already pinned at {}, cannot pin {} ({})",
                    module_path, existing, parsed, note
                )));
            }
            return Ok(());
        }
        self.modules.insert(module_path.to_string(), parsed);
        Ok(())
    }

    /// The pinned tag of a module
    pub fn module_tag(&self, module_path: &str) -> Option<&ModuleTag> {
        self.modules.get(module_path)
    }

    /// Pinned modules, in module path order
    pub fn modules(&self) -> impl Iterator<Item = (&String, &ModuleTag)> {
        self.modules.iter()
    }

    /// Resolve every pinned module from `<cache_root>/<module>@<tag>/`.
    ///
    /// A module missing from the cache is reported but not fatal here: any
    /// lookup of its types fails later with a catalog lookup error.
    pub fn resolve_modules(&mut self, cache_root: impl AsRef<Path>) -> Result<ScanSummary> {
        let cache_root = cache_root.as_ref();
        let pinned: Vec<(String, ModuleTag)> = self
            .modules
            .iter()
            .map(|(m, t)| (m.clone(), t.clone()))
            .collect();

        let mut summary = ScanSummary::default();
        for (module, tag) in pinned {
            let dir = cache_root.join(tag.dir_name(&module));
            if !dir.is_dir() {
                warn!(module = %module, tag = %tag, dir = %dir.display(), "pinned module not found in module cache");
                continue;
            }
            summary.merge(self.scan_tree(&dir, Some(&module))?);
        }
        Ok(summary)
    }

    /// Register a type directly (generated descriptors, tests).
    ///
    /// The first definition of a key wins; later duplicates are reported.
    pub fn insert(&mut self, info: TypeInfo) {
        let key = info.key();
        if self.types.contains_key(&key) {
            warn!(type_key = %key, "duplicate type definition ignored");
            return;
        }
        self.types.insert(key, info);
    }

    /// Look up a type, failing with a descriptive error if unknown
    pub fn get(&self, key: &TypeKey) -> Result<&TypeInfo> {
        self.types.get(key).ok_or_else(|| self.lookup_error(key))
    }

    /// Look up a type, `None` if unknown
    pub fn find(&self, key: &TypeKey) -> Option<&TypeInfo> {
        self.types.get(key)
    }

    /// Resolve a named field type as written in a type of `package`.
    ///
    /// The owning package is searched first. Rust paths (`super::Address`)
    /// resolve by their last segment; descriptor-qualified names
    /// (`wire.LinkSpec`) are relative to the pinned module that owns `package`.
    /// Generic types (`chrono::DateTime<Utc>`) are never catalog types.
    pub fn resolve_named(&self, package: &str, name: &str) -> Option<&TypeInfo> {
        let name = name.trim();
        if name.contains('<') {
            return None;
        }
        let last = name.rsplit("::").next().unwrap_or(name);
        if let Some(info) = self.find(&TypeKey::new(package, last)) {
            return Some(info);
        }
        if !last.contains('.') {
            return None;
        }
        let key = match self.owning_module(package) {
            Some((module, _)) => TypeKey::resolve_qualified(last, package, module),
            None => {
                let dot = last.rfind('.')?;
                TypeKey::new(&last[..dot], &last[dot + 1..])
            }
        };
        self.find(&key)
    }

    /// Ordered fields of `package.type_name`
    pub fn get_fields(&self, package: &str, type_name: &str) -> Result<&[FieldMeta]> {
        self.get(&TypeKey::new(package, type_name))
            .map(|info| info.fields.as_slice())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All types in key order
    pub fn types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.values()
    }

    /// Types of one package
    pub fn package_types<'a>(&'a self, package: &'a str) -> impl Iterator<Item = &'a TypeInfo> + 'a {
        self.types.values().filter(move |t| t.package == package)
    }

    /// Fuzzy-match known type keys against a query
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        let matcher = SkimMatcherV2::default();
        let mut results: Vec<(i64, String)> = self
            .types
            .keys()
            .filter_map(|key| {
                let rendered = key.to_string();
                matcher.fuzzy_match(&rendered, query).map(|score| (score, rendered))
            })
            .collect();

        results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        results.into_iter().take(limit).map(|(_, k)| k).collect()
    }

    fn owning_module(&self, package: &str) -> Option<(&String, &ModuleTag)> {
        self.modules
            .iter()
            .filter(|(module, _)| package == module.as_str() || package.starts_with(&format!("{}/", module)))
            .max_by_key(|(module, _)| module.len())
    }

    fn lookup_error(&self, key: &TypeKey) -> HubError {
        let mut hint = String::new();
        if let Some((module, tag)) = self.owning_module(&key.package) {
            hint.push_str(&format!(" (module {} is pinned at {} but does not provide it)", module, tag));
        }
        let suggestions = self.suggest(&key.name, 3);
        if !suggestions.is_empty() {
            hint.push_str(&format!("; did you mean {}?", suggestions.join(", ")));
        }
        HubError::CatalogLookup {
            package: key.package.clone(),
            type_name: key.name.clone(),
            hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_spec(package: &str) -> TypeInfo {
        TypeInfo {
            name: "DeviceSpec".to_string(),
            package: package.to_string(),
            fields: vec![FieldMeta {
                name: "ip_address".to_string(),
                declared_type: "String".to_string(),
                wire_tag: "ipAddress".to_string(),
                required: true,
                optional: false,
            }],
            open: false,
        }
    }

    #[test]
    fn test_same_name_in_different_packages() {
        let mut catalog = Catalog::new();
        catalog.insert(device_spec("infra/v1"));
        let mut other = device_spec("infra/v1beta1");
        other.fields.clear();
        catalog.insert(other);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get_fields("infra/v1", "DeviceSpec").unwrap().len(), 1);
        assert!(catalog.get_fields("infra/v1beta1", "DeviceSpec").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let mut catalog = Catalog::new();
        catalog.insert(device_spec("infra/v1"));
        let err = catalog.get_fields("infra/v2", "DeviceSpec").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("must be declared via an explicit import"));
        assert!(msg.contains("did you mean infra/v1.DeviceSpec"));
    }

    #[test]
    fn test_add_module_pins_version() {
        let mut catalog = Catalog::new();
        catalog.add_module("github.com/acme/netkit", "v1.4.0").unwrap();
        assert_eq!(catalog.module_tag("github.com/acme/netkit").unwrap().raw, "v1.4.0");

        // same tag again is fine, a different one is not
        catalog.add_module("github.com/acme/netkit", "v1.4.0").unwrap();
        assert!(catalog.add_module("github.com/acme/netkit", "v1.5.0").is_err());
        assert!(catalog.add_module("github.com/acme/other", "main").is_err());
    }

    #[test]
    fn test_pinned_module_lookup_hint() {
        let mut catalog = Catalog::new();
        catalog.add_module("github.com/acme/netkit", "v1.4.0").unwrap();
        let err = catalog.get_fields("github.com/acme/netkit/types", "NetSpec").unwrap_err();
        assert!(err.to_string().contains("pinned at v1.4.0"));
    }

    #[test]
    fn test_resolve_named_prefers_owning_package() {
        let mut catalog = Catalog::new();
        for package in ["site/v1", "site/v1alpha1"] {
            catalog.insert(TypeInfo {
                name: "Address".to_string(),
                package: package.to_string(),
                fields: Vec::new(),
                open: false,
            });
        }
        catalog.insert(TypeInfo {
            name: "LinkSpec".to_string(),
            package: "github.com/acme/netkit/wire".to_string(),
            fields: Vec::new(),
            open: false,
        });
        catalog.add_module("github.com/acme/netkit", "v1.4.0").unwrap();

        let found = catalog.resolve_named("site/v1alpha1", "Address").unwrap();
        assert_eq!(found.package, "site/v1alpha1");
        let found = catalog.resolve_named("site/v1", "super::Address").unwrap();
        assert_eq!(found.package, "site/v1");
        let found = catalog.resolve_named("github.com/acme/netkit/api", "wire.LinkSpec").unwrap();
        assert_eq!(found.key(), TypeKey::new("github.com/acme/netkit/wire", "LinkSpec"));

        assert!(catalog.resolve_named("site/v2", "Address").is_none());
        assert!(catalog.resolve_named("site/v1", "chrono::DateTime<chrono::Utc>").is_none());
    }

    #[test]
    fn test_resolve_qualified() {
        let key = TypeKey::resolve_qualified("NetSpec", "github.com/acme/netkit/types", "github.com/acme/netkit");
        assert_eq!(key, TypeKey::new("github.com/acme/netkit/types", "NetSpec"));

        let key = TypeKey::resolve_qualified("api/v2.NetStatus", "ignored", "github.com/acme/netkit");
        assert_eq!(key, TypeKey::new("github.com/acme/netkit/api/v2", "NetStatus"));
    }
}
