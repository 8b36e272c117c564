//! Source Scanning
//!
//! Walks a source tree and extracts struct field metadata without compiling
//! anything. Two inputs are understood:
//!
//! - Rust sources (`*.rs`), parsed with `syn`; wire tags come from serde attributes.
//! - Catalog descriptors (`*.types.yaml`), for modules that do not ship Rust
//!   sources; wire tags are raw struct tags such as `json:"ipAddress,omitempty"`.
//!
//! The package of a file is its directory relative to the scan root. Files that
//! fail to parse are skipped and reported, never fatal to the whole scan.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::types::{normalize_type, unwrap_optional, OPAQUE};
use super::{FieldMeta, TypeInfo};
use crate::error::{HubError, Result};

/// Configuration for source scanning
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Skip files matching these relative path prefixes
    pub skip_prefixes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: vec![
                "target/".to_string(),
                ".git/".to_string(),
                "node_modules/".to_string(),
            ],
        }
    }
}

/// Outcome of scanning one tree
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub files_scanned: usize,
    pub types_found: usize,
    /// Files that could not be parsed
    pub skipped: Vec<PathBuf>,
}

impl ScanSummary {
    pub fn merge(&mut self, other: ScanSummary) {
        self.files_scanned += other.files_scanned;
        self.types_found += other.types_found;
        self.skipped.extend(other.skipped);
    }
}

/// Scan a directory tree, returning every struct-shaped type found.
///
/// `package_prefix` is prepended to the directory-derived package path
/// (used for external modules, whose packages live under the module path).
pub fn scan_directory(
    root: &Path,
    package_prefix: Option<&str>,
    config: &ScanConfig,
) -> Result<(Vec<TypeInfo>, ScanSummary)> {
    if !root.is_dir() {
        return Err(HubError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source directory {} does not exist", root.display()),
        )));
    }

    let mut types = Vec::new();
    let mut summary = ScanSummary::default();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative_str = slash_path(relative);
        if config.skip_prefixes.iter().any(|p| relative_str.starts_with(p.as_str())) {
            continue;
        }

        let file_name = relative_str.rsplit('/').next().unwrap_or_default();
        let is_rust = file_name.ends_with(".rs");
        let is_descriptor = file_name.ends_with(".types.yaml") || file_name.ends_with(".types.yml");
        if !is_rust && !is_descriptor {
            continue;
        }

        let package = package_for(relative.parent(), package_prefix);
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable source file");
                summary.skipped.push(path.to_path_buf());
                continue;
            }
        };
        summary.files_scanned += 1;

        let parsed = if is_rust {
            scan_source(&package, &content).map_err(|e| e.to_string())
        } else {
            load_descriptor(&package, package_prefix, &content).map_err(|e| e.to_string())
        };

        match parsed {
            Ok(found) => {
                debug!(path = %relative_str, package = %package, types = found.len(), "scanned source file");
                summary.types_found += found.len();
                types.extend(found);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparsable source file");
                summary.skipped.push(path.to_path_buf());
            }
        }
    }

    Ok((types, summary))
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn package_for(dir: Option<&Path>, prefix: Option<&str>) -> String {
    let dir = dir.map(slash_path).unwrap_or_default();
    join_package(prefix, &dir)
}

fn join_package(prefix: Option<&str>, rest: &str) -> String {
    match prefix {
        Some(p) if rest.is_empty() => p.to_string(),
        Some(p) => format!("{}/{}", p, rest),
        None => rest.to_string(),
    }
}

// =============================================================================
// Rust Sources
// =============================================================================

/// Parse one Rust source file and collect every named-field struct,
/// including structs inside inline `mod` blocks.
pub fn scan_source(package: &str, src: &str) -> syn::Result<Vec<TypeInfo>> {
    let file = syn::parse_file(src)?;
    let mut out = Vec::new();
    collect_items(package, &file.items, &mut out);
    Ok(out)
}

fn collect_items(package: &str, items: &[syn::Item], out: &mut Vec<TypeInfo>) {
    for item in items {
        match item {
            syn::Item::Struct(s) => {
                if let Some(info) = struct_info(package, s) {
                    out.push(info);
                }
            }
            syn::Item::Mod(m) => {
                if let Some((_, inner)) = &m.content {
                    collect_items(package, inner, out);
                }
            }
            _ => {}
        }
    }
}

fn struct_info(package: &str, s: &syn::ItemStruct) -> Option<TypeInfo> {
    let syn::Fields::Named(named) = &s.fields else {
        return None;
    };
    let container = container_attrs(&s.attrs);

    let mut fields = Vec::with_capacity(named.named.len());
    let mut open = false;
    for field in &named.named {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = field_attrs(&field.attrs);
        if attrs.skip {
            continue;
        }
        let name = ident.unraw().to_string();
        let (inner, optional) = unwrap_optional(&field.ty);
        let declared_type = if attrs.flatten {
            open = true;
            OPAQUE.to_string()
        } else {
            normalize_type(inner)
        };
        let wire_tag = attrs.rename.clone().unwrap_or_else(|| match &container.rename_all {
            Some(rule) => apply_rename_rule(rule, &name),
            None => name.clone(),
        });
        let required = !(optional
            || attrs.default
            || container.default
            || attrs.skip_serializing_if
            || attrs.flatten);

        fields.push(FieldMeta {
            name,
            declared_type,
            wire_tag,
            required,
            optional,
        });
    }

    Some(TypeInfo {
        name: s.ident.unraw().to_string(),
        package: package.to_string(),
        fields,
        open,
    })
}

#[derive(Debug, Default)]
struct ContainerAttrs {
    rename_all: Option<String>,
    default: bool,
}

#[derive(Debug, Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
    default: bool,
    skip_serializing_if: bool,
    flatten: bool,
}

fn container_attrs(attrs: &[syn::Attribute]) -> ContainerAttrs {
    let mut out = ContainerAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                out.rename_all = rename_value(&meta)?;
            } else if meta.path.is_ident("default") {
                out.default = true;
                skip_value(&meta)?;
            } else {
                skip_value(&meta)?;
            }
            Ok(())
        });
        if let Err(e) = parsed {
            debug!(error = %e, "ignoring unparsable serde container attribute");
        }
    }
    out
}

fn field_attrs(attrs: &[syn::Attribute]) -> FieldAttrs {
    let mut out = FieldAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                out.rename = rename_value(&meta)?;
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                out.skip = true;
            } else if meta.path.is_ident("flatten") {
                out.flatten = true;
            } else if meta.path.is_ident("default") {
                out.default = true;
                skip_value(&meta)?;
            } else if meta.path.is_ident("skip_serializing_if") {
                out.skip_serializing_if = true;
                skip_value(&meta)?;
            } else {
                skip_value(&meta)?;
            }
            Ok(())
        });
        if let Err(e) = parsed {
            debug!(error = %e, "ignoring unparsable serde field attribute");
        }
    }
    out
}

/// `rename = "x"` or `rename(serialize = "a", deserialize = "b")`; the
/// deserialize name wins because it is what clients send.
fn rename_value(meta: &ParseNestedMeta) -> syn::Result<Option<String>> {
    if meta.input.peek(syn::Token![=]) {
        let lit: syn::LitStr = meta.value()?.parse()?;
        return Ok(Some(lit.value()));
    }
    let mut found: Option<String> = None;
    let mut from_deserialize = false;
    meta.parse_nested_meta(|nested| {
        if nested.path.is_ident("deserialize") {
            let lit: syn::LitStr = nested.value()?.parse()?;
            found = Some(lit.value());
            from_deserialize = true;
        } else if nested.path.is_ident("serialize") {
            let lit: syn::LitStr = nested.value()?.parse()?;
            if !from_deserialize {
                found = Some(lit.value());
            }
        } else {
            skip_value(&nested)?;
        }
        Ok(())
    })?;
    Ok(found)
}

fn skip_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|nested| skip_value(&nested))?;
    }
    Ok(())
}

/// Apply a serde `rename_all` rule to a snake_case field name.
pub fn apply_rename_rule(rule: &str, field: &str) -> String {
    match rule {
        "lowercase" => field.to_ascii_lowercase(),
        "UPPERCASE" | "SCREAMING_SNAKE_CASE" => field.to_ascii_uppercase(),
        "PascalCase" => pascal_case(field),
        "camelCase" => {
            let pascal = pascal_case(field);
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                None => pascal,
            }
        }
        "kebab-case" => field.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => field.to_ascii_uppercase().replace('_', "-"),
        _ => field.to_string(),
    }
}

fn pascal_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = true;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }
    result
}

// =============================================================================
// Struct Tags and Descriptors
// =============================================================================

/// A parsed raw struct tag (`json:"name,omitempty"`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructTag {
    /// Wire name, `None` when the tag leaves the name unchanged
    pub name: Option<String>,
    pub omit_empty: bool,
    /// Tag name `-`: the field never appears on the wire
    pub hidden: bool,
}

/// Parse a raw struct tag.
///
/// Backticks and quoting are stripped and the name is the segment before the
/// first comma, so options such as `omitempty` never leak into the wire name.
pub fn parse_struct_tag(raw: &str) -> StructTag {
    let trimmed = raw.trim().trim_matches('`').trim();
    let body = match trimmed.find("json:\"") {
        Some(start) => {
            let rest = &trimmed[start + "json:\"".len()..];
            match rest.find('"') {
                Some(end) => &rest[..end],
                None => rest,
            }
        }
        None => trimmed.trim_matches('"'),
    };

    let mut parts = body.split(',');
    let name = parts.next().unwrap_or_default().trim();
    let omit_empty = parts.any(|opt| opt.trim() == "omitempty");

    StructTag {
        name: match name {
            "" | "-" => None,
            n => Some(n.to_string()),
        },
        omit_empty,
        hidden: name == "-",
    }
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    types: Vec<DescribedType>,
}

#[derive(Debug, Deserialize)]
struct DescribedType {
    name: String,
    #[serde(default)]
    fields: Vec<DescribedField>,
}

#[derive(Debug, Deserialize)]
struct DescribedField {
    name: String,
    #[serde(rename = "type", default)]
    declared_type: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    required: Option<bool>,
}

/// Load a `*.types.yaml` catalog descriptor.
///
/// A descriptor may name its own package; it is taken relative to the
/// module prefix, otherwise the file's directory is used.
pub fn load_descriptor(
    dir_package: &str,
    package_prefix: Option<&str>,
    content: &str,
) -> Result<Vec<TypeInfo>> {
    let descriptor: Descriptor = serde_yaml::from_str(content)?;
    let package = match descriptor.package.as_deref() {
        Some(p) => join_package(package_prefix, p.trim_matches('/')),
        None => dir_package.to_string(),
    };

    let mut out = Vec::with_capacity(descriptor.types.len());
    for ty in descriptor.types {
        let mut fields = Vec::with_capacity(ty.fields.len());
        for field in ty.fields {
            let tag = field.tag.as_deref().map(parse_struct_tag).unwrap_or_default();
            if tag.hidden {
                continue;
            }
            let wire_tag = tag.name.clone().unwrap_or_else(|| field.name.clone());
            fields.push(FieldMeta {
                wire_tag,
                declared_type: field
                    .declared_type
                    .unwrap_or_else(|| OPAQUE.to_string()),
                required: field.required.unwrap_or(!tag.omit_empty),
                optional: tag.omit_empty,
                name: field.name,
            });
        }
        out.push(TypeInfo {
            name: ty.name,
            package: package.clone(),
            fields,
            open: false,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_tag_strips_options() {
        let tag = parse_struct_tag(r#"`json:"ipAddress,omitempty"`"#);
        assert_eq!(tag.name.as_deref(), Some("ipAddress"));
        assert!(tag.omit_empty);
        assert!(!tag.hidden);
    }

    #[test]
    fn test_struct_tag_variants() {
        assert_eq!(parse_struct_tag("\"hostname\"").name.as_deref(), Some("hostname"));
        assert_eq!(parse_struct_tag(r#"json:",omitempty""#).name, None);
        assert!(parse_struct_tag(r#"json:"-""#).hidden);
        let other = parse_struct_tag(r#"yaml:"x" json:"port""#);
        assert_eq!(other.name.as_deref(), Some("port"));
    }

    #[test]
    fn test_rename_rules() {
        assert_eq!(apply_rename_rule("camelCase", "ip_address"), "ipAddress");
        assert_eq!(apply_rename_rule("PascalCase", "ip_address"), "IpAddress");
        assert_eq!(apply_rename_rule("kebab-case", "ip_address"), "ip-address");
        assert_eq!(apply_rename_rule("SCREAMING_SNAKE_CASE", "ip_address"), "IP_ADDRESS");
        assert_eq!(apply_rename_rule("unknown", "ip_address"), "ip_address");
    }

    #[test]
    fn test_scan_source_extracts_fields() {
        let src = r#"
            use serde::{Deserialize, Serialize};

            #[derive(Serialize, Deserialize)]
            #[serde(rename_all = "camelCase")]
            pub struct DeviceSpec {
                pub ip_address: String,
                #[serde(default)]
                pub tags: Vec<String>,
                pub hostname: Option<String>,
                #[serde(rename = "macAddr", skip_serializing_if = "Option::is_none")]
                pub mac: Option<String>,
                #[serde(skip)]
                pub cached: u64,
                pub r#type: String,
            }

            pub struct Marker;
            pub enum Phase { Up, Down }
        "#;
        let types = scan_source("infra/v1", src).unwrap();
        assert_eq!(types.len(), 1);
        let spec = &types[0];
        assert_eq!(spec.name, "DeviceSpec");
        assert_eq!(spec.package, "infra/v1");

        let tags: Vec<&str> = spec.fields.iter().map(|f| f.wire_tag.as_str()).collect();
        assert_eq!(tags, vec!["ipAddress", "tags", "hostname", "macAddr", "type"]);

        let ip = &spec.fields[0];
        assert_eq!(ip.name, "ip_address");
        assert_eq!(ip.declared_type, "String");
        assert!(ip.required);

        assert_eq!(spec.fields[1].declared_type, "[]String");
        assert!(!spec.fields[1].required);
        assert!(!spec.fields[2].required);
        assert_eq!(spec.fields[3].name, "mac");
        assert_eq!(spec.fields[4].name, "type");
    }

    #[test]
    fn test_scan_source_inline_modules_and_flatten() {
        let src = r#"
            mod inner {
                pub struct Extra {
                    #[serde(flatten)]
                    pub rest: std::collections::BTreeMap<String, String>,
                    #[serde(rename(serialize = "out", deserialize = "in"))]
                    pub value: i32,
                }
            }
        "#;
        let types = scan_source("pkg", src).unwrap();
        assert_eq!(types.len(), 1);
        assert!(types[0].open);
        assert_eq!(types[0].fields[0].declared_type, OPAQUE);
        assert_eq!(types[0].fields[1].wire_tag, "in");
    }

    #[test]
    fn test_scan_source_rejects_invalid_rust() {
        assert!(scan_source("pkg", "pub struct {").is_err());
    }

    #[test]
    fn test_load_descriptor() {
        let content = r#"
types:
  - name: NetSpec
    fields:
      - name: IPAddress
        type: string
        tag: 'json:"ipAddress,omitempty"'
      - name: Port
        type: int32
        tag: 'json:"port"'
      - name: Internal
        type: string
        tag: 'json:"-"'
"#;
        let types = load_descriptor("github.com/acme/netkit/types", None, content).unwrap();
        assert_eq!(types.len(), 1);
        let fields = &types[0].fields;
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].wire_tag, "ipAddress");
        assert!(!fields[0].required);
        assert_eq!(fields[1].wire_tag, "port");
        assert!(fields[1].required);
    }
}
