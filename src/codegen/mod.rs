//! Code Generation
//!
//! Turns a [`ConversionSet`] into Rust source: one unit struct per
//! `(spoke version, kind)` implementing `Converter` over typed envelopes.
//!
//! Architecture:
//! - CodegenOptions: where catalog packages live as Rust paths
//! - rust: the emitter, which only reads plans (never the catalog)
//! - drift: compares committed generated code with a fresh generation

pub mod rust;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::catalog::TypeKey;
use crate::checksum::Checksum;
use crate::convert::ConversionSet;

// =============================================================================
// Options
// =============================================================================

/// Rust path mapping for generated code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Rust path of the crate root holding local packages (`crate`, `my_api`)
    pub crate_path: String,
    /// Path of the runtime crate providing `Converter` and `VersionedEnvelope`
    pub runtime_path: String,
    /// External module path prefix -> Rust crate path
    pub module_crates: BTreeMap<String, String>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            crate_path: "crate".to_string(),
            runtime_path: "hubspoke".to_string(),
            module_crates: BTreeMap::new(),
        }
    }
}

impl CodegenOptions {
    /// Rust path of a catalog type.
    ///
    /// `infra/v1beta1.DeviceSpec` becomes `crate::infra::v1beta1::DeviceSpec`;
    /// packages under a mapped module are rooted at that module's crate.
    pub fn type_path(&self, key: &TypeKey) -> String {
        let mapped = self
            .module_crates
            .iter()
            .filter(|(module, _)| key.package == **module || key.package.starts_with(&format!("{}/", module)))
            .max_by_key(|(module, _)| module.len());

        let (root, rest) = match mapped {
            Some((module, krate)) => (krate.as_str(), key.package[module.len()..].trim_start_matches('/')),
            None => (self.crate_path.as_str(), key.package.as_str()),
        };

        let mut path = root.to_string();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            path.push_str("::");
            path.push_str(&rust::module_ident(segment));
        }
        path.push_str("::");
        path.push_str(&key.name);
        path
    }
}

// =============================================================================
// Output
// =============================================================================

/// Generated source plus bookkeeping
#[derive(Debug, Clone)]
pub struct GeneratedOutput {
    pub code: String,
    pub conversion_count: usize,
    /// Checksum of `code`
    pub checksum: Checksum,
}

/// Emit Rust converters for every plan in the set
pub fn emit_rust(set: &ConversionSet, options: &CodegenOptions) -> GeneratedOutput {
    let code = rust::emit_set(set, options);
    GeneratedOutput {
        checksum: Checksum::of_str(&code),
        conversion_count: set.len(),
        code,
    }
}

/// Compare committed generated code with a fresh generation.
///
/// Returns `None` when they match, otherwise a line diff (`-` committed, `+` generated).
pub fn drift(committed: &str, generated: &str) -> Option<String> {
    if committed == generated {
        return None;
    }

    let diff = TextDiff::from_lines(committed, generated);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => continue,
        };
        out.push_str(sign);
        out.push_str(change.value());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    Some(out)
}
