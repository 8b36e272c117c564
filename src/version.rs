//! Version pins for external source modules

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pinned version of an external module (e.g. `v1.4.0`).
///
/// The raw tag is kept verbatim because it names the module's directory in
/// the module cache; the parsed version is used for comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleTag {
    /// Tag as written in the configuration
    pub raw: String,
    /// Parsed semantic version
    pub version: Version,
}

impl ModuleTag {
    /// Parse a tag, accepting an optional leading `v`
    pub fn parse(tag: &str) -> Result<Self, semver::Error> {
        let tag = tag.trim();
        let version_str = tag.strip_prefix('v').unwrap_or(tag);
        let version = Version::parse(version_str)?;
        Ok(Self {
            raw: tag.to_string(),
            version,
        })
    }

    /// Directory name of this module inside a module cache (`<module>@<tag>`)
    pub fn dir_name(&self, module_path: &str) -> String {
        format!("{}@{}", module_path, self.raw)
    }

    /// Same major version, so types are expected to be source compatible
    pub fn is_compatible_with(&self, other: &ModuleTag) -> bool {
        self.version.major == other.version.major
    }
}

impl fmt::Display for ModuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for ModuleTag {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for ModuleTag {}
