//! Tool settings
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (hubspoke.toml)
//! - Environment variables (HUBSPOKE__*)
//!
//! ## Example config file (hubspoke.toml):
//! ```toml
//! [apis]
//! path = "apis.yaml"
//!
//! [catalog]
//! source_dirs = ["apis"]
//! module_cache = ".hubspoke/modules"
//!
//! [generate]
//! output = "src/generated/conversions.rs"
//! crate_path = "crate::apis"
//! missing_hub_field = "zero"
//!
//! [[generate.module_crates]]
//! module = "github.com/acme/netkit"
//! crate_path = "netkit"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::ScanConfig;
use crate::codegen::CodegenOptions;
use crate::convert::MissingHubField;

/// Main configuration for the hubspoke tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// API configuration file
    #[serde(default)]
    pub apis: ApisSettings,

    /// Type catalog sources
    #[serde(default)]
    pub catalog: CatalogSettings,

    /// Code generation settings
    #[serde(default)]
    pub generate: GenerateSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApisSettings {
    /// Path to `apis.yaml`
    #[serde(default = "default_apis_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Local source trees scanned for Spec/Status types
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<PathBuf>,

    /// Root holding `<module>@<tag>/` checkouts of pinned modules
    #[serde(default)]
    pub module_cache: Option<PathBuf>,

    /// Relative path prefixes skipped while scanning
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateSettings {
    /// Generated converter source file
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Rust path of the local packages' root module
    #[serde(default = "default_crate_path")]
    pub crate_path: String,

    /// Rust path of the hubspoke runtime
    #[serde(default = "default_runtime_path")]
    pub runtime_path: String,

    /// Required hub fields with no spoke counterpart
    #[serde(default)]
    pub missing_hub_field: MissingHubField,

    /// External modules and the crates that provide them
    #[serde(default)]
    pub module_crates: Vec<ModuleCrate>,
}

/// Maps an external module path to a Rust crate path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleCrate {
    pub module: String,
    pub crate_path: String,
}

// Default value functions
fn default_apis_path() -> PathBuf {
    PathBuf::from("apis.yaml")
}

fn default_source_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("apis")]
}

fn default_skip_prefixes() -> Vec<String> {
    ScanConfig::default().skip_prefixes
}

fn default_output() -> PathBuf {
    PathBuf::from("src/generated/conversions.rs")
}

fn default_crate_path() -> String {
    "crate".to_string()
}

fn default_runtime_path() -> String {
    "hubspoke".to_string()
}

impl Default for ApisSettings {
    fn default() -> Self {
        Self {
            path: default_apis_path(),
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            source_dirs: default_source_dirs(),
            module_cache: None,
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl Default for GenerateSettings {
    fn default() -> Self {
        Self {
            output: default_output(),
            crate_path: default_crate_path(),
            runtime_path: default_runtime_path(),
            missing_hub_field: MissingHubField::default(),
            module_crates: Vec::new(),
        }
    }
}

impl HubConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["hubspoke.toml", ".hubspoke.toml", "config/hubspoke.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(dirs) = directories::ProjectDirs::from("dev", "hubspoke", "hubspoke") {
            let xdg_config = dirs.config_dir().join("hubspoke.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // HUBSPOKE__GENERATE__OUTPUT=...
        builder = builder.add_source(
            Environment::with_prefix("HUBSPOKE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Module cache root; defaults to the user cache directory
    pub fn module_cache(&self) -> PathBuf {
        if let Some(path) = &self.catalog.module_cache {
            return resolve(path);
        }
        directories::ProjectDirs::from("dev", "hubspoke", "hubspoke")
            .map(|dirs| dirs.cache_dir().join("modules"))
            .unwrap_or_else(|| resolve(Path::new(".hubspoke/modules")))
    }

    pub fn apis_path(&self) -> PathBuf {
        resolve(&self.apis.path)
    }

    pub fn source_dirs(&self) -> Vec<PathBuf> {
        self.catalog.source_dirs.iter().map(|p| resolve(p)).collect()
    }

    pub fn output_path(&self) -> PathBuf {
        resolve(&self.generate.output)
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            skip_prefixes: self.catalog.skip_prefixes.clone(),
        }
    }

    pub fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions {
            crate_path: self.generate.crate_path.clone(),
            runtime_path: self.generate.runtime_path.clone(),
            module_crates: self
                .generate
                .module_crates
                .iter()
                .map(|m| (m.module.clone(), m.crate_path.clone()))
                .collect(),
        }
    }
}

/// Relative paths are taken from the current directory
fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.apis.path, PathBuf::from("apis.yaml"));
        assert_eq!(config.generate.missing_hub_field, MissingHubField::Zero);
        assert!(config.catalog.skip_prefixes.contains(&"target/".to_string()));
        assert!(config.module_cache().ends_with("modules"));
    }

    #[test]
    fn test_serialize_config() {
        let config = HubConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[apis]"));
        assert!(toml_str.contains("[generate]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubspoke.toml");
        std::fs::write(
            &path,
            r#"
[apis]
path = "/srv/apis.yaml"

[generate]
missing_hub_field = "reject"
crate_path = "crate::apis"

[[generate.module_crates]]
module = "github.com/acme/netkit"
crate_path = "netkit"
"#,
        )
        .unwrap();

        let config = HubConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.apis_path(), PathBuf::from("/srv/apis.yaml"));
        assert_eq!(config.generate.missing_hub_field, MissingHubField::Reject);

        let options = config.codegen_options();
        assert_eq!(options.crate_path, "crate::apis");
        assert_eq!(options.module_crates["github.com/acme/netkit"], "netkit");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = HubConfig::default();
        config.generate.output = PathBuf::from("out.rs");
        config.save(&path).unwrap();

        let loaded: HubConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.generate.output, PathBuf::from("out.rs"));
    }
}
