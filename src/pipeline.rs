//! Generation pipeline
//!
//! Loads everything a conversion set depends on, in order: API
//! configuration, local sources, pinned modules, conversions. Each step
//! blocks the next on error.

use std::sync::Arc;

use tracing::info;

use crate::catalog::Catalog;
use crate::config::HubConfig;
use crate::convert::{ConversionSet, Generator};
use crate::error::Result;
use crate::negotiate::Negotiator;
use crate::registry::VersionRegistry;

/// Everything produced by one pipeline run
#[derive(Debug)]
pub struct Generated {
    pub registry: VersionRegistry,
    pub catalog: Catalog,
    pub conversions: ConversionSet,
}

impl Generated {
    /// Build a negotiator over this run's conversions
    pub fn negotiator(&self) -> Result<Negotiator> {
        Negotiator::new(Arc::new(self.registry.clone()), &self.catalog, &self.conversions)
    }
}

/// Load and validate the API configuration named by `config`
pub fn load_registry(config: &HubConfig) -> Result<VersionRegistry> {
    VersionRegistry::load(config.apis_path())
}

/// Build the catalog for `registry`: local sources, then every import pinned
/// and resolved from the module cache.
pub fn build_catalog(config: &HubConfig, registry: &VersionRegistry) -> Result<Catalog> {
    let mut catalog = Catalog::new().with_scan_config(config.scan_config());
    for dir in config.source_dirs() {
        catalog.scan_local_package(&dir)?;
    }

    for group in registry.groups() {
        for import in group.imports() {
            catalog.add_module(&import.module, &import.tag)?;
        }
    }
    if catalog.modules().next().is_some() {
        catalog.resolve_modules(config.module_cache())?;
    }
    Ok(catalog)
}

/// Run the whole pipeline
pub fn load(config: &HubConfig) -> Result<Generated> {
    let registry = load_registry(config)?;
    let catalog = build_catalog(config, &registry)?;
    let conversions = Generator::new(&catalog, &registry)
        .with_policy(config.generate.missing_hub_field)
        .generate()?;

    info!(
        groups = registry.groups().len(),
        types = catalog.len(),
        conversions = conversions.len(),
        fingerprint = %conversions.fingerprint().short(),
        "pipeline complete"
    );

    Ok(Generated {
        registry,
        catalog,
        conversions,
    })
}
