//! Hub-and-spoke API versioning
//!
//! Lets a service expose several public schema versions ("spokes") of the
//! same resource while persisting exactly one internal version (the "hub").
//!
//! ## Features
//!
//! - **Type Catalog**: static field/shape resolution for local Rust sources
//!   and pinned external modules
//! - **Version Registry**: validated `apis.yaml` groups, versions, renames and imports
//! - **Conversion Generator**: deterministic hub/spoke field mappings with a loss report
//! - **Code Generation**: typed `Converter` implementations emitted as Rust source
//! - **Version Negotiation**: per-request version resolution, decode, conversion and dispatch
//!
//! ## Architecture
//!
//! ```text
//! apis.yaml ──► VersionRegistry ─┐
//!                                ├──► Generator ──► ConversionSet ──► codegen
//! sources ───► Catalog ──────────┘                      │
//!                                                       ▼
//! request ──► Negotiator: resolve ► decode ► to hub ► dispatch ► from hub ► encode
//!                                                       │
//!                                                 ResourceHandler / HubStore
//! ```

pub mod catalog;
pub mod checksum;
pub mod codegen;
pub mod config;
pub mod convert;
pub mod envelope;
pub mod error;
pub mod negotiate;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod version;

pub use catalog::{Catalog, FieldMeta, TypeInfo, TypeKey};
pub use checksum::Checksum;
pub use config::HubConfig;
pub use convert::{
    reshape, ConversionPlan, ConversionSet, Converter, ConverterRegistry, Generator, LossReport,
    MissingHubField, TypedConverter,
};
pub use envelope::{Metadata, VersionedEnvelope};
pub use error::{HubError, Result};
pub use negotiate::{NegotiationRequest, NegotiationResponse, Negotiator, Operation, RequestContext, ResourceHandler};
pub use registry::{GroupVersionKind, VersionRegistry};
pub use store::{HubStore, MemoryStore, StorageHandler};
pub use version::ModuleTag;
