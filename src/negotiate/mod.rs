//! Version Negotiation Layer
//!
//! Per-request pipeline:
//!
//! ```text
//! ReceiveRequest -> ResolveVersion -> DecodeAsSpoke -> ConvertToHub
//!     -> Dispatch -> ConvertHubToResponseSpoke -> EncodeResponse
//! ```
//!
//! Everything from `Dispatch` on sees hub-shaped values only; this layer is
//! the one place a spoke value is ever materialized.
//!
//! Request errors (unserved version, payload that does not fit the spoke)
//! are client errors. A failing conversion means generated code and
//! configuration have drifted apart and is reported as a server error.

pub mod accept;
pub mod shape;

pub use accept::{accept_api_version, content_type, resolve_version, ResolvedVersion, VersionSource};
pub use shape::{type_schema, SectionShape};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info_span};
use uuid::Uuid;

use crate::catalog::{Catalog, TypeKey};
use crate::convert::{ConversionSet, Converter, ConverterRegistry};
use crate::envelope::VersionedEnvelope;
use crate::error::{HubError, Result};
use crate::registry::{GroupVersionKind, VersionRegistry};

// =============================================================================
// Request Model
// =============================================================================

/// Pipeline stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReceiveRequest,
    ResolveVersion,
    DecodeAsSpoke,
    ConvertToHub,
    Dispatch,
    ConvertHubToResponseSpoke,
    EncodeResponse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ReceiveRequest => "receive_request",
            Stage::ResolveVersion => "resolve_version",
            Stage::DecodeAsSpoke => "decode_as_spoke",
            Stage::ConvertToHub => "convert_to_hub",
            Stage::Dispatch => "dispatch",
            Stage::ConvertHubToResponseSpoke => "convert_hub_to_response_spoke",
            Stage::EncodeResponse => "encode_response",
        };
        f.write_str(name)
    }
}

/// What the caller wants done with the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    Get { uid: String },
    Update { uid: String },
    Delete { uid: String },
}

impl Operation {
    /// Operations whose request carries an object
    pub fn has_body(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update { .. })
    }
}

/// Per-request context: an id for correlation and a cancellation flag.
///
/// Clones share the flag, so a caller can keep one to cancel the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    cancelled: Arc<AtomicBool>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// An incoming request, before any version is known
#[derive(Debug, Clone)]
pub struct NegotiationRequest<'a> {
    pub group: &'a str,
    pub kind: &'a str,
    pub operation: Operation,
    /// Raw JSON body
    pub body: Option<&'a [u8]>,
    /// Raw `Accept` header
    pub accept: Option<&'a str>,
}

/// What the handler layer receives: hub-shaped only
#[derive(Debug, Clone)]
pub struct HubRequest {
    /// Hub GVK of the resource
    pub gvk: GroupVersionKind,
    pub operation: Operation,
    pub object: Option<VersionedEnvelope>,
}

/// Handler/storage collaborator, operating on hub values
pub trait ResourceHandler: Send + Sync {
    /// Returns the resulting hub object, or `None` when there is nothing to return
    fn dispatch(&self, ctx: &RequestContext, request: HubRequest) -> Result<Option<VersionedEnvelope>>;
}

/// Encoded response in the caller's version
#[derive(Debug, Clone)]
pub struct NegotiationResponse {
    pub status: u16,
    pub api_version: String,
    pub content_type: String,
    pub body: Option<Vec<u8>>,
}

impl NegotiationResponse {
    /// Decode the body as JSON
    pub fn json(&self) -> Result<Option<Value>> {
        match &self.body {
            Some(body) => Ok(Some(serde_json::from_slice(body)?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Negotiator
// =============================================================================

/// Compiled request shapes of one spoke
#[derive(Debug)]
struct SpokeShape {
    spec: SectionShape,
    status: Option<SectionShape>,
}

/// The request-time pipeline.
///
/// Immutable once built; share it across request threads behind an `Arc`.
pub struct Negotiator {
    registry: Arc<VersionRegistry>,
    converters: ConverterRegistry,
    shapes: HashMap<GroupVersionKind, SpokeShape>,
}

impl Negotiator {
    /// Build from a registry and the conversions generated for it.
    ///
    /// Compiles one request shape per spoke from the catalog.
    pub fn new(registry: Arc<VersionRegistry>, catalog: &Catalog, conversions: &ConversionSet) -> Result<Self> {
        let mut shapes = HashMap::new();
        for plan in conversions.plans() {
            let compile = |key: &TypeKey| -> Result<SectionShape> {
                let info = catalog.get(key)?;
                SectionShape::compile(catalog, info).map_err(|reason| HubError::ConversionGeneration {
                    gvk: plan.gvk.to_string(),
                    reason,
                })
            };
            let spec = compile(&plan.spoke_spec)?;
            let status = plan.spoke_status.as_ref().map(compile).transpose()?;
            shapes.insert(plan.gvk.clone(), SpokeShape { spec, status });
        }

        Ok(Self {
            registry,
            converters: ConverterRegistry::from_set(conversions),
            shapes,
        })
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Run one request through the pipeline
    pub fn handle(
        &self,
        ctx: &RequestContext,
        request: NegotiationRequest<'_>,
        handler: &dyn ResourceHandler,
    ) -> Result<NegotiationResponse> {
        let span = info_span!(
            "negotiate",
            request_id = %ctx.request_id,
            group = request.group,
            kind = request.kind
        );
        let _enter = span.enter();
        debug!(stage = %Stage::ReceiveRequest, operation = ?request.operation);

        let group = self
            .registry
            .group(request.group)
            .ok_or_else(|| HubError::RequestVersion {
                group: request.group.to_string(),
                requested: String::new(),
            })?;

        let payload = match (request.operation.has_body(), request.body) {
            (true, Some(body)) => Some(parse_body(request.group, request.kind, body)?),
            (true, None) => {
                return Err(HubError::RequestDecode {
                    api_version: request.group.to_string(),
                    kind: request.kind.to_string(),
                    reason: "request body is required".to_string(),
                })
            }
            (false, _) => None,
        };

        let body_version = match payload.as_ref().and_then(|v| v.get("apiVersion")) {
            None => None,
            Some(Value::String(version)) if !version.trim().is_empty() => Some(version.as_str()),
            Some(other) => {
                return Err(HubError::RequestDecode {
                    api_version: request.group.to_string(),
                    kind: request.kind.to_string(),
                    reason: format!("apiVersion must be a non-empty string, got {}", other),
                })
            }
        };
        let resolved = resolve_version(group, body_version, request.accept)?;
        let gvk = group.gvk(&resolved.version, request.kind);
        debug!(stage = %Stage::ResolveVersion, version = %resolved.version, source = ?resolved.source);

        if group.resource(request.kind).is_none() {
            return Err(HubError::RequestDecode {
                api_version: gvk.api_version(),
                kind: gvk.kind.clone(),
                reason: "kind is not served by this group".to_string(),
            });
        }
        let converter = self.converters.require(&gvk).map_err(|e| drift(&gvk, e))?;

        let hub_object = match payload {
            Some(payload) => {
                let spoke = self.decode(&gvk, payload)?;
                debug!(stage = %Stage::DecodeAsSpoke, version = %gvk.version);

                let hub = converter.convert_to(spoke).map_err(|e| drift(&gvk, e))?;
                debug!(stage = %Stage::ConvertToHub, hub_version = %group.hub_version());
                Some(hub)
            }
            None => None,
        };

        if ctx.is_cancelled() {
            debug!(stage = %Stage::Dispatch, "request cancelled before dispatch");
            return Err(HubError::Cancelled);
        }

        let hub_request = HubRequest {
            gvk: group.gvk(group.hub_version(), request.kind),
            operation: request.operation.clone(),
            object: hub_object,
        };
        let result = handler.dispatch(ctx, hub_request)?;
        debug!(stage = %Stage::Dispatch, returned = result.is_some());

        let spoke = match result {
            Some(hub) => {
                let spoke = converter.convert_from(hub).map_err(|e| drift(&gvk, e))?;
                debug!(stage = %Stage::ConvertHubToResponseSpoke, version = %gvk.version);
                Some(spoke)
            }
            None => None,
        };

        let body = spoke.as_ref().map(serde_json::to_vec).transpose()?;
        let status = match (&request.operation, &body) {
            (_, None) => 204,
            (Operation::Create, Some(_)) => 201,
            _ => 200,
        };
        debug!(stage = %Stage::EncodeResponse, status);

        let api_version = gvk.api_version();
        Ok(NegotiationResponse {
            status,
            content_type: content_type(&api_version),
            api_version,
            body,
        })
    }

    /// Validate a payload against the spoke's shape and decode it
    fn decode(&self, gvk: &GroupVersionKind, mut payload: Value) -> Result<VersionedEnvelope> {
        let decode_error = |reason: String| HubError::RequestDecode {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            reason,
        };

        let Some(object) = payload.as_object_mut() else {
            return Err(decode_error("body is not a JSON object".to_string()));
        };
        match object.get("kind").and_then(Value::as_str) {
            Some(kind) if kind != gvk.kind => {
                return Err(decode_error(format!("kind '{}' does not match the request", kind)))
            }
            _ => {}
        }
        object.insert("apiVersion".to_string(), Value::String(gvk.api_version()));
        object.insert("kind".to_string(), Value::String(gvk.kind.clone()));

        let shape = self.shapes.get(gvk).ok_or_else(|| drift(gvk, HubError::RuntimeConversion {
            gvk: gvk.to_string(),
            reason: "no request shape compiled".to_string(),
        }))?;

        let spec = object.get("spec").cloned().unwrap_or(Value::Null);
        shape
            .spec
            .check(&spec)
            .map_err(|errors| decode_error(format!("spec: {}", errors.join("; "))))?;

        match (object.get("status"), &shape.status) {
            (None | Some(Value::Null), _) => {}
            (Some(status), Some(status_shape)) => status_shape
                .check(status)
                .map_err(|errors| decode_error(format!("status: {}", errors.join("; "))))?,
            (Some(_), None) => return Err(decode_error(format!("{} has no status", gvk.version))),
        }

        serde_json::from_value(payload).map_err(|e| decode_error(e.to_string()))
    }
}

fn parse_body(group: &str, kind: &str, body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| HubError::RequestDecode {
        api_version: group.to_string(),
        kind: kind.to_string(),
        reason: format!("malformed JSON: {}", e),
    })
}

/// Conversions only fail when generated code and configuration disagree
fn drift(gvk: &GroupVersionKind, err: HubError) -> HubError {
    error!(gvk = %gvk, error = %err, "conversion failed; generated conversions and configuration have drifted");
    match err {
        HubError::RuntimeConversion { .. } => err,
        other => HubError::RuntimeConversion {
            gvk: gvk.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldMeta, TypeInfo};
    use crate::convert::Generator;
    use crate::store::{MemoryStore, StorageHandler};
    use serde_json::json;

    const APIS: &str = r#"
groups:
  - name: infra.example.io
    storageVersion: v1
    versions: [v1alpha1, v1]
    resources: [{ kind: Device }]
"#;

    fn field(name: &str, ty: &str, required: bool) -> FieldMeta {
        FieldMeta {
            name: name.to_string(),
            declared_type: ty.to_string(),
            wire_tag: name.to_string(),
            required,
            optional: !required,
        }
    }

    fn negotiator() -> Negotiator {
        let mut catalog = Catalog::new();
        catalog.insert(TypeInfo {
            name: "DeviceSpec".into(),
            package: "infra/v1alpha1".into(),
            fields: vec![field("hostname", "String", true)],
            open: false,
        });
        catalog.insert(TypeInfo {
            name: "DeviceSpec".into(),
            package: "infra/v1".into(),
            fields: vec![field("hostname", "String", true), field("rack", "String", false)],
            open: false,
        });
        let registry = Arc::new(VersionRegistry::from_yaml_str(APIS).unwrap());
        let set = Generator::new(&catalog, &registry).generate().unwrap();
        Negotiator::new(registry, &catalog, &set).unwrap()
    }

    fn create<'a>(body: &'a [u8], accept: Option<&'a str>) -> NegotiationRequest<'a> {
        NegotiationRequest {
            group: "infra.example.io",
            kind: "Device",
            operation: Operation::Create,
            body: Some(body),
            accept,
        }
    }

    #[test]
    fn test_create_defaults_to_preferred_version() {
        let negotiator = negotiator();
        let handler = StorageHandler::new(MemoryStore::new());
        let body = br#"{"kind":"Device","metadata":{"name":"edge-1"},"spec":{"hostname":"edge-1","rack":"a1"}}"#;

        let response = negotiator
            .handle(&RequestContext::new(), create(body, None), &handler)
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.api_version, "infra.example.io/v1");
        assert_eq!(response.content_type, "application/json; api-version=infra.example.io/v1");
        let json = response.json().unwrap().unwrap();
        assert_eq!(json["spec"]["rack"], "a1");
        assert!(json["metadata"]["uid"].is_string());
    }

    #[test]
    fn test_accept_header_selects_version() {
        let negotiator = negotiator();
        let handler = StorageHandler::new(MemoryStore::new());
        let body = br#"{"spec":{"hostname":"edge-1"}}"#;

        let response = negotiator
            .handle(
                &RequestContext::new(),
                create(body, Some("application/json; api-version=infra.example.io/v1alpha1")),
                &handler,
            )
            .unwrap();
        assert_eq!(response.api_version, "infra.example.io/v1alpha1");
        let json = response.json().unwrap().unwrap();
        assert_eq!(json["apiVersion"], "infra.example.io/v1alpha1");
        assert_eq!(json["spec"], json!({"hostname": "edge-1"}));
    }

    #[test]
    fn test_bad_payloads_are_client_errors() {
        let negotiator = negotiator();
        let handler = StorageHandler::new(MemoryStore::new());
        let ctx = RequestContext::new();

        let err = negotiator.handle(&ctx, create(b"{not json", None), &handler).unwrap_err();
        assert!(matches!(err, HubError::RequestDecode { .. }));

        // rack does not exist in v1alpha1
        let body = br#"{"apiVersion":"infra.example.io/v1alpha1","spec":{"hostname":"h","rack":"a1"}}"#;
        let err = negotiator.handle(&ctx, create(body, None), &handler).unwrap_err();
        assert!(matches!(err, HubError::RequestDecode { .. }));
        assert_eq!(err.status_code(), 400);

        let body = br#"{"apiVersion":"infra.example.io/v9","spec":{"hostname":"h"}}"#;
        let err = negotiator.handle(&ctx, create(body, None), &handler).unwrap_err();
        assert!(matches!(err, HubError::RequestVersion { .. }));
    }

    #[test]
    fn test_explicit_api_version_must_be_a_string() {
        let negotiator = negotiator();
        let handler = StorageHandler::new(MemoryStore::new());
        let ctx = RequestContext::new();

        for body in [
            &br#"{"apiVersion":42,"spec":{"hostname":"h"}}"#[..],
            &br#"{"apiVersion":"","spec":{"hostname":"h"}}"#[..],
            &br#"{"apiVersion":null,"spec":{"hostname":"h"}}"#[..],
        ] {
            let err = negotiator
                .handle(&ctx, create(body, Some("application/json; api-version=v1")), &handler)
                .unwrap_err();
            assert!(matches!(err, HubError::RequestDecode { .. }), "{:?}", err);
            assert!(err.to_string().contains("apiVersion"));
        }
    }

    #[test]
    fn test_cancelled_request_skips_dispatch() {
        let negotiator = negotiator();
        let store = MemoryStore::new();
        let handler = StorageHandler::new(store.clone());
        let ctx = RequestContext::new();
        ctx.cancel();

        let body = br#"{"spec":{"hostname":"edge-1"}}"#;
        let err = negotiator.handle(&ctx, create(body, None), &handler).unwrap_err();
        assert!(matches!(err, HubError::Cancelled));
        assert!(store.is_empty());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ConvertHubToResponseSpoke.to_string(), "convert_hub_to_response_spoke");
        assert!(Operation::Create.has_body());
        assert!(!Operation::Get { uid: "x".into() }.has_body());
    }
}
