//! Request-time conversion
//!
//! [`Converter`] is the typed `ConvertTo` / `ConvertFrom` pair for one spoke.
//! [`PlanConverter`] executes a generated plan over untyped envelopes and is
//! what the negotiation layer runs; [`TypedConverter`] wraps it for concrete
//! envelope types. [`ConverterRegistry`] dispatches by `(group, version, kind)`.
//!
//! Converters are pure: no shared mutable state and no I/O, so they are shared
//! freely across request threads.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{ConversionPlan, ConversionSet, DirectionPlan, SectionPlan};
use crate::catalog::TypeShape;
use crate::envelope::VersionedEnvelope;
use crate::error::{HubError, Result};
use crate::registry::{split_api_version, GroupVersionKind};

/// Bidirectional conversion between one spoke and the hub
pub trait Converter: Send + Sync {
    type Hub;
    type Spoke;

    /// Spoke to hub
    fn convert_to(&self, spoke: Self::Spoke) -> Result<Self::Hub>;

    /// Hub to spoke
    fn convert_from(&self, hub: Self::Hub) -> Result<Self::Spoke>;
}

/// Convert a value to another type with the same wire shape
pub fn reshape<T: Serialize, U: DeserializeOwned>(value: T) -> Result<U> {
    Ok(serde_json::from_value(serde_json::to_value(value)?)?)
}

// =============================================================================
// Plan Execution
// =============================================================================

/// Runs a [`ConversionPlan`] over untyped envelopes
#[derive(Debug, Clone)]
pub struct PlanConverter {
    plan: ConversionPlan,
}

impl PlanConverter {
    pub fn new(plan: ConversionPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &ConversionPlan {
        &self.plan
    }

    pub fn gvk(&self) -> &GroupVersionKind {
        &self.plan.gvk
    }

    fn failure(&self, reason: impl Into<String>) -> HubError {
        HubError::RuntimeConversion {
            gvk: self.plan.gvk.to_string(),
            reason: reason.into(),
        }
    }

    fn expect_envelope(&self, envelope: &VersionedEnvelope, gvk: &GroupVersionKind) -> Result<()> {
        if envelope.is(gvk) {
            return Ok(());
        }
        Err(self.failure(format!(
            "expected {} {}, got {} {}",
            gvk.api_version(),
            gvk.kind,
            envelope.api_version,
            envelope.kind
        )))
    }

    /// Map one object through a section plan.
    ///
    /// Only assigned destination fields are written, so source-only keys never
    /// reach the output. A required destination whose source is absent or
    /// null gets its zero value.
    fn apply(&self, direction: &DirectionPlan, plan: &SectionPlan, value: Value) -> Result<Value> {
        let source = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(self.failure(format!(
                    "{} of {} is not an object: {}",
                    plan.section, plan.source, other
                )))
            }
        };

        let mut out = Map::new();
        for assignment in &plan.assignments {
            match source.get(&assignment.source_tag) {
                Some(value) if !value.is_null() => {
                    let mapped = match &assignment.nested {
                        Some(pair) => {
                            let nested = direction.nested_plan(pair).ok_or_else(|| {
                                self.failure(format!("no nested plan for {} -> {}", pair.source, pair.target))
                            })?;
                            let shape = TypeShape::parse(&assignment.target_type);
                            self.apply_nested(direction, nested, &shape, value.clone())?
                        }
                        None => value.clone(),
                    };
                    out.insert(assignment.target_tag.clone(), mapped);
                }
                present => {
                    if let Some(zero) = &assignment.zero {
                        out.insert(assignment.target_tag.clone(), zero.clone());
                    } else if present.is_some() && assignment.target_optional {
                        out.insert(assignment.target_tag.clone(), Value::Null);
                    }
                }
            }
        }
        for zero in &plan.zero_fill {
            out.entry(zero.tag.clone()).or_insert_with(|| zero.value.clone());
        }
        Ok(Value::Object(out))
    }

    /// Apply a nested plan to a struct value, or to each element of a list or map of them
    fn apply_nested(&self, direction: &DirectionPlan, plan: &SectionPlan, shape: &TypeShape, value: Value) -> Result<Value> {
        match (shape, value) {
            (TypeShape::List(item), Value::Array(items)) => items
                .into_iter()
                .map(|v| self.apply_nested(direction, plan, item, v))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (TypeShape::Map(_, item), Value::Object(entries)) => entries
                .into_iter()
                .map(|(k, v)| self.apply_nested(direction, plan, item, v).map(|v| (k, v)))
                .collect::<Result<Map<_, _>>>()
                .map(Value::Object),
            (TypeShape::Named(_), Value::Null) => Ok(Value::Null),
            (TypeShape::Named(_), value) => self.apply(direction, plan, value),
            (_, other) => Err(self.failure(format!(
                "{} value does not have the declared shape of {}: {}",
                plan.section, plan.target, other
            ))),
        }
    }

    fn apply_status(&self, direction: &DirectionPlan, status: Option<Value>) -> Result<Option<Value>> {
        match (&direction.status, status) {
            (Some(plan), Some(status)) => self.apply(direction, plan, status).map(Some),
            _ => Ok(None),
        }
    }
}

impl Converter for PlanConverter {
    type Hub = VersionedEnvelope;
    type Spoke = VersionedEnvelope;

    fn convert_to(&self, spoke: VersionedEnvelope) -> Result<VersionedEnvelope> {
        self.expect_envelope(&spoke, &self.plan.gvk)?;
        let direction = &self.plan.to_hub;
        let spec = self.apply(direction, &direction.spec, spoke.spec)?;
        let status = self.apply_status(direction, spoke.status)?;
        Ok(VersionedEnvelope::new(&self.plan.hub, spoke.metadata, spec, status))
    }

    fn convert_from(&self, hub: VersionedEnvelope) -> Result<VersionedEnvelope> {
        self.expect_envelope(&hub, &self.plan.hub)?;
        let direction = &self.plan.from_hub;
        let spec = self.apply(direction, &direction.spec, hub.spec)?;
        let status = self.apply_status(direction, hub.status)?;
        Ok(VersionedEnvelope::new(&self.plan.gvk, hub.metadata, spec, status))
    }
}

/// [`PlanConverter`] over concrete envelope types (`H` hub, `S` spoke)
pub struct TypedConverter<H, S> {
    inner: Arc<PlanConverter>,
    _types: PhantomData<fn() -> (H, S)>,
}

impl<H, S> TypedConverter<H, S> {
    pub fn new(inner: Arc<PlanConverter>) -> Self {
        Self {
            inner,
            _types: PhantomData,
        }
    }
}

impl<H, S> Converter for TypedConverter<H, S>
where
    H: Serialize + DeserializeOwned,
    S: Serialize + DeserializeOwned,
{
    type Hub = H;
    type Spoke = S;

    fn convert_to(&self, spoke: S) -> Result<H> {
        let hub = self.inner.convert_to(reshape(spoke)?)?;
        reshape(hub).map_err(|e| self.inner.failure(e.to_string()))
    }

    fn convert_from(&self, hub: H) -> Result<S> {
        let spoke = self.inner.convert_from(reshape(hub)?)?;
        reshape(spoke).map_err(|e| self.inner.failure(e.to_string()))
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Converters keyed by spoke `(group, version, kind)`
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<GroupVersionKind, Arc<PlanConverter>>,
}

impl ConverterRegistry {
    pub fn from_set(set: &ConversionSet) -> Self {
        let converters = set
            .plans()
            .map(|plan| (plan.gvk.clone(), Arc::new(PlanConverter::new(plan.clone()))))
            .collect();
        Self { converters }
    }

    pub fn get(&self, gvk: &GroupVersionKind) -> Option<&Arc<PlanConverter>> {
        self.converters.get(gvk)
    }

    /// Like [`get`](Self::get), but a missing converter is a runtime conversion error
    pub fn require(&self, gvk: &GroupVersionKind) -> Result<&Arc<PlanConverter>> {
        self.converters.get(gvk).ok_or_else(|| HubError::RuntimeConversion {
            gvk: gvk.to_string(),
            reason: "no generated conversion for this version".to_string(),
        })
    }

    /// Typed view of one converter
    pub fn typed<H, S>(&self, gvk: &GroupVersionKind) -> Option<TypedConverter<H, S>> {
        self.converters.get(gvk).map(|c| TypedConverter::new(Arc::clone(c)))
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Convert an envelope of any served version to the hub
    pub fn to_hub(&self, envelope: VersionedEnvelope) -> Result<VersionedEnvelope> {
        let (group, version) = split_api_version(&envelope.api_version);
        let gvk = GroupVersionKind::new(group, version, &envelope.kind);
        self.require(&gvk)?.convert_to(envelope)
    }

    /// Convert an envelope of any served version to `target_version` through the hub
    pub fn convert(&self, envelope: VersionedEnvelope, target_version: &str) -> Result<VersionedEnvelope> {
        let (group, _) = split_api_version(&envelope.api_version);
        let target = GroupVersionKind::new(group, target_version, &envelope.kind);
        let converter = self.require(&target)?;
        let hub = self.to_hub(envelope)?;
        converter.convert_from(hub)
    }
}
