//! Conversion Generator
//!
//! Produces, for every `(spoke version, kind)`, a deterministic field mapping
//! between the spoke's Spec/Status types and the hub's, in both directions.
//!
//! ## Matching
//!
//! Each field of the *destination* type is matched against the source type:
//!
//! 1. an explicit rename override for the spoke version
//! 2. equal wire tags
//! 3. equal source-level field names
//!
//! Unmatched destination fields stay unset; required ones are zero-filled
//! (or rejected, see [`MissingHubField`]). Matched fields with incompatible
//! declared types fail generation. Metadata is never field-mapped.
//!
//! Struct-typed fields (directly, in lists or as map values) are resolved
//! through the catalog and mapped by the same rules, one nested plan per
//! struct pair and direction. A nested type missing from the catalog, or two
//! nested types without a single common field, fail generation.

pub mod report;
pub mod runtime;

pub use report::{FieldLoss, LossKind, LossReport};
pub use runtime::{reshape, Converter, ConverterRegistry, PlanConverter, TypedConverter};

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::{Catalog, FieldMeta, TypeInfo, TypeKey, TypeShape};
use crate::checksum::Checksum;
use crate::error::{HubError, Result};
use crate::registry::{FieldPath, GroupVersionKind, RegisteredGroup, Section, SectionTypes, VersionRegistry};

// =============================================================================
// Plan Types
// =============================================================================

/// Why a destination field was paired with a source field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Rename,
    Tag,
    Name,
}

/// Policy for required destination fields with no source counterpart
/// on the way into the hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingHubField {
    /// Leave the hub field at its zero value
    #[default]
    Zero,
    /// Fail generation
    Reject,
}

/// Source and destination struct types of a nested mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypePair {
    pub source: TypeKey,
    pub target: TypeKey,
}

impl TypePair {
    pub fn new(source: TypeKey, target: TypeKey) -> Self {
        Self { source, target }
    }
}

/// One destination field filled from one source field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAssignment {
    pub target_field: String,
    pub target_tag: String,
    pub target_type: String,
    pub source_field: String,
    pub source_tag: String,
    pub source_type: String,
    pub target_optional: bool,
    pub source_optional: bool,
    pub matched_by: MatchKind,
    /// Struct types inside the field, mapped per element for lists and maps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<TypePair>,
    /// Written when the source value is absent or null and the destination is required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero: Option<Value>,
}

/// A required destination field with no source, set to its zero value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroFill {
    pub field: String,
    pub tag: String,
    pub declared_type: String,
    pub value: Value,
}

/// Field mapping from one section type to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub section: Section,
    pub source: TypeKey,
    pub target: TypeKey,
    pub assignments: Vec<FieldAssignment>,
    pub zero_fill: Vec<ZeroFill>,
    /// Every target field is assigned
    pub complete: bool,
}

impl SectionPlan {
    pub fn pair(&self) -> TypePair {
        TypePair::new(self.source.clone(), self.target.clone())
    }
}

/// Spec and (when both sides have one) Status mapping for one direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionPlan {
    pub spec: SectionPlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SectionPlan>,
    /// Mappings of the struct types nested in spec and status fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<SectionPlan>,
}

impl DirectionPlan {
    pub fn section(&self, section: Section) -> Option<&SectionPlan> {
        match section {
            Section::Spec => Some(&self.spec),
            Section::Status => self.status.as_ref(),
        }
    }

    /// The mapping of one nested struct type pair
    pub fn nested_plan(&self, pair: &TypePair) -> Option<&SectionPlan> {
        self.nested
            .iter()
            .find(|plan| plan.source == pair.source && plan.target == pair.target)
    }
}

/// Both conversion directions for one `(spoke version, kind)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionPlan {
    pub gvk: GroupVersionKind,
    pub hub: GroupVersionKind,
    pub spoke_spec: TypeKey,
    pub spoke_status: Option<TypeKey>,
    pub hub_spec: TypeKey,
    pub hub_status: Option<TypeKey>,
    /// Spoke to hub (`ConvertTo`)
    pub to_hub: DirectionPlan,
    /// Hub to spoke (`ConvertFrom`)
    pub from_hub: DirectionPlan,
    pub report: LossReport,
}

impl ConversionPlan {
    /// Whether this plan converts the hub version to itself
    pub fn is_hub(&self) -> bool {
        self.gvk == self.hub
    }
}

/// Every plan of a registry, keyed by spoke GVK
#[derive(Debug, Clone)]
pub struct ConversionSet {
    plans: BTreeMap<GroupVersionKind, ConversionPlan>,
    fingerprint: Checksum,
}

impl ConversionSet {
    pub fn from_plans(plans: impl IntoIterator<Item = ConversionPlan>) -> Result<Self> {
        let plans: BTreeMap<_, _> = plans.into_iter().map(|p| (p.gvk.clone(), p)).collect();
        let fingerprint = Checksum::of_serialized(&plans.values().collect::<Vec<_>>())?;
        Ok(Self { plans, fingerprint })
    }

    pub fn get(&self, gvk: &GroupVersionKind) -> Option<&ConversionPlan> {
        self.plans.get(gvk)
    }

    /// Plans in GVK order
    pub fn plans(&self) -> impl Iterator<Item = &ConversionPlan> {
        self.plans.values()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// SHA-256 over the serialized plans
    pub fn fingerprint(&self) -> &Checksum {
        &self.fingerprint
    }

    /// Plans as pretty JSON, in GVK order
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.plans.values().collect::<Vec<_>>())?)
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Builds a [`ConversionSet`] from catalog field lists and registry config
pub struct Generator<'a> {
    catalog: &'a Catalog,
    registry: &'a VersionRegistry,
    policy: MissingHubField,
}

/// Source/target field pairing requested by a rename
struct Override<'f> {
    target: &'f FieldMeta,
    source: &'f FieldMeta,
}

impl<'a> Generator<'a> {
    pub fn new(catalog: &'a Catalog, registry: &'a VersionRegistry) -> Self {
        Self {
            catalog,
            registry,
            policy: MissingHubField::default(),
        }
    }

    pub fn with_policy(mut self, policy: MissingHubField) -> Self {
        self.policy = policy;
        self
    }

    /// Generate plans for every served `(group, version, kind)`
    pub fn generate(&self) -> Result<ConversionSet> {
        let mut plans = Vec::new();
        for group in self.registry.groups() {
            for resource in group.resources() {
                for version in group.versions() {
                    plans.push(self.plan(group, version, &resource.kind)?);
                }
            }
        }

        let set = ConversionSet::from_plans(plans)?;
        info!(
            conversions = set.len(),
            lossy = set.plans().filter(|p| p.report.is_lossy()).count(),
            fingerprint = %set.fingerprint().short(),
            "conversion plans generated"
        );
        Ok(set)
    }

    /// Generate the plan for one spoke
    pub fn plan_for(&self, gvk: &GroupVersionKind) -> Result<ConversionPlan> {
        let group = self.registry.group(&gvk.group).ok_or_else(|| HubError::ConversionGeneration {
            gvk: gvk.to_string(),
            reason: "group is not registered".to_string(),
        })?;
        if !group.is_served(&gvk.version) || group.resource(&gvk.kind).is_none() {
            return Err(HubError::ConversionGeneration {
                gvk: gvk.to_string(),
                reason: "version or kind is not registered for the group".to_string(),
            });
        }
        self.plan(group, &gvk.version, &gvk.kind)
    }

    fn plan(&self, group: &RegisteredGroup, version: &str, kind: &str) -> Result<ConversionPlan> {
        let gvk = group.gvk(version, kind);
        let hub = group.gvk(group.hub_version(), kind);

        let spoke_types = group.section_types(version, kind);
        let hub_types = group.section_types(group.hub_version(), kind);

        let spoke_spec = self.catalog.get(&spoke_types.spec)?;
        let hub_spec = self.catalog.get(&hub_types.spec)?;
        let spoke_status = self.resolve_status(&spoke_types)?;
        let hub_status = self.resolve_status(&hub_types)?;

        let renames = self.parse_renames(&gvk, group, version, kind)?;
        let mut report = LossReport::default();
        let mut to_hub_nested = Vec::new();
        let mut from_hub_nested = Vec::new();

        let spec_renames = renames_in(&renames, Section::Spec);
        let to_hub_spec = self.section(
            Walk::new(&gvk, Section::Spec, Direction::ToHub, &mut report, &mut to_hub_nested),
            spoke_spec,
            hub_spec,
            &spec_renames,
        )?;
        let from_hub_spec = self.section(
            Walk::new(&gvk, Section::Spec, Direction::FromHub, &mut report, &mut from_hub_nested),
            hub_spec,
            spoke_spec,
            &flip(&spec_renames),
        )?;

        let status_renames = renames_in(&renames, Section::Status);
        let (to_hub_status, from_hub_status) = match (spoke_status, hub_status) {
            (Some(spoke), Some(hub_info)) => (
                Some(self.section(
                    Walk::new(&gvk, Section::Status, Direction::ToHub, &mut report, &mut to_hub_nested),
                    spoke,
                    hub_info,
                    &status_renames,
                )?),
                Some(self.section(
                    Walk::new(&gvk, Section::Status, Direction::FromHub, &mut report, &mut from_hub_nested),
                    hub_info,
                    spoke,
                    &flip(&status_renames),
                )?),
            ),
            (spoke, hub_info) => {
                if !status_renames.is_empty() {
                    return Err(HubError::ConversionGeneration {
                        gvk: gvk.to_string(),
                        reason: "status renames declared but status is missing on one side".to_string(),
                    });
                }
                if let Some(spoke) = spoke {
                    report.push(
                        LossKind::SectionMissing,
                        Section::Status,
                        "*",
                        format!("hub has no status type; {} status is dropped when stored", spoke.key()),
                    );
                }
                if let Some(hub_info) = hub_info {
                    report.push(
                        LossKind::HubOnly,
                        Section::Status,
                        "*",
                        format!("{} has no status type; hub status {} is not exposed", version, hub_info.key()),
                    );
                }
                (None, None)
            }
        };

        report.log(&gvk);
        debug!(
            gvk = %gvk,
            summary = %report.summary(),
            nested = to_hub_nested.len() + from_hub_nested.len(),
            "conversion plan built"
        );

        Ok(ConversionPlan {
            hub,
            spoke_spec: spoke_spec.key(),
            spoke_status: spoke_status.map(TypeInfo::key),
            hub_spec: hub_spec.key(),
            hub_status: hub_status.map(TypeInfo::key),
            to_hub: DirectionPlan {
                spec: to_hub_spec,
                status: to_hub_status,
                nested: to_hub_nested,
            },
            from_hub: DirectionPlan {
                spec: from_hub_spec,
                status: from_hub_status,
                nested: from_hub_nested,
            },
            report,
            gvk,
        })
    }

    /// Explicitly declared status types must resolve; conventional local ones are optional.
    fn resolve_status(&self, types: &SectionTypes) -> Result<Option<&'a TypeInfo>> {
        match &types.status {
            Some(key) if types.explicit => self.catalog.get(key).map(Some),
            Some(key) => Ok(self.catalog.find(key)),
            None => Ok(None),
        }
    }

    fn parse_renames(
        &self,
        gvk: &GroupVersionKind,
        group: &RegisteredGroup,
        version: &str,
        kind: &str,
    ) -> Result<Vec<(FieldPath, FieldPath)>> {
        group
            .renames(kind, version)
            .iter()
            .map(|rename| {
                let from = FieldPath::parse(&rename.from);
                let to = FieldPath::parse(&rename.to);
                if from.section != to.section {
                    return Err(HubError::ConversionGeneration {
                        gvk: gvk.to_string(),
                        reason: format!("rename {} -> {} crosses sections", from, to),
                    });
                }
                Ok((from, to))
            })
            .collect()
    }

    fn section(
        &self,
        mut walk: Walk<'_>,
        source: &TypeInfo,
        target: &TypeInfo,
        renames: &[(String, String)],
    ) -> Result<SectionPlan> {
        self.section_plan(&mut walk, source, target, renames, "")
    }

    /// Map every field of `target` onto `source`.
    ///
    /// `renames` pairs are `(source ident, target ident)` for this direction;
    /// they only apply at the top of a section. `prefix` is the wire path of
    /// the field holding a nested struct, used in the loss report.
    fn section_plan(
        &self,
        walk: &mut Walk<'_>,
        source: &TypeInfo,
        target: &TypeInfo,
        renames: &[(String, String)],
        prefix: &str,
    ) -> Result<SectionPlan> {
        let section = walk.section;
        let mut overrides = Vec::with_capacity(renames.len());
        for (source_ident, target_ident) in renames {
            let source_field = source
                .field(source_ident)
                .ok_or_else(|| rename_endpoint_error(walk.gvk, section, source_ident, source))?;
            let target_field = target
                .field(target_ident)
                .ok_or_else(|| rename_endpoint_error(walk.gvk, section, target_ident, target))?;
            overrides.push(Override {
                target: target_field,
                source: source_field,
            });
        }
        let renamed_sources: HashSet<&str> = overrides.iter().map(|o| o.source.name.as_str()).collect();

        let mut assignments = Vec::new();
        let mut zero_fill = Vec::new();

        for field in &target.fields {
            let path = join_path(prefix, &field.wire_tag);
            let matched = overrides
                .iter()
                .find(|o| o.target.name == field.name)
                .map(|o| (o.source, MatchKind::Rename))
                .or_else(|| {
                    let eligible = || source.fields.iter().filter(|s| !renamed_sources.contains(s.name.as_str()));
                    eligible()
                        .find(|s| s.wire_tag == field.wire_tag)
                        .map(|s| (s, MatchKind::Tag))
                        .or_else(|| eligible().find(|s| s.name == field.name).map(|s| (s, MatchKind::Name)))
                });

            match matched {
                Some((source_field, matched_by)) => {
                    let shapes = self.match_shapes(
                        walk,
                        (source.package.as_str(), &source_field.shape()),
                        (target.package.as_str(), &field.shape()),
                        &path,
                    )?;
                    let nested = match shapes {
                        ShapeMatch::Leaf => None,
                        ShapeMatch::Nested(pair) => Some(pair),
                        ShapeMatch::Mismatch => {
                            return Err(walk.error(format!(
                                "{}.{}: {} type '{}' is incompatible with {} type '{}'",
                                section,
                                path,
                                walk.direction.source_side(),
                                source_field.declared_type,
                                walk.direction.target_side(),
                                field.declared_type
                            )))
                        }
                    };
                    let zero = field
                        .required
                        .then(|| self.zero_value(&target.package, &field.shape(), &mut Vec::new()));
                    assignments.push(FieldAssignment {
                        target_field: field.name.clone(),
                        target_tag: field.wire_tag.clone(),
                        target_type: field.declared_type.clone(),
                        source_field: source_field.name.clone(),
                        source_tag: source_field.wire_tag.clone(),
                        source_type: source_field.declared_type.clone(),
                        target_optional: field.optional,
                        source_optional: source_field.optional,
                        matched_by,
                        nested,
                        zero,
                    });
                }
                None => {
                    match walk.direction {
                        Direction::ToHub => walk.report.push(
                            LossKind::HubOnly,
                            section,
                            &path,
                            format!("hub field {}.{} has no {} counterpart", section, path, walk.gvk.version),
                        ),
                        Direction::FromHub => walk.report.push(
                            LossKind::SpokeOnly,
                            section,
                            &path,
                            format!("{}.{} has no hub counterpart and is dropped when stored", section, path),
                        ),
                    }

                    if !field.required {
                        continue;
                    }
                    if walk.direction == Direction::ToHub {
                        if self.policy == MissingHubField::Reject {
                            return Err(walk.error(format!(
                                "required hub field {}.{} has no counterpart in {}",
                                section, path, walk.gvk.version
                            )));
                        }
                        walk.report.push(
                            LossKind::ZeroFilled,
                            section,
                            &path,
                            format!("required hub field {}.{} is zero-filled", section, path),
                        );
                    }
                    zero_fill.push(ZeroFill {
                        field: field.name.clone(),
                        tag: field.wire_tag.clone(),
                        declared_type: field.declared_type.clone(),
                        value: self.zero_value(&target.package, &field.shape(), &mut Vec::new()),
                    });
                }
            }
        }

        Ok(SectionPlan {
            section,
            source: source.key(),
            target: target.key(),
            complete: assignments.len() == target.fields.len(),
            assignments,
            zero_fill,
        })
    }

    /// Check the declared types of a matched field, planning any struct
    /// types nested in them. Sides are `(owning package, shape)`.
    fn match_shapes(
        &self,
        walk: &mut Walk<'_>,
        source: (&str, &TypeShape),
        target: (&str, &TypeShape),
        path: &str,
    ) -> Result<ShapeMatch> {
        match (source.1, target.1) {
            (TypeShape::List(s), TypeShape::List(t)) => self.match_shapes(walk, (source.0, s), (target.0, t), path),
            (TypeShape::Map(sk, sv), TypeShape::Map(tk, tv)) if sk.is_compatible(tk) => {
                self.match_shapes(walk, (source.0, sv), (target.0, tv), path)
            }
            (TypeShape::Named(s), TypeShape::Named(t)) => {
                let resolved = (
                    self.catalog.resolve_named(source.0, s),
                    self.catalog.resolve_named(target.0, t),
                );
                match resolved {
                    (Some(source_info), Some(target_info)) if source_info.key() == target_info.key() => {
                        Ok(ShapeMatch::Leaf)
                    }
                    (Some(source_info), Some(target_info)) => {
                        let pair = TypePair::new(source_info.key(), target_info.key());
                        self.nested_plan(walk, source_info, target_info, &pair, path)?;
                        Ok(ShapeMatch::Nested(pair))
                    }
                    // library types such as `chrono::DateTime<Utc>` travel unchanged
                    (None, None) if s == t && s.contains("::") => Ok(ShapeMatch::Leaf),
                    (None, _) => Err(unresolved_nested(walk, path, walk.direction.source_side(), source.0, s)),
                    (_, None) => Err(unresolved_nested(walk, path, walk.direction.target_side(), target.0, t)),
                }
            }
            (s, t) if s.is_compatible(t) => Ok(ShapeMatch::Leaf),
            _ => Ok(ShapeMatch::Mismatch),
        }
    }

    /// Plan one nested struct pair, once per direction
    fn nested_plan(
        &self,
        walk: &mut Walk<'_>,
        source: &TypeInfo,
        target: &TypeInfo,
        pair: &TypePair,
        path: &str,
    ) -> Result<()> {
        if walk.pending.contains(pair) || walk.nested.iter().any(|plan| plan.pair() == *pair) {
            return Ok(());
        }

        walk.pending.push(pair.clone());
        let plan = self.section_plan(walk, source, target, &[], path)?;
        walk.pending.pop();

        if plan.assignments.is_empty() && !source.fields.is_empty() && !target.fields.is_empty() {
            return Err(walk.error(format!(
                "{}.{}: {} type {} and {} type {} have no field in common",
                walk.section,
                path,
                walk.direction.source_side(),
                source.key(),
                walk.direction.target_side(),
                target.key()
            )));
        }
        walk.nested.push(plan);
        Ok(())
    }

    /// JSON zero value of a declared type.
    ///
    /// Struct types get their required fields zeroed; opaque values are null.
    fn zero_value(&self, package: &str, shape: &TypeShape, seen: &mut Vec<TypeKey>) -> Value {
        let TypeShape::Named(name) = shape else {
            return shape.zero_value().unwrap_or(Value::Null);
        };
        let mut object = serde_json::Map::new();
        if let Some(info) = self.catalog.resolve_named(package, name) {
            if !seen.contains(&info.key()) {
                seen.push(info.key());
                for field in info.fields.iter().filter(|f| f.required) {
                    let zero = self.zero_value(&info.package, &field.shape(), seen);
                    object.insert(field.wire_tag.clone(), zero);
                }
                seen.pop();
            }
        }
        Value::Object(object)
    }
}

/// Outcome of matching two declared types
enum ShapeMatch {
    /// Copied as-is
    Leaf,
    /// Struct values mapped through a nested plan
    Nested(TypePair),
    Mismatch,
}

/// Mutable state while mapping one section in one direction
struct Walk<'w> {
    gvk: &'w GroupVersionKind,
    section: Section,
    direction: Direction,
    report: &'w mut LossReport,
    nested: &'w mut Vec<SectionPlan>,
    /// Nested pairs being planned, for recursive types
    pending: Vec<TypePair>,
}

impl<'w> Walk<'w> {
    fn new(
        gvk: &'w GroupVersionKind,
        section: Section,
        direction: Direction,
        report: &'w mut LossReport,
        nested: &'w mut Vec<SectionPlan>,
    ) -> Self {
        Self {
            gvk,
            section,
            direction,
            report,
            nested,
            pending: Vec::new(),
        }
    }

    fn error(&self, reason: String) -> HubError {
        HubError::ConversionGeneration {
            gvk: self.gvk.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToHub,
    FromHub,
}

impl Direction {
    fn source_side(&self) -> &'static str {
        match self {
            Direction::ToHub => "spoke",
            Direction::FromHub => "hub",
        }
    }

    fn target_side(&self) -> &'static str {
        match self {
            Direction::ToHub => "hub",
            Direction::FromHub => "spoke",
        }
    }
}

/// `(spoke ident, hub ident)` pairs for one section
fn renames_in(renames: &[(FieldPath, FieldPath)], section: Section) -> Vec<(String, String)> {
    renames
        .iter()
        .filter(|(from, _)| from.section == section)
        .map(|(from, to)| (from.field.clone(), to.field.clone()))
        .collect()
}

fn flip(pairs: &[(String, String)]) -> Vec<(String, String)> {
    pairs.iter().map(|(a, b)| (b.clone(), a.clone())).collect()
}

fn rename_endpoint_error(gvk: &GroupVersionKind, section: Section, ident: &str, info: &TypeInfo) -> HubError {
    HubError::ConversionGeneration {
        gvk: gvk.to_string(),
        reason: format!("rename endpoint {}.{} is not a field of {}", section, ident, info.key()),
    }
}

fn unresolved_nested(walk: &Walk<'_>, path: &str, side: &str, package: &str, name: &str) -> HubError {
    walk.error(format!(
        "{}.{}: {} type '{}' (from {}) is not in the catalog",
        walk.section, path, side, name, package
    ))
}

/// Wire path of a field below `prefix`
fn join_path(prefix: &str, tag: &str) -> String {
    if prefix.is_empty() {
        tag.to_string()
    } else {
        format!("{}.{}", prefix, tag)
    }
}
