//! Rust Code Emitter
//!
//! Generates one `Converter` implementation per conversion plan.
//!
//! Key constraints:
//! - This module ONLY receives plans + CodegenOptions, never the catalog
//! - Field moves are direct when both sides declare the same Rust type
//! - Nested struct pairs get one associated fn per direction on the
//!   converter, called directly, per list element or per map value
//! - Anything else goes through the runtime's `reshape`
//! - Unassigned destination fields come from `Default::default()`

use crate::catalog::TypeShape;
use crate::convert::{ConversionPlan, ConversionSet, DirectionPlan, FieldAssignment, SectionPlan, TypePair};

use super::CodegenOptions;

// =============================================================================
// Public API
// =============================================================================

/// Emit a complete source file for a conversion set
pub fn emit_set(set: &ConversionSet, options: &CodegenOptions) -> String {
    let mut output = String::new();
    output.push_str("// @generated by hubspoke. Do not edit by hand.\n");
    output.push_str(&format!("// conversion set: {}\n\n", set.fingerprint()));
    output.push_str("/// Fingerprint of the conversion set this file was generated from\n");
    output.push_str(&format!(
        "pub const CONVERSION_SET_FINGERPRINT: &str = \"{}\";\n",
        set.fingerprint()
    ));

    let mut groups: Vec<&str> = set.plans().map(|p| p.gvk.group.as_str()).collect();
    groups.dedup();
    let qualify = groups.len() > 1;

    for plan in set.plans() {
        output.push('\n');
        emit_plan(&mut output, plan, options, qualify);
    }
    output
}

/// Name of the converter struct for a plan (`DeviceV1beta1Converter`)
pub fn converter_name(plan: &ConversionPlan, qualify_group: bool) -> String {
    let mut name = String::new();
    if qualify_group {
        let label = plan.gvk.group.split('.').next().unwrap_or(&plan.gvk.group);
        name.push_str(&pascal(label));
    }
    name.push_str(&plan.gvk.kind);
    name.push_str(&pascal(&plan.gvk.version));
    name.push_str("Converter");
    name
}

// =============================================================================
// Plan Emission
// =============================================================================

fn emit_plan(output: &mut String, plan: &ConversionPlan, options: &CodegenOptions, qualify: bool) {
    let rt = &options.runtime_path;
    let name = converter_name(plan, qualify);
    let fns = NestedFns::for_plan(plan);

    let hub_type = envelope_type(rt, options, &plan.hub_spec, plan.hub_status.as_ref());
    let spoke_type = envelope_type(rt, options, &plan.spoke_spec, plan.spoke_status.as_ref());

    if plan.is_hub() {
        output.push_str(&format!("/// {} {} (hub)\n", plan.gvk.api_version(), plan.gvk.kind));
    } else {
        output.push_str(&format!(
            "/// {} {} <-> {} (hub)\n",
            plan.gvk.api_version(),
            plan.gvk.kind,
            plan.hub.api_version()
        ));
    }
    output.push_str("#[derive(Debug, Clone, Copy, Default)]\n");
    output.push_str(&format!("pub struct {};\n\n", name));

    output.push_str(&format!("impl {}::Converter for {} {{\n", rt, name));
    output.push_str(&format!("    type Hub = {};\n", hub_type));
    output.push_str(&format!("    type Spoke = {};\n\n", spoke_type));

    emit_direction(
        output,
        options,
        "convert_to",
        "spoke",
        "Self::Spoke",
        "Self::Hub",
        &plan.hub.api_version(),
        &plan.gvk.kind,
        &plan.to_hub,
        &fns,
    );
    output.push('\n');
    emit_direction(
        output,
        options,
        "convert_from",
        "hub",
        "Self::Hub",
        "Self::Spoke",
        &plan.gvk.api_version(),
        &plan.gvk.kind,
        &plan.from_hub,
        &fns,
    );
    output.push_str("}\n");

    if !fns.is_empty() {
        output.push_str(&format!("\nimpl {} {{\n", name));
        for (i, (nested, fn_name)) in fns.plans(plan).enumerate() {
            if i > 0 {
                output.push('\n');
            }
            emit_nested_fn(output, options, nested, fn_name, &fns);
        }
        output.push_str("}\n");
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_direction(
    output: &mut String,
    options: &CodegenOptions,
    method: &str,
    input: &str,
    input_type: &str,
    output_type: &str,
    api_version: &str,
    kind: &str,
    direction: &DirectionPlan,
    fns: &NestedFns,
) {
    let rt = &options.runtime_path;
    output.push_str(&format!(
        "    fn {}(&self, {}: {}) -> {}::Result<{}> {{\n",
        method, input, input_type, rt, output_type
    ));
    output.push_str(&format!("        let spec = {}.spec;\n", input));
    output.push_str(&format!("        Ok({}::VersionedEnvelope {{\n", rt));
    output.push_str(&format!("            api_version: \"{}\".to_string(),\n", api_version));
    output.push_str(&format!("            kind: \"{}\".to_string(),\n", kind));
    output.push_str(&format!("            metadata: {}.metadata,\n", input));
    output.push_str("            spec: ");
    emit_struct_literal(output, options, &direction.spec, "spec", 3, fns);
    output.push_str(",\n");

    match &direction.status {
        Some(plan) => {
            let target = options.type_path(&plan.target);
            output.push_str(&format!("            status: {}\n", input));
            output.push_str("                .status\n");
            output.push_str(&format!(
                "                .map(|status| -> {}::Result<{}> {{\n",
                rt, target
            ));
            output.push_str("                    Ok(");
            emit_struct_literal(output, options, plan, "status", 5, fns);
            output.push_str(")\n");
            output.push_str("                })\n");
            output.push_str("                .transpose()?,\n");
        }
        None => output.push_str("            status: None,\n"),
    }
    output.push_str("        })\n");
    output.push_str("    }\n");
}

/// `fn to_hub_address(value: Spoke) -> Result<Hub>` for one nested pair
fn emit_nested_fn(output: &mut String, options: &CodegenOptions, plan: &SectionPlan, name: &str, fns: &NestedFns) {
    let var = if plan.assignments.is_empty() { "_value" } else { "value" };
    output.push_str(&format!(
        "    fn {}({}: {}) -> {}::Result<{}> {{\n",
        name,
        var,
        options.type_path(&plan.source),
        options.runtime_path,
        options.type_path(&plan.target)
    ));
    output.push_str("        Ok(");
    emit_struct_literal(output, options, plan, "value", 2, fns);
    output.push_str(")\n");
    output.push_str("    }\n");
}

fn emit_struct_literal(
    output: &mut String,
    options: &CodegenOptions,
    plan: &SectionPlan,
    var: &str,
    depth: usize,
    fns: &NestedFns,
) {
    let indent = "    ".repeat(depth + 1);
    let closing = "    ".repeat(depth);
    let rt = &options.runtime_path;
    let same_package = plan.source.package == plan.target.package;

    output.push_str(&format!("{} {{\n", options.type_path(&plan.target)));
    for (i, assignment) in plan.assignments.iter().enumerate() {
        let reused = plan.assignments[i + 1..]
            .iter()
            .any(|later| later.source_field == assignment.source_field);
        let mut source = format!("{}.{}", var, rust_ident(&assignment.source_field));
        if reused {
            source.push_str(".clone()");
        }
        output.push_str(&format!(
            "{}{}: {},\n",
            indent,
            rust_ident(&assignment.target_field),
            field_expr(rt, &source, assignment, same_package, fns)
        ));
    }
    if !plan.complete {
        output.push_str(&format!("{}..Default::default()\n", indent));
    }
    output.push_str(&format!("{}}}", closing));
}

/// Expression moving one source field into its destination
fn field_expr(rt: &str, source: &str, assignment: &FieldAssignment, same_package: bool, fns: &NestedFns) -> String {
    let nested = assignment.nested.as_ref().and_then(|pair| fns.name(pair));
    if let Some(name) = nested {
        let (from, to) = (&assignment.source_type, &assignment.target_type);
        let calls = (nested_call(rt, name, source, from, to), nested_call(rt, name, "value", from, to));
        if let (Some(call), Some(per_value)) = calls {
            let mapper = if per_value == format!("Self::{}(value)", name) {
                format!("Self::{}", name)
            } else {
                format!("|value| {}", per_value)
            };
            return match (assignment.source_optional, assignment.target_optional) {
                (false, false) => format!("{}?", call),
                (true, true) => format!("{}.map({}).transpose()?", source, mapper),
                (true, false) => format!("{}.map({}).transpose()?.unwrap_or_default()", source, mapper),
                (false, true) => format!("Some({}?)", call),
            };
        }
    }

    let direct = assignment.source_type == assignment.target_type
        && (TypeShape::parse(&assignment.target_type).is_plain()
            || assignment.target_type.contains("::")
            || (same_package && assignment.nested.is_none()));

    match (assignment.source_optional, assignment.target_optional, direct) {
        (false, false, true) | (true, true, true) => source.to_string(),
        (false, false, false) => format!("{}::reshape({})?", rt, source),
        (true, true, false) => format!("{}.map({}::reshape).transpose()?", source, rt),
        (true, false, true) => format!("{}.unwrap_or_default()", source),
        (true, false, false) => format!("{}.map({}::reshape).transpose()?.unwrap_or_default()", source, rt),
        (false, true, true) => format!("Some({})", source),
        (false, true, false) => format!("Some({}::reshape({})?)", rt, source),
    }
}

/// Fallible expression converting `var` through the nested fn `name`.
///
/// Covers a struct (boxed or not), a list of structs and a map of structs;
/// other containers are left to `reshape`.
fn nested_call(rt: &str, name: &str, var: &str, source_type: &str, target_type: &str) -> Option<String> {
    let unboxed = |declared: &str| !declared.contains('*');
    match (TypeShape::parse(source_type), TypeShape::parse(target_type)) {
        (TypeShape::Named(_), TypeShape::Named(_)) => {
            let deref = if source_type.starts_with('*') { "*" } else { "" };
            let rebox = if target_type.starts_with('*') { ".map(Box::new)" } else { "" };
            Some(format!("Self::{}({}{}){}", name, deref, var, rebox))
        }
        (TypeShape::List(s), TypeShape::List(t))
            if both_named(&s, &t) && unboxed(source_type) && unboxed(target_type) =>
        {
            Some(format!("{}.into_iter().map(Self::{}).collect::<{}::Result<_>>()", var, name, rt))
        }
        (TypeShape::Map(_, s), TypeShape::Map(_, t))
            if both_named(&s, &t) && unboxed(source_type) && unboxed(target_type) =>
        {
            Some(format!(
                "{}.into_iter().map(|(key, value)| Self::{}(value).map(|value| (key, value))).collect::<{}::Result<_>>()",
                var, name, rt
            ))
        }
        _ => None,
    }
}

fn both_named(source: &TypeShape, target: &TypeShape) -> bool {
    matches!((source, target), (TypeShape::Named(_), TypeShape::Named(_)))
}

// =============================================================================
// Nested Converters
// =============================================================================

/// Associated fn names of a plan's nested struct pairs
struct NestedFns {
    names: Vec<(TypePair, String)>,
}

impl NestedFns {
    /// `to_hub_<spoke type>` and `from_hub_<spoke type>`, suffixed on collision
    fn for_plan(plan: &ConversionPlan) -> Self {
        let mut names: Vec<(TypePair, String)> = Vec::new();
        let directions = [("to_hub", &plan.to_hub, true), ("from_hub", &plan.from_hub, false)];
        for (prefix, direction, spoke_is_source) in directions {
            for nested in &direction.nested {
                let spoke = if spoke_is_source { &nested.source } else { &nested.target };
                let base = format!("{}_{}", prefix, snake(&spoke.name));
                let mut name = base.clone();
                let mut n = 2;
                while names.iter().any(|(_, taken)| *taken == name) {
                    name = format!("{}_{}", base, n);
                    n += 1;
                }
                names.push((nested.pair(), name));
            }
        }
        Self { names }
    }

    fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn name(&self, pair: &TypePair) -> Option<&str> {
        self.names.iter().find(|(p, _)| p == pair).map(|(_, name)| name.as_str())
    }

    /// Nested plans with their fn names, to-hub first
    fn plans<'p>(&'p self, plan: &'p ConversionPlan) -> impl Iterator<Item = (&'p SectionPlan, &'p str)> {
        plan.to_hub
            .nested
            .iter()
            .chain(&plan.from_hub.nested)
            .filter_map(move |nested| self.name(&nested.pair()).map(|name| (nested, name)))
    }
}

fn envelope_type(
    rt: &str,
    options: &CodegenOptions,
    spec: &crate::catalog::TypeKey,
    status: Option<&crate::catalog::TypeKey>,
) -> String {
    match status {
        Some(status) => format!(
            "{}::VersionedEnvelope<{}, {}>",
            rt,
            options.type_path(spec),
            options.type_path(status)
        ),
        None => format!("{}::VersionedEnvelope<{}>", rt, options.type_path(spec)),
    }
}

// =============================================================================
// Identifiers
// =============================================================================

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "yield",
];

/// Field identifier, raw when it collides with a keyword
pub fn rust_ident(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

/// Module path segment from a package directory name
pub fn module_ident(segment: &str) -> String {
    let mut ident: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    rust_ident(&ident)
}

fn snake(s: &str) -> String {
    let mut out = String::new();
    let mut previous_lower = false;
    for c in s.chars() {
        if c.is_ascii_uppercase() && previous_lower {
            out.push('_');
        }
        previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c.to_ascii_lowercase());
    }
    out
}

fn pascal(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
