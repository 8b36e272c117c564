//! Request shapes
//!
//! Derives a JSON Schema (draft 7) for each spoke Spec/Status type from its
//! catalog fields, so `DecodeAsSpoke` rejects payloads that do not fit the
//! resolved version before anything is converted.

use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Map, Value};

use crate::catalog::{Catalog, FieldMeta, TypeInfo, TypeKey, TypeShape};

/// JSON Schema for one field of a type in `package`
fn field_schema(catalog: &Catalog, package: &str, field: &FieldMeta, seen: &mut Vec<TypeKey>) -> Value {
    let mut schema = shape_schema(catalog, package, &field.shape(), seen);
    if field.optional {
        if let Some(Value::String(ty)) = schema.get("type").cloned() {
            schema["type"] = json!([ty, "null"]);
        }
    }
    schema
}

/// Struct types are resolved through the catalog and described inline; a
/// recursive reference, or a type the catalog does not know, accepts any value.
fn shape_schema(catalog: &Catalog, package: &str, shape: &TypeShape, seen: &mut Vec<TypeKey>) -> Value {
    match shape {
        TypeShape::Named(name) => match catalog.resolve_named(package, name) {
            Some(info) if !seen.contains(&info.key()) => {
                seen.push(info.key());
                let schema = object_schema(catalog, info, seen);
                seen.pop();
                schema
            }
            _ => json!({}),
        },
        TypeShape::List(item) => json!({
            "type": "array",
            "items": shape_schema(catalog, package, item, seen),
        }),
        TypeShape::Map(_, value) => json!({
            "type": "object",
            "additionalProperties": shape_schema(catalog, package, value, seen),
        }),
        other => match other.json_type() {
            Some(ty) => json!({ "type": ty }),
            None => json!({}),
        },
    }
}

/// Unknown properties are rejected unless the type has a flattened field.
fn object_schema(catalog: &Catalog, info: &TypeInfo, seen: &mut Vec<TypeKey>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in &info.fields {
        properties.insert(field.wire_tag.clone(), field_schema(catalog, &info.package, field, seen));
        if field.required {
            required.push(Value::String(field.wire_tag.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": info.open,
    })
}

/// JSON Schema describing the wire shape of a struct type, nested struct
/// fields included.
pub fn type_schema(catalog: &Catalog, info: &TypeInfo) -> Value {
    let mut schema = object_schema(catalog, info, &mut vec![info.key()]);
    schema["$schema"] = json!("http://json-schema.org/draft-07/schema#");
    schema["title"] = json!(info.key().to_string());
    schema
}

/// A compiled schema for one section type
pub struct SectionShape {
    title: String,
    compiled: JSONSchema,
}

impl std::fmt::Debug for SectionShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionShape").field("title", &self.title).finish()
    }
}

impl SectionShape {
    /// Compile the schema of a catalog type; errors are rendered to strings
    pub fn compile(catalog: &Catalog, info: &TypeInfo) -> Result<Self, String> {
        let schema = type_schema(catalog, info);
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| format!("compiling schema for {}: {}", info.key(), e))?;
        Ok(Self {
            title: info.key().to_string(),
            compiled,
        })
    }

    /// Validate a value, returning every violation as `path: message`
    pub fn check(&self, value: &Value) -> Result<(), Vec<String>> {
        let result = self.compiled.validate(value);
        match result {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|err| {
                    let path = err.instance_path.to_string();
                    if path.is_empty() {
                        err.to_string()
                    } else {
                        format!("{}: {}", path, err)
                    }
                })
                .collect()),
        }
    }
}
