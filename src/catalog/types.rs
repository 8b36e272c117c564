//! Declared-type normalization
//!
//! Rust types are reduced to a small, language-neutral string notation:
//!
//! | Rust                         | normalized        |
//! |------------------------------|-------------------|
//! | `String`, `u32`              | `String`, `u32`   |
//! | `Box<T>`, `Arc<T>`, `&T`     | `*T`              |
//! | `Vec<T>`, `[T]`, `[T; N]`    | `[]T`             |
//! | `HashMap<K, V>`              | `map[K]V`         |
//! | `chrono::DateTime<Utc>`      | `chrono::DateTime<Utc>` |
//! | anything else                | `any`             |
//!
//! `Option<T>` is unwrapped separately because it only affects the required flag.
//! Unrecognized shapes degrade to `any` instead of failing the scan.

use serde_json::Value;

/// Marker for shapes the catalog cannot describe
pub const OPAQUE: &str = "any";

/// Split `Option<T>` into `(T, true)`; other types are returned as `(ty, false)`.
pub fn unwrap_optional(ty: &syn::Type) -> (&syn::Type, bool) {
    if let syn::Type::Path(p) = ty {
        if p.qself.is_none() {
            if let Some(last) = p.path.segments.last() {
                if last.ident == "Option" {
                    if let Some(inner) = single_type_arg(&last.arguments) {
                        return (inner, true);
                    }
                }
            }
        }
    }
    (ty, false)
}

/// Normalize a parsed Rust type into the catalog notation.
pub fn normalize_type(ty: &syn::Type) -> String {
    match ty {
        syn::Type::Path(p) if p.qself.is_none() => normalize_path(&p.path),
        syn::Type::Reference(r) => format!("*{}", normalize_type(&r.elem)),
        syn::Type::Slice(s) => format!("[]{}", normalize_type(&s.elem)),
        syn::Type::Array(a) => format!("[]{}", normalize_type(&a.elem)),
        syn::Type::Paren(p) => normalize_type(&p.elem),
        syn::Type::Group(g) => normalize_type(&g.elem),
        _ => OPAQUE.to_string(),
    }
}

fn normalize_path(path: &syn::Path) -> String {
    let Some(last) = path.segments.last() else {
        return OPAQUE.to_string();
    };
    let ident = last.ident.to_string();
    let args = type_args(&last.arguments);

    match (ident.as_str(), args.as_slice()) {
        ("Box" | "Rc" | "Arc", [inner]) => format!("*{}", normalize_type(inner)),
        ("Option", [inner]) => normalize_type(inner),
        ("Vec" | "VecDeque" | "HashSet" | "BTreeSet", [inner]) => {
            format!("[]{}", normalize_type(inner))
        }
        ("HashMap" | "BTreeMap" | "IndexMap", [key, value]) => {
            format!("map[{}]{}", normalize_type(key), normalize_type(value))
        }
        _ => {
            let mut out = path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect::<Vec<_>>()
                .join("::");
            if path.leading_colon.is_some() {
                out.insert_str(0, "::");
            }
            if !args.is_empty() {
                let rendered: Vec<String> = args.iter().map(|a| normalize_type(a)).collect();
                out.push('<');
                out.push_str(&rendered.join(", "));
                out.push('>');
            }
            out
        }
    }
}

fn type_args(args: &syn::PathArguments) -> Vec<&syn::Type> {
    match args {
        syn::PathArguments::AngleBracketed(ab) => ab
            .args
            .iter()
            .filter_map(|a| match a {
                syn::GenericArgument::Type(t) => Some(t),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn single_type_arg(args: &syn::PathArguments) -> Option<&syn::Type> {
    match type_args(args).as_slice() {
        [inner] => Some(*inner),
        _ => None,
    }
}

// =============================================================================
// Type Shapes
// =============================================================================

/// Structural class of a normalized type, used for compatibility checks,
/// zero values and request-shape schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Bool,
    Integer(String),
    Float(String),
    Text(String),
    List(Box<TypeShape>),
    Map(Box<TypeShape>, Box<TypeShape>),
    /// A named (struct/enum/external) type, converted structurally
    Named(String),
    Opaque,
}

impl TypeShape {
    /// Parse the normalized notation produced by [`normalize_type`].
    pub fn parse(normalized: &str) -> Self {
        let s = normalized.trim();
        if let Some(inner) = s.strip_prefix('*') {
            return Self::parse(inner);
        }
        if let Some(inner) = s.strip_prefix("[]") {
            return TypeShape::List(Box::new(Self::parse(inner)));
        }
        if let Some(rest) = s.strip_prefix("map[") {
            if let Some(close) = matching_bracket(rest) {
                let key = &rest[..close];
                let value = &rest[close + 1..];
                return TypeShape::Map(Box::new(Self::parse(key)), Box::new(Self::parse(value)));
            }
            return TypeShape::Opaque;
        }
        match s {
            "" | OPAQUE => TypeShape::Opaque,
            "bool" => TypeShape::Bool,
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" | "int" | "int32" | "int64" | "uint32" | "uint64" | "integer" => {
                TypeShape::Integer(s.to_string())
            }
            "f32" | "f64" | "float32" | "float64" | "number" => TypeShape::Float(s.to_string()),
            "String" | "str" | "char" | "string" => TypeShape::Text(s.to_string()),
            "serde_json::Value" | "Value" => TypeShape::Opaque,
            other => TypeShape::Named(other.to_string()),
        }
    }

    /// Catalog-free structural check.
    ///
    /// Scalars must match exactly and containers compare element-wise. Named
    /// types only match the same name here; struct types with different names
    /// are matched field by field by the conversion generator. Opaque values
    /// are accepted against anything.
    pub fn is_compatible(&self, other: &TypeShape) -> bool {
        use TypeShape::*;
        match (self, other) {
            (Opaque, _) | (_, Opaque) => true,
            (Bool, Bool) => true,
            (Integer(a), Integer(b)) | (Float(a), Float(b)) | (Text(a), Text(b)) => {
                canonical_scalar(a) == canonical_scalar(b)
            }
            (List(a), List(b)) => a.is_compatible(b),
            (Map(ka, va), Map(kb, vb)) => ka.is_compatible(kb) && va.is_compatible(vb),
            (Named(a), Named(b)) => a == b,
            _ => false,
        }
    }

    /// Whether values of this shape only contain scalars (no nested named types)
    pub fn is_plain(&self) -> bool {
        match self {
            TypeShape::Bool | TypeShape::Integer(_) | TypeShape::Float(_) | TypeShape::Text(_) => true,
            TypeShape::List(inner) => inner.is_plain(),
            TypeShape::Map(k, v) => k.is_plain() && v.is_plain(),
            TypeShape::Named(_) | TypeShape::Opaque => false,
        }
    }

    /// JSON zero value of this shape, if it has a well-defined one
    pub fn zero_value(&self) -> Option<Value> {
        match self {
            TypeShape::Bool => Some(Value::Bool(false)),
            TypeShape::Integer(_) => Some(Value::from(0)),
            TypeShape::Float(_) => Some(Value::from(0.0)),
            TypeShape::Text(_) => Some(Value::String(String::new())),
            TypeShape::List(_) => Some(Value::Array(Vec::new())),
            TypeShape::Map(_, _) => Some(Value::Object(serde_json::Map::new())),
            TypeShape::Named(_) | TypeShape::Opaque => None,
        }
    }

    /// JSON Schema `type` keyword for this shape, if constrained
    pub fn json_type(&self) -> Option<&'static str> {
        match self {
            TypeShape::Bool => Some("boolean"),
            TypeShape::Integer(_) => Some("integer"),
            TypeShape::Float(_) => Some("number"),
            TypeShape::Text(_) => Some("string"),
            TypeShape::List(_) => Some("array"),
            TypeShape::Map(_, _) => Some("object"),
            TypeShape::Named(_) | TypeShape::Opaque => None,
        }
    }
}

/// Descriptor files use language-neutral scalar names; fold them onto Rust's.
fn canonical_scalar(name: &str) -> &str {
    match name {
        "string" | "str" => "String",
        "int" | "int64" | "integer" => "i64",
        "int32" => "i32",
        "uint32" => "u32",
        "uint64" => "u64",
        "float64" | "number" => "f64",
        "float32" => "f32",
        other => other,
    }
}

fn matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' if depth == 0 => return Some(i),
            ']' => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(src: &str) -> String {
        let ty: syn::Type = syn::parse_str(src).unwrap();
        normalize_type(&ty)
    }

    #[test]
    fn test_normalize_basic_shapes() {
        assert_eq!(norm("String"), "String");
        assert_eq!(norm("Box<Device>"), "*Device");
        assert_eq!(norm("&str"), "*str");
        assert_eq!(norm("Vec<String>"), "[]String");
        assert_eq!(norm("[u8; 4]"), "[]u8");
        assert_eq!(norm("BTreeMap<String, Vec<u16>>"), "map[String][]u16");
        assert_eq!(norm("chrono::DateTime<chrono::Utc>"), "chrono::DateTime<chrono::Utc>");
    }

    #[test]
    fn test_normalize_unknown_shape_is_opaque() {
        assert_eq!(norm("(u8, u8)"), OPAQUE);
        assert_eq!(norm("fn(u8) -> u8"), OPAQUE);
        assert_eq!(norm("<T as Trait>::Assoc"), OPAQUE);
    }

    #[test]
    fn test_unwrap_optional() {
        let ty: syn::Type = syn::parse_str("Option<Vec<String>>").unwrap();
        let (inner, optional) = unwrap_optional(&ty);
        assert!(optional);
        assert_eq!(normalize_type(inner), "[]String");

        let ty: syn::Type = syn::parse_str("u32").unwrap();
        assert!(!unwrap_optional(&ty).1);
    }

    #[test]
    fn test_shape_parse() {
        assert_eq!(TypeShape::parse("*[]String"), TypeShape::List(Box::new(TypeShape::Text("String".into()))));
        assert_eq!(
            TypeShape::parse("map[String][]u16"),
            TypeShape::Map(
                Box::new(TypeShape::Text("String".into())),
                Box::new(TypeShape::List(Box::new(TypeShape::Integer("u16".into()))))
            )
        );
        assert_eq!(TypeShape::parse("any"), TypeShape::Opaque);
        assert_eq!(TypeShape::parse("NetworkConfig"), TypeShape::Named("NetworkConfig".into()));
    }

    #[test]
    fn test_scalar_compatibility_is_exact() {
        let text = TypeShape::parse("String");
        let int = TypeShape::parse("i64");
        assert!(!text.is_compatible(&int));
        assert!(!TypeShape::parse("i32").is_compatible(&TypeShape::parse("i64")));
        assert!(TypeShape::parse("string").is_compatible(&text));
        assert!(!TypeShape::parse("[]String").is_compatible(&TypeShape::parse("Device")));
        assert!(TypeShape::parse("any").is_compatible(&int));
        assert!(TypeShape::parse("*Address").is_compatible(&TypeShape::parse("Address")));
        assert!(!TypeShape::parse("Address").is_compatible(&TypeShape::parse("Location")));
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(TypeShape::parse("String").zero_value(), Some(Value::String(String::new())));
        assert_eq!(TypeShape::parse("[]u8").zero_value(), Some(Value::Array(vec![])));
        assert_eq!(TypeShape::parse("Device").zero_value(), None);
    }
}
