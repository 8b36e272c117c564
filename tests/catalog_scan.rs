//! Catalog scanning over scratch source trees

use std::fs;
use std::path::Path;

use hubspoke::catalog::{Catalog, ScanConfig, TypeKey};
use hubspoke::HubError;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_scan_keys_by_package() {
    let dir = TempDir::new().unwrap();
    let spec = |field: &str| format!("pub struct DeviceSpec {{ pub {}: String }}", field);
    write(dir.path(), "infra/v1/types.rs", &spec("ip"));
    write(dir.path(), "infra/v1beta1/types.rs", &spec("address"));

    let catalog = Catalog::load_from_directory(dir.path()).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get_fields("infra/v1", "DeviceSpec").unwrap()[0].name, "ip");
    assert_eq!(catalog.get_fields("infra/v1beta1", "DeviceSpec").unwrap()[0].name, "address");
}

#[test]
fn test_unparsable_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "infra/v1/broken.rs", "pub struct {");
    write(dir.path(), "infra/v1/types.rs", "pub struct DeviceSpec { pub ip: String }");

    let mut catalog = Catalog::new();
    let summary = catalog.scan_local_package(dir.path()).unwrap();
    assert_eq!(summary.files_scanned, 2);
    assert_eq!(summary.skipped.len(), 1);
    assert!(catalog.find(&TypeKey::new("infra/v1", "DeviceSpec")).is_some());
}

#[test]
fn test_skip_prefixes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "target/debug/types.rs", "pub struct Stale { pub x: u32 }");
    write(dir.path(), "vendor/types.rs", "pub struct Vendored { pub x: u32 }");
    write(dir.path(), "infra/v1/types.rs", "pub struct DeviceSpec { pub ip: String }");

    let mut config = ScanConfig::default();
    config.skip_prefixes.push("vendor/".to_string());
    let mut catalog = Catalog::new().with_scan_config(config);
    catalog.scan_local_package(dir.path()).unwrap();

    let names: Vec<&str> = catalog.types().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["DeviceSpec"]);
}

#[test]
fn test_serde_attributes_shape_fields() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "infra/v1/types.rs",
        r#"
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSpec {
    pub ip_address: String,
    #[serde(rename = "host")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip)]
    pub cache: Vec<u8>,
    pub ports: Vec<Box<Port>>,
    pub callback: fn(),
}

pub mod nested {
    pub struct Port { pub number: u16 }
}
"#,
    );

    let catalog = Catalog::load_from_directory(dir.path()).unwrap();
    let fields = catalog.get_fields("infra/v1", "DeviceSpec").unwrap();

    let summary: Vec<(&str, &str, bool)> = fields
        .iter()
        .map(|f| (f.wire_tag.as_str(), f.declared_type.as_str(), f.required))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("ipAddress", "String", true),
            ("host", "String", false),
            ("labels", "map[String]String", false),
            ("ports", "[]*Port", true),
            ("callback", "any", true),
        ]
    );
    assert!(catalog.find(&TypeKey::new("infra/v1", "Port")).is_some());
}

#[test]
fn test_unknown_type_suggests_neighbours() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "infra/v1/types.rs", "pub struct DeviceSpec { pub ip: String }");
    let catalog = Catalog::load_from_directory(dir.path()).unwrap();

    let err = catalog.get_fields("infra/v1", "DevSpec").unwrap_err();
    assert!(matches!(err, HubError::CatalogLookup { .. }));
    assert!(err.to_string().contains("infra/v1.DeviceSpec"));
}

#[test]
fn test_pinned_modules_resolve_from_cache() {
    let cache = TempDir::new().unwrap();
    write(
        cache.path(),
        "github.com/acme/netkit@v1.4.0/wire/link.types.yaml",
        r#"
types:
  - name: LinkSpec
    fields:
      - { name: Peer, type: string, tag: '`json:"peer"`' }
      - { name: Secret, type: string, tag: 'json:"-"' }
"#,
    );
    write(
        cache.path(),
        "github.com/acme/netkit@v1.5.0/wire/link.types.yaml",
        "types: [{ name: LinkSpec, fields: [] }]",
    );

    let mut catalog = Catalog::new();
    catalog.add_module("github.com/acme/netkit", "v1.4.0").unwrap();
    let summary = catalog.resolve_modules(cache.path()).unwrap();
    assert_eq!(summary.types_found, 1);

    let fields = catalog
        .get_fields("github.com/acme/netkit/wire", "LinkSpec")
        .unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].wire_tag, "peer");
}

#[test]
fn test_module_pins_are_exclusive() {
    let mut catalog = Catalog::new();
    catalog.add_module("github.com/acme/netkit", "v1.4.0").unwrap();
    catalog.add_module("github.com/acme/netkit", "v1.4.0").unwrap();
    assert!(matches!(
        catalog.add_module("github.com/acme/netkit", "v1.5.0"),
        Err(HubError::InvalidModuleTag(_))
    ));
    assert!(catalog.add_module("github.com/acme/other", "latest").is_err());
}

#[test]
fn test_unpinned_module_types_are_not_guessed() {
    let cache = TempDir::new().unwrap();
    write(
        cache.path(),
        "github.com/acme/netkit@v1.4.0/wire/link.types.yaml",
        "types: [{ name: LinkSpec, fields: [] }]",
    );

    let mut catalog = Catalog::new();
    catalog.resolve_modules(cache.path()).unwrap();
    assert!(catalog.is_empty());
    assert!(catalog.get(&TypeKey::new("github.com/acme/netkit/wire", "LinkSpec")).is_err());
}
