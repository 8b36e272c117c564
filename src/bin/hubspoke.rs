//! Hub/Spoke CLI
//!
//! Validates API configuration, inspects the type catalog, generates
//! converters and converts envelopes offline.
//!
//! Usage:
//!   hubspoke validate
//!   hubspoke catalog --package infra/v1
//!   hubspoke generate --check
//!   hubspoke report
//!   hubspoke convert --to v1alpha1 device.json

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use hubspoke::catalog::TypeInfo;
use hubspoke::codegen::{self, drift};
use hubspoke::convert::ConverterRegistry;
use hubspoke::{pipeline, Checksum, HubConfig, VersionedEnvelope};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hubspoke")]
#[command(about = "Hub-and-spoke API versioning: catalog, conversions and negotiation")]
struct Cli {
    /// Settings file (hubspoke.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the API configuration
    Validate,

    /// List catalog types
    Catalog {
        /// Only types of this package
        #[arg(short, long)]
        package: Option<String>,

        /// Only types with this name
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: CatalogFormat,
    },

    /// Generate converters
    Generate {
        /// Output file (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail if the output file differs from a fresh generation
        #[arg(long)]
        check: bool,

        #[arg(short, long, value_enum, default_value = "rust")]
        format: GenerateFormat,
    },

    /// Print the loss report of every conversion
    Report,

    /// Convert an envelope file to another version through the hub
    Convert {
        /// Target version (`v1alpha1` or `group/v1alpha1`)
        #[arg(long)]
        to: String,

        /// JSON or YAML envelope
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CatalogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum GenerateFormat {
    Rust,
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = HubConfig::load_from(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Commands::Validate => validate(&config),
        Commands::Catalog {
            package,
            type_name,
            format,
        } => catalog(&config, package.as_deref(), type_name.as_deref(), format),
        Commands::Generate { output, check, format } => generate(&config, output, check, format),
        Commands::Report => report(&config),
        Commands::Convert { to, file } => convert(&config, &to, &file),
    }
}

fn validate(config: &HubConfig) -> anyhow::Result<()> {
    let path = config.apis_path();
    println!("🔍 Validating {}\n", path.display());

    let registry = pipeline::load_registry(config)?;
    for group in registry.groups() {
        println!("📦 {}", group.name());
        println!("   hub:       {}", group.hub_version());
        println!("   preferred: {}", group.preferred_version());
        println!("   versions:  {}", group.versions().join(", "));
        let kinds: Vec<&str> = group.resources().iter().map(|r| r.kind.as_str()).collect();
        println!("   kinds:     {}", kinds.join(", "));
        for import in group.imports() {
            println!("   import:    {}@{}", import.module, import.tag);
        }
    }

    println!("\n✅ {} group(s) valid", registry.groups().len());
    Ok(())
}

fn catalog(
    config: &HubConfig,
    package: Option<&str>,
    type_name: Option<&str>,
    format: CatalogFormat,
) -> anyhow::Result<()> {
    let registry = pipeline::load_registry(config)?;
    let catalog = pipeline::build_catalog(config, &registry)?;

    let selected: Vec<&TypeInfo> = catalog
        .types()
        .filter(|t| package.map_or(true, |p| t.package == p))
        .filter(|t| type_name.map_or(true, |n| t.name == n))
        .collect();

    if selected.is_empty() {
        let query = [package, type_name].into_iter().flatten().collect::<Vec<_>>().join(".");
        let suggestions = catalog.suggest(&query, 5);
        if suggestions.is_empty() {
            bail!("no catalog types match '{}'", query);
        }
        bail!("no catalog types match '{}'; did you mean: {}", query, suggestions.join(", "));
    }

    match format {
        CatalogFormat::Json => println!("{}", serde_json::to_string_pretty(&selected)?),
        CatalogFormat::Text => {
            for info in &selected {
                println!("📄 {}", info.key());
                for field in &info.fields {
                    let marker = if field.required { "*" } else { " " };
                    println!("   {} {:<20} {:<20} {}", marker, field.wire_tag, field.name, field.declared_type);
                }
            }
            println!("\n{} type(s), {} module pin(s)", selected.len(), catalog.modules().count());
        }
    }
    Ok(())
}

fn generate(config: &HubConfig, output: Option<PathBuf>, check: bool, format: GenerateFormat) -> anyhow::Result<()> {
    let generated = pipeline::load(config)?;
    let conversions = &generated.conversions;

    let code = match format {
        GenerateFormat::Rust => codegen::emit_rust(conversions, &config.codegen_options()).code,
        GenerateFormat::Json => conversions.to_json()?,
    };
    let output = output.unwrap_or_else(|| config.output_path());

    if check {
        let committed = fs::read_to_string(&output)
            .with_context(|| format!("reading committed output {}", output.display()))?;
        if !Checksum::of_str(&code).verify(&committed) {
            if let Some(diff) = drift(&committed, &code) {
                eprintln!("{}", diff);
            }
            bail!("{} is out of date; run `hubspoke generate`", output.display());
        }
        println!("✅ {} is up to date ({})", output.display(), conversions.fingerprint().short());
        return Ok(());
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&output, &code).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "✅ Wrote {} conversion(s) to {} ({})",
        conversions.len(),
        output.display(),
        conversions.fingerprint().short()
    );
    Ok(())
}

fn report(config: &HubConfig) -> anyhow::Result<()> {
    let generated = pipeline::load(config)?;

    let mut lossy = 0;
    for plan in generated.conversions.plans() {
        let icon = if plan.report.is_lossy() {
            lossy += 1;
            "⚠️ "
        } else {
            "✅"
        };
        let hub = if plan.is_hub() { " (hub)" } else { "" };
        println!("{} {}{}: {}", icon, plan.gvk, hub, plan.report.summary());
        for loss in &plan.report.losses {
            println!("     {}.{}: {}", loss.section, loss.field, loss.description);
        }
    }

    println!("\n{} conversion(s), {} lossy", generated.conversions.len(), lossy);
    Ok(())
}

fn convert(config: &HubConfig, to: &str, file: &Path) -> anyhow::Result<()> {
    let generated = pipeline::load(config)?;
    let content = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let envelope: VersionedEnvelope = serde_yaml::from_str(&content)
        .with_context(|| format!("{} is not a versioned envelope", file.display()))?;

    let target = to.rsplit('/').next().unwrap_or(to);
    let converters = ConverterRegistry::from_set(&generated.conversions);
    let converted = converters.convert(envelope, target)?;
    println!("{}", serde_json::to_string_pretty(&converted)?);
    Ok(())
}
