//! mozjpeg-native command-line tool
//!
//! Inspects the host platform and the bundled library catalog, and
//! extracts, verifies or loads the native mozjpeg library.

mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mozjpeg_native::{
    checksum_file, extract, platform, verify_file, DirectoryBundle, Loader, LoaderConfig,
    VerificationOutcome,
};
use output::{resolve_color_choice, StyledOutput};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mozjpeg-native")]
#[command(about = "Provision and inspect the native mozjpeg library", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// When to use colors: auto, always, never
    #[arg(long, global = true, value_name = "WHEN")]
    color: Option<String>,

    /// TOML config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory to load the library from
    #[arg(long, global = true, value_name = "DIR")]
    lib_path: Option<PathBuf>,

    /// Library file name to load
    #[arg(long, global = true, value_name = "NAME")]
    lib_name: Option<String>,

    /// Bundled library version
    #[arg(long, global = true, value_name = "VERSION")]
    lib_version: Option<String>,

    /// Use the non-SIMD build
    #[arg(long, global = true)]
    simd_disabled: bool,

    /// Delete and re-extract the bundled library
    #[arg(long, global = true)]
    renew: bool,

    /// Root directory of the bundled resources
    #[arg(long, global = true, value_name = "DIR")]
    resources: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show host platform facts and resolved library locations
    Info,

    /// List bundled library variants and their checksums
    Catalog,

    /// Print the MD5 of a file
    Checksum {
        /// File to hash
        file: PathBuf,
        /// Verify against this catalog resource path
        #[arg(long, value_name = "RESOURCE")]
        resource: Option<String>,
    },

    /// Extract and verify the host's library variant without loading it
    Extract {
        /// Destination file (defaults to the extraction path)
        #[arg(long, value_name = "FILE")]
        dest: Option<PathBuf>,
    },

    /// Provision and load the library, then report the load state
    Load,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = build_config(&cli)?;
    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    match &cli.command {
        Commands::Info => info(&config, &mut out),
        Commands::Catalog => catalog(&config, &mut out),
        Commands::Checksum { file, resource } => {
            checksum(&config, file, resource.as_deref(), &mut out)
        }
        Commands::Extract { dest } => extract_cmd(&config, dest.clone(), &mut out),
        Commands::Load => load(&config, &mut out),
    }
}

/// Defaults < config file < environment < command-line flags
fn build_config(cli: &Cli) -> Result<LoaderConfig> {
    let base = match &cli.config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => LoaderConfig::default(),
    };
    let mut config = base.with_env_overrides();

    if let Some(path) = &cli.lib_path {
        config = config.with_lib_path(path);
    }
    if let Some(name) = &cli.lib_name {
        config = config.with_lib_name(name);
    }
    if let Some(version) = &cli.lib_version {
        config = config.with_version(version);
    }
    if cli.simd_disabled {
        config = config.with_simd_disabled(true);
    }
    if cli.renew {
        config = config.with_renew(true);
    }
    if let Some(root) = &cli.resources {
        config = config.with_resource_root(root);
    }
    Ok(config)
}

fn new_loader(config: &LoaderConfig) -> Loader {
    let bundle = config
        .resource_root
        .clone()
        .map(DirectoryBundle::new)
        .unwrap_or_else(DirectoryBundle::beside_executable);
    Loader::new(bundle)
}

fn info(config: &LoaderConfig, out: &mut StyledOutput) -> Result<()> {
    let loader = new_loader(config);
    let locator = loader.locator(config);
    let fingerprint = locator.fingerprint();

    out.heading("Host");
    out.field("OS family", fingerprint.os);
    out.field("Architecture", fingerprint.arch);
    out.field("SIMD", fingerprint.simd_mode());
    out.field("Temp directory", platform::temp_directory().display());
    out.field("Executable temp", loader.platform().temp_dir().display());
    out.field("Home directory", platform::user_home_directory().display());

    out.heading("Library");
    out.field("Version", locator.version());
    out.field("Resource", locator.resource_path());
    out.field(
        "Checksum",
        loader
            .catalog()
            .expected_checksum(&locator.resource_path())
            .unwrap_or("(not catalogued)"),
    );
    out.field("Extraction path", loader.extraction_path(config).display());
    Ok(())
}

fn catalog(config: &LoaderConfig, out: &mut StyledOutput) -> Result<()> {
    let loader = new_loader(config);
    for entry in loader.catalog().entries() {
        let marker = if loader.bundle().contains(&entry.resource_path) {
            "bundled"
        } else {
            "missing"
        };
        out.line(&format!(
            "{}  {}  ({})",
            entry.expected_checksum, entry.resource_path, marker
        ));
    }
    Ok(())
}

fn checksum(
    config: &LoaderConfig,
    file: &std::path::Path,
    resource: Option<&str>,
    out: &mut StyledOutput,
) -> Result<()> {
    let digest =
        checksum_file(file).with_context(|| format!("failed to read {}", file.display()))?;
    out.line(&format!("{}  {}", digest, file.display()));

    let Some(resource) = resource else {
        return Ok(());
    };
    let loader = new_loader(config);
    report_verification(verify_file(loader.catalog(), resource, file), out)
}

fn extract_cmd(config: &LoaderConfig, dest: Option<PathBuf>, out: &mut StyledOutput) -> Result<()> {
    let loader = new_loader(config);
    let resource = loader.locator(config).resource_path();
    let dest = dest.unwrap_or_else(|| loader.extraction_path(config));

    let bytes = extract(loader.bundle(), &resource, &dest)?;
    out.field("Extracted", format!("{} ({} bytes)", dest.display(), bytes));
    report_verification(verify_file(loader.catalog(), &resource, &dest), out)
}

fn report_verification(outcome: VerificationOutcome, out: &mut StyledOutput) -> Result<()> {
    match outcome {
        VerificationOutcome::Matched => {
            out.success("checksum matches catalog");
            Ok(())
        }
        VerificationOutcome::Inconclusive(reason) => {
            out.warning(&format!("checksum not verified: {}", reason));
            Ok(())
        }
        VerificationOutcome::Mismatched { expected, actual } => {
            out.error(&format!("checksum mismatch: expected {}, got {}", expected, actual));
            bail!("checksum verification failed")
        }
    }
}

fn load(config: &LoaderConfig, out: &mut StyledOutput) -> Result<()> {
    let loader = new_loader(config);
    let result = loader.load_unsafe(config);
    let state = loader.state();

    out.field("Phase", state.phase);
    out.field(
        "Loaded path",
        state
            .loaded_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    out.field(
        "Internal resource",
        state.is_loaded_from_internal_resource(),
    );
    out.field(
        "Version",
        state.internal_version.as_deref().unwrap_or("-"),
    );
    out.field("SIMD disabled", state.simd_disabled);
    out.field("Renewed", state.renewed);

    match result {
        Ok(()) => {
            out.success("native library loaded");
            Ok(())
        }
        Err(e) => {
            out.error(&format!("{}", e));
            Err(e.into())
        }
    }
}
