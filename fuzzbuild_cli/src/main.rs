use fuzzbuild_core::config::BaseConfiguration;
use fuzzbuild_core::executor::{BuildError, BuildExecutor, run_all};
use fuzzbuild_core::plan::BuildPlan;
use fuzzbuild_core::variant::{BuildVariant, select_variants};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "fuzzbuild.toml";

/// Builds the fuzz target under every instrumented toolchain.
///
/// Output directories are wiped and rebuilt on every run.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// TOML file overriding tool commands, base flags and targets
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Build only the named variant (repeatable); catalog order is kept
    #[clap(long = "only", value_name = "NAME")]
    only: Vec<String>,
    /// Print the variant catalog and exit
    #[clap(long)]
    list: bool,
    /// Print the composed commands without running them
    #[clap(long)]
    dry_run: bool,
    /// Emit the dry-run plan as JSON
    #[clap(long, requires = "dry_run")]
    json: bool,
    /// Enable debug logging
    #[clap(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn load_config(config_file: Option<PathBuf>) -> anyhow::Result<BaseConfiguration> {
    match config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            BaseConfiguration::load_from_file(&config_path)
                .with_context(|| format!("Could not load {config_path:?}"))
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_config_path.exists() {
                info!("Loading default configuration: {default_config_path:?}");
                BaseConfiguration::load_from_file(&default_config_path)
                    .with_context(|| format!("Could not load {default_config_path:?}"))
            } else {
                Ok(BaseConfiguration::default())
            }
        }
    }
}

fn print_catalog(variants: &[BuildVariant]) {
    for variant in variants {
        println!("{}\t{}", variant.name, variant.output_directory.display());
    }
}

fn print_plans(plans: &[BuildPlan], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plans)?);
        return Ok(());
    }
    for plan in plans {
        println!("# {} -> {}", plan.variant, plan.output_directory.display());
        for (key, value) in &plan.env_overrides {
            println!("{key}={value}");
        }
        println!("{}", plan.configure);
        println!("{}", plan.build);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let variants = select_variants(&cli.only)?;

    if cli.list {
        print_catalog(&variants);
        return Ok(());
    }

    let config = load_config(cli.config_file)?;
    let mut executor = BuildExecutor::system(config)?;

    if cli.dry_run {
        let plans: Vec<BuildPlan> = variants.iter().map(|v| executor.plan(v)).collect();
        return print_plans(&plans, cli.json);
    }

    let summary = run_all(&variants, &mut executor)?;
    info!(
        "Built {} variant(s): {}",
        summary.built.len(),
        summary
            .built
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

/// Child exit codes that fit a process status pass through; anything else is 1.
fn exit_status_byte(code: i32) -> u8 {
    u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(build_error) = e.downcast_ref::<BuildError>() {
                // run_all already logged it
                return ExitCode::from(exit_status_byte(build_error.exit_code()));
            }
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
