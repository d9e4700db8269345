//! blueprint-gen — build blueprint and defaults manifests from templates.
//!
//! - `blueprint-gen build -i templates -d docs.json -b blueprints -D defaults`
//! - `blueprint-gen seed -m mapping.json -s code-templates -o templates`

use anyhow::{Context, Result};
use blueprint_gen::batch;
use blueprint_gen::config::{self, BatchConfig, ErrorPolicy, Settings};
use blueprint_gen::model::RValue;
use blueprint_gen::seed::{self, SeedConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "blueprint-gen",
    version,
    about = "Reconcile tool templates with function documentation into blueprint manifests"
)]
struct Cli {
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log debug details
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a blueprint and a defaults file for every template
    Build(BuildArgs),
    /// Create templates from legacy code templates and a parameter mapping
    Seed(SeedArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Directory holding template *.json files
    #[arg(short, long)]
    input: PathBuf,

    /// Documentation database (JSON)
    #[arg(short, long)]
    docs: PathBuf,

    /// Output directory for blueprints
    #[arg(short, long)]
    blueprints: PathBuf,

    /// Output directory for defaults files
    #[arg(short = 'D', long)]
    defaults: PathBuf,

    /// TOML settings file ([options], keep_deprecated, fail_fast)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Evaluation option as NAME=VALUE, visible to getOption(). Repeatable.
    #[arg(long = "option", value_name = "NAME=VALUE", value_parser = config::parse_option)]
    options: Vec<(String, RValue)>,

    /// Drop template arguments that are no longer documented
    #[arg(long)]
    drop_deprecated: bool,

    /// Stop at the first template that fails
    #[arg(long)]
    fail_fast: bool,
}

#[derive(Args)]
struct SeedArgs {
    /// Mapping file with template_mappings
    #[arg(short, long)]
    mapping: PathBuf,

    /// Directory holding *.code-template.json files
    #[arg(short, long)]
    source: PathBuf,

    /// Output directory for templates
    #[arg(short, long)]
    output: PathBuf,

    /// Text removed from every title
    #[arg(long, default_value = " [CCBR]")]
    strip_title_suffix: String,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Command::Build(args) => build(args),
        Command::Seed(args) => {
            let written = seed::seed(&SeedConfig {
                mapping_path: args.mapping,
                source_dir: args.source,
                output_dir: args.output,
                strip_title: args.strip_title_suffix,
            })?;
            log::info!("seeded {} templates", written.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn build(args: BuildArgs) -> Result<ExitCode> {
    let mut config = BatchConfig::new(args.input, args.docs, args.blueprints, args.defaults);
    if let Some(path) = &args.config {
        Settings::load(path)?
            .apply(&mut config)
            .with_context(|| format!("failed to apply settings from {}", path.display()))?;
    }
    // Flags win over the settings file.
    config.extract.options.extend(args.options);
    if args.drop_deprecated {
        config.keep_deprecated = false;
    }
    if args.fail_fast {
        config.on_error = ErrorPolicy::FailFast;
    }

    let summary = batch::run(&config)?;
    log::info!(
        "wrote {} blueprints, {} with argument drift, {} failed",
        summary.written.len(),
        summary.mismatched,
        summary.failures.len()
    );
    for failure in &summary.failures {
        eprintln!("failed: {}: {}", failure.path.display(), failure.error);
    }
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
