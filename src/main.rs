use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use metadata_extractor::{Config, ExportStyle, extractor};

#[derive(Parser)]
#[command(name = "metadata-extractor")]
#[command(about = "Exports the structure of role-marked Rust types as a JSON metadata document")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[arg(short, long, global = true, conflicts_with = "verbose", help = "Only log errors")]
    quiet: bool,

    #[arg(long, global = true, help = "Log level: trace, debug, info, warn, error")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Discover role-marked types and write the metadata document")]
    Extract(ExtractArgs),
    #[command(about = "List discovered types and their role markers without writing a file")]
    Discover(ExtractArgs),
}

#[derive(Args, Default)]
struct ExtractArgs {
    #[arg(short, long, help = "TOML configuration file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Crate root to scan (defaults to the current directory)")]
    source_root: Option<PathBuf>,
    #[arg(short, long, help = "Namespace to search, e.g. 'demo::api' or 'demo.api'")]
    namespace: Option<String>,
    #[arg(short, long, help = "Output file (defaults to internal_metadata.json)")]
    output: Option<PathBuf>,
    #[arg(long, value_enum)]
    style: Option<ExportStyle>,
    #[arg(long, help = "Also scan #[cfg(test)] modules and test files")]
    include_tests: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command.unwrap_or(Commands::Extract(ExtractArgs::default())) {
        Commands::Extract(args) => {
            let config = load_config(args)?;
            let summary = extractor::run_with_config(&config)?;
            info!(
                "Extracted {} types with {} operations from namespace {}",
                summary.types, summary.operations, summary.namespace
            );
        }
        Commands::Discover(args) => {
            let config = load_config(args)?;
            let (extractor, namespace) = extractor::prepare(&config)?;
            for descriptor in extractor.discover(&namespace) {
                let markers = descriptor
                    .markers
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                println!("{}\t{}", descriptor.qualified_name, markers);
            }
        }
    }

    Ok(())
}

fn load_config(args: ExtractArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(root) = args.source_root {
        config.source.root = root;
    }
    if let Some(namespace) = args.namespace {
        config.source.namespace = Some(namespace);
    }
    if let Some(output) = args.output {
        config.export.output = output;
    }
    if let Some(style) = args.style {
        config.export.style = style;
    }
    if args.include_tests {
        config.scan.include_tests = true;
    }

    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

fn init_logging(cli: &Cli) {
    let level = if let Some(level_str) = &cli.log_level {
        parse_level(level_str)
    } else if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        let level_str =
            env::var("METADATA_EXTRACTOR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let mut filter = EnvFilter::from_default_env();
    if env::var("RUST_LOG").is_err() {
        if let Ok(directive) = format!("metadata_extractor={}", level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
