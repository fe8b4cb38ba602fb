//! Schema Resolver CLI
//!
//! Inspect the resolver configuration and try out artifact naming and topic
//! header derivation without running a pipeline.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use cdc_schema_resolver::record::{Headers, RecordMetadata};
use cdc_schema_resolver::strategy::ArtifactReferenceStrategy;
use cdc_schema_resolver::{Settings, TableIdStrategy, TopicHeaderTransform};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-resolver")]
#[command(about = "Inspect schema resolver configuration and artifact naming")]
struct Cli {
    /// Configuration file (defaults to schema-resolver.toml and friends)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or create configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print the artifact reference derived for a message
    Derive(DeriveArgs),

    /// Print the header the topic transform adds for a topic
    Header {
        /// Topic name
        #[arg(short, long)]
        topic: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show {
        /// Output format: toml or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Write a configuration file with default values
    Init {
        /// Output file
        #[arg(short, long, default_value = "schema-resolver.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct DeriveArgs {
    /// Topic the message was read from
    #[arg(short, long)]
    topic: String,

    /// The payload is the message key
    #[arg(long)]
    key: bool,

    /// Raw value of the table identity header
    #[arg(long)]
    header: Option<String>,

    /// Name of the table identity header (defaults to the configured one)
    #[arg(long)]
    header_name: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let path = match path {
        Some(path) => Some(
            path.to_str()
                .with_context(|| format!("config path is not UTF-8: {}", path.display()))?,
        ),
        None => None,
    };
    Settings::load_from(path).context("failed to load configuration")
}

fn render_settings(settings: &Settings, format: &str) -> anyhow::Result<String> {
    match format {
        "toml" => Ok(toml::to_string_pretty(settings)?),
        "json" => Ok(format!("{}\n", serde_json::to_string_pretty(settings)?)),
        other => bail!("invalid format {other}, use 'toml' or 'json'"),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Config(ConfigCommand::Show { format }) => {
            let settings = load_settings(cli.config.as_deref())?;
            print!("{}", render_settings(&settings, &format)?);
            Ok(())
        }

        Commands::Config(ConfigCommand::Init { output, force }) => {
            if output.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", output.display());
            }
            let path = output
                .to_str()
                .with_context(|| format!("output path is not UTF-8: {}", output.display()))?;
            Settings::default()
                .save(path)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("✅ Wrote {}", output.display());
            Ok(())
        }

        Commands::Derive(args) => {
            let settings = load_settings(cli.config.as_deref())?;
            let header_name = args
                .header_name
                .unwrap_or(settings.strategy.table_id_header);

            let mut headers = Headers::new();
            if let Some(value) = args.header {
                headers.add(header_name.as_str(), value.into_bytes());
            }
            let metadata = RecordMetadata::new(args.topic, args.key).with_headers(Some(headers));

            let strategy = TableIdStrategy::new(header_name);
            let reference = strategy.artifact_reference(&metadata);
            println!("{}", serde_json::to_string_pretty(&reference)?);
            Ok(())
        }

        Commands::Header { topic } => {
            let settings = load_settings(cli.config.as_deref())?;
            let Some(config) = settings.transform else {
                bail!("no [transform] section configured");
            };

            let transform = TopicHeaderTransform::new(&config)?;
            match transform.header_value(&topic) {
                Some(value) => println!("{}={}", transform.header_name(), value),
                None => println!("No header for topic {}", topic),
            }
            Ok(())
        }
    }
}
