//! Zentinel Adapt Agent CLI entry point.
//!
//! Streams a body through one local adaptation exchange and writes the
//! adapted body to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zentinel_agent_adapt::local::run_exchange;
use zentinel_agent_adapt::{AdapterConfig, AdapterService, Header, Message, ServiceRegistry};

#[derive(Parser, Debug)]
#[command(name = "zentinel-agent-adapt")]
#[command(
    author,
    version,
    about = "Streaming body adaptation agent for Zentinel"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transform definition path (overrides the configuration)
    #[arg(short, long, env = "ADAPT_DEFINITION")]
    definition: Option<PathBuf>,

    /// Body to adapt; reads stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Content-Type of the body
    #[arg(long, default_value = "text/html")]
    content_type: String,

    /// Chunk size in bytes (overrides the configuration)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print example configuration and definition, then exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and definition, then exit.
    #[arg(long)]
    validate: bool,

    /// Print service counters as JSON to stderr when done.
    #[arg(long)]
    stats: bool,
}

fn print_example_config() {
    let example = r#"# Adapt Agent Configuration Example
version: "1"

settings:
  # Service URI, unique per registry
  service_uri: "ecap://zentinel.dev/adapt/modifying"
  # Transform definition artifact, re-checked before every transaction
  definition_path: "/etc/zentinel/adapt.yaml"
  # Stop rewriting after this many adapted bytes (bytes)
  max_body_size: 10485760  # 10MB
  # Look-behind window for regex rules without their own (bytes)
  default_window: 64
  # Chunk size for local exchanges (bytes)
  chunk_size: 16384

headers:
  add:
    - name: "X-Zentinel-Adapt"
      value: "${service.uri}"
  set:
    - name: "X-Adapt-Definition"
      value: "${definition.version}"
  remove:
    - "ETag"

---
# Transform Definition Example (/etc/zentinel/adapt.yaml)
version: "1"

content_types:
  - pattern: "text/html"
    type: exact
  - pattern: "text/*"
    type: glob

rules:
  - name: "kristian"
    find: "Kristian"
    replace: "Christian"

  - name: "iso-dates"
    type: regex
    find: "(\\d{4})-(\\d{2})-(\\d{2})"
    replace: "$3.$2.$1"
    window: 10
"#;
    println!("{}", example);
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init();
    }

    // Print example config if requested
    if args.example_config {
        print_example_config();
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        if config_path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        }
    } else {
        AdapterConfig::default()
    };

    // Override from CLI
    if let Some(definition) = &args.definition {
        config.settings.definition_path = definition.to_string_lossy().to_string();
    }
    let chunk_size = args.chunk_size.unwrap_or(config.settings.chunk_size);

    let service = AdapterService::new(config).with_context(|| "Failed to load adaptation service")?;

    // Validate only if requested
    if args.validate {
        info!(tag = %service.tag(), "Configuration is valid");
        return Ok(());
    }

    let mut registry = ServiceRegistry::new();
    let service = Arc::new(service);
    registry.register(Arc::clone(&service))?;
    service.start();

    info!(
        uri = %service.uri(),
        tag = %service.tag(),
        input = ?args.input,
        chunk_size,
        "Starting local adaptation exchange"
    );

    let input: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(
            File::open(path)
                .with_context(|| format!("Failed to open input: {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let mut header = Header::new();
    header.add("Content-Type", args.content_type.as_str());
    let virgin = Message::with_body(header);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = run_exchange(&service, virgin, input, &mut out, chunk_size)
        .context("Adaptation exchange failed")?;

    info!(
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        definition = ?summary.definition_version,
        "Adaptation exchange finished"
    );

    if args.stats {
        eprintln!("{}", serde_json::to_string_pretty(&service.stats())?);
    }

    registry.retire_all();
    Ok(())
}
