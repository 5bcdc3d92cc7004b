//! glang - G-Lang command-line tool
//!
//! Parses and checks G-Lang documents, inspects the primitive table and
//! drives the pre-built state machines, one-shot or interactively.

mod commands;
mod config;
mod repl;

use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;
use config::{load_manifest, Config};
use glang_core::{ExtensionRegistry, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "glang")]
#[command(about = "Parse, validate and drive G-Lang documents")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "GLANG_CONFIG")]
    config: Option<PathBuf>,

    /// Extension manifest to register (repeatable)
    #[arg(short, long = "extension")]
    extensions: Vec<PathBuf>,

    /// Skip schema validation
    #[arg(long)]
    no_validate: bool,

    /// Report unbalanced tags as errors
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a document and print its tree as JSON ("-" reads stdin)
    Parse {
        input: String,
    },

    /// Validate one or more documents
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List the active primitives
    Primitives,

    /// List the pre-built state machines
    Machines,

    /// Drive a fresh machine through a sequence of events
    Run {
        /// Machine kind (stream, tool, approve)
        machine: String,

        /// Events to apply in order
        events: Vec<String>,
    },

    /// Start an interactive session with a machine
    Repl {
        /// Machine kind (stream, tool, approve)
        machine: String,
    },
}

/// Shared state for command execution.
pub struct Context {
    pub parser: Parser,
    pub registry: Arc<ExtensionRegistry>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            std::process::exit(1);
        }
    };

    // Flags override file and environment
    if cli.no_validate {
        config.parser.validate = false;
    }
    if cli.strict {
        config.parser.strict = true;
    }
    config.extensions.paths.extend(cli.extensions);

    let registry = Arc::new(ExtensionRegistry::new());
    for path in &config.extensions.paths {
        let extension = match load_manifest(path) {
            Ok(ext) => ext,
            Err(e) => {
                eprintln!("{}: {}", "Extension error".red(), e);
                std::process::exit(1);
            }
        };
        if let Err(e) = registry.register(extension) {
            eprintln!("{}: {}: {}", "Extension error".red(), path.display(), e);
            std::process::exit(1);
        }
    }

    tracing::debug!("parser options: {:?}", config.parser);

    let ctx = Context {
        parser: Parser::with_registry(config.parser, registry.clone()),
        registry,
    };

    match cli.command {
        Commands::Repl { machine } => {
            repl::run(&machine)?;
        }
        cmd => {
            let output = commands::execute(&ctx, cmd).await?;
            if output.ok {
                println!("{}", output.text);
            } else {
                eprintln!("{}", output.text);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
