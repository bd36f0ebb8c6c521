//! Binary entry point for the rexbatch command-line client.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::{Args, Parser, Subcommand};
use rexbatch::cli::{commit_report, encode_report, failure_report, read_json, read_type_map, BatchFile};
use rexbatch::{ClientConfig, EncodeMode, GraphClient, Transaction};
use serde_json::Value as JsonValue;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "rexbatch",
    version,
    about = "Typed batch writes against a Rexster-style graph server",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    #[arg(
        long,
        global = true,
        env = "REXBATCH_CONFIG",
        value_name = "FILE",
        help = "Config file (defaults to <config dir>/rexbatch/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Server host")]
    host: Option<String>,

    #[arg(long, global = true, help = "Server port")]
    port: Option<u16>,

    #[arg(long, global = true, help = "Graph name")]
    graph: Option<String>,

    #[arg(long, global = true, value_name = "MS", help = "Per-request timeout")]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the typed encoding of a JSON document
    Encode {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "FILE", help = "JSON type map")]
        types: Option<PathBuf>,

        #[arg(long, help = "Emit one embedded literal instead of a field map")]
        literal: bool,
    },
    /// Commit a batch file against the configured graph
    Commit {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(
            long,
            value_name = "FILE",
            help = "JSON type map, replacing the one in the batch file"
        )]
        types: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    install_tracing_subscriber();
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the command succeeded.
async fn run() -> Result<bool, Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Encode {
            input,
            types,
            literal,
        } => {
            let types = types.as_deref().map(read_type_map).transpose()?;
            let mode = if literal {
                EncodeMode::EmbeddedLiteral
            } else {
                EncodeMode::FieldMap
            };
            let report = encode_report(read_json(&input)?, types, mode)?;
            emit(&report)?;
            Ok(true)
        }
        Command::Commit { file, types } => {
            let config = load_config(&cli.connection)?;
            let batch = BatchFile::load(&file)?;
            let types = match types {
                Some(path) => Some(read_type_map(&path)?),
                None => batch.type_map()?,
            };
            let mut tx = match types {
                Some(types) => Transaction::with_types(types),
                None => Transaction::new(),
            };
            batch.apply(&mut tx)?;

            let client = GraphClient::connect(config)?;
            match client.commit(&mut tx).await {
                Ok(outcome) => {
                    emit(&commit_report(&outcome, &batch))?;
                    Ok(true)
                }
                Err(err) => {
                    emit(&failure_report(&err))?;
                    Ok(false)
                }
            }
        }
    }
}

fn load_config(args: &ConnectionArgs) -> Result<ClientConfig, Box<dyn Error>> {
    let mut config = ClientConfig::load(args.config.as_deref())?;
    config.apply_env()?;
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(graph) = &args.graph {
        config.graph = graph.clone();
    }
    if args.timeout_ms.is_some() {
        config.timeout_ms = args.timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

fn emit(report: &JsonValue) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
