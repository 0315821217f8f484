use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pact_contracts::events::EventWriter;
use pact_contracts::store::CommitmentStore;
use pact_engine::{EngineConfig, ImageInput, Pipeline, ScanRequest};

#[derive(Debug, Parser)]
#[command(name = "pact-rs", version, about = "Pact promise pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Scan(ScanArgs),
    List(ListArgs),
}

#[derive(Debug, Parser)]
struct ScanArgs {
    /// Owner every read and write is scoped to.
    #[arg(long)]
    owner: String,
    /// Screenshot file to scan.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Screenshot as a bare base64 blob or data URL.
    #[arg(long)]
    image_data: Option<String>,
    #[arg(long)]
    screenshot_id: Option<String>,
    #[arg(long)]
    screenshot_at: Option<String>,
    /// Where the request's event stream lands.
    #[arg(long, default_value = "pact-events.jsonl")]
    events: PathBuf,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    store_url: Option<String>,
}

#[derive(Debug, Parser)]
struct ListArgs {
    #[arg(long)]
    owner: String,
    #[arg(long)]
    store_url: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("pact-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Scan(args) => {
            run_scan(args)?;
            Ok(0)
        }
        Command::List(args) => {
            run_list(args)?;
            Ok(0)
        }
    }
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let image = match (args.image, args.image_data) {
        (Some(path), None) => {
            let bytes = fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ImageInput::Bytes {
                bytes,
                content_type: None,
            }
        }
        (None, Some(data)) => ImageInput::Encoded(data),
        _ => bail!("provide exactly one of --image or --image-data"),
    };

    let mut config = EngineConfig::from_env();
    if let Some(url) = args.api_url {
        config.api_url = Some(url);
    }
    if let Some(url) = args.store_url {
        config.store_url = Some(url);
    }

    let intel = config.build_intel()?;
    let store = config.build_store()?;
    let request_id = format!("req_{}", uuid::Uuid::new_v4().simple());
    let events = EventWriter::new(&args.events, request_id);

    let pipeline = Pipeline::new(intel, store, events);
    let report = pipeline.scan(ScanRequest {
        owner_id: args.owner,
        image,
        screenshot_id: args.screenshot_id,
        screenshot_timestamp: args.screenshot_at,
    })?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_list(args: ListArgs) -> Result<()> {
    let mut config = EngineConfig::from_env();
    if let Some(url) = args.store_url {
        config.store_url = Some(url);
    }
    let store = config.build_store()?;
    let rows = store.fetch_open(&args.owner)?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
