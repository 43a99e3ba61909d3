use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roomstage_contracts::events::EventWriter;
use roomstage_contracts::images::ImageReference;
use roomstage_contracts::pipeline::{PipelineState, StageRequest};
use roomstage_contracts::providers::DescribedProvider;
use roomstage_engine::providers::ProviderAdapter;
use roomstage_engine::{EngineConfig, StageController, StageError};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const VALIDATION_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "roomstage", version, about = "Room photo enhancement pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one pipeline stage against a saved state file.
    Stage(StageArgs),
    /// List the configured provider adapters.
    Providers,
    /// Discard a saved pipeline state.
    Reset(ResetArgs),
}

#[derive(Debug, Parser)]
struct StageArgs {
    #[arg(long)]
    stage: u8,
    /// File path, http(s) URL or data:image URI.
    #[arg(long)]
    image: Option<String>,
    #[arg(long)]
    scenario: Option<String>,
    #[arg(long)]
    props: Option<String>,
    #[arg(long, default_value = "")]
    clutter_list: String,
    #[arg(long)]
    redo: bool,
    #[arg(long)]
    state: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ResetArgs {
    #[arg(long)]
    state: PathBuf,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("roomstage error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    match cli.command {
        Command::Stage(args) => run_stage(&config, args),
        Command::Providers => run_providers(&config),
        Command::Reset(args) => run_reset(&args.state),
    }
}

fn run_stage(config: &EngineConfig, args: StageArgs) -> Result<i32> {
    let mut state = load_state(&args.state)?;
    let mut request = StageRequest::new(args.stage);
    request.clutter_list = args.clutter_list;
    request.is_redo = args.redo;
    request.scenario = args.scenario;
    request.props = args.props;
    if let Some(raw) = args.image.as_deref() {
        request.image = Some(image_argument(raw)?);
    }

    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| default_events_path(&args.state));
    let controller = StageController::from_config(config)?.with_events(EventWriter::new(events_path));
    match controller.run_stage(&mut state, request) {
        Ok(outcome) => {
            save_state(&args.state, &state)?;
            print_json(&outcome.to_response())?;
            Ok(0)
        }
        Err(StageError::Validation(err)) => {
            print_json(&json!({ "error": err.to_string() }))?;
            Ok(VALIDATION_EXIT_CODE)
        }
        Err(err) => Err(err.into()),
    }
}

fn run_providers(config: &EngineConfig) -> Result<i32> {
    let controller = StageController::from_config(config)?;
    let registry = controller.chain().registry();
    let providers = registry
        .providers()
        .map(|provider| {
            let descriptor = provider.descriptor();
            json!({
                "id": descriptor.id,
                "name": provider.display_name(),
                "capabilities": descriptor.capabilities,
                "priority": descriptor.priority,
                "tiers": descriptor
                    .capabilities
                    .iter()
                    .map(|capability| capability.tier())
                    .collect::<Vec<_>>(),
            })
        })
        .collect::<Vec<Value>>();
    print_json(&json!({ "providers": providers, "simulated": registry.is_empty() }))?;
    Ok(0)
}

fn run_reset(path: &Path) -> Result<i32> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove state file {}", path.display()))?;
    }
    println!("Pipeline state reset");
    Ok(0)
}

/// URLs and data URIs are passed through; anything else is read as a file.
fn image_argument(raw: &str) -> Result<ImageReference> {
    if let Some(reference) = ImageReference::parse(raw) {
        return Ok(reference);
    }
    let bytes = fs::read(raw).with_context(|| format!("failed to read image file {raw}"))?;
    Ok(ImageReference::from_bytes(bytes))
}

fn load_state(path: &Path) -> Result<PipelineState> {
    if !path.exists() {
        return Ok(PipelineState::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("state file {} is not valid pipeline state", path.display()))
}

fn save_state(path: &Path, state: &PipelineState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let encoded = serde_json::to_string_pretty(state)?;
    fs::write(path, encoded)
        .with_context(|| format!("failed to write state file {}", path.display()))
}

fn default_events_path(state_path: &Path) -> PathBuf {
    state_path.with_extension("events.jsonl")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
