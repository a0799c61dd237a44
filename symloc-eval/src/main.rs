//! symloc-eval - Main entry point
//!
//! Runs symptom localization evaluation batches against LLM providers and
//! writes per-report artifacts plus a batch summary under the root folder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use symloc_common::config::{
    default_config_path, load_toml_config, write_toml_config, ProviderConfig, ProviderKind, RootFolderResolver,
    TomlConfig,
};
use symloc_common::events::{EvalEvent, EventBus};
use symloc_common::models::EvaluationMode;
use symloc_eval::dataset::{DatasetLoader, ReportIdRange};
use symloc_eval::normalizer::normalize;
use symloc_eval::storage::{load_batch_summary, load_report_artifact, render_batch, render_report};
use symloc_eval::{
    BatchOrchestrator, JsonlRetriever, OpenAiCompatibleProvider, PredictionProvider, RetrievalCache, Retriever,
    ReportStore,
};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for symloc-eval
#[derive(Parser, Debug)]
#[command(name = "symloc-eval")]
#[command(about = "Symptom localization evaluation for LLM providers")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config folder)
    #[arg(short, long, global = true, env = "SYMLOC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a range of reports
    Run(RunArgs),
    /// Load and normalize ground truth without calling any provider
    Validate(RangeArgs),
    /// Print the text summary of a stored artifact
    Summarize {
        /// Report artifact or batch summary JSON file
        path: PathBuf,
    },
    /// Write a default configuration file
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// First report id (inclusive)
    #[arg(long)]
    start_id: u32,

    /// Last report id (inclusive)
    #[arg(long)]
    end_id: u32,

    /// Folder holding diagnostic_<id>.json reports
    #[arg(long, env = "SYMLOC_DATA_PATH")]
    data_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    range: RangeArgs,

    #[arg(long, value_enum, default_value_t = ModeArg::Both)]
    mode: ModeArg,

    /// Provider names to run (default: every configured provider)
    #[arg(long, value_delimiter = ',')]
    providers: Vec<String>,

    /// Results root folder
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Pre-computed retrieval results (JSONL), required for RAG mode
    #[arg(long)]
    retrieval_results: Option<PathBuf>,

    /// Retrieval cache file: seeded from if present, written back after the run
    #[arg(long)]
    rag_cache: Option<PathBuf>,

    /// Override batch.max_workers
    #[arg(long)]
    max_workers: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    Baseline,
    Rag,
    Both,
}

impl ModeArg {
    fn modes(self) -> Vec<EvaluationMode> {
        match self {
            ModeArg::Baseline => vec![EvaluationMode::Baseline],
            ModeArg::Rag => vec![EvaluationMode::RagEnhanced],
            ModeArg::Both => EvaluationMode::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);
    let config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => TomlConfig::default(),
    };

    // Initialize tracing: RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "symloc_eval={level},symloc_common={level}",
                level = config.logging.level
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        Some(path) => info!("No configuration at {}, using compiled defaults", path.display()),
        None => info!("No configuration folder on this platform, using compiled defaults"),
    }

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::Validate(args) => validate(&config, args).await,
        Command::Summarize { path } => summarize(&path).await,
        Command::InitConfig { path, force } => init_config(&path, force),
    }
}

fn data_loader(config: &TomlConfig, cli_data_path: Option<PathBuf>) -> Result<DatasetLoader> {
    let Some(data_path) = cli_data_path.or_else(|| config.data_path.clone()) else {
        bail!("No data path given: pass --data-path or set data_path in the configuration");
    };
    Ok(DatasetLoader::new(data_path))
}

fn select_providers(config: &TomlConfig, names: &[String]) -> Result<Vec<ProviderConfig>> {
    let available = config.effective_providers();
    if names.is_empty() {
        return Ok(available);
    }

    names
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|p| &p.name == name)
                .cloned()
                .with_context(|| format!("Unknown provider '{}'", name))
        })
        .collect()
}

async fn run(mut config: TomlConfig, args: RunArgs) -> Result<()> {
    if let Some(max_workers) = args.max_workers {
        config.batch.max_workers = max_workers;
        config.validate().context("Invalid --max-workers")?;
    }

    let range = ReportIdRange::new(args.range.start_id, args.range.end_id)?;
    let loader = data_loader(&config, args.range.data_path)?;
    let modes = args.mode.modes();

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder)
        .with_toml_config(&config)
        .resolve();
    info!("Root folder: {}", root_folder.display());

    let mut providers: Vec<Arc<dyn PredictionProvider>> = Vec::new();
    for provider_config in select_providers(&config, &args.providers)? {
        let provider: Arc<dyn PredictionProvider> = match provider_config.kind {
            ProviderKind::OpenaiCompatible => Arc::new(
                OpenAiCompatibleProvider::from_config(&provider_config)
                    .with_context(|| format!("Failed to initialize provider '{}'", provider_config.name))?,
            ),
        };
        info!(
            provider = %provider_config.name,
            kind = provider_config.kind.as_str(),
            model = %provider_config.model,
            "Provider ready"
        );
        providers.push(provider);
    }

    let retriever: Option<Arc<dyn Retriever>> = match &args.retrieval_results {
        Some(path) => {
            let retriever = JsonlRetriever::load(path)
                .await
                .with_context(|| format!("Failed to load retrieval results from {}", path.display()))?;
            info!(path = %path.display(), queries = retriever.len(), "Retrieval results loaded");
            Some(Arc::new(retriever))
        }
        None => None,
    };
    if modes.contains(&EvaluationMode::RagEnhanced) && retriever.is_none() {
        bail!("RAG mode needs --retrieval-results");
    }

    let cache = Arc::new(RetrievalCache::new());
    if let Some(path) = &args.rag_cache {
        if path.exists() {
            let seeded = cache
                .import_jsonl(path)
                .await
                .with_context(|| format!("Failed to read retrieval cache {}", path.display()))?;
            info!(path = %path.display(), entries = seeded, "Retrieval cache seeded");
        }
    }

    let event_bus = EventBus::new(config.batch.event_capacity);
    let progress = tokio::spawn(log_progress(event_bus.subscribe()));

    let orchestrator = BatchOrchestrator::new(&config, providers, retriever)
        .with_cache(cache)
        .with_event_bus(event_bus);

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling batch");
            cancel_on_signal.cancel();
        }
    });

    let result = orchestrator.run_batch(&loader, range, &modes, cancel).await;
    let cache = Arc::clone(orchestrator.cache());

    // Dropping the orchestrator closes the event channel and ends the progress task
    drop(orchestrator);
    let _ = progress.await;

    if let Some(path) = &args.rag_cache {
        match cache.export_jsonl(path).await {
            Ok(entries) => info!(path = %path.display(), entries, "Retrieval cache written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write retrieval cache"),
        }
    }

    let outcome = result.context("Evaluation batch failed")?;

    let store = ReportStore::new(&root_folder);
    for artifact in &outcome.reports {
        store
            .save_report_artifact(artifact)
            .await
            .with_context(|| format!("Failed to save report {}", artifact.report_id))?;
    }
    let summary_path = store
        .save_batch_summary(&outcome.summary)
        .await
        .context("Failed to save batch summary")?;

    println!("{}", render_batch(&outcome.summary));
    info!(batch_id = %outcome.batch_id(), "Batch summary: {}", summary_path.display());

    if outcome.cancelled() {
        warn!(completed = outcome.reports.len(), "Batch was cancelled; partial results saved");
    }
    Ok(())
}

async fn log_progress(mut rx: broadcast::Receiver<EvalEvent>) {
    loop {
        match rx.recv().await {
            Ok(EvalEvent::BatchStarted { report_count, unit_count, .. }) => {
                info!(reports = report_count, units = unit_count, "Batch started");
            }
            Ok(EvalEvent::UnitStarted { symptom_id, provider, mode, .. }) => {
                debug!(%symptom_id, %provider, %mode, "Unit started");
            }
            Ok(EvalEvent::UnitScored { symptom_id, provider, mode, overall_score, .. }) => {
                debug!(%symptom_id, %provider, %mode, overall_score, "Unit scored");
            }
            Ok(EvalEvent::UnitFailed { symptom_id, provider, mode, kind, .. }) => {
                debug!(%symptom_id, %provider, %mode, %kind, "Unit failed");
            }
            Ok(EvalEvent::ReportCompleted { report_id, scored_units, failed_units, .. }) => {
                info!(report_id, scored_units, failed_units, "Report completed");
            }
            Ok(EvalEvent::BatchCompleted { cancelled, scored_units, failed_units, .. }) => {
                info!(cancelled, scored_units, failed_units, "Batch completed");
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Progress logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn validate(config: &TomlConfig, args: RangeArgs) -> Result<()> {
    let range = ReportIdRange::new(args.start_id, args.end_id)?;
    let loader = data_loader(config, args.data_path)?;

    let mut malformed_total = 0;
    let mut unreadable = 0;
    for (report_id, loaded) in loader.load_range(range).await? {
        let report = match loaded {
            Ok(report) => report,
            Err(e) => {
                error!(report_id, error = %e, "Unreadable report");
                println!("report {report_id}: unreadable ({e})");
                unreadable += 1;
                continue;
            }
        };

        let mut malformed = Vec::new();
        for symptom in &report.symptoms {
            if let Err(e) = normalize(symptom) {
                malformed.push(e.to_string());
            }
        }
        println!(
            "report {}: {} symptoms, {} malformed",
            report_id,
            report.symptoms.len(),
            malformed.len()
        );
        for reason in &malformed {
            println!("  {reason}");
        }
        malformed_total += malformed.len();
    }

    info!(malformed = malformed_total, unreadable, "Validation finished");
    Ok(())
}

async fn summarize(path: &Path) -> Result<()> {
    let is_batch = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("batch_summary_"))
        .unwrap_or(false);

    let text = if is_batch {
        let summary = load_batch_summary(path)
            .await
            .with_context(|| format!("Failed to read batch summary {}", path.display()))?;
        render_batch(&summary)
    } else {
        let artifact = load_report_artifact(path)
            .await
            .with_context(|| format!("Failed to read report artifact {}", path.display()))?;
        render_report(&artifact)
    };

    println!("{text}");
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let config = TomlConfig {
        providers: ProviderConfig::compiled_defaults(),
        ..TomlConfig::default()
    };
    write_toml_config(&config, path).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
