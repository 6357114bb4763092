use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stratforge::application::pipeline::{PipelineOrchestrator, PipelineRunner, PipelineServices, RunRequest};
use stratforge::config::{Config, StoreBackend, StoreEnvConfig};
use stratforge::domain::cancellation::{CancellationHandle, cancellation_pair};
use stratforge::domain::pipeline::{PipelineRun, PipelineRunSummary, RunFilter, RunId, RunStatus};
use stratforge::domain::ports::{LanguageModelService, MarketDataProvider, SandboxEnvironment};
use stratforge::domain::repositories::ResultStore;
use stratforge::domain::strategy::{IdeaOrigin, StrategyIdea};
use stratforge::infrastructure::llm::{OpenAiCompatibleClient, RetryingLanguageModel};
use stratforge::infrastructure::observability::Metrics;
use stratforge::infrastructure::persistence::{Database, InMemoryResultStore, JsonFileResultStore, SqliteResultStore};
use stratforge::infrastructure::sandbox::ProcessSandbox;
use stratforge::infrastructure::{CsvDirectoryProvider, LimitEnforcingProvider};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about = "Turns trading ideas into validated, backtested strategy code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one idea
    Run {
        /// Idea text
        #[arg(long, conflicts_with = "idea_file")]
        idea: Option<String>,

        /// Read the idea from a file (transcript, notes)
        #[arg(long)]
        idea_file: Option<PathBuf>,

        /// Where the idea came from: text, transcript or note
        #[arg(long, default_value = "text")]
        origin: String,

        /// Target return in percent; overrides any target in the idea
        #[arg(long)]
        target: Option<f64>,

        /// Print the Prometheus metrics after the run
        #[arg(long)]
        print_metrics: bool,
    },
    /// Run one pipeline per non-empty line of a file, concurrently
    Batch {
        /// File with one idea per line
        #[arg(short, long)]
        file: PathBuf,

        /// Maximum concurrent runs (defaults to MAX_CONCURRENT_RUNS)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Target return in percent for every run
        #[arg(long)]
        target: Option<f64>,

        #[arg(long)]
        print_metrics: bool,
    },
    /// Print a stored run as JSON
    Show {
        /// Run identifier
        id: String,
    },
    /// List stored runs, newest first
    List {
        #[arg(long)]
        ticker: Option<String>,

        /// success, failed, error or cancelled
        #[arg(long)]
        status: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn parse_origin(raw: &str) -> Result<IdeaOrigin> {
    match raw.trim().to_lowercase().as_str() {
        "text" => Ok(IdeaOrigin::Text),
        "transcript" => Ok(IdeaOrigin::Transcript),
        "note" | "notes" => Ok(IdeaOrigin::Note),
        _ => bail!("Invalid origin: {}. Must be 'text', 'transcript' or 'note'", raw),
    }
}

async fn build_store(config: &StoreEnvConfig) -> Result<Arc<dyn ResultStore>> {
    Ok(match config.backend {
        StoreBackend::JsonFiles => Arc::new(JsonFileResultStore::new(&config.results_dir).await?),
        StoreBackend::Sqlite => {
            let db = Database::new(&config.database_url).await?;
            Arc::new(SqliteResultStore::new(db.pool.clone()))
        }
        StoreBackend::Memory => {
            warn!("RESULT_STORE=memory: runs will not outlive this process");
            Arc::new(InMemoryResultStore::new())
        }
    })
}

fn build_orchestrator(config: &Config, store: Arc<dyn ResultStore>, metrics: Metrics) -> Result<PipelineOrchestrator> {
    if config.llm.api_key.is_none() {
        warn!("No LLM_API_KEY set; requests to {} are sent unauthenticated", config.llm.base_url);
    }
    let client: Arc<dyn LanguageModelService> = Arc::new(OpenAiCompatibleClient::new(config.llm.client_config()));
    let llm: Arc<dyn LanguageModelService> =
        Arc::new(RetryingLanguageModel::new(client, config.llm.retry_policy()).with_metrics(metrics.clone()));
    let sandbox: Arc<dyn SandboxEnvironment> = Arc::new(ProcessSandbox::new(config.sandbox.sandbox_config()));
    let market_data = config.market_data_dir.as_ref().map(|dir| {
        info!("Market data from {:?}", dir);
        let csv: Arc<dyn MarketDataProvider> = Arc::new(CsvDirectoryProvider::new(dir));
        Arc::new(LimitEnforcingProvider::new(csv)) as Arc<dyn MarketDataProvider>
    });

    let services = PipelineServices {
        llm,
        sandbox,
        market_data,
        store,
    };
    Ok(PipelineOrchestrator::new(services, config.pipeline_config()?, metrics))
}

/// First Ctrl-C cancels in-flight runs; they still finish and persist as CANCELLED
fn cancel_on_ctrl_c(handle: CancellationHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling runs...");
            handle.cancel();
        }
    });
}

fn read_idea(idea: Option<String>, idea_file: Option<&Path>) -> Result<String> {
    match (idea, idea_file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read idea file {:?}", path))
        }
        (None, None) => bail!("Provide --idea or --idea-file"),
    }
}

fn print_summary(summary: &PipelineRunSummary) {
    let reward = summary
        .best_reward
        .map(|r| format!("{:.4}", r))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<60} {:<10} attempts={:<3} reward={:<8} {}",
        summary.id.as_str(),
        summary.status.as_str(),
        summary.attempt_count,
        reward,
        summary.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn report_run(run: &PipelineRun) {
    match run.status() {
        RunStatus::Success => info!("Run {} succeeded", run.id()),
        RunStatus::Failed => warn!("Run {} failed: repair attempts exhausted", run.id()),
        RunStatus::Error => error!("Run {} errored: {}", run.id(), run.error().unwrap_or("unknown error")),
        RunStatus::Cancelled => warn!("Run {} cancelled", run.id()),
        RunStatus::Running => warn!("Run {} did not reach a terminal status", run.id()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let store = build_store(&config.store).await?;

    match cli.command {
        Commands::Run {
            idea,
            idea_file,
            origin,
            target,
            print_metrics,
        } => {
            let text = read_idea(idea, idea_file.as_deref())?;
            let mut request = RunRequest::new(StrategyIdea::new(text, parse_origin(&origin)?));
            if let Some(target) = target {
                request = request.with_target(target);
            }

            let metrics = Metrics::new()?;
            let orchestrator = build_orchestrator(&config, store, metrics.clone())?;
            let (handle, signal) = cancellation_pair();
            cancel_on_ctrl_c(handle);

            let run = orchestrator.execute(request, signal).await?;
            report_run(&run);
            println!("{}", serde_json::to_string_pretty(&run)?);
            if print_metrics {
                eprintln!("{}", metrics.render());
            }
        }
        Commands::Batch {
            file,
            concurrency,
            target,
            print_metrics,
        } => {
            let content =
                std::fs::read_to_string(&file).with_context(|| format!("Failed to read batch file {:?}", file))?;
            let requests: Vec<RunRequest> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|line| {
                    let request = RunRequest::new(StrategyIdea::new(line, IdeaOrigin::Text));
                    match target {
                        Some(target) => request.with_target(target),
                        None => request,
                    }
                })
                .collect();
            if requests.is_empty() {
                bail!("No ideas found in {:?}", file);
            }

            let metrics = Metrics::new()?;
            let orchestrator = Arc::new(build_orchestrator(&config, store, metrics.clone())?);
            let runner = PipelineRunner::new(orchestrator, concurrency.unwrap_or(config.loops.max_concurrent_runs));
            let (handle, signal) = cancellation_pair();
            cancel_on_ctrl_c(handle);

            for result in runner.run_all(requests, signal).await {
                match result {
                    Ok(run) => {
                        report_run(&run);
                        print_summary(&run.summary());
                    }
                    Err(e) => error!("Run could not be completed: {:#}", e),
                }
            }
            if print_metrics {
                eprintln!("{}", metrics.render());
            }
        }
        Commands::Show { id } => match store.get_run(&RunId::from(id.as_str())).await? {
            Some(run) => println!("{}", serde_json::to_string_pretty(&run)?),
            None => bail!("Run {} not found", id),
        },
        Commands::List { ticker, status, limit } => {
            let filter = RunFilter {
                ticker,
                status: status.as_deref().map(str::parse::<RunStatus>).transpose()?,
                limit: Some(limit),
            };
            let runs = store.list_runs(&filter).await?;
            if runs.is_empty() {
                println!("No runs found.");
            }
            for summary in &runs {
                print_summary(summary);
            }
        }
    }

    Ok(())
}
