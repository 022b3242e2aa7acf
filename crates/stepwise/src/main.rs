use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepwise_engine::alias::AliasStore;
use stepwise_engine::config::{ConfigLoader, StepwiseConfig};
use stepwise_engine::driver::Driver;
use stepwise_engine::executor::ActionExecutor;
use stepwise_engine::goal::Goal;
use stepwise_engine::llm::{ChatModel, LlmClient};
use stepwise_engine::oracle::KeywordOracle;
use stepwise_engine::planner::{FallbackPlanner, LlmPlanner, Planner};
use stepwise_engine::report::write_report;
use stepwise_engine::runlog::RunLog;
use stepwise_engine::runner::{StepOrchestrator, create_run_dir};
use stepwise_h::ChromiumDriver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stepwise", version, about = "Natural-language UI test runner")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one goal file against a fresh browser
    Run(RunArgs),
}

#[derive(ClapArgs)]
struct RunArgs {
    /// Goal YAML file (name, url, steps, assertions)
    goal: PathBuf,

    /// Launch browser in visible mode (not headless)
    #[arg(long)]
    headed: bool,

    /// Configuration file (defaults to ./stepwise.yaml, then ~/.stepwise/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory that receives one sub-directory per run
    #[arg(long)]
    runs_dir: Option<PathBuf>,

    /// Alias file to read and learn into
    #[arg(long)]
    aliases: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report paths.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run(run) => run_goal(run).await,
    }
}

async fn load_config(args: &RunArgs) -> anyhow::Result<StepwiseConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };
    if args.headed {
        config.browser.headless = false;
    }
    if let Some(dir) = &args.runs_dir {
        config.runs_dir = dir.clone();
    }
    if let Some(path) = &args.aliases {
        config.aliases.path = Some(path.clone());
    }
    Ok(config)
}

/// The LLM client when credentials are present; otherwise `None` and a warning.
fn chat_model(config: &StepwiseConfig) -> Option<Arc<dyn ChatModel>> {
    match LlmClient::from_config(&config.llm) {
        Ok(client) => {
            info!(
                provider = %client.settings().provider,
                model = %client.settings().model,
                "LLM configured"
            );
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("LLM unavailable ({}); steps fall back to single clicks", e);
            None
        }
    }
}

async fn run_goal(args: RunArgs) -> anyhow::Result<()> {
    let config = Arc::new(load_config(&args).await?);
    let goal = Goal::load(&args.goal)
        .await
        .with_context(|| format!("Failed to load goal {}", args.goal.display()))?;

    let aliases = Arc::new(AliasStore::from_config(&config.aliases));
    if let Some(path) = aliases.path() {
        info!("Alias store: {}", path.display());
    }

    let model = chat_model(&config);
    let planner: Arc<dyn Planner> = match &model {
        Some(model) => Arc::new(LlmPlanner::new(
            model.clone(),
            config.limits.plan_snippet_chars,
            config.limits.max_actions_per_step,
        )),
        None => Arc::new(FallbackPlanner),
    };
    let oracle = Arc::new(KeywordOracle::new(
        config.oracle.confirmation_tokens.clone(),
        model,
        config.limits.oracle_snippet_chars,
    ));
    let orchestrator = StepOrchestrator::new(
        ActionExecutor::new(aliases, config.clone()),
        planner,
        oracle,
        config.clone(),
    );

    let dir = create_run_dir(&config.runs_dir, &goal).await?;
    let log = RunLog::create(&dir, config.limits.log_truncate_chars);

    let mut driver = ChromiumDriver::launch(&config.browser)
        .await
        .context("Failed to launch browser")?;
    let outcome = orchestrator.run(&mut driver, &goal, &dir, &log).await;
    if let Err(e) = driver.close().await {
        warn!("Failed to close browser: {}", e);
    }
    let record = outcome?;

    let report = write_report(&dir, &record).await?;
    print_summary(&report, &dir, record.passed_steps(), record.steps.len());
    Ok(())
}

fn print_summary(report: &Path, dir: &Path, passed: usize, total: usize) {
    println!("Steps passed: {}/{}", passed, total);
    println!("Report: {}", report.display());
    println!("Artifacts: {}", dir.display());
}
