use anyhow::Context as _;
use clap::Parser;
use consult_flow::FsArtifactStore;
use mdt_consult::{
    BatchDriver, CaseRunner, ConsultConfig, ErrorLog, HttpRetriever, ReasoningOracle, RigOracle,
    SpecialistAgent, SpecialistProfile, SpecialistTeam,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Multi-specialist diagnostic consultation over a directory of case files.
#[derive(Debug, Parser)]
#[command(name = "mdt-consult", version)]
struct Cli {
    /// Directory containing one JSON file per case
    case_dir: PathBuf,

    /// Number of cases processed concurrently
    #[arg(long)]
    workers: Option<usize>,

    /// YAML configuration file
    #[arg(long, env = "MDT_CONSULT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    result_dir: Option<PathBuf>,

    #[arg(long)]
    error_log: Option<PathBuf>,

    /// Discussion rounds
    #[arg(long)]
    rounds: Option<u32>,

    /// Turns per round
    #[arg(long)]
    turns: Option<u32>,

    /// OpenRouter model id
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    retriever_url: Option<String>,

    /// Seed for the discussion randomness
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut ConsultConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(result_dir) = self.result_dir {
            config.result_dir = result_dir;
        }
        if let Some(error_log) = self.error_log {
            config.error_log = error_log;
        }
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(turns) = self.turns {
            config.turns = turns;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(url) = self.retriever_url {
            config.retriever.endpoint = url;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

async fn load_config(cli: Cli) -> anyhow::Result<(PathBuf, ConsultConfig)> {
    let mut config = match &cli.config {
        Some(path) => ConsultConfig::from_yaml_file(path).await?,
        None => ConsultConfig::default(),
    };
    let case_dir = cli.case_dir.clone();
    cli.apply(&mut config);
    config.validate()?;
    Ok((case_dir, config))
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let (case_dir, config) = load_config(cli).await?;
    info!(?config, "configuration loaded");

    let oracle: Arc<dyn ReasoningOracle> = Arc::new(RigOracle::from_env(config.model.clone())?);

    let mut agents = Vec::new();
    for profile in SpecialistProfile::ALL {
        let retriever = HttpRetriever::new(
            config.retriever.endpoint.clone(),
            config.retriever.name.clone(),
            profile.corpus,
            config.retriever.timeout(),
        )?;
        agents.push(SpecialistAgent::new(
            profile,
            Arc::new(retriever),
            oracle.clone(),
            config.top_k,
        ));
    }
    let team = SpecialistTeam::new(agents);

    tokio::fs::create_dir_all(&config.result_dir)
        .await
        .with_context(|| format!("cannot create result directory {}", config.result_dir.display()))?;
    let store = Arc::new(FsArtifactStore::new(config.result_dir.clone()));
    let error_log = Arc::new(ErrorLog::new(config.error_log.clone()));

    let runner = CaseRunner::new(Arc::new(team), oracle, store, error_log.clone())
        .with_settings(config.discussion_settings())
        .with_retry(config.retry_policy())
        .with_seed(config.seed);
    let driver = BatchDriver::new(Arc::new(runner), config.workers);

    let summary = driver.run_dir(&case_dir).await?;
    info!(
        completed = summary.completed,
        cached = summary.cached,
        failed = summary.failed,
        total = summary.total(),
        "all cases processed"
    );

    error_log.is_empty().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: cannot install tracing subscriber: {e}");
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("some cases failed, see the error log");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "consultation batch aborted");
            ExitCode::FAILURE
        }
    }
}
