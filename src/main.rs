use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use digest_worker::clients::{
    AgentChannel, ChannelRef, GeminiClient, InsightSynthesizer, MessageSender, OpenServClient,
};
use digest_worker::config::{AppConfig, CliConfig, FileConfig, StoreSettings};
use digest_worker::decision::MessagingPolicy;
use digest_worker::pipeline::{ContentPipeline, DigestSender};
use digest_worker::scheduler::{cycles::default_cycles, CycleContext, CycleScheduler, InitialSendTracker};
use digest_worker::server::{metrics, run_server, RequestsLoggingLevel};
use digest_worker::shutdown::ShutdownSignals;
use digest_worker::store::{RestUserStore, SqliteUserStore, UserStore};
use digest_worker::{HealthState, LockRegistry};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[clap(version = env!("BUILD_GIT_HASH"))]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port the health listener binds to.
    #[clap(short, long, default_value_t = digest_worker::config::DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    /// IANA timezone for the midnight force-refresh.
    #[clap(long, env = "DIGEST_TIMEZONE")]
    pub timezone: Option<String>,

    /// Use a local SQLite user store instead of the hosted REST table.
    #[clap(long, value_parser = parse_path)]
    pub sqlite_path: Option<PathBuf>,

    #[clap(long, env = "SUPABASE_URL", hide_env_values = true)]
    pub store_url: Option<String>,

    #[clap(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    pub store_service_key: Option<String>,

    #[clap(long, env = "OPENSERV_API_KEY", hide_env_values = true)]
    pub openserv_api_key: Option<String>,

    /// Session cookie needed to read agent replies back.
    #[clap(long, env = "OPENSERV_CONNECT_SID", hide_env_values = true)]
    pub openserv_session: Option<String>,

    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// The level of logging to perform on each health listener request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            port: self.port,
            timezone: self.timezone.clone(),
            store_url: self.store_url.clone(),
            store_service_key: self.store_service_key.clone(),
            sqlite_path: self.sqlite_path.clone(),
            openserv_api_key: self.openserv_api_key.clone(),
            openserv_session: self.openserv_session.clone(),
            gemini_api_key: self.gemini_api_key.clone(),
        }
    }
}

fn open_store(settings: &StoreSettings) -> Result<Arc<dyn UserStore>> {
    match settings {
        StoreSettings::Rest {
            url,
            service_key,
            timeout,
        } => {
            info!("Using REST user store at {}", url);
            let store = RestUserStore::new(url, service_key, *timeout)
                .context("Failed to create REST user store")?;
            Ok(Arc::new(store))
        }
        StoreSettings::Sqlite { path } => {
            info!("Opening SQLite user store at {:?}...", path);
            let store = SqliteUserStore::new(path)?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    metrics::init_metrics();

    let store = open_store(&config.store)?;

    let openserv = Arc::new(
        OpenServClient::new(
            &config.generation.base_url,
            &config.generation.api_key,
            config.generation.session_cookie.clone(),
            config.generation.timeout,
        )
        .context("Failed to create OpenServ client")?,
    );

    let mut pipeline = ContentPipeline::new(
        Arc::clone(&store),
        Arc::clone(&openserv) as Arc<dyn AgentChannel>,
        config.generation.channels.clone(),
        config.pipeline.clone(),
    );

    match &config.insights {
        Some(insights) => {
            info!("AI synthesis enabled with model {}", insights.model);
            let gemini = GeminiClient::new(
                &insights.base_url,
                &insights.api_key,
                &insights.model,
                insights.timeout,
            )
            .context("Failed to create Gemini client")?;
            pipeline = pipeline.with_synthesizer(Arc::new(gemini) as Arc<dyn InsightSynthesizer>);
        }
        None => warn!("No Gemini API key configured, exposed content will be raw intel"),
    }

    match &config.messaging {
        Some(messaging) => {
            info!("Digest messaging enabled via channel {}", messaging.channel);
            let channel: ChannelRef = messaging.channel.clone();
            pipeline = pipeline.with_digest_sender(DigestSender::new(
                Arc::clone(&openserv) as Arc<dyn MessageSender>,
                channel,
                MessagingPolicy::from_hours(messaging.cooldown_hours),
                messaging.send_delay,
            ));
        }
        None => info!("Digest messaging disabled"),
    }

    let shutdown = CancellationToken::new();
    let locks = LockRegistry::new();
    let initial_sends = InitialSendTracker::new();
    let health = HealthState::new(env!("BUILD_GIT_HASH"), locks.clone(), initial_sends.clone());

    let context = CycleContext::new(
        Arc::new(pipeline),
        locks,
        initial_sends,
        shutdown.clone(),
        &config.schedule,
    );

    let mut scheduler =
        CycleScheduler::new(context, health.clone(), config.schedule.shutdown_grace);
    for cycle in default_cycles(&config.schedule, config.messaging.is_some()) {
        scheduler.register(cycle);
    }

    info!(
        "Digest worker {} starting, midnight refresh in {}",
        health.version(),
        config.schedule.timezone
    );

    let mut signals = ShutdownSignals::install().context("Failed to install signal handlers")?;

    let mut server = tokio::spawn(run_server(
        health,
        config.port,
        cli_args.logging_level,
        shutdown.clone(),
    ));
    let mut scheduler_task = tokio::spawn(scheduler.run());

    let mut exit_error = None;
    tokio::select! {
        name = signals.recv() => {
            info!("Shutdown signal received ({})", name);
        }
        result = &mut scheduler_task => {
            match result {
                Ok(Ok(())) => info!("Scheduler exited"),
                Ok(Err(e)) => {
                    error!("Scheduler stopped: {}", e);
                    exit_error = Some(anyhow::Error::new(e));
                }
                Err(e) => exit_error = Some(anyhow::anyhow!("Scheduler task failed: {}", e)),
            }
        }
        result = &mut server => {
            match result {
                Ok(Ok(())) => info!("Health listener exited"),
                Ok(Err(e)) => {
                    error!("Health listener stopped: {:#}", e);
                    exit_error = Some(e);
                }
                Err(e) => exit_error = Some(anyhow::anyhow!("Health listener task failed: {}", e)),
            }
        }
    }

    shutdown.cancel();
    if !scheduler_task.is_finished() {
        if let Ok(Err(e)) = scheduler_task.await {
            exit_error.get_or_insert(anyhow::Error::new(e));
        }
    }
    if !server.is_finished() {
        let _ = server.await;
    }

    match exit_error {
        Some(e) => Err(e),
        None => {
            info!("Digest worker stopped");
            Ok(())
        }
    }
}
