use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use fetch::extractor::{ExtractError, HttpExtractor, TextExtractor};
use fetch::mail::SpoolMailSource;
use fetch::store::{MemoryStore, Store, StoreError};
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::describe_all;
use shared::pubsub::{HttpPublisher, MemoryBroker, PubSubError, Publisher};
use std::path::PathBuf;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod config;

const METRICS_PREFIX: &str = "newshound";

#[derive(Parser)]
#[command(name = "newshound", about = "Clusters breaking news alerts into events")]
struct Cli {
    /// YAML configuration file
    #[arg(long, short, global = true, default_value = "newshound.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Fetch alert mail and cluster it into events
    Fetch {
        /// Fetch a single time instead of polling the mailbox
        #[arg(long)]
        once: bool,
    },
    /// Re-extract every stored alert and rebuild all events
    Reparse,
    /// Serve notifications to websocket clients
    Bark,
    /// Fetch and bark in a single process
    Run,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] fetch::errors::FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unable to create extractor client: {0}")]
    Extractor(#[from] ExtractError),
    #[error("unable to create publisher: {0}")]
    PubSub(#[from] PubSubError),
    #[error(transparent)]
    Bark(#[from] bark::BarkServiceError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to set up metrics: {0}")]
    Metrics(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(&config.common.logging);

    if let Some(metrics) = &config.common.metrics {
        if let Err(e) = init_metrics(metrics) {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "unable to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(cli.command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "newshound failed");
            ExitCode::FAILURE
        }
    }
}

/// Installs the log subscriber. The returned guard flushes pending Sentry
/// events when dropped.
fn init_logging(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_deref().unwrap_or("info")));

    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    describe_all(fetch::metrics_defs::ALL_METRICS);
    describe_all(bark::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "sending metrics to statsd"
    );
    Ok(())
}

async fn run_command(command: CliCommand, config: Config) -> Result<(), CliError> {
    match command {
        CliCommand::Fetch { once } => {
            tracing::info!("Starting fetch");
            fetch_alerts(&config, once).await
        }
        CliCommand::Reparse => {
            tracing::info!("Starting reparse");
            reparse(&config).await
        }
        CliCommand::Bark => {
            tracing::info!("Starting bark");
            bark::run(config.bark(), None, shutdown_signal()).await?;
            Ok(())
        }
        CliCommand::Run => {
            tracing::info!("Starting fetch and bark");
            run_all(&config).await
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// Starts listening for the shutdown signal right away. The returned future
/// resolves once it arrives.
fn listen_for_shutdown() -> impl Future<Output = ()> + Send + 'static {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(());
    });
    async move {
        let _ = rx.await;
    }
}

fn open_store(config: &Config) -> Result<Arc<MemoryStore>, CliError> {
    match &config.store {
        Some(store) => Ok(Arc::new(MemoryStore::open(store.path.clone())?)),
        None => {
            tracing::warn!("no store path configured, nothing will be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn http_publisher(config: &Config) -> Result<Option<Arc<dyn Publisher>>, CliError> {
    let Some(pubsub) = &config.pubsub else {
        tracing::warn!("no pubsub configured, notifications will not be published");
        return Ok(None);
    };
    let publisher = HttpPublisher::new(pubsub.push_url.clone(), pubsub.timeout())?;
    Ok(Some(Arc::new(publisher)))
}

/// Polls the mailbox until shut down, or fetches once.
async fn fetch_alerts(config: &Config, once: bool) -> Result<(), CliError> {
    let fetch_config = config.fetch()?;
    let store = open_store(config)?;
    let extractor: Arc<dyn TextExtractor> = Arc::new(HttpExtractor::new(&fetch_config.extractor)?);
    let publisher = http_publisher(config)?;
    let source = SpoolMailSource::new(
        fetch_config.mailbox.spool_path.clone(),
        fetch_config.mailbox.mark_read,
    );

    if once {
        fetch::fetch_mail(fetch_config, &source, extractor, store, publisher).await?;
        return Ok(());
    }

    let shutdown = listen_for_shutdown();
    fetch::fetch_forever(fetch_config, &source, extractor, store.clone(), publisher, shutdown)
        .await?;
    store.flush().await?;
    Ok(())
}

/// Rebuilds the store next to the configured one and swaps it in once
/// every alert has been reparsed.
async fn reparse(config: &Config) -> Result<(), CliError> {
    let fetch_config = config.fetch()?;
    let store_config = config.store()?;
    let extractor: Arc<dyn TextExtractor> = Arc::new(HttpExtractor::new(&fetch_config.extractor)?);

    let source = MemoryStore::open(store_config.path.clone())?;
    let target = Arc::new(MemoryStore::create(store_config.reparse_path())?);

    let count = fetch::reparse(fetch_config, extractor, &source, target.clone()).await?;
    target.promote_to(&store_config.path)?;

    tracing::info!(count, path = ?store_config.path, "replaced store with reparsed alerts");
    Ok(())
}

/// Runs the fetch loop and the bark server in one process, connected by an
/// in-memory broker.
async fn run_all(config: &Config) -> Result<(), CliError> {
    let fetch_config = config.fetch()?;
    let bark_config = config.bark();
    let store = open_store(config)?;
    let extractor: Arc<dyn TextExtractor> = Arc::new(HttpExtractor::new(&fetch_config.extractor)?);
    let source = SpoolMailSource::new(
        fetch_config.mailbox.spool_path.clone(),
        fetch_config.mailbox.mark_read,
    );

    let broker = Arc::new(MemoryBroker::new());
    let service = bark::BarkService::new(&bark_config, Some(broker.clone()))?;
    let listener = TcpListener::bind(bark_config.listener.address()).await?;
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(service.serve(listener, async move {
        let _ = stopped.await;
    }));

    let publisher: Arc<dyn Publisher> = broker;
    let shutdown = listen_for_shutdown();
    let fetched = fetch::fetch_forever(
        fetch_config,
        &source,
        extractor,
        store.clone(),
        Some(publisher),
        shutdown,
    )
    .await;
    let flushed = store.flush().await;

    let _ = stop.send(());
    match server.await {
        Ok(served) => served?,
        Err(e) => tracing::error!("Task panicked: {}", e),
    }

    fetched?;
    flushed?;
    Ok(())
}
