pub mod alert;
pub mod cluster;
pub mod config;
pub mod driver;
pub mod errors;
pub mod extractor;
pub mod mail;
pub mod metrics_defs;
pub mod parser;
pub mod phrases;
pub mod store;

use config::Config;
use driver::Driver;
use errors::FetchError;
use extractor::TextExtractor;
use futures::{FutureExt, StreamExt};
use mail::MailSource;
use parser::{MailParser, Reparser, spawn_pool};
use shared::histogram;
use shared::pubsub::Publisher;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use store::Store;
use tokio::sync::mpsc;

const REPARSE_BUFFER: usize = 1000;

/// Fetches unread mail once, stores the resulting alerts and refreshes the
/// events they belong to. Returns the number of alerts received.
pub async fn fetch_mail(
    config: &Config,
    source: &dyn MailSource,
    extractor: Arc<dyn TextExtractor>,
    store: Arc<dyn Store>,
    publisher: Option<Arc<dyn Publisher>>,
) -> Result<usize, FetchError> {
    tracing::info!("getting mail");
    let start = Instant::now();

    let mail = source.unread().await?;
    let parser = Arc::new(MailParser::new(
        extractor,
        config.allow_list(),
        config.mailbox.address.clone(),
    ));
    let (alerts, workers) = spawn_pool(parser, mail, config.worker_count());

    let driver = Driver::new(
        store.clone(),
        publisher,
        config.clustering.clone(),
        config.batching.clone(),
    );
    let count = driver.save_and_refresh(alerts).await;

    // keep whatever was stored even if a worker failed
    let workers = workers.await;
    store.flush().await?;
    workers??;

    histogram!(metrics_defs::RUN_DURATION).record(start.elapsed().as_secs_f64());
    tracing::info!(count, elapsed = ?start.elapsed(), "fetched messages");
    Ok(count)
}

/// Fetches mail every `fetch_interval` until a run fails or `shutdown`
/// resolves. A run in progress is always finished before shutting down.
pub async fn fetch_forever(
    config: &Config,
    source: &dyn MailSource,
    extractor: Arc<dyn TextExtractor>,
    store: Arc<dyn Store>,
    publisher: Option<Arc<dyn Publisher>>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), FetchError> {
    let shutdown = shutdown.fuse();
    tokio::pin!(shutdown);
    loop {
        let run = fetch_mail(
            config,
            source,
            extractor.clone(),
            store.clone(),
            publisher.clone(),
        );
        tokio::pin!(run);

        // the signal may arrive mid-run, but the run keeps going
        let stopping = tokio::select! {
            result = &mut run => {
                result?;
                false
            }
            _ = &mut shutdown => true,
        };
        if stopping {
            tracing::info!("finishing current run before shutting down");
            run.await?;
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.fetch_interval()) => {}
            _ = &mut shutdown => break,
        }
    }
    tracing::info!("stopped fetching");
    Ok(())
}

/// Rebuilds every alert of `source` with fresh phrases and re-clusters them
/// into `target`. No notifications are sent. Any extraction failure aborts
/// the run and leaves `source` untouched.
pub async fn reparse(
    config: &Config,
    extractor: Arc<dyn TextExtractor>,
    source: &dyn Store,
    target: Arc<dyn Store>,
) -> Result<usize, FetchError> {
    tracing::info!("reparsing mail");
    let start = Instant::now();

    let mut stored = source.get_all_alerts().await?;
    let (tx, input) = mpsc::channel(REPARSE_BUFFER);
    let feeder = tokio::spawn(async move {
        while let Some(alert) = stored.next().await {
            if tx.send(alert).await.is_err() {
                break;
            }
        }
    });

    let parser = Arc::new(Reparser::new(extractor));
    let (alerts, workers) = spawn_pool(parser, input, config.worker_count());

    let driver = Driver::new(
        target.clone(),
        None,
        config.clustering.clone(),
        config.batching.clone(),
    );
    let count = driver.save_and_refresh(alerts).await;

    workers.await??;
    feeder.await?;
    target.flush().await?;

    tracing::info!(count, elapsed = ?start.elapsed(), "reparsed messages");
    Ok(count)
}
