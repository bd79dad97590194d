//! Worker pool turning raw mail, or stored alerts during a reparse, into
//! alerts ready to be stored.
//!
//! All workers read from one shared input channel and write to one shared
//! output channel. The output closes once every worker is done. No ordering
//! is kept between workers.

use crate::alert::{extractor_text, find_sender, new_alert, reparse_alert};
use crate::config::SenderAllowList;
use crate::errors::FetchError;
use crate::extractor::TextExtractor;
use crate::mail::MailResponse;
use crate::metrics_defs::{ALERTS_PARSED, ALERTS_SKIPPED, EXTRACT_DURATION};
use async_trait::async_trait;
use shared::types::Alert;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};

const ALERT_BUFFER: usize = 100;

/// Turns one unit of input into an alert. `Ok(None)` drops the input,
/// while an error stops the whole pool.
#[async_trait]
pub trait Parse: Send + Sync + 'static {
    type Input: Send + 'static;

    async fn parse(&self, input: Self::Input) -> Result<Option<Alert>, FetchError>;
}

/// Parses newly received mail. Messages from unknown senders and messages
/// the extractor cannot handle are dropped.
pub struct MailParser {
    extractor: Arc<dyn TextExtractor>,
    allow_list: SenderAllowList,
    mailbox_address: String,
}

impl MailParser {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        allow_list: SenderAllowList,
        mailbox_address: impl Into<String>,
    ) -> Self {
        MailParser {
            extractor,
            allow_list,
            mailbox_address: mailbox_address.into(),
        }
    }
}

#[async_trait]
impl Parse for MailParser {
    type Input = MailResponse;

    async fn parse(&self, input: MailResponse) -> Result<Option<Alert>, FetchError> {
        let mail = input?;

        // only post approved senders
        let sender = find_sender(&mail.from_name, &mail.from_address);
        if !self.allow_list.allows(&sender) {
            tracing::info!(%sender, "skipping email from unknown sender");
            counter!(ALERTS_SKIPPED).increment(1);
            return Ok(None);
        }

        let started = Instant::now();
        let extraction = match self.extractor.extract(extractor_text(&mail)).await {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!(%sender, subject = %mail.subject, error = %e, "unable to parse email");
                counter!(ALERTS_SKIPPED).increment(1);
                return Ok(None);
            }
        };
        histogram!(EXTRACT_DURATION).record(started.elapsed().as_secs_f64());
        counter!(ALERTS_PARSED).increment(1);

        Ok(Some(new_alert(&mail, extraction, &self.mailbox_address)))
    }
}

/// Re-extracts the phrases of stored alerts. Any extractor failure is fatal
/// so that a reparse never silently loses alerts.
pub struct Reparser {
    extractor: Arc<dyn TextExtractor>,
}

impl Reparser {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Reparser { extractor }
    }
}

#[async_trait]
impl Parse for Reparser {
    type Input = Alert;

    async fn parse(&self, alert: Alert) -> Result<Option<Alert>, FetchError> {
        let started = Instant::now();
        let extraction = self
            .extractor
            .extract(alert.extractor_input())
            .await
            .map_err(|source| FetchError::Reparse {
                id: alert.id(),
                source,
            })?;
        histogram!(EXTRACT_DURATION).record(started.elapsed().as_secs_f64());
        counter!(ALERTS_PARSED).increment(1);

        Ok(Some(reparse_alert(&alert, extraction)))
    }
}

/// Starts `workers` tasks parsing everything received on `input`.
///
/// Returns the channel parsed alerts are delivered on and a handle resolving
/// once every worker has finished. The first worker error aborts the others
/// and is returned from the handle.
pub fn spawn_pool<P: Parse>(
    parser: Arc<P>,
    input: mpsc::Receiver<P::Input>,
    workers: usize,
) -> (mpsc::Receiver<Alert>, JoinHandle<Result<(), FetchError>>) {
    let (tx, rx) = mpsc::channel(ALERT_BUFFER);
    let input = Arc::new(Mutex::new(input));

    let mut join_set = JoinSet::new();
    for _ in 0..workers.max(1) {
        let parser = parser.clone();
        let input = input.clone();
        let tx = tx.clone();
        join_set.spawn(async move { run_worker(parser.as_ref(), &input, &tx).await });
    }
    // the output closes once the last worker drops its sender
    drop(tx);

    let handle = tokio::spawn(async move {
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    join_set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Task panicked: {}", e);
                    join_set.abort_all();
                    return Err(FetchError::Worker(e));
                }
            }
        }
        Ok(())
    });

    (rx, handle)
}

async fn run_worker<P: Parse>(
    parser: &P,
    input: &Mutex<mpsc::Receiver<P::Input>>,
    output: &mpsc::Sender<Alert>,
) -> Result<(), FetchError> {
    loop {
        let next = input.lock().await.recv().await;
        let Some(item) = next else {
            return Ok(());
        };

        if let Some(alert) = parser.parse(item).await? {
            output
                .send(alert)
                .await
                .map_err(|_| FetchError::PipelineClosed)?;
        }
    }
}
