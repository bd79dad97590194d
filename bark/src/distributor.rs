//! Subscribes to the notification topics and fans every message out to the
//! registered barkers.
//!
//! Each barker gets its own detached task per message, so a slow, failing or
//! panicking barker never holds up the others. Barker errors are logged and
//! never retried. Messages that cannot be decoded are dropped.

use crate::barker::{AlertBarker, EventBarker};
use crate::metrics_defs::{BARK_FAILED, MESSAGES_MALFORMED, MESSAGES_RECEIVED};
use serde::de::DeserializeOwned;
use shared::counter;
use shared::pubsub::{Subscriber, Subscription, decode};
use shared::topics::Topic;
use shared::types::{AlertLite, Event};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

#[derive(thiserror::Error, Debug)]
pub enum DistributorError {
    #[error("distributor is no longer running")]
    NotRunning,

    #[error("{0} topic listener(s) panicked")]
    ListenerPanicked(usize),
}

pub enum Command {
    // Close every topic subscription. The distributor answers once all
    // listeners have stopped.
    Stop(oneshot::Sender<Result<(), DistributorError>>),
}

#[derive(Default)]
pub struct Distributor {
    alert_barkers: Vec<Arc<dyn AlertBarker>>,
    event_barkers: Vec<Arc<dyn EventBarker>>,
    event_update_barkers: Vec<Arc<dyn EventBarker>>,
}

impl Distributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_alert_barker(&mut self, barker: Arc<dyn AlertBarker>) {
        self.alert_barkers.push(barker);
    }

    pub fn add_event_barker(&mut self, barker: Arc<dyn EventBarker>) {
        self.event_barkers.push(barker);
    }

    pub fn add_event_update_barker(&mut self, barker: Arc<dyn EventBarker>) {
        self.event_update_barkers.push(barker);
    }

    /// Subscribes to every topic and starts barking. The returned handle
    /// stops the distributor.
    pub fn listen_and_bark(self, subscriber: &dyn Subscriber) -> DistributorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut listeners = JoinSet::new();

        let alert_barkers = Arc::new(self.alert_barkers);
        listeners.spawn(listen(
            Topic::Alerts,
            subscriber.subscribe(Topic::Alerts),
            shutdown_rx.clone(),
            move |alert: AlertLite| fan_out_alert(&alert_barkers, alert),
        ));

        let event_barkers = Arc::new(self.event_barkers);
        listeners.spawn(listen(
            Topic::Events,
            subscriber.subscribe(Topic::Events),
            shutdown_rx.clone(),
            move |event: Event| fan_out_event(Topic::Events, &event_barkers, event),
        ));

        let event_update_barkers = Arc::new(self.event_update_barkers);
        listeners.spawn(listen(
            Topic::EventUpdates,
            subscriber.subscribe(Topic::EventUpdates),
            shutdown_rx,
            move |event: Event| fan_out_event(Topic::EventUpdates, &event_update_barkers, event),
        ));

        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run_control(rx, shutdown_tx, listeners));
        DistributorHandle { tx, task }
    }
}

pub struct DistributorHandle {
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl DistributorHandle {
    /// Stops listening on every topic and waits for the acknowledgment.
    /// Barks already handed out keep running.
    pub async fn stop(self) -> Result<(), DistributorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Stop(ack_tx))
            .await
            .map_err(|_| DistributorError::NotRunning)?;
        let result = ack_rx.await.map_err(|_| DistributorError::NotRunning)?;
        if let Err(e) = self.task.await {
            tracing::error!("Task panicked: {}", e);
        }
        result
    }
}

async fn run_control(
    mut rx: mpsc::Receiver<Command>,
    shutdown: watch::Sender<bool>,
    mut listeners: JoinSet<()>,
) {
    // a dropped handle stops the distributor as well
    let command = rx.recv().await;
    let _ = shutdown.send(true);

    let mut panicked = 0;
    while let Some(result) = listeners.join_next().await {
        if let Err(e) = result {
            tracing::error!("Task panicked: {}", e);
            panicked += 1;
        }
    }

    let result = match panicked {
        0 => Ok(()),
        n => Err(DistributorError::ListenerPanicked(n)),
    };
    tracing::info!("distributor stopped");

    if let Some(Command::Stop(ack)) = command {
        let _ = ack.send(result);
    }
}

/// Decodes every message of a subscription and hands it to `dispatch`
/// until shut down or until the subscription ends.
async fn listen<T, F>(
    topic: Topic,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
    dispatch: F,
) where
    T: DeserializeOwned,
    F: Fn(T),
{
    tracing::info!(%topic, "listening for messages");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                subscription.close();
                break;
            }
            message = subscription.recv() => {
                let Some(message) = message else {
                    break;
                };
                counter!(MESSAGES_RECEIVED).increment(1);
                match decode::<T>(&message) {
                    Ok(record) => dispatch(record),
                    Err(e) => {
                        counter!(MESSAGES_MALFORMED).increment(1);
                        tracing::warn!(%topic, error = %e, "unable to read message");
                    }
                }
            }
        }
    }
    tracing::info!(%topic, "stopped listening");
}

fn fan_out_alert(barkers: &[Arc<dyn AlertBarker>], alert: AlertLite) {
    let alert = Arc::new(alert);
    for barker in barkers {
        let barker = barker.clone();
        let alert = alert.clone();
        tokio::spawn(async move {
            if let Err(e) = barker.bark_alert(&alert).await {
                counter!(BARK_FAILED).increment(1);
                tracing::error!(alert_id = %alert.id, error = %e, "problems barking about alert");
            }
        });
    }
}

fn fan_out_event(topic: Topic, barkers: &[Arc<dyn EventBarker>], event: Event) {
    let event = Arc::new(event);
    for barker in barkers {
        let barker = barker.clone();
        let event = event.clone();
        tokio::spawn(async move {
            if let Err(e) = barker.bark_event(&event).await {
                counter!(BARK_FAILED).increment(1);
                tracing::error!(event_id = %event.id, %topic, error = %e, "problems barking about event");
            }
        });
    }
}
