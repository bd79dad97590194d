use crate::cluster::EventClusterer;
use crate::config::{BatchingConfig, ClusteringConfig};
use crate::metrics_defs::{ALERTS_STORED, PUBLISH_FAILED};
use crate::store::Store;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use shared::counter;
use shared::pubsub::{Publisher, publish_record};
use shared::topics::Topic;
use shared::types::Alert;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

const PROGRESS_INTERVAL: usize = 10;

/// Stores parsed alerts and keeps events up to date.
///
/// Refreshing events for every single alert would re-cluster the same
/// timeframe over and over, so alert timestamps are collected into buckets
/// and each bucket is refreshed once.
pub struct Driver {
    store: Arc<dyn Store>,
    publisher: Option<Arc<dyn Publisher>>,
    clusterer: EventClusterer,
    batching: BatchingConfig,
}

impl Driver {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Option<Arc<dyn Publisher>>,
        clustering: ClusteringConfig,
        batching: BatchingConfig,
    ) -> Self {
        let clusterer = EventClusterer::new(store.clone(), publisher.clone(), clustering);
        Driver {
            store,
            publisher,
            clusterer,
            batching,
        }
    }

    /// Inserts every alert received and refreshes the events of their
    /// timeframes. Returns the number of alerts received.
    pub async fn save_and_refresh(&self, mut alerts: mpsc::Receiver<Alert>) -> usize {
        let mut count = 0;
        let mut buckets = BTreeSet::new();

        while let Some(alert) = alerts.recv().await {
            count += 1;
            if let Err(e) = self.store.put_alert(&alert).await {
                tracing::error!(alert_id = %alert.id(), error = %e, "unable to save alert");
                continue;
            }
            counter!(ALERTS_STORED).increment(1);
            self.publish_alert(&alert).await;

            if count % PROGRESS_INTERVAL == 0 {
                tracing::info!(count, "fetched messages");
            }

            buckets.insert(self.bucket(alert.timestamp()));
            if buckets.len() > self.batching.max_pending_buckets {
                self.refresh(&mut buckets).await;
            }
        }

        // flush whatever is left at the end
        self.refresh(&mut buckets).await;
        count
    }

    async fn publish_alert(&self, alert: &Alert) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Err(e) = publish_record(publisher.as_ref(), Topic::Alerts, &alert.lite).await {
            counter!(PUBLISH_FAILED).increment(1);
            tracing::error!(alert_id = %alert.id(), error = %e, "unable to publish alert");
        }
    }

    async fn refresh(&self, buckets: &mut BTreeSet<DateTime<Utc>>) {
        for bucket in std::mem::take(buckets) {
            if let Err(e) = self.clusterer.event_refresh(bucket).await {
                tracing::error!(%bucket, error = %e, "problems refreshing events");
            }
        }
    }

    fn bucket(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        bucket_start(timestamp, self.batching.bucket_secs)
    }
}

/// Truncates a timestamp to the start of its bucket.
pub fn bucket_start(timestamp: DateTime<Utc>, bucket_secs: u64) -> DateTime<Utc> {
    let width = TimeDelta::seconds(bucket_secs as i64);
    timestamp.duration_trunc(width).unwrap_or(timestamp)
}
