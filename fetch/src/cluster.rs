//! Groups alerts from different outlets into events.
//!
//! For a subject alert the clusterer scores the phrases of every alert
//! within the event timeframe, keeps the alerts that share enough of the
//! frequent phrases and folds them, together with any events they already
//! belong to, into a single event. The oldest colliding event keeps its id
//! and every other colliding event is deleted.

use crate::config::ClusteringConfig;
use crate::metrics_defs::{EVENTS_CREATED, EVENTS_MERGED, EVENTS_UPDATED, PUBLISH_FAILED};
use crate::phrases::{build_phrase_counts, equal_fold, lookup_count};
use crate::store::{Store, StoreError};
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use shared::counter;
use shared::pubsub::{Publisher, publish_record};
use shared::topics::Topic;
use shared::types::{Alert, AlertId, Event, EventAlert, EventId};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Weighted phrase score, per pool member, an alert must exceed to join.
const LIKE_SCORE_FACTOR: f64 = 1.2;

/// Alerts found to share enough phrases with a subject alert.
#[derive(Debug, Default, PartialEq)]
pub struct LikeAlertCluster {
    pub alert_ids: Vec<AlertId>,
    pub tags: Vec<String>,
}

/// A cluster folded together with the events it collides with.
#[derive(Debug, PartialEq)]
pub struct MergedEvent {
    pub id: EventId,
    /// The colliding event whose id is reused
    pub kept: Option<Event>,
    pub alert_ids: Vec<AlertId>,
    pub tags: Vec<String>,
    pub stale_ids: Vec<EventId>,
}

impl MergedEvent {
    pub fn is_new(&self) -> bool {
        self.kept.is_none()
    }

    /// Whether the merge added alerts to the reused event.
    pub fn grew(&self) -> bool {
        let original = self.kept.as_ref().map(|e| e.alerts.len()).unwrap_or(0);
        self.alert_ids.len() > original
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterOutcome {
    /// Not enough shared phrases or like alerts
    NoCluster,
    /// The merged event lacks alerts or distinct senders
    NotViable,
    /// The stored event already reflects the cluster
    Unchanged(EventId),
    Created(Event),
    /// Any change to a reused event, whether it grew or not
    Updated(Event),
}

pub struct EventClusterer {
    store: Arc<dyn Store>,
    publisher: Option<Arc<dyn Publisher>>,
    config: ClusteringConfig,
}

impl EventClusterer {
    /// Creates a clusterer. Without a publisher no notifications are sent.
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Option<Arc<dyn Publisher>>,
        config: ClusteringConfig,
    ) -> Self {
        EventClusterer {
            store,
            publisher,
            config,
        }
    }

    /// Re-clusters every alert within the event timeframe of `at`. Returns
    /// the number of alerts that were considered.
    pub async fn event_refresh(&self, at: DateTime<Utc>) -> Result<usize, StoreError> {
        let timeframe = self.config.event_timeframe();
        let eligible = self
            .store
            .find_alerts_by_timeframe(at - timeframe, at + timeframe)
            .await?;

        for alert in &eligible {
            if let Err(e) = self.update_events(alert).await {
                tracing::error!(alert_id = %alert.id(), error = %e, "problems refreshing event");
            }
        }

        Ok(eligible.len())
    }

    /// Finds the event the given alert belongs to and stores it.
    pub async fn update_events(&self, alert: &Alert) -> Result<ClusterOutcome, StoreError> {
        let cluster = self.find_like_alert_cluster(alert).await?;

        // at least 3 alerts for significance
        if cluster.alert_ids.len() <= 2 {
            return Ok(ClusterOutcome::NoCluster);
        }

        let existing = self.store.find_events_by_alert_ids(&cluster.alert_ids).await?;
        let merged = merge_events(&cluster, &existing);

        let alerts = self.store.get_alerts_by_id(&merged.alert_ids).await?;
        if alerts.len() < self.config.min_alerts
            || !has_min_senders(&alerts, self.config.min_senders)
        {
            return Ok(ClusterOutcome::NotViable);
        }

        let Some(event) = new_event(merged.id, alerts, merged.tags.clone()) else {
            return Ok(ClusterOutcome::NotViable);
        };

        if merged.stale_ids.is_empty() && merged.kept.as_ref() == Some(&event) {
            return Ok(ClusterOutcome::Unchanged(event.id));
        }

        self.store.upsert_event(&event).await?;

        // the event is persisted, so it is published even if cleanup fails
        let deleted = if merged.stale_ids.is_empty() {
            Ok(())
        } else {
            let deleted = self.store.delete_events(&merged.stale_ids).await;
            if deleted.is_ok() {
                counter!(EVENTS_MERGED).increment(merged.stale_ids.len() as u64);
            }
            deleted
        };

        let outcome = if merged.is_new() {
            ClusterOutcome::Created(event)
        } else {
            tracing::debug!(
                event_id = %event.id,
                grew = merged.grew(),
                stale = merged.stale_ids.len(),
                "updating event"
            );
            ClusterOutcome::Updated(event)
        };
        self.notify(&outcome).await;
        deleted?;

        Ok(outcome)
    }

    /// Scores the phrases of every alert near the subject and returns the
    /// alerts sharing enough of the frequent ones.
    pub async fn find_like_alert_cluster(
        &self,
        alert: &Alert,
    ) -> Result<LikeAlertCluster, StoreError> {
        let possible = self
            .store
            .find_possible_like_alerts(alert, self.config.event_timeframe())
            .await?;

        let mut counts = build_phrase_counts(alert.tags(), possible.iter().map(|a| a.tags()));
        let min_occurs = self.config.min_occurrences(possible.len());
        counts.retain(|_, count| *count > min_occurs);

        // we need at least 2 tags for an event
        if counts.len() < 2 {
            return Ok(LikeAlertCluster::default());
        }

        // the subject alert goes through the same filtering
        let pool = possible.len() + 1;
        let alert_ids = possible
            .iter()
            .chain(std::iter::once(alert))
            .filter(|candidate| self.is_like(candidate.tags(), &counts, pool))
            .map(|candidate| candidate.id())
            .collect();

        Ok(LikeAlertCluster {
            alert_ids,
            tags: counts.into_keys().collect(),
        })
    }

    fn is_like(&self, tags: &[String], counts: &IndexMap<String, usize>, pool: usize) -> bool {
        let (hits, score) = tags
            .iter()
            .filter_map(|tag| lookup_count(counts, tag))
            .fold((0, 0), |(hits, score), count| (hits + 1, score + count));

        hits >= self.config.min_like_phrases
            || hits >= pool
            || score as f64 > pool as f64 * LIKE_SCORE_FACTOR
    }

    async fn notify(&self, outcome: &ClusterOutcome) {
        let (topic, event) = match outcome {
            ClusterOutcome::Created(event) => {
                counter!(EVENTS_CREATED).increment(1);
                (Topic::Events, event)
            }
            ClusterOutcome::Updated(event) => {
                counter!(EVENTS_UPDATED).increment(1);
                (Topic::EventUpdates, event)
            }
            _ => return,
        };

        tracing::info!(
            event_id = %event.id,
            alerts = event.alerts.len(),
            tags = ?event.tags,
            %topic,
            "event found"
        );

        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Err(e) = publish_record(publisher.as_ref(), topic, event).await {
            counter!(PUBLISH_FAILED).increment(1);
            tracing::error!(event_id = %event.id, %topic, error = %e, "unable to publish event");
        }
    }
}

fn has_min_senders(alerts: &[Alert], min_senders: usize) -> bool {
    let senders: HashSet<&str> = alerts.iter().map(|a| a.sender()).collect();
    senders.len() >= min_senders
}

/// Folds a cluster and the events it collides with into one event. The
/// oldest colliding event keeps its id; the others become stale.
pub fn merge_events(cluster: &LikeAlertCluster, existing: &[Event]) -> MergedEvent {
    let mut alert_ids: IndexSet<AlertId> = cluster.alert_ids.iter().copied().collect();
    let mut tags: IndexSet<String> = cluster.tags.iter().cloned().collect();
    for event in existing {
        alert_ids.extend(event.alert_ids());
        tags.extend(event.tags.iter().cloned());
    }

    let kept = existing.iter().min_by_key(|e| (e.event_start, e.id)).cloned();
    let kept_id = kept.as_ref().map(|e| e.id);

    let mut stale_ids: Vec<EventId> = Vec::new();
    for event in existing {
        if Some(event.id) != kept_id && !stale_ids.contains(&event.id) {
            stale_ids.push(event.id);
        }
    }

    MergedEvent {
        id: kept_id.unwrap_or_else(Uuid::new_v4),
        kept,
        alert_ids: alert_ids.into_iter().collect(),
        tags: tags.into_iter().collect(),
        stale_ids,
    }
}

/// Materializes an event from its member alerts. Returns `None` for an
/// empty member list.
pub fn new_event(id: EventId, mut alerts: Vec<Alert>, mut tags: Vec<String>) -> Option<Event> {
    alerts.sort_by(|a, b| (a.timestamp(), a.id()).cmp(&(b.timestamp(), b.id())));
    let start = alerts.first()?.timestamp();
    let end = alerts.last()?.timestamp();

    tags.sort();
    tags.dedup();

    // the sentence that reaches the highest score first wins
    let mut top_count = 0;
    let mut top_sender = String::new();
    let mut top_sentence = String::new();
    for alert in &alerts {
        for sentence in &alert.sentences {
            let hits: usize = sentence
                .phrases
                .iter()
                .map(|phrase| tags.iter().filter(|tag| equal_fold(tag, phrase)).count())
                .sum();

            if hits > top_count {
                top_count = hits;
                top_sender = alert.sender().to_string();
                top_sentence = sentence.value.clone();
            }
        }
    }

    let members = alerts
        .iter()
        .enumerate()
        .map(|(order, alert)| EventAlert {
            alert_id: alert.id(),
            instance_id: alert.lite.instance_id.clone(),
            article_url: alert.lite.article_url.clone(),
            sender: alert.sender().to_string(),
            tags: alert.tags().to_vec(),
            subject: alert.lite.subject.clone(),
            top_sentence: alert.lite.top_sentence.clone(),
            order: order as i64,
            time_lapsed: (alert.timestamp() - start).num_seconds(),
        })
        .collect();

    Some(Event {
        id,
        tags,
        event_start: start,
        event_end: end,
        alerts: members,
        top_sentence,
        top_sender,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::testutils::{alert, at};
    use shared::pubsub::{MemoryBroker, Subscriber, decode};
    use shared::types::Sentence;

    const TAGS: &[&str] = &["orlando", "nightclub shooting", "gunman"];

    struct Fixture {
        store: Arc<MemoryStore>,
        broker: Arc<MemoryBroker>,
        clusterer: EventClusterer,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let broker = Arc::new(MemoryBroker::new());
            let clusterer = EventClusterer::new(
                store.clone(),
                Some(broker.clone()),
                ClusteringConfig::default(),
            );
            Fixture {
                store,
                broker,
                clusterer,
            }
        }

        async fn put(&self, alerts: &[&Alert]) {
            for a in alerts {
                self.store.put_alert(a).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_new_event_then_idempotent() {
        let fixture = Fixture::new();
        let mut events = fixture.broker.subscribe(Topic::Events);
        let mut updates = fixture.broker.subscribe(Topic::EventUpdates);

        let a = alert("CNN", 0, TAGS);
        let b = alert("NYTimes.com", 5, TAGS);
        let c = alert("NPR", 10, TAGS);
        fixture.put(&[&a, &b, &c]).await;

        let outcome = fixture.clusterer.update_events(&c).await.unwrap();
        let ClusterOutcome::Created(event) = outcome else {
            panic!("expected a new event, got {outcome:?}");
        };
        assert_eq!(event.alerts.len(), 3);
        assert_eq!(event.tags, vec!["gunman", "nightclub shooting", "orlando"]);
        assert_eq!(event.event_start, at(0));
        assert_eq!(event.event_end, at(10));
        assert_eq!(fixture.store.events(), vec![event.clone()]);

        let published: Event = decode(&events.try_recv().unwrap()).unwrap();
        assert_eq!(published, event);
        assert!(updates.try_recv().is_err());

        // running again for any member changes nothing
        let writes = fixture.store.event_writes();
        for member in [&a, &b, &c] {
            let outcome = fixture.clusterer.update_events(member).await.unwrap();
            assert_eq!(outcome, ClusterOutcome::Unchanged(event.id));
        }
        assert_eq!(fixture.store.event_writes(), writes);
        assert!(events.try_recv().is_err());
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_growth_publishes_update_only() {
        let fixture = Fixture::new();
        let a = alert("CNN", 0, TAGS);
        let b = alert("NYTimes.com", 5, TAGS);
        let c = alert("NPR", 10, TAGS);
        fixture.put(&[&a, &b, &c]).await;
        let ClusterOutcome::Created(original) = fixture.clusterer.update_events(&c).await.unwrap()
        else {
            panic!("expected a new event");
        };

        let mut events = fixture.broker.subscribe(Topic::Events);
        let mut updates = fixture.broker.subscribe(Topic::EventUpdates);

        let d = alert("BBC", 15, TAGS);
        fixture.put(&[&d]).await;
        let outcome = fixture.clusterer.update_events(&d).await.unwrap();
        let ClusterOutcome::Updated(event) = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(event.id, original.id);
        assert_eq!(event.alerts.len(), 4);

        let published: Event = decode(&updates.try_recv().unwrap()).unwrap();
        assert_eq!(published.id, original.id);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tag_change_publishes_update() {
        let fixture = Fixture::new();
        let a = alert("CNN", 0, TAGS);
        let b = alert("NYTimes.com", 5, TAGS);
        let c = alert("NPR", 10, TAGS);
        fixture.put(&[&a, &b, &c]).await;

        let stored = new_event(
            Uuid::new_v4(),
            vec![a.clone(), b.clone(), c.clone()],
            vec!["orlando".into()],
        )
        .unwrap();
        fixture.store.upsert_event(&stored).await.unwrap();

        let mut events = fixture.broker.subscribe(Topic::Events);
        let mut updates = fixture.broker.subscribe(Topic::EventUpdates);

        let outcome = fixture.clusterer.update_events(&a).await.unwrap();
        let ClusterOutcome::Updated(event) = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(event.id, stored.id);
        assert_eq!(event.alerts.len(), 3);
        assert_eq!(event.tags.len(), 3);

        let published: Event = decode(&updates.try_recv().unwrap()).unwrap();
        assert_eq!(published, event);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_single_sender_is_not_viable() {
        let fixture = Fixture::new();
        let mut events = fixture.broker.subscribe(Topic::Events);
        let a = alert("CNN", 0, TAGS);
        let b = alert("CNN", 5, TAGS);
        let c = alert("CNN", 10, TAGS);
        fixture.put(&[&a, &b, &c]).await;

        let outcome = fixture.clusterer.update_events(&c).await.unwrap();
        assert_eq!(outcome, ClusterOutcome::NotViable);
        assert_eq!(fixture.store.event_writes(), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_cluster_without_shared_phrases() {
        let fixture = Fixture::new();
        let a = alert("CNN", 0, &["orlando", "weather"]);
        let b = alert("NPR", 5, &["orlando", "sports"]);
        let c = alert("BBC", 10, &["orlando", "markets"]);
        fixture.put(&[&a, &b, &c]).await;

        let outcome = fixture.clusterer.update_events(&c).await.unwrap();
        assert_eq!(outcome, ClusterOutcome::NoCluster);
        assert_eq!(fixture.store.event_writes(), 0);
    }

    #[tokio::test]
    async fn test_alerts_outside_timeframe_are_ignored() {
        let fixture = Fixture::new();
        let a = alert("CNN", 0, TAGS);
        let b = alert("NPR", 5, TAGS);
        let far = alert("BBC", 24 * 60, TAGS);
        fixture.put(&[&a, &b, &far]).await;

        let outcome = fixture.clusterer.update_events(&b).await.unwrap();
        assert_eq!(outcome, ClusterOutcome::NoCluster);
    }

    #[tokio::test]
    async fn test_merge_keeps_oldest_event() {
        let fixture = Fixture::new();
        let alerts: Vec<Alert> = ["CNN", "NPR", "BBC", "AP", "Reuters", "NBC"]
            .iter()
            .enumerate()
            .map(|(i, sender)| alert(sender, i as i64 * 5, TAGS))
            .collect();
        fixture.put(&alerts.iter().collect::<Vec<_>>()).await;

        let tags: Vec<String> = TAGS.iter().map(|t| t.to_string()).collect();
        let older = new_event(Uuid::new_v4(), alerts[..3].to_vec(), tags.clone()).unwrap();
        let newer = new_event(Uuid::new_v4(), alerts[3..].to_vec(), tags).unwrap();
        fixture.store.upsert_event(&older).await.unwrap();
        fixture.store.upsert_event(&newer).await.unwrap();

        let outcome = fixture.clusterer.update_events(&alerts[5]).await.unwrap();
        let ClusterOutcome::Updated(event) = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(event.id, older.id);

        let stored = fixture.store.events();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, older.id);
        assert!(fixture.store.get_event(&newer.id).is_none());

        let ids: HashSet<AlertId> = stored[0].alert_ids().collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(stored[0].alerts.len(), 6);
    }

    /// Delegates to a memory store but refuses to delete events.
    struct StuckDeletes(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl Store for StuckDeletes {
        async fn put_alert(&self, alert: &Alert) -> Result<(), StoreError> {
            self.0.put_alert(alert).await
        }

        async fn find_alerts_by_timeframe(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Alert>, StoreError> {
            self.0.find_alerts_by_timeframe(start, end).await
        }

        async fn find_possible_like_alerts(
            &self,
            alert: &Alert,
            timeframe: chrono::Duration,
        ) -> Result<Vec<Alert>, StoreError> {
            self.0.find_possible_like_alerts(alert, timeframe).await
        }

        async fn find_events_by_alert_ids(
            &self,
            ids: &[AlertId],
        ) -> Result<Vec<Event>, StoreError> {
            self.0.find_events_by_alert_ids(ids).await
        }

        async fn get_alerts_by_id(&self, ids: &[AlertId]) -> Result<Vec<Alert>, StoreError> {
            self.0.get_alerts_by_id(ids).await
        }

        async fn upsert_event(&self, event: &Event) -> Result<(), StoreError> {
            self.0.upsert_event(event).await
        }

        async fn delete_events(&self, _ids: &[EventId]) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        async fn get_all_alerts(
            &self,
        ) -> Result<futures::stream::BoxStream<'static, Alert>, StoreError> {
            self.0.get_all_alerts().await
        }
    }

    #[tokio::test]
    async fn test_failed_cleanup_still_publishes() {
        let memory = Arc::new(MemoryStore::new());
        let broker = Arc::new(MemoryBroker::new());
        let clusterer = EventClusterer::new(
            Arc::new(StuckDeletes(memory.clone())),
            Some(broker.clone()),
            ClusteringConfig::default(),
        );
        let mut updates = broker.subscribe(Topic::EventUpdates);

        let alerts: Vec<Alert> = ["CNN", "NPR", "BBC", "AP", "Reuters", "NBC"]
            .iter()
            .enumerate()
            .map(|(i, sender)| alert(sender, i as i64 * 5, TAGS))
            .collect();
        for a in &alerts {
            memory.put_alert(a).await.unwrap();
        }
        let tags: Vec<String> = TAGS.iter().map(|t| t.to_string()).collect();
        let older = new_event(Uuid::new_v4(), alerts[..3].to_vec(), tags.clone()).unwrap();
        let newer = new_event(Uuid::new_v4(), alerts[3..].to_vec(), tags).unwrap();
        memory.upsert_event(&older).await.unwrap();
        memory.upsert_event(&newer).await.unwrap();

        let result = clusterer.update_events(&alerts[5]).await;
        assert!(matches!(result, Err(StoreError::Io(_))));

        // the merged event was written and announced
        let published: Event = decode(&updates.try_recv().unwrap()).unwrap();
        assert_eq!(published.id, older.id);
        assert_eq!(published.alerts.len(), 6);
        assert_eq!(memory.get_event(&older.id), Some(published));
    }

    #[tokio::test]
    async fn test_event_refresh() {
        let fixture = Fixture::new();
        let a = alert("CNN", 0, TAGS);
        let b = alert("NPR", 5, TAGS);
        let c = alert("BBC", 10, TAGS);
        fixture.put(&[&a, &b, &c]).await;

        let considered = fixture.clusterer.event_refresh(at(0)).await.unwrap();
        assert_eq!(considered, 3);
        assert_eq!(fixture.store.events().len(), 1);
    }

    #[test]
    fn test_merge_events_without_collisions() {
        let cluster = LikeAlertCluster {
            alert_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            tags: vec!["a".into(), "b".into()],
        };
        let merged = merge_events(&cluster, &[]);
        assert!(merged.is_new());
        assert!(merged.grew());
        assert!(merged.stale_ids.is_empty());
        assert_eq!(merged.alert_ids, cluster.alert_ids);
    }

    #[test]
    fn test_merge_events_marks_newer_events_stale() {
        let alerts: Vec<Alert> = ["CNN", "NPR", "BBC", "AP", "Reuters", "NBC"]
            .iter()
            .enumerate()
            .map(|(i, sender)| alert(sender, i as i64 * 5, TAGS))
            .collect();
        let tags: Vec<String> = TAGS.iter().map(|t| t.to_string()).collect();
        let older = new_event(Uuid::new_v4(), alerts[..3].to_vec(), tags.clone()).unwrap();
        let newer = new_event(Uuid::new_v4(), alerts[3..].to_vec(), tags.clone()).unwrap();

        let cluster = LikeAlertCluster {
            alert_ids: vec![alerts[2].id(), alerts[3].id()],
            tags,
        };
        // the same event can be found through several of its alerts
        let merged = merge_events(&cluster, &[newer.clone(), older.clone(), newer.clone()]);

        assert_eq!(merged.id, older.id);
        assert_eq!(merged.kept.as_ref(), Some(&older));
        assert_eq!(merged.stale_ids, vec![newer.id]);
        assert_eq!(merged.alert_ids.len(), 6);
        assert!(merged.grew());
    }

    #[test]
    fn test_new_event_ordering_and_top_sentence() {
        let mut first = alert("CNN", 10, TAGS);
        first.sentences = vec![
            Sentence::new("One match.", ["orlando"]),
            Sentence::new("Two matches.", ["Orlando", "gunman"]),
        ];
        let mut second = alert("NPR", 0, TAGS);
        second.sentences = vec![Sentence::new("Nothing here.", ["weather"])];
        let mut third = alert("BBC", 20, TAGS);
        // ties do not replace the first sentence to reach the max
        third.sentences = vec![Sentence::new("Also two.", ["orlando", "gunman"])];

        let tags = TAGS.iter().rev().map(|t| t.to_string()).collect();
        let event = new_event(Uuid::new_v4(), vec![first, second, third], tags).unwrap();

        assert_eq!(event.top_sentence, "Two matches.");
        assert_eq!(event.top_sender, "CNN");
        assert_eq!(event.event_start, at(0));
        assert_eq!(event.event_end, at(20));
        assert_eq!(event.tags, vec!["gunman", "nightclub shooting", "orlando"]);

        let senders: Vec<&str> = event.alerts.iter().map(|a| a.sender.as_str()).collect();
        assert_eq!(senders, vec!["NPR", "CNN", "BBC"]);
        for pair in event.alerts.windows(2) {
            assert!(pair[0].order < pair[1].order);
            assert!(pair[0].time_lapsed <= pair[1].time_lapsed);
        }
        assert_eq!(event.alerts[2].time_lapsed, 20 * 60);
    }

    #[test]
    fn test_new_event_without_alerts() {
        assert!(new_event(Uuid::new_v4(), Vec::new(), Vec::new()).is_none());
    }
}
