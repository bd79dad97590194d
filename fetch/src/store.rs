//! Alert and event persistence.
//!
//! [`MemoryStore`] keeps every document in memory and can persist itself as
//! a JSON snapshot. Snapshots are written to a temporary file and renamed
//! into place so a crash never leaves a half written store behind.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared::types::{Alert, AlertId, Event, EventId};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("alert {0} already exists")]
    DuplicateAlert(AlertId),

    #[error("store has no snapshot path")]
    NotPersistent,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn put_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    /// Alerts with a timestamp within `[start, end]`, oldest first.
    async fn find_alerts_by_timeframe(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError>;

    /// Every other alert within `timeframe` of the given alert.
    async fn find_possible_like_alerts(
        &self,
        alert: &Alert,
        timeframe: Duration,
    ) -> Result<Vec<Alert>, StoreError>;

    async fn find_events_by_alert_ids(&self, ids: &[AlertId]) -> Result<Vec<Event>, StoreError>;

    async fn get_alerts_by_id(&self, ids: &[AlertId]) -> Result<Vec<Alert>, StoreError>;

    async fn upsert_event(&self, event: &Event) -> Result<(), StoreError>;

    async fn delete_events(&self, ids: &[EventId]) -> Result<(), StoreError>;

    async fn get_all_alerts(&self) -> Result<BoxStream<'static, Alert>, StoreError>;

    /// Makes previous writes durable.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    alerts: Vec<Alert>,
    events: Vec<Event>,
}

#[derive(Default)]
struct StoreData {
    alerts: HashMap<AlertId, Alert>,
    events: HashMap<EventId, Event>,
}

impl StoreData {
    fn snapshot(&self) -> Snapshot {
        let mut alerts: Vec<Alert> = self.alerts.values().cloned().collect();
        sort_alerts(&mut alerts);
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| (a.event_start, a.id).cmp(&(b.event_start, b.id)));
        Snapshot { alerts, events }
    }
}

fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| (a.timestamp(), a.id()).cmp(&(b.timestamp(), b.id())));
}

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
    path: Option<PathBuf>,
    event_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store persisted at `path`, loading the snapshot if one exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut data = StoreData::default();

        if path.exists() {
            let file = std::fs::File::open(&path)?;
            let snapshot: Snapshot = serde_json::from_reader(io::BufReader::new(file))?;
            data.alerts = snapshot.alerts.into_iter().map(|a| (a.id(), a)).collect();
            data.events = snapshot.events.into_iter().map(|e| (e.id, e)).collect();
            tracing::info!(
                alerts = data.alerts.len(),
                events = data.events.len(),
                path = ?path,
                "loaded store snapshot"
            );
        }

        Ok(MemoryStore {
            data: RwLock::new(data),
            path: Some(path),
            event_writes: AtomicUsize::new(0),
        })
    }

    /// Opens an empty store at `path`, discarding any snapshot left there.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Self::open(path)
    }

    /// Number of event upserts and deletes applied so far.
    pub fn event_writes(&self) -> usize {
        self.event_writes.load(Ordering::Relaxed)
    }

    pub fn alert_count(&self) -> usize {
        self.data.read().alerts.len()
    }

    pub fn events(&self) -> Vec<Event> {
        self.data.read().snapshot().events
    }

    pub fn get_event(&self, id: &EventId) -> Option<Event> {
        self.data.read().events.get(id).cloned()
    }

    fn write_snapshot(&self) -> Result<(), StoreError> {
        let path = self.path.as_ref().ok_or(StoreError::NotPersistent)?;
        let snapshot = self.data.read().snapshot();

        let tmp = tmp_path(path);
        let file = std::fs::File::create(&tmp)?;
        let mut writer = io::BufWriter::new(file);
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        std::fs::rename(&tmp, path)?;

        tracing::debug!(
            alerts = snapshot.alerts.len(),
            events = snapshot.events.len(),
            path = ?path,
            "stored snapshot"
        );
        Ok(())
    }

    /// Flushes this store and moves its snapshot over `target`, replacing
    /// whatever was stored there.
    pub fn promote_to(&self, target: &Path) -> Result<(), StoreError> {
        self.write_snapshot()?;
        let path = self.path.as_ref().ok_or(StoreError::NotPersistent)?;
        std::fs::rename(path, target)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut write_guard = self.data.write();
        if write_guard.alerts.contains_key(&alert.id()) {
            return Err(StoreError::DuplicateAlert(alert.id()));
        }
        write_guard.alerts.insert(alert.id(), alert.clone());
        Ok(())
    }

    async fn find_alerts_by_timeframe(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError> {
        let mut alerts: Vec<Alert> = self
            .data
            .read()
            .alerts
            .values()
            .filter(|a| a.timestamp() >= start && a.timestamp() <= end)
            .cloned()
            .collect();
        sort_alerts(&mut alerts);
        Ok(alerts)
    }

    async fn find_possible_like_alerts(
        &self,
        alert: &Alert,
        timeframe: Duration,
    ) -> Result<Vec<Alert>, StoreError> {
        let start = alert.timestamp() - timeframe;
        let end = alert.timestamp() + timeframe;
        let mut possible = self.find_alerts_by_timeframe(start, end).await?;
        possible.retain(|a| a.id() != alert.id());
        Ok(possible)
    }

    async fn find_events_by_alert_ids(&self, ids: &[AlertId]) -> Result<Vec<Event>, StoreError> {
        let ids: HashSet<&AlertId> = ids.iter().collect();
        let mut events: Vec<Event> = self
            .data
            .read()
            .events
            .values()
            .filter(|e| e.alerts.iter().any(|a| ids.contains(&a.alert_id)))
            .cloned()
            .collect();
        events.sort_by(|a, b| (a.event_start, a.id).cmp(&(b.event_start, b.id)));
        Ok(events)
    }

    async fn get_alerts_by_id(&self, ids: &[AlertId]) -> Result<Vec<Alert>, StoreError> {
        let read_guard = self.data.read();
        let mut alerts: Vec<Alert> = ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| read_guard.alerts.get(id).cloned())
            .collect();
        sort_alerts(&mut alerts);
        Ok(alerts)
    }

    async fn upsert_event(&self, event: &Event) -> Result<(), StoreError> {
        self.data.write().events.insert(event.id, event.clone());
        self.event_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_events(&self, ids: &[EventId]) -> Result<(), StoreError> {
        let mut write_guard = self.data.write();
        for id in ids {
            write_guard.events.remove(id);
        }
        self.event_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn get_all_alerts(&self) -> Result<BoxStream<'static, Alert>, StoreError> {
        let alerts = self.data.read().snapshot().alerts;
        Ok(stream::iter(alerts).boxed())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        if self.path.is_none() {
            return Ok(());
        }
        self.write_snapshot()
    }
}
