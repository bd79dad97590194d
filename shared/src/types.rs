use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AlertId = Uuid;
pub type EventId = Uuid;

/// A sentence of an alert along with the phrases extracted from it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    #[serde(rename = "sentence")]
    pub value: String,
    #[serde(rename = "noun_phrases", default)]
    pub phrases: Vec<String>,
}

impl Sentence {
    pub fn new<V, I, P>(value: V, phrases: I) -> Self
    where
        V: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Sentence {
            value: value.into(),
            phrases: phrases.into_iter().map(Into::into).collect(),
        }
    }
}

/// The subset of an alert that is published to the alerts topic and handed
/// to barkers. Bodies and sentences are left out to keep messages small.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLite {
    pub id: AlertId,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub article_url: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "phrases", default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub top_sentence: String,
}

/// A single parsed news alert email.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(flatten)]
    pub lite: AlertLite,
    #[serde(default)]
    pub raw_body: String,
    #[serde(default)]
    pub body: String,
    /// The text the phrases were extracted from
    #[serde(default)]
    pub source_text: String,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

impl Alert {
    pub fn id(&self) -> AlertId {
        self.lite.id
    }

    pub fn sender(&self) -> &str {
        &self.lite.sender
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.lite.timestamp
    }

    /// What to hand the extractor when re-deriving phrases. Records written
    /// before `source_text` existed fall back to the raw body.
    pub fn extractor_input(&self) -> &str {
        if self.source_text.is_empty() {
            &self.raw_body
        } else {
            &self.source_text
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.lite.tags
    }
}

/// A cluster of alerts from several outlets reporting the same thing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "phrases")]
    pub tags: Vec<String>,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
    #[serde(rename = "news_alerts")]
    pub alerts: Vec<EventAlert>,
    pub top_sentence: String,
    pub top_sender: String,
}

impl Event {
    pub fn alert_ids(&self) -> impl Iterator<Item = AlertId> + '_ {
        self.alerts.iter().map(|a| a.alert_id)
    }

    pub fn contains_alert(&self, id: &AlertId) -> bool {
        self.alerts.iter().any(|a| &a.alert_id == id)
    }
}

/// An event's view of one member alert. `order` is the alert's position in
/// the event and `time_lapsed` the seconds elapsed since the event started.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAlert {
    pub alert_id: AlertId,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub article_url: String,
    pub sender: String,
    #[serde(rename = "phrases", default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub top_sentence: String,
    pub order: i64,
    pub time_lapsed: i64,
}
