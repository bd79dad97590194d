use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NEWS_ALERT_TOPIC: &str = "news-alerts";
pub const NEWS_EVENT_TOPIC: &str = "news-events";
pub const NEWS_EVENT_UPDATE_TOPIC: &str = "news-event-updates";

/// The topics notifications are published on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "news-alerts")]
    Alerts,
    #[serde(rename = "news-events")]
    Events,
    #[serde(rename = "news-event-updates")]
    EventUpdates,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Alerts, Topic::Events, Topic::EventUpdates];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Topic::Alerts => NEWS_ALERT_TOPIC,
            Topic::Events => NEWS_EVENT_TOPIC,
            Topic::EventUpdates => NEWS_EVENT_UPDATE_TOPIC,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}
