//! Topic based publish/subscribe plumbing.
//!
//! Messages travel as push envelopes: `{"message":{"data":"<base64>"}}` where
//! the data is the JSON encoding of an alert or event record. The same bytes
//! are used by the in-process broker and by the HTTP push transport so that a
//! subscriber never has to know where a message came from.

use crate::topics::Topic;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

const SUBSCRIPTION_BUFFER: usize = 1024;

#[derive(thiserror::Error, Debug)]
pub enum PubSubError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("publish request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("publish rejected with status {0}")]
    Rejected(u16),
    #[error("invalid push url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Serialize, Deserialize)]
struct PushMessage {
    message: PushData,
}

#[derive(Serialize, Deserialize)]
struct PushData {
    data: String,
}

/// Wraps a record in a push envelope.
pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, PubSubError> {
    let payload = serde_json::to_vec(record)?;
    let envelope = PushMessage {
        message: PushData {
            data: STANDARD.encode(payload),
        },
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Unwraps a push envelope and decodes the record inside it.
pub fn decode<T: DeserializeOwned>(message: &[u8]) -> Result<T, PubSubError> {
    let envelope: PushMessage = serde_json::from_slice(message)?;
    let payload = STANDARD.decode(envelope.message.data.as_bytes())?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Raw envelopes delivered for one topic. Dropping the receiver ends the
/// subscription.
pub type Subscription = mpsc::Receiver<Vec<u8>>;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: Topic, message: Vec<u8>) -> Result<(), PubSubError>;
}

pub trait Subscriber: Send + Sync {
    fn subscribe(&self, topic: Topic) -> Subscription;
}

/// Encodes `record` and publishes it on `topic`.
pub async fn publish_record<T: Serialize>(
    publisher: &dyn Publisher,
    topic: Topic,
    record: &T,
) -> Result<(), PubSubError> {
    let message = encode(record)?;
    publisher.publish(topic, message).await
}

/// Fans published messages out to every live subscription of a topic.
#[derive(Default)]
pub struct TopicChannels {
    subscribers: RwLock<HashMap<Topic, Vec<mpsc::Sender<Vec<u8>>>>>,
}

impl TopicChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a message to all subscribers of a topic. Returns the number
    /// of subscriptions the message was handed to.
    pub async fn deliver(&self, topic: Topic, message: Vec<u8>) -> usize {
        // Clone the senders so the lock is never held across an await point
        let senders = self
            .subscribers
            .read()
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        let mut closed = false;
        for sender in senders {
            match sender.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => closed = true,
            }
        }

        if closed {
            let mut write_guard = self.subscribers.write();
            if let Some(list) = write_guard.get_mut(&topic) {
                list.retain(|sender| !sender.is_closed());
            }
        }

        if delivered == 0 {
            tracing::debug!(%topic, "no subscribers for message");
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .read()
            .get(&topic)
            .map(|list| list.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Subscriber for TopicChannels {
    fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscribers.write().entry(topic).or_default().push(tx);
        rx
    }
}

/// In-process broker used when every service runs in the same process.
#[derive(Default)]
pub struct MemoryBroker {
    channels: TopicChannels,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: Topic, message: Vec<u8>) -> Result<(), PubSubError> {
        self.channels.deliver(topic, message).await;
        Ok(())
    }
}

impl Subscriber for MemoryBroker {
    fn subscribe(&self, topic: Topic) -> Subscription {
        self.channels.subscribe(topic)
    }
}

/// Publishes envelopes by POSTing them to a bark server's push endpoint.
pub struct HttpPublisher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpPublisher {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, PubSubError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpPublisher { client, base_url })
    }

    fn topic_url(&self, topic: Topic) -> Result<Url, PubSubError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/push/{topic}"))?)
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, topic: Topic, message: Vec<u8>) -> Result<(), PubSubError> {
        let response = self
            .client
            .post(self.topic_url(topic)?)
            .header("Content-Type", "application/json")
            .body(message)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PubSubError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
