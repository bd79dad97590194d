//! Websocket hub broadcasting notifications to every connected client.
//!
//! Each connection owns a bounded queue in the registry. A broadcast walks
//! the registry under the shared lock and enqueues the message for every
//! connection; what happens to a full queue depends on the broadcast policy.
//! Connections ping their client periodically and give up on any write that
//! misses its deadline.

use crate::barker::{AlertBarker, BarkError, EventBarker};
use crate::config::{BroadcastPolicy, WebSocketConfig};
use crate::metrics_defs::{WS_CONNECTIONS, WS_MESSAGES_DROPPED, WS_REJECTED};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use shared::types::{AlertLite, Event};
use shared::{counter, gauge};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum HubError {
    #[error("too many concurrent connections, please try again later")]
    TooManyConnections,
}

#[derive(thiserror::Error, Debug)]
enum WriteError {
    #[error("websocket write failed: {0}")]
    Socket(#[from] axum::Error),

    #[error("websocket write timed out")]
    Timeout,
}

/// A slot in the registry. Messages broadcast to the hub arrive on it.
pub struct Registration {
    pub id: Uuid,
    rx: mpsc::Receiver<Utf8Bytes>,
}

impl Registration {
    pub async fn recv(&mut self) -> Option<Utf8Bytes> {
        self.rx.recv().await
    }
}

pub struct WebSocketHub {
    sockets: RwLock<HashMap<Uuid, mpsc::Sender<Utf8Bytes>>>,
    config: WebSocketConfig,
}

impl WebSocketHub {
    pub fn new(config: WebSocketConfig) -> Self {
        WebSocketHub {
            sockets: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Adds a connection to the registry, unless it is full.
    pub async fn register(&self) -> Result<Registration, HubError> {
        let mut write_guard = self.sockets.write().await;
        if write_guard.len() >= self.config.max_connections {
            counter!(WS_REJECTED).increment(1);
            return Err(HubError::TooManyConnections);
        }

        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        write_guard.insert(id, tx);
        gauge!(WS_CONNECTIONS).set(write_guard.len() as f64);
        tracing::info!(socket_id = %id, "added socket");

        Ok(Registration { id, rx })
    }

    /// Closes the queue of a registration and removes it from the registry.
    /// A broadcast blocked on the full queue fails and releases the registry.
    pub async fn release(&self, registration: Registration) {
        let id = registration.id;
        drop(registration);
        self.deregister(id).await;
    }

    pub async fn deregister(&self, id: Uuid) {
        let mut write_guard = self.sockets.write().await;
        if write_guard.remove(&id).is_some() {
            gauge!(WS_CONNECTIONS).set(write_guard.len() as f64);
            tracing::info!(socket_id = %id, "deleted socket");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.sockets.read().await.len()
    }

    /// Enqueues a message for every registered connection. Returns the
    /// number of connections it was queued for.
    pub async fn bark(&self, message: Utf8Bytes) -> usize {
        let read_guard = self.sockets.read().await;
        let mut queued = 0;

        for (id, socket) in read_guard.iter() {
            let sent = match self.config.broadcast_policy {
                BroadcastPolicy::Block => socket.send(message.clone()).await.is_ok(),
                BroadcastPolicy::Drop => match socket.try_send(message.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        counter!(WS_MESSAGES_DROPPED).increment(1);
                        tracing::warn!(socket_id = %id, "socket queue full, dropping message");
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                },
            };
            if sent {
                queued += 1;
            }
        }

        tracing::debug!(queued, "barked to sockets");
        queued
    }

    async fn bark_json<T: Serialize>(&self, record: &T) -> Result<usize, BarkError> {
        let payload = serde_json::to_string(record)?;
        Ok(self.bark(payload.into()).await)
    }

    /// Pumps queued messages and keep-alive pings to the client until the
    /// connection fails or the client goes away.
    pub async fn serve(&self, socket: WebSocket, mut registration: Registration) {
        let (mut sender, mut receiver) = socket.split();
        let write_timeout = self.config.write_timeout();

        let mut ping = tokio::time::interval(self.config.ping_interval());
        // the first tick completes immediately
        ping.tick().await;

        loop {
            let result = tokio::select! {
                message = registration.recv() => match message {
                    Some(text) => write(&mut sender, Message::Text(text), write_timeout).await,
                    None => break,
                },
                _ = ping.tick() => {
                    write(&mut sender, Message::Ping(Bytes::new()), write_timeout).await
                }
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => Ok(()),
                },
            };

            if let Err(e) = result {
                tracing::info!(socket_id = %registration.id, error = %e, "closing socket");
                break;
            }
        }

        self.release(registration).await;
    }
}

async fn write<S>(sender: &mut S, message: Message, deadline: Duration) -> Result<(), WriteError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match tokio::time::timeout(deadline, sender.send(message)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(WriteError::Timeout),
    }
}

#[async_trait]
impl AlertBarker for WebSocketHub {
    async fn bark_alert(&self, alert: &AlertLite) -> Result<(), BarkError> {
        let queued = self.bark_json(alert).await?;
        tracing::debug!(alert_id = %alert.id, sender = %alert.sender, queued, "alerted sockets");
        Ok(())
    }
}

#[async_trait]
impl EventBarker for WebSocketHub {
    async fn bark_event(&self, event: &Event) -> Result<(), BarkError> {
        let queued = self.bark_json(event).await?;
        tracing::debug!(event_id = %event.id, queued, "alerted sockets of event");
        Ok(())
    }
}
