use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("{0} cannot be 0")]
    Zero(&'static str),

    #[error("Websocket hub is enabled but barks about nothing")]
    NothingToBark,
}

/// Bark configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Serves the websocket hub, health checks and push deliveries
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    /// Accept topic messages POSTed to `/push/{topic}`
    #[serde(default = "default_true")]
    pub push: bool,
    /// Log every alert and event received
    #[serde(default)]
    pub log_notifications: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            websocket: WebSocketConfig::default(),
            push: true,
            log_notifications: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.websocket.validate()?;
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8888,
        }
    }
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What happens to a broadcast when a connection's queue is full
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastPolicy {
    /// Wait for queue space. A stalled connection delays every broadcast.
    Block,
    /// Skip the full connection
    #[default]
    Drop,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,
    /// Connections beyond this are turned away with a 503
    pub max_connections: usize,
    /// Outbound messages buffered per connection
    pub queue_capacity: usize,
    pub ping_interval_secs: u64,
    /// Deadline for every outbound write
    pub write_timeout_secs: u64,
    pub broadcast_policy: BroadcastPolicy,
    pub alerts: bool,
    pub events: bool,
    pub event_updates: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            enabled: true,
            max_connections: 500,
            queue_capacity: 500,
            ping_interval_secs: 5,
            write_timeout_secs: 30,
            broadcast_policy: BroadcastPolicy::Drop,
            alerts: true,
            events: true,
            event_updates: false,
        }
    }
}

impl WebSocketConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.queue_capacity == 0 {
            return Err(ValidationError::Zero("websocket.queue_capacity"));
        }
        if self.ping_interval_secs == 0 {
            return Err(ValidationError::Zero("websocket.ping_interval_secs"));
        }
        if self.write_timeout_secs == 0 {
            return Err(ValidationError::Zero("websocket.write_timeout_secs"));
        }
        if !(self.alerts || self.events || self.event_updates) {
            return Err(ValidationError::NothingToBark);
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}
