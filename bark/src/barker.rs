//! Sinks notifications are fanned out to.
//!
//! Plain closures are barkers too, which keeps one-off sinks such as the
//! notification logger free of boilerplate:
//!
//! ```ignore
//! distributor.add_alert_barker(Arc::new(|alert: &AlertLite| {
//!     tracing::info!(sender = %alert.sender, "alert");
//!     Ok(())
//! }));
//! ```

use async_trait::async_trait;
use shared::types::{AlertLite, Event};

#[derive(thiserror::Error, Debug)]
pub enum BarkError {
    #[error("unable to encode notification: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Sink(String),
}

#[async_trait]
pub trait AlertBarker: Send + Sync {
    async fn bark_alert(&self, alert: &AlertLite) -> Result<(), BarkError>;
}

#[async_trait]
pub trait EventBarker: Send + Sync {
    async fn bark_event(&self, event: &Event) -> Result<(), BarkError>;
}

#[async_trait]
impl<F> AlertBarker for F
where
    F: Fn(&AlertLite) -> Result<(), BarkError> + Send + Sync,
{
    async fn bark_alert(&self, alert: &AlertLite) -> Result<(), BarkError> {
        self(alert)
    }
}

#[async_trait]
impl<F> EventBarker for F
where
    F: Fn(&Event) -> Result<(), BarkError> + Send + Sync,
{
    async fn bark_event(&self, event: &Event) -> Result<(), BarkError> {
        self(event)
    }
}

/// Logs alerts as they come in.
pub fn log_alert(alert: &AlertLite) -> Result<(), BarkError> {
    tracing::info!(
        alert_id = %alert.id,
        sender = %alert.sender,
        subject = %alert.subject,
        "news alert"
    );
    Ok(())
}

/// Logs events as they come in.
pub fn log_event(event: &Event) -> Result<(), BarkError> {
    tracing::info!(
        event_id = %event.id,
        alerts = event.alerts.len(),
        top_sender = %event.top_sender,
        top_sentence = %event.top_sentence,
        "news event"
    );
    Ok(())
}
