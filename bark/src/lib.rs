pub mod barker;
pub mod config;
pub mod distributor;
pub mod metrics_defs;
pub mod server;
pub mod websocket;

use barker::{log_alert, log_event};
use config::Config;
use distributor::{Distributor, DistributorError};
use server::{AppState, router};
use shared::pubsub::{Subscriber, TopicChannels};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use websocket::WebSocketHub;

#[derive(thiserror::Error, Debug)]
pub enum BarkServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unable to stop distributor: {0}")]
    Distributor(#[from] DistributorError),

    #[error("no message source: push delivery is disabled and no broker was given")]
    NoMessageSource,
}

/// The distributor together with the HTTP server hosting its websocket hub
/// and push endpoint.
pub struct BarkService {
    hub: Option<Arc<WebSocketHub>>,
    push: Option<Arc<TopicChannels>>,
    source: Arc<dyn Subscriber>,
    distributor: Distributor,
}

impl BarkService {
    /// Builds the service. Messages are read from `subscriber` when given,
    /// otherwise from the push endpoint.
    pub fn new(
        config: &Config,
        subscriber: Option<Arc<dyn Subscriber>>,
    ) -> Result<Self, BarkServiceError> {
        let push = (subscriber.is_none() && config.push).then(|| Arc::new(TopicChannels::new()));
        let source: Arc<dyn Subscriber> = match (subscriber, &push) {
            (Some(subscriber), _) => subscriber,
            (None, Some(push)) => push.clone(),
            (None, None) => return Err(BarkServiceError::NoMessageSource),
        };

        let mut distributor = Distributor::new();

        let hub = config
            .websocket
            .enabled
            .then(|| Arc::new(WebSocketHub::new(config.websocket.clone())));
        if let Some(hub) = &hub {
            if config.websocket.alerts {
                distributor.add_alert_barker(hub.clone());
            }
            if config.websocket.events {
                distributor.add_event_barker(hub.clone());
            }
            if config.websocket.event_updates {
                distributor.add_event_update_barker(hub.clone());
            }
        }

        if config.log_notifications {
            distributor.add_alert_barker(Arc::new(log_alert));
            distributor.add_event_barker(Arc::new(log_event));
            distributor.add_event_update_barker(Arc::new(log_event));
        }

        Ok(BarkService {
            hub,
            push,
            source,
            distributor,
        })
    }

    pub fn hub(&self) -> Option<Arc<WebSocketHub>> {
        self.hub.clone()
    }

    /// Gives access to the distributor to register more barkers.
    pub fn distributor_mut(&mut self) -> &mut Distributor {
        &mut self.distributor
    }

    /// Barks until `shutdown` resolves, then stops the distributor.
    ///
    /// Topic subscriptions are taken before this returns, so messages
    /// published after the call are delivered even if the returned future
    /// has not been polled yet. Must be called within a tokio runtime.
    pub fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> impl Future<Output = Result<(), BarkServiceError>> + Send + 'static {
        let handle = self.distributor.listen_and_bark(self.source.as_ref());
        let state = AppState {
            hub: self.hub,
            push: self.push,
        };

        async move {
            let address = listener.local_addr();
            let served = match address {
                Ok(address) => {
                    tracing::info!(?address, "bark listening");
                    axum::serve(listener, router(state))
                        .with_graceful_shutdown(shutdown)
                        .await
                }
                Err(e) => Err(e),
            };

            handle.stop().await?;
            served?;
            Ok::<(), BarkServiceError>(())
        }
    }
}

/// Runs the bark service on the configured listener.
pub async fn run(
    config: Config,
    subscriber: Option<Arc<dyn Subscriber>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BarkServiceError> {
    let service = BarkService::new(&config, subscriber)?;
    let listener = TcpListener::bind(config.listener.address()).await?;
    service.serve(listener, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::pubsub::{MemoryBroker, Publisher, encode};
    use shared::topics::Topic;
    use shared::types::{AlertLite, Event};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use uuid::Uuid;

    fn lite() -> AlertLite {
        AlertLite {
            id: Uuid::new_v4(),
            instance_id: String::new(),
            article_url: "https://example.com/story".into(),
            sender: "CNN".into(),
            timestamp: Utc.with_ymd_and_hms(2016, 6, 12, 9, 0, 0).unwrap(),
            tags: vec!["orlando".into()],
            subject: "Breaking".into(),
            top_sentence: String::new(),
        }
    }

    struct Running {
        base: String,
        stop: oneshot::Sender<()>,
        task: JoinHandle<Result<(), BarkServiceError>>,
    }

    async fn start(service: BarkService) -> Running {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(service.serve(listener, async move {
            let _ = stopped.await;
        }));
        Running { base, stop, task }
    }

    impl Running {
        async fn shutdown(self) {
            self.stop.send(()).unwrap();
            self.task.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_push_reaches_websocket_hub() {
        let service = BarkService::new(&Config::default(), None).unwrap();
        let hub = service.hub().unwrap();
        let mut socket = hub.register().await.unwrap();
        let running = start(service).await;
        let client = reqwest::Client::new();

        let health = client
            .get(format!("{}/health", running.base))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status(), 200);

        let alert = lite();
        let response = client
            .post(format!("{}/push/news-alerts", running.base))
            .body(encode(&alert).unwrap())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let text = tokio::time::timeout(Duration::from_secs(1), socket.recv())
            .await
            .unwrap()
            .unwrap();
        let received: AlertLite = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(received, alert);

        // malformed payloads are acknowledged and dropped
        let response = client
            .post(format!("{}/push/news-alerts", running.base))
            .body("garbage")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let response = client
            .post(format!("{}/push/bogus", running.base))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_websocket_at_capacity() {
        let mut config = Config::default();
        config.websocket.max_connections = 0;
        let running = start(BarkService::new(&config, None).unwrap()).await;

        let response = reqwest::Client::new()
            .get(format!("{}/ws", running.base))
            .header("Connection", "upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_broker_source_disables_push() {
        let broker = Arc::new(MemoryBroker::new());
        let mut service = BarkService::new(&Config::default(), Some(broker.clone())).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        service
            .distributor_mut()
            .add_alert_barker(Arc::new(move |alert: &AlertLite| {
                tx.send(alert.id)
                    .map_err(|e| barker::BarkError::Sink(e.to_string()))
            }));
        let running = start(service).await;

        let alert = lite();
        broker
            .publish(Topic::Alerts, encode(&alert).unwrap())
            .await
            .unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(alert.id));

        let response = reqwest::Client::new()
            .post(format!("{}/push/news-alerts", running.base))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        running.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_right_after_spawn_is_delivered() {
        let broker = Arc::new(MemoryBroker::new());
        let mut service = BarkService::new(&Config::default(), Some(broker.clone())).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        service
            .distributor_mut()
            .add_event_barker(Arc::new(move |event: &Event| {
                tx.send(event.id)
                    .map_err(|e| barker::BarkError::Sink(e.to_string()))
            }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(service.serve(listener, async move {
            let _ = stopped.await;
        }));

        let at = Utc.with_ymd_and_hms(2016, 6, 12, 9, 0, 0).unwrap();
        let event = Event {
            id: Uuid::new_v4(),
            tags: vec!["orlando".into()],
            event_start: at,
            event_end: at,
            alerts: Vec::new(),
            top_sentence: String::new(),
            top_sender: String::new(),
        };
        broker
            .publish(Topic::Events, encode(&event).unwrap())
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(event.id));

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn test_requires_message_source() {
        let config = Config {
            push: false,
            ..Default::default()
        };
        assert!(matches!(
            BarkService::new(&config, None),
            Err(BarkServiceError::NoMessageSource)
        ));
    }
}
