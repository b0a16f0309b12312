//! Server push channel.
//!
//! The API pushes events over a websocket as JSON text frames of the form
//! `{"event": "<name>", "data": <value>}`. Every (re)connect starts with an
//! `authenticate` frame carrying the user id so the server can route
//! per-user events to this socket.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::ApiError;

pub const AUTHENTICATE: &str = "authenticate";
pub const NEW_NOTIFICATION: &str = "newNotification";

/// One named event on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl PushEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    pub fn authenticate(user_id: &str) -> Self {
        Self::new(AUTHENTICATE, Value::String(user_id.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub url: String,
    /// Reconnects attempted after a drop before the channel gives up.
    pub reconnection_attempts: u32,
    pub reconnection_delay: Duration,
    pub connect_timeout: Duration,
}

impl PushConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnection_attempts: 5,
            reconnection_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// Handle to a live push connection.
///
/// Dropping or closing it stops the background task.
pub struct PushSubscription {
    events: mpsc::UnboundedReceiver<PushEvent>,
    outbound: mpsc::UnboundedSender<PushEvent>,
    task: Option<JoinHandle<()>>,
}

impl PushSubscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<PushEvent>,
        outbound: mpsc::UnboundedSender<PushEvent>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { events, outbound, task }
    }

    /// A subscription with no transport behind it. The returned sender feeds
    /// events in; the receiver sees what the client emits.
    pub fn detached() -> (
        Self,
        mpsc::UnboundedSender<PushEvent>,
        mpsc::UnboundedReceiver<PushEvent>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (Self::new(event_rx, out_tx, None), event_tx, out_rx)
    }

    /// Next server event. `None` once the channel has closed for good.
    pub async fn next_event(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }

    pub fn emit(&self, event: PushEvent) -> Result<(), ApiError> {
        self.outbound
            .send(event)
            .map_err(|_| ApiError::Channel("push channel closed".into()))
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.close();
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens push subscriptions for a user.
#[async_trait::async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, user_id: &str) -> Result<PushSubscription, ApiError>;
}

/// Websocket implementation of [`PushConnector`].
pub struct WsConnector {
    config: PushConfig,
}

impl WsConnector {
    pub fn new(config: PushConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, user_id: &str) -> Result<PushSubscription, ApiError> {
        if self.config.url.is_empty() {
            return Err(ApiError::Channel("push url is not configured".into()));
        }
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(self.config.clone(), user_id.to_string(), event_tx, out_rx));
        Ok(PushSubscription::new(event_rx, out_tx, Some(task)))
    }
}

enum Disconnect {
    /// Socket dropped; try again.
    Lost,
    /// The subscription side went away; stop for good.
    Closed,
}

async fn run(
    config: PushConfig,
    user_id: String,
    events: mpsc::UnboundedSender<PushEvent>,
    mut outbound: mpsc::UnboundedReceiver<PushEvent>,
) {
    let mut failures = 0u32;
    loop {
        match tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(config.url.as_str())).await {
            Ok(Ok((stream, _))) => {
                info!(url = %config.url, "push channel connected");
                failures = 0;
                let (mut sink, mut source) = stream.split();

                let mut outcome = match send_event(&mut sink, &PushEvent::authenticate(&user_id)).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!("push authenticate failed: {}", e);
                        Some(Disconnect::Lost)
                    }
                };

                while outcome.is_none() {
                    tokio::select! {
                        inbound = source.next() => match inbound {
                            Some(Ok(Message::Text(text))) => match serde_json::from_str::<PushEvent>(&text) {
                                Ok(event) => {
                                    debug!(event = %event.event, "push event");
                                    if events.send(event).is_err() {
                                        outcome = Some(Disconnect::Closed);
                                    }
                                }
                                Err(e) => debug!("ignoring malformed push frame: {}", e),
                            },
                            Some(Ok(Message::Close(_))) | None => outcome = Some(Disconnect::Lost),
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("push channel read error: {}", e);
                                outcome = Some(Disconnect::Lost);
                            }
                        },
                        next = outbound.recv() => match next {
                            Some(event) => {
                                if let Err(e) = send_event(&mut sink, &event).await {
                                    warn!("push emit failed: {}", e);
                                    outcome = Some(Disconnect::Lost);
                                }
                            }
                            None => {
                                let _ = sink.close().await;
                                outcome = Some(Disconnect::Closed);
                            }
                        },
                    }
                }

                if let Some(Disconnect::Closed) = outcome {
                    debug!("push channel closed by client");
                    return;
                }
                info!("push channel disconnected");
            }
            Ok(Err(e)) => warn!(url = %config.url, "push connect failed: {}", e),
            Err(_) => warn!(url = %config.url, "push connect timed out"),
        }

        failures += 1;
        if failures > config.reconnection_attempts {
            error!(attempts = config.reconnection_attempts, "push channel giving up");
            return;
        }
        tokio::time::sleep(config.reconnection_delay).await;
    }
}

async fn send_event<S>(sink: &mut S, event: &PushEvent) -> Result<(), ApiError>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(event).map_err(|e| ApiError::Encode(e.to_string()))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| ApiError::Channel(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
    use axum::routing::get;
    use axum::Router;

    // =====================================================================
    // Test server
    // =====================================================================

    /// Push server: after the first frame it sends one notification, then
    /// forwards every client frame to the test. A `disconnect-me` frame
    /// makes it drop the socket.
    async fn start_push_server() -> (String, mpsc::UnboundedReceiver<PushEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let tx = tx.clone();
                async move { ws.on_upgrade(move |socket| serve_socket(socket, tx)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("ws://{}/ws", addr), rx)
    }

    async fn serve_socket(mut socket: WebSocket, tx: mpsc::UnboundedSender<PushEvent>) {
        let mut greeted = false;
        while let Some(Ok(msg)) = socket.recv().await {
            let WsMessage::Text(text) = msg else { continue };
            let event: PushEvent = serde_json::from_str(&text).unwrap();
            let hang_up = event.event == "disconnect-me";
            let _ = tx.send(event);
            if hang_up {
                return;
            }
            if !greeted {
                greeted = true;
                let frame = serde_json::json!({
                    "event": NEW_NOTIFICATION,
                    "data": { "notification": { "_id": "n1", "title": "Low stock" } }
                });
                socket.send(WsMessage::Text(frame.to_string())).await.unwrap();
            }
        }
    }

    fn fast_config(url: String) -> PushConfig {
        PushConfig {
            reconnection_delay: Duration::from_millis(20),
            connect_timeout: Duration::from_secs(2),
            ..PushConfig::new(url)
        }
    }

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    // =====================================================================
    // WsConnector
    // =====================================================================

    #[tokio::test]
    async fn authenticates_then_receives_events() {
        let (url, mut server) = start_push_server().await;
        let mut sub = WsConnector::new(fast_config(url)).connect("u-42").await.unwrap();

        let auth = recv(&mut server).await;
        assert_eq!(auth, PushEvent::authenticate("u-42"));

        let event = tokio::time::timeout(Duration::from_secs(5), sub.next_event())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event, NEW_NOTIFICATION);
        assert_eq!(event.data["notification"]["_id"], "n1");
    }

    #[tokio::test]
    async fn emit_reaches_server() {
        let (url, mut server) = start_push_server().await;
        let sub = WsConnector::new(fast_config(url)).connect("u-1").await.unwrap();
        assert_eq!(recv(&mut server).await.event, AUTHENTICATE);

        sub.emit(PushEvent::new("ping", serde_json::json!(1))).unwrap();
        let got = recv(&mut server).await;
        assert_eq!(got, PushEvent::new("ping", serde_json::json!(1)));
    }

    #[tokio::test]
    async fn reconnect_authenticates_again() {
        let (url, mut server) = start_push_server().await;
        let sub = WsConnector::new(fast_config(url)).connect("u-7").await.unwrap();
        assert_eq!(recv(&mut server).await, PushEvent::authenticate("u-7"));

        sub.emit(PushEvent::new("disconnect-me", Value::Null)).unwrap();
        assert_eq!(recv(&mut server).await.event, "disconnect-me");

        assert_eq!(recv(&mut server).await, PushEvent::authenticate("u-7"));
    }

    #[tokio::test]
    async fn gives_up_after_attempt_limit() {
        let config = PushConfig {
            reconnection_attempts: 1,
            ..fast_config("ws://127.0.0.1:1/ws".into())
        };
        let mut sub = WsConnector::new(config).connect("u-1").await.unwrap();
        let end = tokio::time::timeout(Duration::from_secs(5), sub.next_event()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let err = WsConnector::new(PushConfig::new("")).connect("u").await.err().unwrap();
        assert!(matches!(err, ApiError::Channel(_)));
    }

    // =====================================================================
    // PushSubscription
    // =====================================================================

    #[tokio::test]
    async fn detached_subscription_round_trips() {
        let (mut sub, feed, mut sent) = PushSubscription::detached();
        feed.send(PushEvent::new("x", Value::Null)).unwrap();
        assert_eq!(sub.next_event().await.unwrap().event, "x");

        sub.emit(PushEvent::authenticate("me")).unwrap();
        assert_eq!(sent.recv().await.unwrap().data, "me");

        sub.close();
        assert!(sub.next_event().await.is_none());
    }

    #[test]
    fn frames_without_data_parse() {
        let event: PushEvent = serde_json::from_str(r#"{"event":"hello"}"#).unwrap();
        assert_eq!(event.data, Value::Null);
    }
}
