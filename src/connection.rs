use crate::error::{Result, UmbraError};
use crate::protocol::{Event, Frame, Request, Response};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state shared between the request path and the reader task
struct ConnectionState {
    /// Pending requests waiting for correlated responses
    pending_requests: HashMap<Uuid, oneshot::Sender<Response>>,
    /// Channel for sending outgoing messages
    ws_tx: mpsc::UnboundedSender<Message>,
}

/// Low-level console channel: one WebSocket carrying JSON frames
///
/// Responses are correlated back to their requests by envelope id; frames
/// without a pending request are push events fanned out to subscribers.
/// Stream end or error marks the connection closed, which the session
/// layer promotes to connection loss.
pub struct Connection {
    state: Arc<Mutex<ConnectionState>>,
    /// Broadcast channel for push events (outside the mutex so subscribing
    /// never blocks on in-flight requests)
    event_tx: broadcast::Sender<Event>,
    closed_rx: watch::Receiver<bool>,
}

impl Connection {
    /// Connect to a console endpoint (`host:port`)
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        let url = format!("ws://{}", endpoint.into());
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, _) = broadcast::channel(100);
        let (closed_tx, closed_rx) = watch::channel(false);

        let state = Arc::new(Mutex::new(ConnectionState {
            pending_requests: HashMap::new(),
            ws_tx,
        }));

        // Forward outgoing messages to the WebSocket
        let write_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    tracing::error!("Failed to send message: {}", e);
                    break;
                }
            }
        });

        // Receive and dispatch incoming frames
        let state_clone = state.clone();
        let event_tx_clone = event_tx.clone();
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if let Err(e) =
                            Self::handle_message(&state_clone, &event_tx_clone, text).await
                        {
                            tracing::error!("Error handling frame: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("Console closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Connection gone: cancel pending requests and notify watchers
            let mut state = state_clone.lock().await;
            state.pending_requests.clear();
            let _ = closed_tx.send(true);
            drop(write_handle);
        });

        Ok(Self {
            state,
            event_tx,
            closed_rx,
        })
    }

    async fn handle_message(
        state: &Arc<Mutex<ConnectionState>>,
        event_tx: &broadcast::Sender<Event>,
        text: String,
    ) -> Result<()> {
        tracing::debug!("Received: {}", text);

        match serde_json::from_str::<Frame>(&text)? {
            Frame::Response(response) => {
                let mut state = state.lock().await;
                if let Some(tx) = state.pending_requests.remove(&response.id) {
                    let _ = tx.send(response);
                } else {
                    tracing::debug!("Dropping response with no pending request: {}", response.id);
                }
            }
            Frame::Event(event) => {
                let _ = event_tx.send(event);
            }
        }

        Ok(())
    }

    /// Send a request and wait for the correlated response.
    ///
    /// A response with `ok: false` is surfaced as [`UmbraError::Console`].
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        let request_id = request.id();
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            state.pending_requests.insert(request_id, tx);

            let json = serde_json::to_string(&request)?;
            tracing::debug!("Sending: {}", json);

            state
                .ws_tx
                .send(Message::Text(json))
                .map_err(|_| UmbraError::ConnectionClosed)?;
        }

        let response = match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(UmbraError::ConnectionClosed),
            Err(_) => {
                let mut state = self.state.lock().await;
                state.pending_requests.remove(&request_id);
                return Err(UmbraError::Timeout);
            }
        };

        if !response.ok {
            return Err(UmbraError::Console {
                detail: response.detail(),
            });
        }

        Ok(response)
    }

    /// Send a request without waiting for a response
    pub async fn send_only(&self, request: Request) -> Result<()> {
        let state = self.state.lock().await;
        let json = serde_json::to_string(&request)?;
        tracing::debug!("Sending (no response): {}", json);

        state
            .ws_tx
            .send(Message::Text(json))
            .map_err(|_| UmbraError::ConnectionClosed)?;

        Ok(())
    }

    /// Subscribe to push events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Resolves once the underlying stream has ended or errored
    pub async fn closed(&self) {
        let mut closed_rx = self.closed_rx.clone();
        // A dropped sender also counts as closed
        let _ = closed_rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Ask the peer to close; the reader task observes the close handshake
    pub async fn close(&self) {
        let state = self.state.lock().await;
        let _ = state.ws_tx.send(Message::Close(None));
    }
}
