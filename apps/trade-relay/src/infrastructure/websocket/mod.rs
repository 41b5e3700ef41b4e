//! WebSocket Listener
//!
//! Accepts WebSocket upgrades on any path and registers each connection
//! with the subscriber registry. Frames sent by clients are read only to
//! detect closure and are otherwise ignored.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PushSink, SinkError};
use crate::application::services::SubscriberRegistry;
use crate::domain::streaming::Payload;

// =============================================================================
// Sink Adapter
// =============================================================================

/// Write half of an upgraded WebSocket.
///
/// UTF-8 payloads are sent as text frames, anything else as binary.
pub struct WebSocketSink {
    sink: SplitSink<WebSocket, Message>,
}

impl WebSocketSink {
    /// Wrap the write half of a socket.
    #[must_use]
    pub const fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

fn frame(payload: &Payload) -> Message {
    payload.as_text().map_or_else(
        || Message::Binary(payload.to_bytes()),
        |text| Message::Text(text.into()),
    )
}

#[async_trait]
impl PushSink for WebSocketSink {
    async fn send_frame(&mut self, payload: &Payload) -> Result<(), SinkError> {
        self.sink
            .send(frame(payload))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Router that upgrades every request to a subscriber session.
pub fn router(registry: Arc<SubscriberRegistry>) -> Router {
    Router::new().fallback(upgrade_handler).with_state(registry)
}

/// Serve WebSocket subscribers on `listener` until cancelled.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<SubscriberRegistry>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "WebSocket listener ready");
    }

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

async fn upgrade_handler(
    State(registry): State<Arc<SubscriberRegistry>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_subscriber(socket, registry))
}

/// Run one subscriber session until either side closes it.
pub async fn serve_subscriber(socket: WebSocket, registry: Arc<SubscriberRegistry>) {
    let (sink, mut incoming) = socket.split();
    let registration = registry.register(WebSocketSink::new(sink));
    let id = registration.id();
    tracing::info!(subscriber = %id, total = registry.len(), "Subscriber connected");

    loop {
        tokio::select! {
            () = registration.closed() => break,
            frame = incoming.next() => match frame {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Err(e)) => {
                    tracing::debug!(subscriber = %id, error = %e, "WebSocket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    registry.deregister(id);
    tracing::info!(subscriber = %id, total = registry.len(), "Subscriber disconnected");
}
