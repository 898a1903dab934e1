use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use super::{Relay, ServerEvent};

pub async fn ws_handler(ws: WebSocketUpgrade, State(relay): State<Relay>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

async fn handle_socket(socket: WebSocket, relay: Relay) {
    let (sink, stream) = socket.split();
    serve_connection(sink, stream, relay).await;
}

/// Greets the client, then answers frames until the client closes or the
/// socket fails.
async fn serve_connection<Tx, Rx>(mut sink: Tx, mut stream: Rx, relay: Relay)
where
    Tx: Sink<Message, Error = axum::Error> + Unpin,
    Rx: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut connection = relay.connect();

    info!("Chat connection opened");
    if send(&mut sink, &ServerEvent::connected()).await.is_err() {
        return;
    }

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "WebSocket receive error");
                break;
            }
        };

        let events = match frame {
            Message::Text(text) => connection.handle_frame(&text).await,
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => connection.handle_frame(text).await,
                Err(_) => vec![ServerEvent::error(super::errors::SERVER_ERROR)],
            },
            Message::Ping(data) => {
                if sink.send(Message::Pong(data)).await.is_err() {
                    break;
                }
                continue;
            }
            Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        let mut closed = false;
        for event in &events {
            if send(&mut sink, event).await.is_err() {
                closed = true;
                break;
            }
        }
        if closed {
            break;
        }
    }

    info!(session_id = ?connection.session_id(), "Chat connection closed");
}

async fn send<S>(sink: &mut S, event: &ServerEvent) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Failed to encode event");
            return Ok(());
        }
    };
    sink.send(Message::Text(payload)).await
}
