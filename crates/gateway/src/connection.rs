use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use txflow_fanout::{ClientCommand, ClientSink, DeliveryError, ServerMessage, SubscriptionRegistry};
use uuid::Uuid;

/// Handle the registry uses to push messages to one WebSocket client.
#[derive(Debug)]
struct Connection {
    id: String,
    outbound: mpsc::Sender<ServerMessage>,
    closed: CancellationToken,
}

impl ClientSink for Connection {
    fn deliver(&self, message: ServerMessage) -> Result<(), DeliveryError> {
        self.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!("client {} is not keeping up, closing", self.id);
                self.closed.cancel();
                DeliveryError::Full
            }
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Serves one upgraded socket until either side closes it.
pub async fn serve_socket(
    socket: WebSocket,
    registry: Arc<SubscriptionRegistry>,
    outbound_buffer: usize,
    shutdown_token: CancellationToken,
) {
    let connection_id = Uuid::new_v4().to_string();
    let (outbound, mut outbound_rx) = mpsc::channel::<ServerMessage>(outbound_buffer.max(1));
    let closed = shutdown_token.child_token();

    let connection = Arc::new(Connection {
        id: connection_id.clone(),
        outbound,
        closed: closed.clone(),
    });
    registry.on_connect(&connection_id, &connection);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let writer_closed = closed.clone();
    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                () = writer_closed.cancelled() => break,
                message = outbound_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("could not serialize message for {writer_id}: {e}");
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                debug!("write to {writer_id} failed: {e}");
                break;
            }
        }

        writer_closed.cancel();
        let _ = ws_sender.close().await;
    });

    if connection
        .deliver(ServerMessage::connected(&connection_id))
        .is_err()
    {
        closed.cancel();
    }

    loop {
        let frame = tokio::select! {
            biased;
            () = closed.cancelled() => break,
            frame = ws_receiver.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                let replies = match ClientCommand::parse(text.as_str()) {
                    Ok(command) => {
                        debug!("{connection_id} sent {command:?}");
                        registry.dispatch(&connection_id, command)
                    }
                    Err(e) => {
                        warn!("bad frame from {connection_id}: {e}");
                        vec![ServerMessage::error(&e)]
                    }
                };

                for reply in replies {
                    if connection.deliver(reply).is_err() {
                        closed.cancel();
                        break;
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("read from {connection_id} failed: {e}");
                break;
            }
        }
    }

    registry.on_disconnect(&connection_id);
    closed.cancel();
    drop(connection);

    if let Err(e) = writer.await {
        warn!("writer task for {connection_id} failed: {e}");
    }
}
