use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    hub::SignalingHub,
    registry::{ConnectionHandle, ConnectionId},
    AppState,
};

const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, remote_addr))
}

/// Pump one WebSocket connection through the hub until it closes.
async fn handle_socket(socket: WebSocket, hub: SignalingHub, remote_addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut rx) = ConnectionHandle::channel();
    let connection_id = connection.id();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        debug!(%connection_id, "writer task ended");
    });

    info!(%connection_id, %remote_addr, "websocket connected");

    while let Some(msg_result) = receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        };

        match msg {
            Message::Text(text) => hub.handle_text(&connection, &text).await,
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => hub.handle_text(&connection, &text).await,
                Err(_) => debug!(%connection_id, "ignoring non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                debug!(%connection_id, "received close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    hub.disconnect(&connection);
    // The registry no longer holds this handle, so once it is dropped the
    // writer flushes what is queued and stops.
    drop(connection);
    drain_writer(writer, connection_id, WRITER_DRAIN).await;

    info!(%connection_id, %remote_addr, "websocket disconnected");
}

/// Wait for the writer to flush frames queued before the close, giving up
/// after `grace`.
async fn drain_writer(mut writer: JoinHandle<()>, connection_id: ConnectionId, grace: Duration) {
    if timeout(grace, &mut writer).await.is_err() {
        debug!(%connection_id, "writer did not drain in time");
        writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test_timeout::tokio_timeout_test]
    async fn queued_frames_are_flushed_after_close() {
        let (connection, mut rx) = ConnectionHandle::channel();
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let _ = sink_tx.send(frame);
            }
        });

        for n in 0..3 {
            connection.send(format!("frame-{n}"));
        }
        let id = connection.id();
        drop(connection);
        drain_writer(writer, id, Duration::from_secs(1)).await;

        let mut flushed = Vec::new();
        while let Ok(frame) = sink_rx.try_recv() {
            flushed.push(frame);
        }
        assert_eq!(flushed, ["frame-0", "frame-1", "frame-2"]);
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn stuck_writer_is_abandoned_after_grace() {
        let writer = tokio::spawn(std::future::pending::<()>());
        drain_writer(writer, ConnectionId::new(), Duration::from_millis(50)).await;
    }
}
