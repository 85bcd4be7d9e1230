//! Ingest channel: the producer's WebSocket.
//!
//! Each binary frame is a chunk of WebM/Opus audio and is forwarded verbatim
//! to the transcoder. Opening a connection starts the transcoder if needed;
//! closing one leaves it running so the producer can reconnect without
//! disturbing the receiver. Nothing is ever sent back to the producer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;

use crate::relay::Relay;

/// `GET /ingest` (WebSocket upgrade)
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(relay): State<Arc<Relay>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| run(socket, relay, peer))
}

async fn run(mut socket: WebSocket, relay: Arc<Relay>, peer: SocketAddr) {
    tracing::info!(%peer, "ingest connected");
    relay.ingest_opened().await;

    let mut chunks = 0u64;
    let mut bytes = 0u64;

    let reason = loop {
        match socket.recv().await {
            Some(Ok(Message::Binary(chunk))) => {
                chunks += 1;
                bytes += chunk.len() as u64;
                relay.ingest_chunk(chunk).await;
            }
            Some(Ok(Message::Close(_))) => break "closed by producer",
            Some(Ok(Message::Text(_))) => {
                tracing::debug!(%peer, "ignoring text frame on ingest");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(%peer, error = %e, "ingest read error");
                break "read error";
            }
            None => break "connection dropped",
        }
    };

    tracing::info!(%peer, reason, chunks, bytes, "ingest closed");
}
