//! HTTP surface of the relay.
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /start?ip=<address>` | Start transcoding and play on the receiver |
//! | `GET /stop` | Stop the receiver and the transcoder (always 200) |
//! | `GET /health`, `GET /healthz` | `{appleTvIp, playlist, ffmpeg}` |
//! | `GET /ingest` | WebSocket carrying WebM/Opus chunks from the producer |
//! | `GET /hls/*` | Playlist and segments, 404 when missing |
//!
//! CORS is permissive: the capture extension calls in from its own origin.

pub mod handlers;
pub mod response;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::ingest;
use crate::relay::Relay;
use crate::store::HLS_URL_PREFIX;
pub use response::ApiResponse;

/// Build the full router around a shared [`Relay`].
pub fn router(relay: Arc<Relay>) -> Router {
    let segments = ServeDir::new(relay.store().dir());

    Router::new()
        .route("/start", get(handlers::start))
        .route("/stop", get(handlers::stop))
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::health))
        .route("/ingest", get(ingest::upgrade))
        .nest_service(HLS_URL_PREFIX, segments)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}
