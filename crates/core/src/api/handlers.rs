use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use serde::Deserialize;

use super::response::ApiResponse;
use crate::relay::{Health, Relay};

#[derive(Debug, Deserialize)]
pub struct StartParams {
    #[serde(default)]
    ip: Option<String>,
}

/// `GET /start?ip=<address>`
pub async fn start(
    State(relay): State<Arc<Relay>>,
    params: Result<Query<StartParams>, QueryRejection>,
) -> ApiResponse {
    let address = match params {
        Ok(Query(params)) => params.ip.unwrap_or_default(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable /start query");
            return ApiResponse::missing_address();
        }
    };

    match relay.start(&address).await {
        Ok(started) => {
            tracing::info!(device = %started.device, "relay ready");
            ApiResponse::ok(format!(
                "Ready. Apple TV is loading {}. Begin sending audio.",
                started.playlist_url
            ))
        }
        Err(e) => e.into(),
    }
}

/// `GET /stop`
pub async fn stop(State(relay): State<Arc<Relay>>) -> ApiResponse {
    relay.stop().await;
    ApiResponse::ok("Stopped.")
}

/// `GET /health`, `GET /healthz`
pub async fn health(State(relay): State<Arc<Relay>>) -> Json<Health> {
    Json(relay.health().await)
}
