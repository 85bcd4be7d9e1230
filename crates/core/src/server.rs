use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::api;
use crate::error::Result;
use crate::relay::Relay;

/// HTTP/WebSocket front of a [`Relay`].
///
/// Binding and serving are split so callers (and tests binding port 0) can
/// learn the real address before requests arrive.
pub struct Server {
    relay: Arc<Relay>,
    listener: TcpListener,
}

impl Server {
    /// Create the segment store and bind the configured address.
    pub async fn bind(relay: Arc<Relay>) -> Result<Self> {
        relay.store().ensure().await?;

        let listener = TcpListener::bind(relay.config().bind).await?;
        let addr = listener.local_addr()?;
        relay.set_bound_addr(addr);

        tracing::info!(%addr, "relay listening");
        match relay.playlist_url() {
            Ok(url) => tracing::info!(url = %url, "HLS playlist"),
            Err(e) => tracing::warn!(error = %e, "no public playlist URL yet"),
        }

        Ok(Self { relay, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn relay(&self) -> Arc<Relay> {
        self.relay.clone()
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then stop the receiver and transcoder.
    ///
    /// Open connections (including ingest sockets) are dropped rather than
    /// drained: a producer never closes on its own.
    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        let app = api::router(self.relay.clone())
            .into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(self.listener, app).into_future();

        tokio::select! {
            result = serve => result?,
            _ = shutdown => tracing::info!("shutdown requested"),
        }

        self.relay.stop().await;
        Ok(())
    }
}
