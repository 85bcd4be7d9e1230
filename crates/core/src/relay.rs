use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::receiver::{AirPlay, Device, ReceiverProtocol, ReceiverSession};
use crate::store::SegmentStore;
use crate::transcode::{FfmpegTranscoder, Transcoder};

/// Snapshot reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// Last receiver address passed to `start`.
    pub apple_tv_ip: Option<String>,
    /// Whether the playlist file currently exists.
    pub playlist: bool,
    /// Whether a transcoding session is active.
    pub ffmpeg: bool,
}

/// Result of a successful `start`.
#[derive(Debug, Clone)]
pub struct Started {
    pub device: Device,
    pub playlist_url: String,
}

/// Orchestration context: the transcoder, the receiver session and the
/// receiver target, coordinated as one unit.
///
/// `start` and `stop` are not serialized against each other; callers issue
/// them one at a time.
pub struct Relay {
    config: RelayConfig,
    store: SegmentStore,
    transcoder: Arc<dyn Transcoder>,
    receiver: ReceiverSession,
    target: RwLock<Option<String>>,
    advertised: RwLock<Option<SocketAddr>>,
}

impl Relay {
    /// Relay wired to ffmpeg and AirPlay per `config`.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let store = SegmentStore::new(&config.hls_dir);
        let transcoder = Arc::new(FfmpegTranscoder::new(
            &config.ffmpeg,
            &config.profile,
            store.clone(),
            config.ingest_queue,
        ));
        let protocol = Arc::new(AirPlay::new(config.command_timeout)?);
        Ok(Self::with_parts(config, transcoder, protocol))
    }

    /// Relay with caller-supplied transcoder and receiver protocol.
    pub fn with_parts(
        config: RelayConfig,
        transcoder: Arc<dyn Transcoder>,
        protocol: Arc<dyn ReceiverProtocol>,
    ) -> Self {
        let store = SegmentStore::new(&config.hls_dir);
        let receiver = ReceiverSession::new(protocol, config.discovery_timeout);
        Self {
            config,
            store,
            transcoder,
            receiver,
            target: RwLock::new(None),
            advertised: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// Record the address the HTTP listener actually bound, used for the
    /// advertised playlist URL (matters when binding port 0).
    pub fn set_bound_addr(&self, addr: SocketAddr) {
        *self.advertised.write() = Some(addr);
    }

    /// Public URL of the playlist, e.g. `http://192.168.1.20:8090/hls/stream.m3u8`.
    pub fn playlist_url(&self) -> Result<String> {
        let bound = (*self.advertised.read()).unwrap_or(self.config.bind);
        let port = self.config.advertised_port(bound);
        let host = match &self.config.public_host {
            Some(host) => host.clone(),
            None => local_ip_address::local_ip()
                .map_err(|e| RelayError::PublicHost(e.to_string()))?
                .to_string(),
        };
        Ok(format!("http://{host}:{port}{}", SegmentStore::playlist_url_path()))
    }

    /// Start transcoding and have the receiver at `address` play the stream.
    pub async fn start(&self, address: &str) -> Result<Started> {
        let address = address.trim();
        if address.is_empty() {
            return Err(RelayError::MissingAddress);
        }

        *self.target.write() = Some(address.to_string());

        // Started up front so segments are being produced while discovery runs.
        if let Err(e) = self.transcoder.start().await {
            tracing::error!(error = %e, "transcoder failed to start");
        }

        let playlist_url = self.playlist_url()?;
        tracing::info!(receiver = address, url = %playlist_url, "starting relay");

        let device = self.receiver.connect(address, &playlist_url).await?;
        Ok(Started {
            device,
            playlist_url,
        })
    }

    /// Tear down the receiver, then the transcoder. Always succeeds.
    pub async fn stop(&self) {
        self.receiver.disconnect().await;
        self.transcoder.stop().await;
        tracing::info!("relay stopped");
    }

    pub async fn health(&self) -> Health {
        let apple_tv_ip = self.target.read().clone();
        Health {
            apple_tv_ip,
            playlist: self.store.playlist_exists().await,
            ffmpeg: self.transcoder.is_running().await,
        }
    }

    /// Currently bound receiver, if any.
    pub fn receiver(&self) -> Option<Device> {
        self.receiver.bound()
    }

    /// A producer connected: make sure there is a session to feed.
    pub async fn ingest_opened(&self) {
        self.ensure_transcoder().await;
    }

    /// Forward one producer chunk to the transcoder, relaunching it first if
    /// the previous process has exited.
    pub async fn ingest_chunk(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.ensure_transcoder().await;
        self.transcoder.feed(chunk).await;
    }

    async fn ensure_transcoder(&self) {
        if self.transcoder.is_running().await {
            return;
        }
        if let Err(e) = self.transcoder.start().await {
            tracing::error!(error = %e, "transcoder failed to start for ingest");
        }
    }
}
