use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::transcode::TranscodeProfile;

pub const DEFAULT_PORT: u16 = 8090;

/// Default discovery window for locating a receiver.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(6);

/// Upper bound on a single play/stop request to a receiver.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Chunks buffered per transcoder session before ingest starts dropping.
pub const DEFAULT_INGEST_QUEUE: usize = 256;

/// Relay-level configuration shared by the HTTP layer and the components.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind: SocketAddr,
    /// Host advertised in the playlist URL handed to the receiver.
    /// When `None`, the primary local IPv4 address is detected at `start`.
    pub public_host: Option<String>,
    /// Port advertised in the playlist URL. Defaults to the bound port.
    pub public_port: Option<u16>,
    /// Segment store directory (playlist + segments).
    pub hls_dir: PathBuf,
    /// Path or name of the ffmpeg executable.
    pub ffmpeg: PathBuf,
    pub profile: TranscodeProfile,
    pub discovery_timeout: Duration,
    pub command_timeout: Duration,
    pub ingest_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            public_host: None,
            public_port: None,
            hls_dir: PathBuf::from("hls"),
            ffmpeg: PathBuf::from("ffmpeg"),
            profile: TranscodeProfile::default(),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ingest_queue: DEFAULT_INGEST_QUEUE,
        }
    }
}

impl RelayConfig {
    /// Port advertised to receivers: the explicit public port, else the bound one.
    pub fn advertised_port(&self, bound: SocketAddr) -> u16 {
        self.public_port.unwrap_or(bound.port())
    }
}
