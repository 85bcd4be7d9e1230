use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use relay::{Relay, RelayConfig, Server, TranscodeProfile};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "airplay-relay",
    about = "Relay browser tab audio to a legacy AirPlay receiver over HLS"
)]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Listen port
    #[arg(long, short, env = "PORT", default_value_t = relay::config::DEFAULT_PORT)]
    port: u16,

    /// Host advertised to the receiver in the playlist URL (detected when omitted)
    #[arg(long)]
    public_host: Option<String>,

    /// Port advertised to the receiver (defaults to --port)
    #[arg(long)]
    public_port: Option<u16>,

    /// Directory for the HLS playlist and segments
    #[arg(long, default_value = "hls")]
    hls_dir: PathBuf,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// AAC bitrate passed to ffmpeg
    #[arg(long, default_value = "160k")]
    bitrate: String,

    /// Seconds to wait for the receiver to show up
    #[arg(long, default_value_t = 6)]
    discovery_timeout: u64,

    /// Seconds allowed for each play/stop request to the receiver
    #[arg(long, default_value_t = relay::config::DEFAULT_COMMAND_TIMEOUT.as_secs())]
    command_timeout: u64,

    /// Audio chunks buffered for ffmpeg before new ones are dropped
    #[arg(long, default_value_t = relay::config::DEFAULT_INGEST_QUEUE)]
    ingest_queue: usize,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            bind: SocketAddr::new(self.host, self.port),
            public_host: self.public_host,
            public_port: self.public_port,
            hls_dir: self.hls_dir,
            ffmpeg: self.ffmpeg,
            profile: TranscodeProfile {
                bitrate: self.bitrate,
                ..TranscodeProfile::default()
            },
            discovery_timeout: Duration::from_secs(self.discovery_timeout),
            command_timeout: Duration::from_secs(self.command_timeout),
            ingest_queue: self.ingest_queue,
            ..RelayConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=info,airplay_relay=info,tower_http=info".into()),
        )
        .init();

    let config = Args::parse().into_config();

    let relay = match Relay::new(config) {
        Ok(relay) => Arc::new(relay),
        Err(e) => {
            eprintln!("Failed to initialise relay: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(relay).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("press Ctrl-C to stop");
    if let Err(e) = server.run().await {
        eprintln!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_relay_config() {
        let config = Args::parse_from(["airplay-relay", "--port", "8090"]).into_config();
        assert_eq!(config.bind.port(), 8090);
        assert_eq!(config.hls_dir, PathBuf::from("hls"));
        assert_eq!(config.profile, TranscodeProfile::default());
        assert_eq!(config.discovery_timeout, Duration::from_secs(6));
        assert_eq!(config.command_timeout, RelayConfig::default().command_timeout);
        assert_eq!(config.ingest_queue, RelayConfig::default().ingest_queue);
    }

    #[test]
    fn flags_override_config() {
        let config = Args::parse_from([
            "airplay-relay",
            "--port",
            "9000",
            "--public-host",
            "192.168.1.20",
            "--bitrate",
            "128k",
            "--discovery-timeout",
            "10",
            "--command-timeout",
            "2",
            "--ingest-queue",
            "32",
        ])
        .into_config();

        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.public_host.as_deref(), Some("192.168.1.20"));
        assert_eq!(config.profile.bitrate, "128k");
        assert_eq!(config.discovery_timeout, Duration::from_secs(10));
        assert_eq!(config.command_timeout, Duration::from_secs(2));
        assert_eq!(config.ingest_queue, 32);
    }
}
