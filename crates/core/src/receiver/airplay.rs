//! Legacy AirPlay receivers (Apple TV 2nd/3rd generation).
//!
//! Discovery browses mDNS for `_airplay._tcp`. Control uses the original
//! AirPlay HTTP API on the advertised port:
//!
//! ```text
//! POST /play   Content-Type: text/parameters
//!              Content-Location: <url>
//!              Start-Position: <0..1>
//! POST /stop
//! ```
//!
//! The device fetches the URL itself, which is why the relay only needs to
//! hand it the HLS playlist.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tokio::sync::mpsc;

use super::{Action, Device, DiscoveryEvent, ReceiverProtocol};
use crate::error::{RelayError, Result};

pub const AIRPLAY_SERVICE: &str = "_airplay._tcp.local.";

const CLIENT_AGENT: &str = "MediaControl/1.0";

/// [`ReceiverProtocol`] speaking mDNS discovery + AirPlay HTTP control.
///
/// The HTTP client is kept for the lifetime of the relay so the connection
/// that issued `/play` stays pooled while the receiver is bound.
pub struct AirPlay {
    http: reqwest::Client,
}

impl AirPlay {
    pub fn new(command_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(command_timeout)
            .build()
            .map_err(std::io::Error::other)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ReceiverProtocol for AirPlay {
    fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>> {
        let daemon = ServiceDaemon::new().map_err(|e| RelayError::Discovery(e.to_string()))?;
        let services = daemon
            .browse(AIRPLAY_SERVICE)
            .map_err(|e| RelayError::Discovery(e.to_string()))?;

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            'browse: loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = services.recv_async() => match event {
                        Ok(ServiceEvent::ServiceResolved(info)) => {
                            for device in devices_from(&info) {
                                if tx.send(DiscoveryEvent::Found(device)).await.is_err() {
                                    break 'browse;
                                }
                            }
                        }
                        Ok(other) => tracing::trace!(event = ?other, "mdns event"),
                        Err(e) => {
                            let _ = tx.send(DiscoveryEvent::Error(e.to_string())).await;
                            break;
                        }
                    },
                }
            }

            if let Err(e) = daemon.stop_browse(AIRPLAY_SERVICE) {
                tracing::debug!(error = %e, "stop_browse");
            }
            if let Err(e) = daemon.shutdown() {
                tracing::debug!(error = %e, "mdns shutdown");
            }
            tracing::debug!("airplay browse ended");
        });

        Ok(rx)
    }

    async fn command(&self, device: &Device, action: &Action) -> Result<()> {
        let url = format!(
            "http://{}/{}",
            SocketAddr::new(device.address, device.port),
            action.name()
        );

        let mut request = self
            .http
            .post(&url)
            .header(USER_AGENT, CLIENT_AGENT)
            .header(CONTENT_TYPE, "text/parameters");
        if let Action::Play {
            url: media,
            start_position,
        } = action
        {
            request = request.body(play_body(media, *start_position));
        }

        tracing::debug!(%device, url = %url, "sending airplay command");

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::command(action.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::command(
                action.name(),
                format!("receiver answered {status}"),
            ));
        }
        Ok(())
    }
}

/// `text/parameters` body of a `/play` request.
fn play_body(url: &str, start_position: f64) -> String {
    format!("Content-Location: {url}\nStart-Position: {start_position}\n")
}

/// One device per advertised address of a resolved service.
fn devices_from(info: &ServiceInfo) -> Vec<Device> {
    let name = instance_name(info.get_fullname()).to_string();
    info.get_addresses()
        .iter()
        .map(|address| Device {
            name: name.clone(),
            address: *address,
            port: info.get_port(),
        })
        .collect()
}

/// `Living Room._airplay._tcp.local.` -> `Living Room`
fn instance_name(fullname: &str) -> &str {
    fullname
        .strip_suffix(AIRPLAY_SERVICE)
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<(String, String, String)>>>;

    async fn record(path: &'static str, log: Log, headers: HeaderMap, body: String) {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        log.lock().push((path.to_string(), content_type, body));
    }

    /// Minimal stand-in for an Apple TV control endpoint.
    async fn fake_apple_tv(stop_status: StatusCode) -> (SocketAddr, Log) {
        let log: Log = Arc::default();
        let app = Router::new()
            .route(
                "/play",
                post(|State(log): State<Log>, headers: HeaderMap, body: String| async move {
                    record("/play", log, headers, body).await;
                    StatusCode::OK
                }),
            )
            .route(
                "/stop",
                post(move |State(log): State<Log>, headers: HeaderMap, body: String| async move {
                    record("/stop", log, headers, body).await;
                    stop_status
                }),
            )
            .with_state(log.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, log)
    }

    fn device_at(addr: SocketAddr) -> Device {
        Device {
            name: "Test TV".to_string(),
            address: addr.ip(),
            port: addr.port(),
        }
    }

    #[test]
    fn play_body_format() {
        assert_eq!(
            play_body("http://10.0.0.2:8090/hls/stream.m3u8", 0.0),
            "Content-Location: http://10.0.0.2:8090/hls/stream.m3u8\nStart-Position: 0\n"
        );
    }

    #[test]
    fn instance_name_strips_service_type() {
        assert_eq!(instance_name("Living Room._airplay._tcp.local."), "Living Room");
        assert_eq!(instance_name("odd-name"), "odd-name");
    }

    #[tokio::test]
    async fn play_posts_parameters_body() {
        let (addr, log) = fake_apple_tv(StatusCode::OK).await;
        let airplay = AirPlay::new(Duration::from_secs(2)).unwrap();

        airplay
            .command(&device_at(addr), &Action::play("http://h:1/hls/stream.m3u8"))
            .await
            .unwrap();

        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "/play");
        assert_eq!(log[0].1, "text/parameters");
        assert!(log[0].2.starts_with("Content-Location: http://h:1/hls/stream.m3u8\n"));
    }

    #[tokio::test]
    async fn non_success_status_is_command_error() {
        let (addr, _log) = fake_apple_tv(StatusCode::INTERNAL_SERVER_ERROR).await;
        let airplay = AirPlay::new(Duration::from_secs(2)).unwrap();

        let err = airplay
            .command(&device_at(addr), &Action::Stop)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Command { action: "stop", .. }));
    }

    #[tokio::test]
    async fn unreachable_device_is_command_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let airplay = AirPlay::new(Duration::from_millis(500)).unwrap();
        let err = airplay
            .command(&device_at(addr), &Action::play("http://x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Command { action: "play", .. }));
    }
}
