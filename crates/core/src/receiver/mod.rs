//! Receiver discovery and playback control.
//!
//! A receiver is a device on the LAN that can be told "fetch this URL and
//! play it". The relay binds at most one receiver at a time:
//!
//! ```text
//! IDLE --connect (match + play ok)--> BOUND --disconnect--> IDLE
//! IDLE --connect (timeout | play error)--> IDLE
//! ```
//!
//! The wire protocol sits behind [`ReceiverProtocol`]; [`airplay`] is the
//! production implementation.

pub mod airplay;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{RelayError, Result};
pub use airplay::AirPlay;

/// A playback device found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub address: IpAddr,
    /// Control port advertised by the device.
    pub port: u16,
}

impl Device {
    /// Whether the device's reported address is `target`.
    pub fn matches(&self, target: &str) -> bool {
        let target = target.trim();
        match target.parse::<IpAddr>() {
            Ok(ip) => ip == self.address,
            Err(_) => self.address.to_string() == target,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.address, self.port)
    }
}

/// Control command sent to a bound receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Fetch `url` and start playing at `start_position` (fraction of the
    /// media, 0 = beginning).
    Play { url: String, start_position: f64 },
    Stop,
}

impl Action {
    pub fn play(url: &str) -> Self {
        Self::Play {
            url: url.to_string(),
            start_position: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Stop => "stop",
        }
    }
}

/// Something observed while browsing for receivers.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Found(Device),
    /// Non-fatal protocol noise; logged and ignored.
    Error(String),
}

/// Capability interface over the discovery/control protocol.
#[async_trait]
pub trait ReceiverProtocol: Send + Sync {
    /// Start browsing the network. Events keep flowing until the returned
    /// receiver is dropped, which also ends the browse.
    fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>>;

    async fn command(&self, device: &Device, action: &Action) -> Result<()>;
}

/// Owns the (at most one) bound receiver.
///
/// Callers serialize `connect`; overlapping connects are not guarded.
pub struct ReceiverSession {
    protocol: Arc<dyn ReceiverProtocol>,
    discovery_timeout: Duration,
    bound: Mutex<Option<Device>>,
}

impl ReceiverSession {
    pub fn new(protocol: Arc<dyn ReceiverProtocol>, discovery_timeout: Duration) -> Self {
        Self {
            protocol,
            discovery_timeout,
            bound: Mutex::new(None),
        }
    }

    /// Currently bound receiver, if any.
    pub fn bound(&self) -> Option<Device> {
        self.bound.lock().clone()
    }

    /// Browse until a device reporting `address` shows up or the discovery
    /// window closes.
    ///
    /// Resolves exactly once. The event channel is dropped on return, so
    /// events arriving after the match or the timeout go nowhere.
    pub async fn discover(&self, address: &str) -> Result<Device> {
        let mut events = self.protocol.browse()?;

        let search = async {
            while let Some(event) = events.recv().await {
                match event {
                    DiscoveryEvent::Found(device) if device.matches(address) => return Some(device),
                    DiscoveryEvent::Found(device) => {
                        tracing::debug!(%device, wanted = address, "ignoring non-matching receiver");
                    }
                    DiscoveryEvent::Error(reason) => {
                        tracing::warn!(reason = %reason, "discovery error");
                    }
                }
            }
            None
        };

        match tokio::time::timeout(self.discovery_timeout, search).await {
            Ok(Some(device)) => Ok(device),
            Ok(None) | Err(_) => Err(RelayError::ReceiverNotFound {
                address: address.to_string(),
                timeout: self.discovery_timeout,
            }),
        }
    }

    /// Locate the receiver at `address` and have it play `media_url`.
    ///
    /// The device is bound only once the play command succeeds.
    pub async fn connect(&self, address: &str, media_url: &str) -> Result<Device> {
        let device = self.discover(address).await?;
        tracing::info!(%device, "receiver found");

        self.protocol
            .command(&device, &Action::play(media_url))
            .await?;

        if let Some(previous) = self.bound.lock().replace(device.clone()) {
            if previous != device {
                tracing::info!(%previous, "replacing bound receiver");
            }
        }

        tracing::info!(%device, url = media_url, "receiver playing");
        Ok(device)
    }

    /// Stop the bound receiver, if any. Never fails: the binding is cleared
    /// even when the device cannot be reached.
    pub async fn disconnect(&self) {
        let Some(device) = self.bound.lock().take() else {
            return;
        };

        match self.protocol.command(&device, &Action::Stop).await {
            Ok(()) => tracing::info!(%device, "receiver stopped"),
            Err(e) => tracing::warn!(%device, error = %e, "receiver stop failed, binding cleared anyway"),
        }
    }
}
