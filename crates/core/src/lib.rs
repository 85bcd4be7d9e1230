//! Relay live browser audio to legacy AirPlay receivers.
//!
//! A producer streams WebM/Opus chunks over a WebSocket ([`ingest`]); an
//! external ffmpeg process ([`transcode`]) turns them into a rolling HLS
//! playlist in the [`store`]; a receiver found by mDNS ([`receiver`]) is
//! told to fetch that playlist. [`Relay`] ties the pieces together and
//! [`Server`] exposes them over HTTP ([`api`]).
//!
//! ```text
//! browser --ws /ingest--> Relay --stdin--> ffmpeg --> hls/stream.m3u8
//!                           |                              ^
//!                           +--POST /play--> Apple TV --GET /hls/...
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod receiver;
pub mod relay;
pub mod server;
pub mod store;
pub mod transcode;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use receiver::{Device, ReceiverProtocol, ReceiverSession};
pub use relay::{Health, Relay};
pub use server::Server;
pub use store::SegmentStore;
pub use transcode::{FfmpegTranscoder, TranscodeProfile, Transcoder};
