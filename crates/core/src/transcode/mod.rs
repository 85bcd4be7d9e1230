//! Transcoding supervisor.
//!
//! The relay never encodes audio itself. It pipes the producer's WebM/Opus
//! byte stream into an external segmenter (ffmpeg) that writes a rolling HLS
//! playlist into the [`SegmentStore`](crate::store::SegmentStore).
//!
//! ## Lifecycle
//!
//! ```text
//! STOPPED --start--> RUNNING --stop / process exit--> STOPPED
//! ```
//!
//! There is no automatic relaunch after an unexpected exit. The next
//! [`Transcoder::start`] (the ingest channel calls it on every new
//! connection) launches a fresh process.

pub mod ffmpeg;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
pub use ffmpeg::FfmpegTranscoder;

/// Capability interface over the external transcoding process.
///
/// Implementations hold at most one running session.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Launch a session unless one is already running.
    async fn start(&self) -> Result<()>;

    /// Forward a chunk to the running session. Never blocks on the process
    /// and never fails: chunks are dropped when there is nowhere to put them.
    async fn feed(&self, chunk: Bytes);

    /// End the running session, if any.
    async fn stop(&self);

    async fn is_running(&self) -> bool;
}

/// Fixed output profile for the segmenter: AAC audio in a rolling HLS window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeProfile {
    pub codec: String,
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate: String,
    /// Target duration of each segment in seconds.
    pub segment_secs: u32,
    /// Number of segments kept in the playlist; older ones are deleted.
    pub list_size: u32,
}

impl Default for TranscodeProfile {
    fn default() -> Self {
        Self {
            codec: "aac".to_string(),
            channels: 2,
            sample_rate: 48_000,
            bitrate: "160k".to_string(),
            segment_secs: 2,
            list_size: 6,
        }
    }
}

impl TranscodeProfile {
    /// ffmpeg arguments reading from stdin and writing `playlist`.
    pub fn ffmpeg_args(&self, playlist: &Path) -> Vec<String> {
        vec![
            "-loglevel".into(),
            "warning".into(),
            // Pace input at native rate so segment timing follows the live source.
            "-re".into(),
            "-i".into(),
            "pipe:0".into(),
            "-vn".into(),
            "-acodec".into(),
            self.codec.clone(),
            "-ac".into(),
            self.channels.to_string(),
            "-ar".into(),
            self.sample_rate.to_string(),
            "-b:a".into(),
            self.bitrate.clone(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            self.segment_secs.to_string(),
            "-hls_list_size".into(),
            self.list_size.to_string(),
            "-hls_flags".into(),
            "delete_segments+append_list+independent_segments".into(),
            playlist.to_string_lossy().into_owned(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_profile_args() {
        let args = TranscodeProfile::default().ffmpeg_args(&PathBuf::from("hls/stream.m3u8"));
        let joined = args.join(" ");

        assert!(joined.starts_with("-loglevel warning -re -i pipe:0 -vn"));
        assert!(joined.contains("-acodec aac -ac 2 -ar 48000 -b:a 160k"));
        assert!(joined.contains("-f hls -hls_time 2 -hls_list_size 6"));
        assert!(joined.contains("delete_segments+append_list+independent_segments"));
        assert_eq!(args.last().map(String::as_str), Some("hls/stream.m3u8"));
    }

    #[test]
    fn profile_overrides_flow_into_args() {
        let profile = TranscodeProfile {
            bitrate: "96k".to_string(),
            list_size: 3,
            ..TranscodeProfile::default()
        };
        let args = profile.ffmpeg_args(&PathBuf::from("out.m3u8"));

        let pos = args.iter().position(|a| a == "-b:a").unwrap();
        assert_eq!(args[pos + 1], "96k");
        let pos = args.iter().position(|a| a == "-hls_list_size").unwrap();
        assert_eq!(args[pos + 1], "3");
    }
}
