//! Segment store: the directory the transcoder writes its HLS output into.
//!
//! The store is passive. Only the transcoding process writes here; the rest
//! of the relay checks whether the playlist exists and serves the files
//! statically under [`HLS_URL_PREFIX`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Playlist file name inside the store.
pub const PLAYLIST_NAME: &str = "stream.m3u8";

/// URL prefix the store is mounted under.
pub const HLS_URL_PREFIX: &str = "/hls";

#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.dir.join(PLAYLIST_NAME)
    }

    /// Path component of the playlist URL, e.g. `/hls/stream.m3u8`.
    pub fn playlist_url_path() -> String {
        format!("{HLS_URL_PREFIX}/{PLAYLIST_NAME}")
    }

    /// Create the store directory if it does not exist yet.
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub async fn playlist_exists(&self) -> bool {
        tokio::fs::try_exists(self.playlist_path())
            .await
            .unwrap_or(false)
    }

    /// Remove every file left over from a previous run.
    ///
    /// Best-effort: files that vanish mid-scan (the old transcoder pruning its
    /// own segments) are skipped. Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure().await?;
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => tokio::fs::remove_dir_all(&path).await,
                _ => tokio::fs::remove_file(&path).await,
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove stale segment"),
            }
        }

        tracing::debug!(dir = %self.dir.display(), removed, "segment store cleared");
        Ok(removed)
    }
}
