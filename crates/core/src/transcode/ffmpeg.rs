use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};

use super::{TranscodeProfile, Transcoder};
use crate::error::{RelayError, Result};
use crate::store::SegmentStore;

type Slot = Arc<Mutex<Option<ActiveSession>>>;

/// Handle to a running transcoder process.
///
/// The process itself is owned by its exit watcher task; the session only
/// keeps the input queue and the kill switch.
struct ActiveSession {
    id: u64,
    input: mpsc::Sender<Bytes>,
    kill: oneshot::Sender<()>,
}

/// [`Transcoder`] backed by an external ffmpeg process.
///
/// Chunks are queued into a bounded per-session channel and written to the
/// process's stdin by a dedicated task, so `feed` never waits on the pipe.
/// stdout/stderr are inherited.
pub struct FfmpegTranscoder {
    program: PathBuf,
    args: Vec<String>,
    store: SegmentStore,
    queue: usize,
    slot: Slot,
    next_id: AtomicU64,
}

impl FfmpegTranscoder {
    pub fn new(
        program: impl Into<PathBuf>,
        profile: &TranscodeProfile,
        store: SegmentStore,
        queue: usize,
    ) -> Self {
        let args = profile.ffmpeg_args(&store.playlist_path());
        Self::with_command(program, args, store, queue)
    }

    /// Run an arbitrary segmenter command instead of the ffmpeg profile.
    pub fn with_command(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        store: SegmentStore,
        queue: usize,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            store,
            queue: queue.max(1),
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    fn spawn(&self) -> Result<(Child, ChildStdin)> {
        let spawn_err = |source| RelayError::Spawn {
            program: self.program.display().to_string(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err(std::io::Error::other("stdin was not captured")))?;

        Ok((child, stdin))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn start(&self) -> Result<()> {
        // Held across clear + spawn so racing starts cannot launch twice.
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        if let Err(e) = self.store.clear().await {
            tracing::warn!(dir = %self.store.dir().display(), error = %e, "could not clear segment store");
        }

        let (child, stdin) = self.spawn()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let pid = child.id();

        let (input_tx, input_rx) = mpsc::channel(self.queue);
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(write_input(id, stdin, input_rx));
        tokio::spawn(watch_exit(id, child, kill_rx, self.slot.clone()));

        *slot = Some(ActiveSession {
            id,
            input: input_tx,
            kill: kill_tx,
        });

        tracing::info!(session = id, pid, program = %self.program.display(), "transcoder started");
        Ok(())
    }

    async fn feed(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }

        let slot = self.slot.lock().await;
        let Some(session) = slot.as_ref() else {
            tracing::trace!(bytes = chunk.len(), "no transcoder session, chunk dropped");
            return;
        };

        match session.input.try_send(chunk) {
            Ok(()) => {}
            Err(TrySendError::Full(chunk)) => {
                tracing::warn!(session = session.id, bytes = chunk.len(), "transcoder input backlog full, chunk dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(session = session.id, "transcoder input closed, chunk dropped");
            }
        }
    }

    async fn stop(&self) {
        let Some(session) = self.slot.lock().await.take() else {
            return;
        };

        // Dropping the queue sender lets the writer drain and close stdin.
        drop(session.input);
        let _ = session.kill.send(());

        tracing::info!(session = session.id, "transcoder stopped");
    }

    async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

/// Drain queued chunks into the process's stdin, in order.
async fn write_input(session: u64, mut stdin: ChildStdin, mut chunks: mpsc::Receiver<Bytes>) {
    while let Some(chunk) = chunks.recv().await {
        if let Err(e) = stdin.write_all(&chunk).await {
            tracing::warn!(session, error = %e, "transcoder stdin write failed");
            return;
        }
    }

    let _ = stdin.shutdown().await;
    tracing::debug!(session, "transcoder stdin closed");
}

/// Own the child until it exits, then release the slot if it still belongs
/// to this session.
async fn watch_exit(session: u64, mut child: Child, kill: oneshot::Receiver<()>, slot: Slot) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(session, error = %e, "kill after exit");
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) if status.success() => tracing::info!(session, "transcoder exited"),
        Ok(status) => tracing::warn!(session, %status, "transcoder exited"),
        Err(e) => tracing::warn!(session, error = %e, "failed to reap transcoder"),
    }

    let mut slot = slot.lock().await;
    if slot.as_ref().is_some_and(|active| active.id == session) {
        *slot = None;
        tracing::info!(session, "transcoder session cleared after exit");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Stand-in segmenter: copies stdin into the playlist file.
    fn cat_into_playlist(store: &SegmentStore) -> FfmpegTranscoder {
        let script = format!("cat > '{}'", store.playlist_path().display());
        FfmpegTranscoder::with_command("sh", vec!["-c".into(), script], store.clone(), 8)
    }

    async fn wait_until_stopped(transcoder: &FfmpegTranscoder) -> bool {
        for _ in 0..100 {
            if !transcoder.is_running().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let transcoder = cat_into_playlist(&SegmentStore::new(temp.path()));

        transcoder.start().await.unwrap();
        let first = transcoder.slot.lock().await.as_ref().map(|s| s.id);
        transcoder.start().await.unwrap();
        let second = transcoder.slot.lock().await.as_ref().map(|s| s.id);

        assert_eq!(first, second);
        transcoder.stop().await;
    }

    #[tokio::test]
    async fn fed_bytes_reach_process_in_order() {
        let temp = TempDir::new().unwrap();
        let store = SegmentStore::new(temp.path());
        let transcoder = cat_into_playlist(&store);

        transcoder.start().await.unwrap();
        transcoder.feed(Bytes::from_static(b"one,")).await;
        transcoder.feed(Bytes::new()).await;
        transcoder.feed(Bytes::from_static(b"two,")).await;
        transcoder.feed(Bytes::from_static(b"three")).await;

        let mut contents = String::new();
        for _ in 0..100 {
            contents = std::fs::read_to_string(store.playlist_path()).unwrap_or_default();
            if contents.len() == 13 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(contents, "one,two,three");

        transcoder.stop().await;
        assert!(!transcoder.is_running().await);
    }

    #[tokio::test]
    async fn start_clears_stale_segments() {
        let temp = TempDir::new().unwrap();
        let store = SegmentStore::new(temp.path());
        std::fs::write(temp.path().join("stream7.ts"), b"old").unwrap();

        let transcoder = cat_into_playlist(&store);
        transcoder.start().await.unwrap();

        assert!(!temp.path().join("stream7.ts").exists());
        transcoder.stop().await;
    }

    #[tokio::test]
    async fn exit_clears_session_and_next_start_relaunches() {
        let temp = TempDir::new().unwrap();
        let transcoder =
            FfmpegTranscoder::with_command("true", Vec::new(), SegmentStore::new(temp.path()), 8);

        transcoder.start().await.unwrap();
        assert!(wait_until_stopped(&transcoder).await, "exit was not observed");

        transcoder.start().await.unwrap();
        assert_eq!(transcoder.next_id.load(Ordering::SeqCst), 3, "second session was not launched");
        assert!(wait_until_stopped(&transcoder).await);
    }

    #[tokio::test]
    async fn feed_after_exit_is_dropped_until_restarted() {
        let temp = TempDir::new().unwrap();
        let store = SegmentStore::new(temp.path());
        let transcoder =
            FfmpegTranscoder::with_command("true", Vec::new(), store.clone(), 8);

        transcoder.start().await.unwrap();
        assert!(wait_until_stopped(&transcoder).await, "exit was not observed");

        transcoder.feed(Bytes::from_static(b"late")).await;
        assert!(!transcoder.is_running().await);
        assert_eq!(transcoder.next_id.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_without_session_is_noop() {
        let temp = TempDir::new().unwrap();
        let transcoder = cat_into_playlist(&SegmentStore::new(temp.path()));

        transcoder.stop().await;
        transcoder.stop().await;
        assert!(!transcoder.is_running().await);
    }

    #[tokio::test]
    async fn feed_without_session_is_dropped() {
        let temp = TempDir::new().unwrap();
        let transcoder = cat_into_playlist(&SegmentStore::new(temp.path()));

        transcoder.feed(Bytes::from_static(b"orphan")).await;
        assert!(!transcoder.is_running().await);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let transcoder = FfmpegTranscoder::with_command(
            "/nonexistent/ffmpeg",
            Vec::new(),
            SegmentStore::new(temp.path()),
            8,
        );

        let err = transcoder.start().await.unwrap_err();
        assert!(matches!(err, RelayError::Spawn { .. }));
        assert!(!transcoder.is_running().await);
    }
}
