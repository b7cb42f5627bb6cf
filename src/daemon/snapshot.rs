//! Ordered snapshot persistence
//!
//! One task owns the snapshot file. Requests arrive over an unbounded channel
//! and are written one at a time in submission order; anything queued while a
//! write is in flight is collapsed to the newest snapshot. Each write goes to
//! a temp file in the same directory and is renamed over the target, so
//! readers never see a torn document. Failures are logged and the task keeps
//! going.

use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

enum Command {
    Write(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Counters reported when the writer stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub failed: usize,
    pub superseded: usize,
}

/// Cloneable handle for queueing snapshots
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl SnapshotSender {
    /// Queue a snapshot; returns false if the writer has stopped
    pub fn submit(&self, bytes: Vec<u8>) -> bool {
        self.tx.send(Command::Write(bytes)).is_ok()
    }

    /// Wait until every snapshot queued before this call is on disk (or failed)
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

pub struct SnapshotWriter {
    sender: SnapshotSender,
    cancel: CancellationToken,
    handle: JoinHandle<WriteStats>,
}

impl SnapshotWriter {
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(path, rx, cancel.clone()));
        Self {
            sender: SnapshotSender { tx },
            cancel,
            handle,
        }
    }

    pub fn sender(&self) -> SnapshotSender {
        self.sender.clone()
    }

    pub fn submit(&self, bytes: Vec<u8>) -> bool {
        self.sender.submit(bytes)
    }

    pub async fn flush(&self) {
        self.sender.flush().await;
    }

    /// Drain everything queued so far, then stop the task
    pub async fn shutdown(self) -> WriteStats {
        self.sender.flush().await;
        self.cancel.cancel();
        match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot writer task failed");
                WriteStats::default()
            }
        }
    }
}

/// Collapse a batch: last write wins, every flush is acknowledged afterwards
fn absorb(
    cmd: Command,
    pending: &mut Option<Vec<u8>>,
    waiters: &mut Vec<oneshot::Sender<()>>,
    stats: &mut WriteStats,
) {
    match cmd {
        Command::Write(bytes) => {
            if pending.replace(bytes).is_some() {
                stats.superseded += 1;
            }
        }
        Command::Flush(ack) => waiters.push(ack),
    }
}

async fn run(
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) -> WriteStats {
    let mut stats = WriteStats::default();

    loop {
        let first = tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
            () = cancel.cancelled() => break,
        };

        let mut pending = None;
        let mut waiters = Vec::new();
        absorb(first, &mut pending, &mut waiters, &mut stats);
        while let Ok(cmd) = rx.try_recv() {
            absorb(cmd, &mut pending, &mut waiters, &mut stats);
        }

        if let Some(bytes) = pending {
            let target = path.clone();
            let result = tokio::task::spawn_blocking(move || atomic_write(&target, &bytes)).await;
            match result {
                Ok(Ok(())) => {
                    stats.written += 1;
                    tracing::trace!(path = %path.display(), "Snapshot written");
                }
                Ok(Err(e)) => {
                    stats.failed += 1;
                    tracing::warn!(path = %path.display(), error = %e, "Failed to write snapshot");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(error = %e, "Snapshot write task panicked");
                }
            }
        }

        for ack in waiters {
            let _ = ack.send(());
        }
    }

    tracing::debug!(
        written = stats.written,
        failed = stats.failed,
        superseded = stats.superseded,
        "Snapshot writer stopped"
    );
    stats
}

/// Write to a temp file beside `path`, then rename over it
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_last_submission_wins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("game-state.json");
        let writer = SnapshotWriter::spawn(path.clone());

        for n in 1..=50 {
            assert!(writer.submit(format!("{{\"tick\":{n}}}").into_bytes()));
        }
        let stats = writer.shutdown().await;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"tick\":50}");
        assert!(stats.written >= 1);
        assert_eq!(stats.written + stats.superseded, 50);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_flush_waits_for_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        let writer = SnapshotWriter::spawn(path.clone());

        writer.submit(b"first".to_vec());
        writer.flush().await;
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        writer.submit(b"second".to_vec());
        writer.flush().await;
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        writer.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_writer() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("missing");
        let path = dir.join("state.json");
        let writer = SnapshotWriter::spawn(path.clone());

        writer.submit(b"lost".to_vec());
        writer.flush().await;
        assert!(!path.exists());

        std::fs::create_dir_all(&dir).unwrap();
        writer.submit(b"kept".to_vec());
        let stats = writer.shutdown().await;

        assert_eq!(std::fs::read(&path).unwrap(), b"kept");
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.written, 1);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        let writer = SnapshotWriter::spawn(path.clone());
        writer.submit(b"{}".to_vec());
        writer.shutdown().await;

        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let writer = SnapshotWriter::spawn(tmp.path().join("state.json"));
        let sender = writer.sender();
        writer.shutdown().await;
        assert!(!sender.submit(b"late".to_vec()));
        // flush on a stopped writer returns immediately
        sender.flush().await;
    }
}
