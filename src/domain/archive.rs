//! Archive stream events and the assembled archive.

use bytes::Bytes;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One event on a generation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    /// Next fragment of the archive, in delivery order
    Data(Bytes),
    /// Explicit end marker, optionally declaring what should have arrived
    End(Option<ArchiveDigest>),
    /// Upstream failure carrying the service's detail string
    Error(String),
}

/// Integrity declaration sent with the end marker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveDigest {
    /// Total archive size in bytes
    pub size: Option<u64>,
    /// Lowercase hex SHA-256 of the archive
    pub sha256: Option<String>,
}

/// Producer side of a per-request archive queue
#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<ChunkEvent>,
}

impl ChunkSender {
    /// Queue an event; returns false once the consumer has gone away
    pub async fn send(&self, event: ChunkEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Resolves once the consumer has dropped its end of the queue
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Ordered, single-consumer queue of chunk events for one request.
///
/// All stream callbacks funnel through this queue, so data, end and error
/// are observed in exactly the order they were produced.
#[derive(Debug)]
pub struct ArchiveStream {
    rx: mpsc::Receiver<ChunkEvent>,
}

impl ArchiveStream {
    /// Create a bounded queue
    pub fn channel(capacity: usize) -> (ChunkSender, ArchiveStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ChunkSender { tx }, ArchiveStream { rx })
    }

    /// Build a stream that replays a fixed event list
    pub fn from_events(events: Vec<ChunkEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // Capacity equals the event count, so this never fails.
            let _ = tx.try_send(event);
        }
        Self { rx }
    }

    /// Wait for the next event; `None` means the producer hung up
    pub async fn next(&mut self) -> Option<ChunkEvent> {
        self.rx.recv().await
    }
}

/// A fully written archive file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledArchive {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub chunks: u64,
    /// Lowercase hex SHA-256 of the file contents
    pub sha256: String,
}
