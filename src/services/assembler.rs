//! Chunk assembler: materializes an archive stream into a file on disk.

use crate::domain::{ArchiveDigest, ArchiveStream, AssembledArchive, ChunkEvent};
use crate::error::{TransferError, TransferResult};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Append every chunk of `stream` to `path` in arrival order.
///
/// The file is opened in append mode so several deliveries for the same
/// archive accumulate. Completion requires an explicit end marker; an
/// upstream error aborts immediately and is never retried here.
pub async fn assemble(mut stream: ArchiveStream, path: &Path) -> TransferResult<AssembledArchive> {
    let write_err = |source| TransferError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(write_err)?;

    let mut hasher = Sha256::new();
    let mut bytes_written = 0u64;
    let mut chunks = 0u64;

    let declared = loop {
        match stream.next().await {
            Some(ChunkEvent::Data(chunk)) => {
                // Fully written before the next event is awaited.
                file.write_all(&chunk).await.map_err(write_err)?;
                hasher.update(&chunk);
                bytes_written += chunk.len() as u64;
                chunks += 1;
                tracing::debug!(
                    "writing archive chunk {} ({} bytes) to: {}",
                    chunks,
                    chunk.len(),
                    path.display()
                );
            }
            Some(ChunkEvent::End(declared)) => break declared,
            Some(ChunkEvent::Error(detail)) => {
                tracing::warn!("Archive stream failed after {} bytes: {}", bytes_written, detail);
                return Err(TransferError::Upstream(detail));
            }
            None => return Err(TransferError::Truncated(bytes_written)),
        }
    };

    file.flush().await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;

    let sha256 = hex::encode(hasher.finalize());
    if let Some(digest) = declared {
        verify(&digest, bytes_written, &sha256)?;
    }

    tracing::info!(
        "Assembled {} ({} bytes in {} chunks)",
        path.display(),
        bytes_written,
        chunks
    );

    Ok(AssembledArchive {
        path: path.to_path_buf(),
        bytes_written,
        chunks,
        sha256,
    })
}

/// Check the received archive against the end marker's declaration
fn verify(digest: &ArchiveDigest, actual_size: u64, actual_sha: &str) -> TransferResult<()> {
    if let Some(expected) = digest.size {
        if expected != actual_size {
            return Err(TransferError::SizeMismatch {
                expected,
                actual: actual_size,
            });
        }
    }
    if let Some(expected) = &digest.sha256 {
        if !expected.eq_ignore_ascii_case(actual_sha) {
            return Err(TransferError::ChecksumMismatch {
                expected: expected.clone(),
                actual: actual_sha.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use tempfile::TempDir;
    use tokio_test::assert_err;

    fn data(bytes: &'static [u8]) -> ChunkEvent {
        ChunkEvent::Data(Bytes::from_static(bytes))
    }

    #[tokio::test]
    async fn test_assemble_concatenates_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.tar.gz");
        let stream = ArchiveStream::from_events(vec![
            data(b"PK\x03\x04"),
            data(b"..."),
            data(b"END"),
            ChunkEvent::End(None),
        ]);

        let archive = assemble(stream, &path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04...END");
        assert_eq!(archive.bytes_written, 10);
        assert_eq!(archive.chunks, 3);
        assert_eq!(archive.sha256, hex::encode(Sha256::digest(b"PK\x03\x04...END")));
    }

    #[tokio::test]
    async fn test_assemble_appends_to_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.tar.gz");
        std::fs::write(&path, b"first").unwrap();

        let stream = ArchiveStream::from_events(vec![data(b"-second"), ChunkEvent::End(None)]);
        assemble(stream, &path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first-second");
    }

    #[tokio::test]
    async fn test_upstream_error_aborts_with_detail() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.tar.gz");
        let stream = ArchiveStream::from_events(vec![
            data(b"abc"),
            ChunkEvent::Error("generator crashed".to_string()),
            data(b"never written"),
            ChunkEvent::End(None),
        ]);

        let err = assert_err!(assemble(stream, &path).await);
        assert!(matches!(err, TransferError::Upstream(ref d) if d == "generator crashed"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_missing_end_marker_is_truncation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.tar.gz");
        let stream = ArchiveStream::from_events(vec![data(b"abcd")]);

        let err = assert_err!(assemble(stream, &path).await);
        assert!(matches!(err, TransferError::Truncated(4)));
    }

    #[tokio::test]
    async fn test_declared_size_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.tar.gz");
        let stream = ArchiveStream::from_events(vec![
            data(b"abc"),
            ChunkEvent::End(Some(ArchiveDigest {
                size: Some(10),
                sha256: None,
            })),
        ]);

        let err = assert_err!(assemble(stream, &path).await);
        assert!(matches!(
            err,
            TransferError::SizeMismatch {
                expected: 10,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_declared_checksum_verified() {
        let temp = TempDir::new().unwrap();
        let good = ArchiveStream::from_events(vec![
            data(b"abc"),
            ChunkEvent::End(Some(ArchiveDigest {
                size: Some(3),
                sha256: Some(hex::encode(Sha256::digest(b"abc")).to_uppercase()),
            })),
        ]);
        assemble(good, &temp.path().join("good")).await.unwrap();

        let bad = ArchiveStream::from_events(vec![
            data(b"abc"),
            ChunkEvent::End(Some(ArchiveDigest {
                size: None,
                sha256: Some("00".repeat(32)),
            })),
        ]);
        let err = assert_err!(assemble(bad, &temp.path().join("bad")).await);
        assert!(matches!(err, TransferError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_assemble_from_live_channel() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.tar.gz");
        let (tx, stream) = ArchiveStream::channel(2);

        let producer = tokio::spawn(async move {
            for i in 0..20u8 {
                tx.send(ChunkEvent::Data(Bytes::from(vec![i; 3]))).await;
            }
            tx.send(ChunkEvent::End(None)).await;
        });

        let archive = assemble(stream, &path).await.unwrap();
        producer.await.unwrap();

        let expected: Vec<u8> = (0..20u8).flat_map(|i| vec![i; 3]).collect();
        assert_eq!(std::fs::read(&path).unwrap(), expected);
        assert_eq!(archive.chunks, 20);
    }

    proptest! {
        #[test]
        fn prop_assembled_equals_concatenation(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16)
        ) {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("out.tar.gz");
            let mut events: Vec<ChunkEvent> = chunks
                .iter()
                .map(|c| ChunkEvent::Data(Bytes::from(c.clone())))
                .collect();
            events.push(ChunkEvent::End(None));

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let archive = runtime
                .block_on(assemble(ArchiveStream::from_events(events), &path))
                .unwrap();

            let expected: Vec<u8> = chunks.concat();
            prop_assert_eq!(std::fs::read(&path).unwrap(), expected.clone());
            prop_assert_eq!(archive.bytes_written, expected.len() as u64);
        }
    }
}
