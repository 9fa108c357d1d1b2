//! Archive extractor: unpacks a gzipped tarball with leading path segments stripped.

use crate::error::{ExtractionError, ExtractionResult};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What an extraction produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    /// Entries with too few path segments, or of unsupported types
    pub skipped: u64,
}

/// Unpack `archive` into `destination`, dropping the first
/// `strip_components` path segments of every entry.
///
/// The archive is streamed through the decoder on the blocking pool. If this
/// future is dropped, the blocking side stops before its next entry; the
/// partial tree is left for workspace cleanup.
pub async fn extract(
    archive: &Path,
    destination: &Path,
    strip_components: usize,
) -> ExtractionResult<ExtractionSummary> {
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();
    let cancel = CancelOnDrop::default();
    let cancelled = Arc::clone(&cancel.0);

    tokio::task::spawn_blocking(move || {
        extract_blocking(&archive, &destination, strip_components, &cancelled)
    })
    .await
    .map_err(|e| ExtractionError::Task(e.to_string()))?
}

/// Raises its flag when dropped
#[derive(Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn extract_blocking(
    archive: &Path,
    destination: &Path,
    strip_components: usize,
    cancelled: &AtomicBool,
) -> ExtractionResult<ExtractionSummary> {
    let file = File::open(archive).map_err(|source| {
        tracing::warn!("Unable to read archive {}: {}", archive.display(), source);
        ExtractionError::Read {
            path: archive.to_path_buf(),
            source,
        }
    })?;

    fs::create_dir_all(destination).map_err(|source| ExtractionError::Destination {
        path: destination.to_path_buf(),
        source,
    })?;

    let mut tarball = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = tarball.entries().map_err(corrupt)?;
    let mut summary = ExtractionSummary::default();

    for entry in entries {
        if cancelled.load(Ordering::SeqCst) {
            tracing::debug!("Extraction into {} cancelled", destination.display());
            return Err(ExtractionError::Cancelled);
        }
        let mut entry = entry.map_err(corrupt)?;
        let raw_path = entry.path().map_err(corrupt)?.into_owned();

        let relative = match strip_path(&raw_path, strip_components)? {
            Some(relative) => relative,
            None => {
                summary.skipped += 1;
                continue;
            }
        };
        let target = destination.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&target).map_err(corrupt)?;
            summary.directories += 1;
            continue;
        }

        if entry_type.is_symlink() {
            let link = entry.link_name().map_err(corrupt)?;
            if let Some(link) = link {
                if !is_contained_link(&link) {
                    return Err(ExtractionError::UnsafePath(raw_path));
                }
            }
        } else if !entry_type.is_file() {
            tracing::debug!("Skipping {:?} entry {}", entry_type, raw_path.display());
            summary.skipped += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(corrupt)?;
        }
        entry.unpack(&target).map_err(corrupt)?;

        if entry_type.is_symlink() {
            summary.symlinks += 1;
        } else {
            summary.files += 1;
        }
    }

    tracing::info!(
        "Extracted {} files, {} directories into {} ({} skipped)",
        summary.files,
        summary.directories,
        destination.display(),
        summary.skipped
    );
    Ok(summary)
}

/// Drop the first `strip` normal segments of an entry path.
///
/// Returns `None` when nothing is left (the entry is skipped, as GNU tar's
/// `--strip-components` does). A leading `/` or `./` is ignored; `..` and
/// drive prefixes are rejected.
pub fn strip_path(path: &Path, strip: usize) -> ExtractionResult<Option<PathBuf>> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => segments.push(segment),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(ExtractionError::UnsafePath(path.to_path_buf()))
            }
        }
    }

    if segments.len() <= strip {
        return Ok(None);
    }
    Ok(Some(segments[strip..].iter().collect()))
}

/// Symlink targets must stay relative and never climb out of their directory
fn is_contained_link(link: &Path) -> bool {
    link.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn corrupt(err: std::io::Error) -> ExtractionError {
    tracing::warn!("Archive extraction failed: {}", err);
    ExtractionError::Corrupt(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;
    use tokio_test::assert_err;

    fn file_header(len: usize) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_size(len as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header
    }

    fn write_archive(path: &Path, files: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        builder.append_data(&mut dir, "demo/", std::io::empty()).unwrap();

        for (name, data) in files {
            let mut header = file_header(data.len());
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(
            strip_path(Path::new("demo/src/main.rs"), 1).unwrap(),
            Some(PathBuf::from("src/main.rs"))
        );
        assert_eq!(
            strip_path(Path::new("./demo/README.md"), 1).unwrap(),
            Some(PathBuf::from("README.md"))
        );
        assert_eq!(strip_path(Path::new("demo"), 1).unwrap(), None);
        assert_eq!(strip_path(Path::new("demo/"), 1).unwrap(), None);
        assert_eq!(
            strip_path(Path::new("a/b/c"), 0).unwrap(),
            Some(PathBuf::from("a/b/c"))
        );
        assert!(matches!(
            strip_path(Path::new("demo/../../etc/passwd"), 1),
            Err(ExtractionError::UnsafePath(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_strips_top_level_directory() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("demo.tar.gz");
        write_archive(
            &archive,
            &[
                ("demo/src/main.rs", b"fn main() {}\n"),
                ("demo/README.md", b"# demo\n"),
                ("loose.txt", b"one segment"),
            ],
        );

        let dest = temp.path().join("out");
        let summary = extract(&archive, &dest, 1).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.join("src/main.rs")).unwrap(),
            "fn main() {}\n"
        );
        assert!(dest.join("README.md").is_file());
        assert!(!dest.join("demo").exists());
        assert!(!dest.join("loose.txt").exists());
        assert_eq!(summary.files, 2);
        // "demo/" and "loose.txt" have too few segments.
        assert_eq!(summary.skipped, 2);
    }

    #[tokio::test]
    async fn test_extract_rejects_parent_traversal() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.tar.gz");
        let encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let data = b"owned";
        let mut header = file_header(data.len());
        let name = b"demo/../../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = temp.path().join("out");
        let err = assert_err!(extract(&archive, &dest, 1).await);
        assert!(matches!(err, ExtractionError::UnsafePath(_)));
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_extract_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.tar.gz");
        std::fs::write(&archive, b"PK\x03\x04 definitely not gzip").unwrap();

        let err = assert_err!(extract(&archive, &temp.path().join("out"), 1).await);
        assert!(matches!(err, ExtractionError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_extract_missing_archive() {
        let temp = TempDir::new().unwrap();
        let err = assert_err!(
            extract(&temp.path().join("absent.tar.gz"), &temp.path().join("out"), 1).await
        );
        assert!(matches!(err, ExtractionError::Read { .. }));
    }

    #[test]
    fn test_cancelled_extraction_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("demo.tar.gz");
        write_archive(&archive, &[("demo/README.md", b"# demo\n")]);

        let dest = temp.path().join("out");
        let cancelled = AtomicBool::new(true);
        let result = extract_blocking(&archive, &dest, 1, &cancelled);

        assert!(matches!(result, Err(ExtractionError::Cancelled)));
        assert!(!dest.join("README.md").exists());
    }

    #[test]
    fn test_cancel_flag_raised_on_drop() {
        let cancel = CancelOnDrop::default();
        let flag = Arc::clone(&cancel.0);
        assert!(!flag.load(Ordering::SeqCst));
        drop(cancel);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_not_corruption() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("demo.tar.gz");
        write_archive(&archive, &[("demo/README.md", b"# demo\n")]);
        let blocker = temp.path().join("occupied");
        std::fs::write(&blocker, "a file, not a directory").unwrap();

        let err = assert_err!(extract(&archive, &blocker.join("out"), 1).await);
        assert!(matches!(err, ExtractionError::Destination { .. }));
    }
}
