//! Persistence of incoming transfers.
//!
//! Every received file lands in one directory as `received_<name>`.  The
//! name from the header is reduced to its final path component first, so a
//! sender cannot write outside the directory with `../` or an absolute path.
//! A second transfer with the same name overwrites the first.

use std::path::{Path, PathBuf};

use lanchat_core::protocol::RECEIVED_FILE_PREFIX;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Error type for received-file writes.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The header name has no usable final component.
    #[error("file name {0:?} has no usable base name")]
    InvalidName(String),

    /// Creating, writing, or flushing the file failed.
    #[error("I/O error writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the incoming stream failed before EOF.
    #[error("connection lost while receiving: {source}")]
    Receive {
        #[source]
        source: std::io::Error,
    },
}

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Writes received files into one directory.
#[derive(Debug, Clone)]
pub struct ReceivedFileStore {
    dir: PathBuf,
}

impl ReceivedFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where a file announced as `name` would be written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidName`] when nothing usable remains
    /// after stripping directories.
    pub fn target_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        let base = safe_base_name(name).ok_or_else(|| StorageError::InvalidName(name.to_string()))?;
        Ok(self.dir.join(format!("{RECEIVED_FILE_PREFIX}{base}")))
    }

    /// Writes `bytes` as the file announced as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the name is unusable or the write fails.
    pub async fn save_bytes(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.target_path(name)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        debug!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Streams `reader` to EOF into the file announced as `name`.
    ///
    /// A partially written file is removed when the copy fails.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Receive`] when reading `reader` fails and
    /// [`StorageError::Write`] when the file cannot be created or written.
    pub async fn save_stream<R>(&self, name: &str, reader: &mut R) -> Result<(PathBuf, u64), StorageError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.target_path(name)?;
        let mut file = match File::create(&path).await {
            Ok(file) => file,
            Err(source) => return Err(StorageError::Write { path, source }),
        };

        match copy_into(reader, &mut file, &path).await {
            Ok(n) => {
                debug!("wrote {n} bytes to {}", path.display());
                Ok((path, n))
            }
            Err(e) => {
                drop(file);
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    warn!("could not remove partial file {}: {remove}", path.display());
                }
                Err(e)
            }
        }
    }
}

/// Copies `reader` to EOF into `file`, keeping read and write failures apart.
async fn copy_into<R>(reader: &mut R, file: &mut File, path: &Path) -> Result<u64, StorageError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|source| StorageError::Receive { source })?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await.map_err(write_err)?;
        total += n as u64;
    }
    file.flush().await.map_err(write_err)?;
    Ok(total)
}

/// Final path component of `name`, accepting both `/` and `\` separators.
fn safe_base_name(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    match base {
        "" | "." | ".." => None,
        _ => Some(base),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> (ReceivedFileStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("lanchat_recv_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        (ReceivedFileStore::new(&dir), dir)
    }

    #[test]
    fn test_safe_base_name_strips_directories() {
        assert_eq!(safe_base_name("report.txt"), Some("report.txt"));
        assert_eq!(safe_base_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(safe_base_name("/abs/path/x.bin"), Some("x.bin"));
        assert_eq!(safe_base_name("C:\\Users\\me\\doc.pdf"), Some("doc.pdf"));
    }

    #[test]
    fn test_safe_base_name_rejects_empty_and_dot_names() {
        assert_eq!(safe_base_name(""), None);
        assert_eq!(safe_base_name(".."), None);
        assert_eq!(safe_base_name("dir/"), None);
        assert_eq!(safe_base_name("a/."), None);
    }

    #[test]
    fn test_target_path_has_received_prefix_inside_dir() {
        let store = ReceivedFileStore::new("/inbox");
        assert_eq!(
            store.target_path("../secret.txt").unwrap(),
            PathBuf::from("/inbox/received_secret.txt")
        );
    }

    #[tokio::test]
    async fn test_save_bytes_writes_file() {
        // Arrange
        let (store, dir) = temp_store();

        // Act
        let path = store.save_bytes("notes.txt", b"hello").await.unwrap();

        // Assert
        assert_eq!(path, dir.join("received_notes.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_save_stream_overwrites_previous_transfer() {
        let (store, dir) = temp_store();

        store.save_bytes("a.bin", b"first version").await.unwrap();
        let mut reader: &[u8] = b"second";
        let (path, n) = store.save_stream("a.bin", &mut reader).await.unwrap();

        assert_eq!(n, 6);
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_reports_write_error() {
        let store = ReceivedFileStore::new(
            std::env::temp_dir().join(format!("lanchat_absent_{}", Uuid::new_v4())),
        );

        let result = store.save_bytes("x.txt", b"data").await;

        assert!(matches!(result, Err(StorageError::Write { .. })));
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected_before_touching_disk() {
        let (store, dir) = temp_store();

        let result = store.save_bytes("../", b"data").await;

        assert!(matches!(result, Err(StorageError::InvalidName(_))));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_broken_stream_is_a_receive_error_and_leaves_no_file() {
        // Arrange
        let (store, dir) = temp_store();
        let mut reader = stream_that_breaks(b"partial payload");

        // Act
        let result = store.save_stream("cut.bin", &mut reader).await;

        // Assert
        match result {
            Err(StorageError::Receive { source }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::ConnectionReset);
            }
            other => panic!("expected Receive, got {other:?}"),
        }
        assert!(!dir.join("received_cut.bin").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_stream_into_missing_directory_is_a_write_error() {
        let store = ReceivedFileStore::new(
            std::env::temp_dir().join(format!("lanchat_absent_{}", Uuid::new_v4())),
        );
        let mut reader: &[u8] = b"data";

        let result = store.save_stream("x.txt", &mut reader).await;

        assert!(matches!(result, Err(StorageError::Write { .. })));
    }

    /// Yields `prefix`, then fails the next read with `ConnectionReset`.
    fn stream_that_breaks(prefix: &'static [u8]) -> impl AsyncRead + Unpin {
        prefix.chain(BrokenReader)
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer reset",
            )))
        }
    }
}
