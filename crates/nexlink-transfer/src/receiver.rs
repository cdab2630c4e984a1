//! Stream-to-disk receiver with preflight admission control.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::error::{Result, TransferError};

/// Fixed headroom kept free beyond the declared transfer size (100 MiB).
pub const SAFETY_MARGIN_BYTES: u64 = 100 * 1024 * 1024;

/// Bounded read buffer for the incoming stream.
const READ_BUF_BYTES: usize = 8 * 1024;

/// Write-side buffer, larger than the read buffer to batch disk writes.
const WRITE_BUF_BYTES: usize = 64 * 1024;

/// Validate a filename before it touches the filesystem.
///
/// # Errors
///
/// Returns `TransferError::InvalidFilename` when the name is empty after
/// trimming, contains a path separator or a parent-directory segment, or
/// embeds a NUL byte.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(TransferError::InvalidFilename("cannot be empty".into()));
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(TransferError::InvalidFilename(
            "contains path separators".into(),
        ));
    }
    if filename.contains('\0') {
        return Err(TransferError::InvalidFilename("contains null bytes".into()));
    }
    Ok(())
}

/// Whether `usable` bytes admit a transfer of `required` bytes.
///
/// Admits exactly at `usable == required + margin` and rejects strictly
/// below.
#[must_use]
pub fn has_capacity(usable: u64, required: u64) -> bool {
    usable >= required.saturating_add(SAFETY_MARGIN_BYTES)
}

/// Admission-controlled, crash-safe file receiver for one destination
/// directory.
#[derive(Debug, Clone)]
pub struct FileReceiver {
    dest_dir: PathBuf,
}

impl FileReceiver {
    /// Create a receiver writing into `dest_dir`.
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
        }
    }

    /// The directory completed files land in.
    #[must_use]
    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Run the preflight checks without writing anything.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` or `InsufficientSpace`. An unreadable space
    /// probe is logged and admits the transfer; the write path still catches
    /// a full disk.
    pub fn preflight(&self, filename: &str, required_bytes: u64) -> Result<()> {
        validate_filename(filename)?;

        // The space probe needs the directory to exist.
        if let Err(e) = std::fs::create_dir_all(&self.dest_dir) {
            tracing::warn!(dir = %self.dest_dir.display(), error = %e, "Unable to create destination directory");
        }

        match fs2::available_space(&self.dest_dir) {
            Ok(usable) => {
                if !has_capacity(usable, required_bytes) {
                    return Err(TransferError::InsufficientSpace {
                        required: required_bytes,
                    });
                }
            }
            Err(e) => {
                tracing::warn!(dir = %self.dest_dir.display(), error = %e, "Unable to probe disk space");
            }
        }
        Ok(())
    }

    /// Receive a file: preflight, stream to a temporary file, then atomically
    /// rename to the final name. Returns the number of bytes written.
    ///
    /// There is no mid-flight cancellation: a connection closed by the sender
    /// surfaces as a read error and takes the failure path, which deletes the
    /// partial temporary file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` or `InsufficientSpace` from preflight,
    /// `InsufficientSpace` when the device fills mid-write, and `Failed` for
    /// any other I/O error.
    pub async fn receive<R>(
        &self,
        filename: &str,
        declared_bytes: u64,
        mut reader: R,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        fs::create_dir_all(&self.dest_dir).await?;
        self.preflight(filename, declared_bytes)?;

        let final_path = self.dest_dir.join(filename);
        let tmp_path = self
            .dest_dir
            .join(format!(".{filename}.{}.part", uuid::Uuid::new_v4()));

        match self.write_stream(&tmp_path, &mut reader).await {
            Ok(bytes_written) => {
                fs::rename(&tmp_path, &final_path).await.map_err(|e| {
                    // The rename itself failed; nothing may remain behind.
                    cleanup_blocking(&tmp_path);
                    classify_io(e, declared_bytes)
                })?;

                tracing::info!(
                    filename = %filename,
                    bytes = bytes_written,
                    "File received"
                );
                Ok(bytes_written)
            }
            Err(e) => {
                cleanup_blocking(&tmp_path);
                Err(classify_io(e, declared_bytes))
            }
        }
    }

    async fn write_stream<R>(&self, tmp_path: &Path, reader: &mut R) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let file = fs::File::create(tmp_path).await?;
        let mut writer = BufWriter::with_capacity(WRITE_BUF_BYTES, file);

        let mut buf = [0u8; READ_BUF_BYTES];
        let mut bytes_written: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            bytes_written += n as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(bytes_written)
    }
}

/// Map a write-path I/O error to the transfer taxonomy: exhaustion is its own
/// kind, everything else is a generic failure.
fn classify_io(e: std::io::Error, required: u64) -> TransferError {
    let exhausted = e.raw_os_error() == Some(28)
        || e.to_string().to_lowercase().contains("no space left");
    if exhausted {
        TransferError::InsufficientSpace { required }
    } else {
        TransferError::Failed(e)
    }
}

/// Best-effort removal of a partial temporary file.
fn cleanup_blocking(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to clean up partial file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;
    use tokio::io::ReadBuf;

    /// A reader that yields some bytes, then fails mid-stream.
    struct FailingReader {
        remaining: Vec<u8>,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.remaining.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "peer closed connection",
                )));
            }
            let n = self.remaining.len().min(buf.remaining());
            let chunk: Vec<u8> = self.remaining.drain(..n).collect();
            buf.put_slice(&chunk);
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn filename_validation() {
        assert!(validate_filename("report.pdf").is_ok());
        assert!(validate_filename("with spaces.txt").is_ok());

        assert!(validate_filename("").is_err());
        assert!(validate_filename("   ").is_err());
        assert!(validate_filename("a/b.txt").is_err());
        assert!(validate_filename("a\\b.txt").is_err());
        assert!(validate_filename("../escape.txt").is_err());
        assert!(validate_filename("nul\0byte").is_err());
    }

    #[test]
    fn capacity_boundary() {
        let required = 50 * 1024 * 1024;
        // Exactly at required + margin is admitted.
        assert!(has_capacity(required + SAFETY_MARGIN_BYTES, required));
        // One byte below is rejected.
        assert!(!has_capacity(required + SAFETY_MARGIN_BYTES - 1, required));
        // Zero-byte files still need the margin.
        assert!(!has_capacity(SAFETY_MARGIN_BYTES - 1, 0));
    }

    #[test]
    fn capacity_does_not_overflow() {
        assert!(!has_capacity(u64::MAX - 1, u64::MAX));
    }

    #[tokio::test]
    async fn receive_writes_final_file() {
        let dir = TempDir::new().unwrap();
        let receiver = FileReceiver::new(dir.path());
        let body = b"hello nexlink".to_vec();

        let written = receiver
            .receive("greeting.txt", body.len() as u64, body.as_slice())
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        let on_disk = std::fs::read(dir.path().join("greeting.txt")).unwrap();
        assert_eq!(on_disk, body);

        // No temporary leftovers.
        let stray: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(stray.is_empty());
    }

    #[tokio::test]
    async fn interrupted_transfer_leaves_nothing_at_final_name() {
        let dir = TempDir::new().unwrap();
        let receiver = FileReceiver::new(dir.path());
        let reader = FailingReader {
            remaining: vec![0xAB; 4096],
        };

        let result = receiver.receive("partial.bin", 1 << 20, reader).await;
        assert!(matches!(result, Err(TransferError::Failed(_))));

        assert!(!dir.path().join("partial.bin").exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty(), "partial temp file was not cleaned up");
    }

    #[tokio::test]
    async fn invalid_filename_rejected_before_write() {
        let dir = TempDir::new().unwrap();
        let receiver = FileReceiver::new(dir.path());

        let result = receiver
            .receive("../../etc/passwd", 10, &b"x"[..])
            .await;
        assert!(matches!(result, Err(TransferError::InvalidFilename(_))));

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn absurd_size_rejected_by_preflight() {
        let dir = TempDir::new().unwrap();
        let receiver = FileReceiver::new(dir.path());

        let result = receiver.receive("huge.bin", u64::MAX / 2, &b"x"[..]).await;
        assert!(matches!(
            result,
            Err(TransferError::InsufficientSpace { .. })
        ));
    }

    #[test]
    fn enospc_classified_as_exhaustion() {
        let e = io::Error::from_raw_os_error(28);
        assert!(matches!(
            classify_io(e, 10),
            TransferError::InsufficientSpace { required: 10 }
        ));

        let generic = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        assert!(matches!(classify_io(generic, 10), TransferError::Failed(_)));
    }
}
