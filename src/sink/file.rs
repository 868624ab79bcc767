//! File-backed durable sink.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::{SinkError, SinkLabel};

/// Permission bits for a sink file created by path, before the umask.
#[cfg(unix)]
const SINK_FILE_MODE: u32 = 0o666;

/// Where a sink's bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// A file opened by this crate. Created if missing, never truncated.
    Path(PathBuf),
    /// A descriptor owned by the caller. The sink writes through a duplicate,
    /// so the caller's descriptor stays open after the sink is closed.
    ///
    /// The descriptor must be open and refer to the intended file while
    /// [`FileSink::open`] runs. A closed descriptor is rejected, but a number
    /// that was closed and then reused for another file cannot be told apart
    /// and the sink will write to that file.
    Descriptor(i32),
}

impl SinkTarget {
    fn label(&self) -> SinkLabel {
        match self {
            Self::Path(path) => SinkLabel::Path(path.clone()),
            Self::Descriptor(fd) => SinkLabel::Descriptor(*fd),
        }
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.label().fmt(f)
    }
}

trait SinkWriter: Write + Seek + Send {}

impl<W: Write + Seek + Send> SinkWriter for W {}

/// Byte sink that mirrors a stream.
///
/// Every [`write_frames`](Self::write_frames) issues exactly one write call.
/// A short write is an error and is never retried, so the sink either holds
/// the exact bytes of every transfer or reports that it does not.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use pcm_tee::FileSink;
///
/// let mut sink = FileSink::from_writer("memory", Cursor::new(Vec::new()));
/// sink.write_frames(&[1, 2, 3, 4]).unwrap();
/// sink.seek_back(2).unwrap();
/// assert_eq!(sink.position().unwrap(), 2);
/// ```
pub struct FileSink {
    label: SinkLabel,
    writer: Box<dyn SinkWriter>,
}

impl FileSink {
    /// Opens the sink described by `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Open`] if the file cannot be opened or the
    /// descriptor is negative, closed or cannot be duplicated.
    pub fn open(target: &SinkTarget) -> Result<Self, SinkError> {
        let label = target.label();
        let open_error = |source| SinkError::Open {
            target: label.clone(),
            source,
        };
        let file = match target {
            SinkTarget::Path(path) => open_path(path).map_err(open_error)?,
            SinkTarget::Descriptor(fd) => duplicate_descriptor(*fd).map_err(open_error)?,
        };
        tracing::debug!(sink = %label, "sink opened");
        Ok(Self {
            label,
            writer: Box::new(file),
        })
    }

    /// Wraps an arbitrary writer.
    pub fn from_writer<W>(name: impl Into<String>, writer: W) -> Self
    where
        W: Write + Seek + Send + 'static,
    {
        Self {
            label: SinkLabel::Writer(name.into()),
            writer: Box::new(writer),
        }
    }

    /// What the sink writes to.
    pub fn label(&self) -> &SinkLabel {
        &self.label
    }

    /// Writes `bytes` with a single write call.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if the write fails and
    /// [`SinkError::ShortWrite`] if it accepts fewer bytes than given.
    pub fn write_frames(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let written = self.writer.write(bytes).map_err(|source| SinkError::Write {
            target: self.label.clone(),
            source,
        })?;
        if written != bytes.len() {
            tracing::error!(
                sink = %self.label,
                expected = bytes.len(),
                written,
                "short write, sink no longer mirrors the stream"
            );
            return Err(SinkError::ShortWrite {
                target: self.label.clone(),
                expected: bytes.len(),
                written,
            });
        }
        Ok(())
    }

    /// Moves the write position back by `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Seek`] if the position cannot be moved.
    pub fn seek_back(&mut self, bytes: u64) -> Result<u64, SinkError> {
        let seek_error = |source| SinkError::Seek {
            target: self.label.clone(),
            source,
        };
        let offset = i64::try_from(bytes).map_err(|_| {
            seek_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "rewind distance too large",
            ))
        })?;
        self.writer
            .seek(SeekFrom::Current(-offset))
            .map_err(|source| {
                tracing::error!(sink = %self.label, bytes, "rewind seek failed");
                seek_error(source)
            })
    }

    /// Current write position.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Seek`] if the position cannot be queried.
    pub fn position(&mut self) -> Result<u64, SinkError> {
        self.writer
            .stream_position()
            .map_err(|source| SinkError::Seek {
                target: self.label.clone(),
                source,
            })
    }

    /// Flushes and closes the sink.
    ///
    /// A descriptor sink only closes its duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Close`] if buffered bytes cannot be flushed.
    pub fn close(mut self) -> Result<(), SinkError> {
        tracing::debug!(sink = %self.label, "closing sink");
        self.writer.flush().map_err(|source| SinkError::Close {
            target: self.label.clone(),
            source,
        })
    }
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

fn open_path(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(SINK_FILE_MODE);
    }
    options.open(path)
}

#[cfg(unix)]
fn duplicate_descriptor(fd: i32) -> std::io::Result<std::fs::File> {
    use std::os::fd::BorrowedFd;

    if fd < 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("negative descriptor {fd}"),
        ));
    }
    // Only the duplicate is owned here. The borrow lives for this call alone
    // and `F_DUPFD_CLOEXEC` fails with EBADF if `fd` is not open.
    #[allow(unsafe_code)]
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    Ok(std::fs::File::from(borrowed.try_clone_to_owned()?))
}

#[cfg(not(unix))]
fn duplicate_descriptor(_fd: i32) -> std::io::Result<std::fs::File> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "descriptor sinks need a unix platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use tempfile::tempdir;

    /// Writer that accepts at most `limit` bytes per call.
    struct Stingy {
        inner: Cursor<Vec<u8>>,
        limit: usize,
    }

    impl Write for Stingy {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for Stingy {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_path_sink_writes_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.raw");

        let mut sink = FileSink::open(&SinkTarget::Path(path.clone())).unwrap();
        sink.write_frames(&[1, 2, 3, 4]).unwrap();
        sink.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_path_sink_does_not_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("existing.raw");
        std::fs::write(&path, [9u8; 8]).unwrap();

        let mut sink = FileSink::open(&SinkTarget::Path(path.clone())).unwrap();
        sink.write_frames(&[1, 2]).unwrap();
        sink.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 9, 9, 9, 9, 9, 9]);
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let target = SinkTarget::Path(PathBuf::from("/nonexistent/directory/tee.raw"));
        let err = FileSink::open(&target).unwrap_err();
        assert!(matches!(err, SinkError::Open { .. }));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_short_write_is_reported() {
        let mut sink = FileSink::from_writer(
            "stingy",
            Stingy {
                inner: Cursor::new(Vec::new()),
                limit: 3,
            },
        );
        let err = sink.write_frames(&[0; 8]).unwrap_err();
        assert!(matches!(
            err,
            SinkError::ShortWrite {
                expected: 8,
                written: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_seek_back_moves_position() {
        let mut sink = FileSink::from_writer("mem", Cursor::new(Vec::new()));
        sink.write_frames(&[0; 16]).unwrap();
        assert_eq!(sink.seek_back(4).unwrap(), 12);
        assert_eq!(sink.position().unwrap(), 12);
    }

    #[test]
    fn test_seek_before_start_fails() {
        let mut sink = FileSink::from_writer("mem", Cursor::new(Vec::new()));
        sink.write_frames(&[0; 4]).unwrap();
        let err = sink.seek_back(8).unwrap_err();
        assert!(matches!(err, SinkError::Seek { .. }));
    }

    #[test]
    fn test_empty_write_is_noop() {
        let mut sink = FileSink::from_writer("mem", Cursor::new(Vec::new()));
        sink.write_frames(&[]).unwrap();
        assert_eq!(sink.position().unwrap(), 0);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(SinkTarget::Descriptor(5).to_string(), "fd=5");
        assert_eq!(
            SinkTarget::Path(PathBuf::from("/tmp/x.raw")).to_string(),
            "file=/tmp/x.raw"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_negative_descriptor_fails() {
        let err = FileSink::open(&SinkTarget::Descriptor(-1)).unwrap_err();
        match err {
            SinkError::Open {
                target: SinkLabel::Descriptor(-1),
                source,
            } => assert_eq!(source.kind(), io::ErrorKind::InvalidInput),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_closed_descriptor_fails() {
        // Far above any descriptor the test process holds.
        let fd = i32::MAX;
        let err = FileSink::open(&SinkTarget::Descriptor(fd)).unwrap_err();
        match err {
            SinkError::Open { target, source } => {
                assert_eq!(target, SinkLabel::Descriptor(fd));
                assert_eq!(source.raw_os_error(), Some(9));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
