//! Device transport: one query/response exchange per call.
//!
//! Every call opens the device handle, waits for the firmware to wake up,
//! discards stale buffered bytes, writes the query and reads a single line
//! back. The handle is closed again before returning, so no connection is
//! held between polls and a device reset cannot leave a stale handle
//! behind.
//!
//! [`SerialTransport`] drives the blocking `serialport` API on tokio's
//! blocking pool so a slow device only ties up its own worker.

use std::future::Future;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serialport::ClearBuffer;
use thermwatch_core::{Device, SerialSettings};

/// Read chunk size. Responses are a single short line.
const READ_CHUNK: usize = 64;

/// Failure of a single exchange with a device.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device name does not resolve to an existing handle. This is a
    /// configuration problem and is never retried.
    #[error("Device handle not found: {}", path.display())]
    DeviceNotFound { path: PathBuf },

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: serialport::Error,
    },

    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Response is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking read task failed: {0}")]
    Worker(String),
}

impl TransportError {
    /// `true` for errors that retrying cannot fix.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::DeviceNotFound { .. })
    }
}

/// A channel to the monitored devices.
///
/// Implementations must be stateless across calls to [`query`](Self::query).
pub trait DeviceTransport: Send + Sync + 'static {
    /// Resolve `device` to its handle, failing with
    /// [`TransportError::DeviceNotFound`] if it does not exist.
    fn resolve(&self, device: &Device) -> Result<PathBuf, TransportError>;

    /// Perform one query/response exchange and return the trimmed line.
    fn query(
        &self,
        device: &Device,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Serial-port transport for devices under a common directory.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    device_dir: PathBuf,
    settings: SerialSettings,
}

impl SerialTransport {
    pub fn new(device_dir: impl Into<PathBuf>, settings: SerialSettings) -> Self {
        Self {
            device_dir: device_dir.into(),
            settings,
        }
    }
}

impl DeviceTransport for SerialTransport {
    fn resolve(&self, device: &Device) -> Result<PathBuf, TransportError> {
        let path = device.path_in(&self.device_dir);
        if path.exists() {
            Ok(path)
        } else {
            Err(TransportError::DeviceNotFound { path })
        }
    }

    async fn query(&self, device: &Device) -> Result<String, TransportError> {
        let path = self.resolve(device)?;
        let settings = self.settings.clone();

        tokio::task::spawn_blocking(move || exchange(&path, &settings))
            .await
            .map_err(|e| TransportError::Worker(e.to_string()))?
    }
}

/// Blocking open / wake / flush / write / read-line / close sequence.
fn exchange(path: &Path, settings: &SerialSettings) -> Result<String, TransportError> {
    let timeout = settings.timeout();

    let mut port = serialport::new(path.to_string_lossy(), settings.baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|source| match source.kind() {
            serialport::ErrorKind::NoDevice => TransportError::DeviceNotFound {
                path: path.to_path_buf(),
            },
            _ => TransportError::Open {
                path: path.to_path_buf(),
                source,
            },
        })?;

    std::thread::sleep(settings.wakeup_delay());
    port.clear(ClearBuffer::All)?;

    port.write_all(settings.query.as_bytes())?;
    port.flush()?;

    let line = read_line(&mut port, timeout)?;
    decode_line(line)
}

/// Read until a `\n` is seen or `timeout` elapses.
///
/// A partial line received before the deadline is returned as-is; a
/// deadline with nothing received is [`TransportError::Timeout`].
pub(crate) fn read_line<R: Read>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    while Instant::now() < deadline {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let received = &chunk[..n];
                if let Some(pos) = received.iter().position(|&b| b == b'\n') {
                    line.extend_from_slice(&received[..=pos]);
                    return Ok(line);
                }
                line.extend_from_slice(received);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) => {}
            Err(e) => return Err(TransportError::Io(e)),
        }
    }

    if line.is_empty() {
        Err(TransportError::Timeout(timeout))
    } else {
        Ok(line)
    }
}

/// Strictly decode a response line and trim surrounding whitespace.
pub(crate) fn decode_line(line: Vec<u8>) -> Result<String, TransportError> {
    let text = String::from_utf8(line)?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use assert_matches::assert_matches;

    use super::*;

    /// Reader that replays a script of chunks and errors.
    struct ScriptedReader {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            }
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[test]
    fn reads_single_line() {
        let mut reader = ScriptedReader::new(vec![Ok(b"Temp: 73.5C\r\n".to_vec())]);
        let line = read_line(&mut reader, TIMEOUT).expect("line");
        assert_eq!(decode_line(line).expect("decode"), "Temp: 73.5C");
    }

    #[test]
    fn assembles_line_from_chunks() {
        let mut reader = ScriptedReader::new(vec![
            Ok(b"Te".to_vec()),
            Err(io::Error::new(io::ErrorKind::TimedOut, "slow")),
            Ok(b"mp: 7".to_vec()),
            Ok(b"3.5\nTRAILING".to_vec()),
        ]);
        let line = read_line(&mut reader, TIMEOUT).expect("line");
        assert_eq!(line, b"Temp: 73.5\n".to_vec());
    }

    #[test]
    fn partial_line_is_returned_at_deadline() {
        let mut reader = ScriptedReader::new(vec![Ok(b"73.".to_vec())]);
        let line = read_line(&mut reader, TIMEOUT).expect("partial line");
        assert_eq!(decode_line(line).expect("decode"), "73.");
    }

    #[test]
    fn silence_is_timeout() {
        let mut reader = ScriptedReader::new(vec![]);
        assert_matches!(
            read_line(&mut reader, TIMEOUT),
            Err(TransportError::Timeout(t)) if t == TIMEOUT
        );
    }

    #[test]
    fn end_of_stream_without_data_is_timeout() {
        let mut reader = ScriptedReader::new(vec![Ok(Vec::new())]);
        assert_matches!(read_line(&mut reader, TIMEOUT), Err(TransportError::Timeout(_)));
    }

    #[test]
    fn hard_io_error_is_surfaced() {
        let mut reader = ScriptedReader::new(vec![Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "unplugged",
        ))]);
        assert_matches!(read_line(&mut reader, TIMEOUT), Err(TransportError::Io(_)));
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        assert_matches!(
            decode_line(vec![0xff, 0xfe, b'\n']),
            Err(TransportError::Decode(_))
        );
    }

    #[test]
    fn missing_device_is_configuration_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let transport = SerialTransport::new(dir.path(), SerialSettings::default());

        let err = transport
            .resolve(&Device::new("txpaa9"))
            .expect_err("device should be missing");
        assert!(err.is_configuration());
        assert_matches!(err, TransportError::DeviceNotFound { path } if path == dir.path().join("txpaa9"));
    }

    #[tokio::test]
    async fn query_of_missing_device_fails_without_opening() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let transport = SerialTransport::new(dir.path(), SerialSettings::default());
        let result = transport.query(&Device::new("absent")).await;
        assert_matches!(result, Err(TransportError::DeviceNotFound { .. }));
    }

    #[test]
    fn existing_handle_resolves() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("amp0"), b"").expect("create handle");
        let transport = SerialTransport::new(dir.path(), SerialSettings::default());
        assert_eq!(
            transport.resolve(&Device::new("amp0")).expect("resolves"),
            dir.path().join("amp0")
        );
    }

    #[test]
    fn only_missing_device_is_configuration() {
        assert!(!TransportError::Timeout(TIMEOUT).is_configuration());
        assert!(!TransportError::Worker("panicked".into()).is_configuration());
    }
}
