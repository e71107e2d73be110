//! TCP transport for a networked device.
//!
//! Frames are terminated by a single delimiter byte in both directions
//! (NUL by default). A background task reads the socket and forwards whole
//! frames over a channel, which keeps [`Transport::next_event`] cancel-safe.
//!
//! ```rust,no_run
//! use rs_lineus::config::DeviceConfig;
//! use rs_lineus::hal::TcpConnector;
//!
//! let connector = TcpConnector::from_config(&DeviceConfig::default().with_host("10.0.0.7"));
//! assert_eq!(connector.addr(), "10.0.0.7:1337");
//! ```

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DeviceConfig;
use crate::error::TransportError;
use crate::traits::{Connector, Transport, TransportEvent};

/// Longest accepted incoming frame, delimiter excluded.
pub const MAX_FRAME_LEN: usize = 4096;

/// Opens TCP connections to one address.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    addr: String,
    delimiter: u8,
    max_frame_len: usize,
}

impl TcpConnector {
    /// Connector for `addr` (`host:port`) using NUL-terminated frames.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            delimiter: b'\0',
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Connector for the configured device.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.url().as_str()).with_delimiter(config.delimiter)
    }

    /// Sets the frame delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the longest accepted incoming frame. A longer frame is
    /// reported as an error and closes the connection.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len.max(1);
        self
    }

    /// Address dialled on connect.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self) -> Result<TcpTransport, TransportError> {
        let stream = TcpStream::connect(self.addr.as_str())
            .await
            .map_err(|source| TransportError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        tracing::debug!(addr = %self.addr, "tcp connected");

        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(32);
        let reader_task = tokio::spawn(read_frames(
            reader,
            self.delimiter,
            self.max_frame_len,
            tx,
        ));

        Ok(TcpTransport {
            writer: Some(writer),
            rx,
            reader_task,
            delimiter: self.delimiter,
            closed: false,
        })
    }
}

/// One open TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    writer: Option<OwnedWriteHalf>,
    rx: mpsc::Receiver<TransportEvent>,
    reader_task: JoinHandle<()>,
    delimiter: u8,
    closed: bool,
}

impl Transport for TcpTransport {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        let mut bytes = Vec::with_capacity(frame.len() + 1);
        bytes.extend_from_slice(frame.as_bytes());
        bytes.push(self.delimiter);
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        if self.closed {
            return TransportEvent::Closed;
        }
        match self.rx.recv().await {
            Some(TransportEvent::Closed) | None => {
                self.closed = true;
                TransportEvent::Closed
            }
            Some(event) => event,
        }
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.reader_task.abort();
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Splits the read half into frames until EOF, an error or an oversized
/// frame.
async fn read_frames(
    reader: OwnedReadHalf,
    delimiter: u8,
    max_frame_len: usize,
    tx: mpsc::Sender<TransportEvent>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    // room for the delimiter after a maximal frame
    let limit = max_frame_len as u64 + 1;

    loop {
        buf.clear();
        match (&mut reader).take(limit).read_until(delimiter, &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&delimiter) {
                    buf.pop();
                } else if buf.len() > max_frame_len {
                    tracing::warn!(limit = max_frame_len, "incoming frame too long");
                    let _ = tx
                        .send(TransportEvent::Error(format!(
                            "frame exceeds {} bytes",
                            max_frame_len
                        )))
                        .await;
                    break;
                }
                let frame = String::from_utf8_lossy(&buf);
                let frame = frame.trim_matches(|c| c == '\r' || c == '\n' || c == '\0');
                if frame.is_empty() {
                    continue;
                }
                if tx.send(TransportEvent::Frame(frame.to_string())).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "tcp read failed");
                let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                break;
            }
        }
    }

    let _ = tx.send(TransportEvent::Closed).await;
}

// ============================================================================
// Tests
// ============================================================================
