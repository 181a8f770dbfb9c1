//! JSON-RPC framing codec.
//!
//! The protocol frames every message as `Content-Length: N\r\n\r\n{json}`
//! over stdin/stdout. [`FrameReader`] and [`FrameWriter`] read and write
//! those frames asynchronously.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Longest header line accepted, terminator included.
pub const MAX_HEADER_LINE_BYTES: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Malformed or missing headers, or an oversized frame.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The stream ended before the announced body length arrived.
    #[error("truncated message: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },
    /// A complete frame whose body is not JSON. The stream is still aligned.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the read loop must stop after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Json(_))
    }
}

/// Reads JSON-RPC frames from an async reader.
///
/// Parses `Content-Length` headers and reads exactly that many bytes,
/// then deserializes the body as JSON.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next JSON-RPC frame.
    ///
    /// Returns `Ok(None)` on EOF before any header byte (clean end of
    /// session).
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>, TransportError> {
        let Some(content_length) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(TransportError::Protocol(format!(
                "Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}"
            )));
        }

        let mut body = vec![0u8; content_length];
        let mut received = 0;
        while received < content_length {
            let n = self.reader.read(&mut body[received..]).await?;
            if n == 0 {
                return Err(TransportError::Truncated {
                    expected: content_length,
                    received,
                });
            }
            received += n;
        }

        let value = serde_json::from_slice(&body)?;
        Ok(Some(value))
    }

    /// Parse headers until the empty line separator.
    ///
    /// Returns the `Content-Length` value, or `None` on EOF.
    async fn read_headers(&mut self) -> Result<Option<usize>, TransportError> {
        let mut content_length: Option<usize> = None;
        let mut raw = Vec::new();
        let mut saw_any_header_bytes = false;

        loop {
            raw.clear();
            let bytes_read = (&mut self.reader)
                .take(MAX_HEADER_LINE_BYTES as u64)
                .read_until(b'\n', &mut raw)
                .await?;
            if bytes_read == MAX_HEADER_LINE_BYTES && raw.last() != Some(&b'\n') {
                return Err(TransportError::Protocol(format!(
                    "header line exceeds {MAX_HEADER_LINE_BYTES} bytes"
                )));
            }

            if bytes_read == 0 {
                // EOF after a partial header block is not a clean shutdown.
                if !saw_any_header_bytes {
                    return Ok(None);
                }
                return Err(TransportError::Protocol(
                    "unexpected EOF while reading headers".to_string(),
                ));
            }
            saw_any_header_bytes = true;

            let line = std::str::from_utf8(&raw)
                .map_err(|_| TransportError::Protocol("header is not valid UTF-8".to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                return Err(TransportError::Protocol(format!(
                    "malformed header line: {trimmed}"
                )));
            };
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let len = value.trim().parse::<usize>().map_err(|_| {
                    TransportError::Protocol(format!("invalid Content-Length value: {}", value.trim()))
                })?;
                content_length = Some(len);
            }
            // Other headers (Content-Type) are ignored.
        }

        match content_length {
            Some(len) => Ok(Some(len)),
            None => Err(TransportError::Protocol(
                "missing Content-Length header".to_string(),
            )),
        }
    }
}

/// Writes JSON-RPC frames to an async writer.
///
/// Serializes JSON and prepends the `Content-Length` header.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a JSON-RPC frame with `Content-Length` header.
    pub async fn write_frame(&mut self, msg: &serde_json::Value) -> Result<(), TransportError> {
        let body = serde_json::to_string(msg)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}
