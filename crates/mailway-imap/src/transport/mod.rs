//! Framed I/O for the IMAP wire protocol.
//!
//! IMAP replies are CRLF-terminated lines that may embed length-prefixed
//! literal blobs (`{n}` followed by CRLF and n raw bytes, after which
//! the same logical line continues). The transport turns the byte
//! stream into reply fragments: a tag token, a status token, the
//! rest-of-line text with literal markers elided, and the literal blobs
//! themselves.

mod stream;

pub use stream::{ImapStream, TlsUpgrade, connect_plain, connect_tls, create_tls_connector};

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::types::Tag;
use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// A literal blob carried by a reply fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralBlob {
    /// Byte offset into the fragment's `message` where the elided
    /// marker stood.
    pub offset: usize,
    /// The raw bytes the marker referred to.
    pub data: Vec<u8>,
}

/// One server reply fragment: a single logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// The raw tag token (`*`, `+`, or a hex tag).
    pub tag: String,
    /// The status token (second whitespace-separated piece).
    pub status: String,
    /// The rest of the line with all literal markers elided.
    pub message: String,
    /// Literal blobs, in the order their markers appeared.
    pub literals: Vec<LiteralBlob>,
}

impl Fragment {
    /// Reconstructs the original rest-of-line bytes by splicing the
    /// markers and blobs back in at their original positions.
    #[must_use]
    pub fn reconstruct(&self) -> Vec<u8> {
        let message = self.message.as_bytes();
        let mut out = Vec::new();
        let mut cursor = 0;
        for blob in &self.literals {
            out.extend_from_slice(&message[cursor..blob.offset]);
            out.extend_from_slice(format!("{{{}}}\r\n", blob.data.len()).as_bytes());
            out.extend_from_slice(&blob.data);
            cursor = blob.offset;
        }
        out.extend_from_slice(&message[cursor..]);
        out
    }
}

/// Framed byte channel over a TCP or TLS stream.
///
/// Single-producer/single-consumer: at most one outstanding receive at
/// a time. The configured timeout applies to both reads and writes.
pub struct Transport<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    io_timeout: Duration,
    closed: bool,
    timed_out: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a transport over a connected stream.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            io_timeout,
            closed: false,
            timed_out: false,
        }
    }

    /// Returns true if the peer closed the stream or `close` was called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns true if a read or write has timed out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        self.timed_out
    }

    /// The configured I/O timeout.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Writes `"<tag-hex> <text>\r\n"`, or `"<text>\r\n"` for the
    /// reserved untagged value (literal payload terminators and other
    /// non-tagged frames).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SendFailed`] on write failure or timeout.
    pub async fn send_line(&mut self, tag: Tag, text: &str) -> Result<()> {
        self.write_buffer.clear();
        if !tag.is_untagged() {
            self.write_buffer.extend_from_slice(tag.to_string().as_bytes());
            self.write_buffer.extend_from_slice(b" ");
        }
        self.write_buffer.extend_from_slice(text.as_bytes());
        self.write_buffer.extend_from_slice(b"\r\n");

        let deadline = self.io_timeout;
        let stream = self.reader.get_mut();
        let write = async {
            stream.write_all(&self.write_buffer).await?;
            stream.flush().await
        };
        match timeout(deadline, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::SendFailed {
                message: "stream write failed".to_string(),
                source: Some(e),
            }),
            Err(_) => {
                self.timed_out = true;
                Err(Error::send_failed("write timed out"))
            }
        }
    }

    /// Writes a raw byte blob with no terminator (literal bodies).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SendFailed`] on write failure or timeout.
    pub async fn send_bytes(&mut self, payload: &[u8]) -> Result<()> {
        let deadline = self.io_timeout;
        let stream = self.reader.get_mut();
        let write = async {
            stream.write_all(payload).await?;
            stream.flush().await
        };
        match timeout(deadline, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::SendFailed {
                message: "stream write failed".to_string(),
                source: Some(e),
            }),
            Err(_) => {
                self.timed_out = true;
                Err(Error::send_failed("write timed out"))
            }
        }
    }

    /// Receives the next reply fragment.
    ///
    /// A fragment is one logical line: text up to CRLF with every
    /// trailing `{n}` marker resolved by reading the n-byte blob and
    /// continuing on the byte after it. Returns `None` when the peer
    /// closed the stream or the timeout elapsed; [`Self::is_timeout`]
    /// distinguishes the two.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReceiveFailed`] on read errors and
    /// [`Error::UnexpectedData`] when a line or literal exceeds the
    /// hard size caps.
    pub async fn receive(&mut self) -> Result<Option<Fragment>> {
        let Some(first) = self.read_line().await? else {
            return Ok(None);
        };
        let (tag, status, rest) = split_reply_line(&first);

        let mut message = String::new();
        let mut literals = Vec::new();
        let mut segment = rest;

        loop {
            match split_trailing_literal(&segment) {
                Some((prefix, size)) => {
                    if size > MAX_LITERAL_SIZE {
                        return Err(Error::UnexpectedData(format!(
                            "literal too large: {size} bytes"
                        )));
                    }
                    message.push_str(prefix);
                    let Some(data) = self.read_exact(size).await? else {
                        return Ok(None);
                    };
                    literals.push(LiteralBlob {
                        offset: message.len(),
                        data,
                    });
                    let Some(next) = self.read_line().await? else {
                        return Ok(None);
                    };
                    segment = next;
                }
                None => {
                    message.push_str(&segment);
                    break;
                }
            }
        }

        Ok(Some(Fragment {
            tag,
            status,
            message,
            literals,
        }))
    }

    /// Returns true iff at least one byte is buffered or becomes
    /// available within `millis` milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReceiveFailed`] on read errors.
    pub async fn poll(&mut self, millis: u64) -> Result<bool> {
        if !self.reader.buffer().is_empty() {
            return Ok(true);
        }
        if self.closed {
            return Ok(false);
        }
        match timeout(Duration::from_millis(millis), self.reader.fill_buf()).await {
            Ok(Ok(buf)) => {
                if buf.is_empty() {
                    self.closed = true;
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
            Ok(Err(e)) => Err(Error::ReceiveFailed {
                message: "stream read failed".to_string(),
                timeout: false,
                source: Some(e),
            }),
            Err(_) => Ok(false),
        }
    }

    /// Shuts the stream down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CloseFailed`] if the shutdown itself fails.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader
            .get_mut()
            .shutdown()
            .await
            .map_err(|e| Error::CloseFailed(format!("stream shutdown failed: {e}")))
    }

    /// Consumes the transport and returns the inner stream.
    ///
    /// Used for the STARTTLS handover; any buffered data is dropped,
    /// which is safe because the upgrade happens on a quiet wire.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    /// Reads one line up to CRLF, stripped. `None` means the peer
    /// closed before a line started, or a read timed out.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line: Vec<u8> = Vec::new();
        let read = async {
            let mut limited = (&mut self.reader).take(MAX_LINE_LENGTH as u64);
            limited.read_until(b'\n', &mut line).await
        };

        match timeout(self.io_timeout, read).await {
            Ok(Ok(0)) => {
                self.closed = true;
                Ok(None)
            }
            Ok(Ok(_)) => {
                if line.last() != Some(&b'\n') {
                    if line.len() >= MAX_LINE_LENGTH {
                        return Err(Error::UnexpectedData("line too long".to_string()));
                    }
                    self.closed = true;
                    return Err(Error::receive_failed("connection closed mid-line"));
                }
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            Ok(Err(e)) => Err(Error::ReceiveFailed {
                message: "stream read failed".to_string(),
                timeout: false,
                source: Some(e),
            }),
            Err(_) => {
                self.timed_out = true;
                Ok(None)
            }
        }
    }

    /// Reads exactly `size` bytes. `None` means close or timeout.
    async fn read_exact(&mut self, size: usize) -> Result<Option<Vec<u8>>> {
        let mut data = vec![0u8; size];
        match timeout(self.io_timeout, self.reader.read_exact(&mut data)).await {
            Ok(Ok(_)) => Ok(Some(data)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.closed = true;
                Ok(None)
            }
            Ok(Err(e)) => Err(Error::ReceiveFailed {
                message: "stream read failed".to_string(),
                timeout: false,
                source: Some(e),
            }),
            Err(_) => {
                self.timed_out = true;
                Ok(None)
            }
        }
    }
}

/// Splits a reply line into its three whitespace-separated pieces:
/// tag, status, and the rest.
fn split_reply_line(line: &str) -> (String, String, String) {
    let mut parts = line.splitn(3, ' ');
    let tag = parts.next().unwrap_or_default().to_string();
    let status = parts.next().unwrap_or_default().to_string();
    let rest = parts.next().unwrap_or_default().to_string();
    (tag, status, rest)
}

/// Splits a line segment ending in a `{n}` literal marker into the
/// text before the marker and the literal size.
fn split_trailing_literal(segment: &str) -> Option<(&str, usize)> {
    let stripped = segment.strip_suffix('}')?;
    let open = stripped.rfind('{')?;
    let digits = &stripped[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let size = digits.parse().ok()?;
    Some((&segment[..open], size))
}
