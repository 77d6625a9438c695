//! Per-connection session worker.
//!
//! Protocol: fixed text, no framing.
//! - Server sends the greeting once, as soon as the session starts.
//! - Every read of up to 255 bytes from the client is answered with the
//!   fixed response.
//! - The session ends when the client closes the connection or on the first
//!   I/O error. Either way the stream is dropped, which closes it.

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::error::SessionError;

/// Read buffer capacity
pub const BUFFER_SIZE: usize = 256;

/// Maximum bytes consumed by a single read
pub const MAX_READ: usize = BUFFER_SIZE - 1;

const GREETING_TEXT: &[u8] = b"Hello. I'm a TCP server.  What's going on?\n";
const RESPONSE_TEXT: &[u8] = b"Tell me about it. What else is happening?\n";

/// Greeting frame, NUL padded to its fixed wire size.
pub const GREETING: [u8; 45] = frame(GREETING_TEXT);

/// Response frame, NUL padded to its fixed wire size.
pub const RESPONSE: [u8; 60] = frame(RESPONSE_TEXT);

/// Copy `text` into a zeroed frame of `N` bytes.
const fn frame<const N: usize>(text: &[u8]) -> [u8; N] {
    assert!(text.len() <= N);
    let mut out = [0u8; N];
    let mut i = 0;
    while i < text.len() {
        out[i] = text[i];
        i += 1;
    }
    out
}

/// Counters reported when a session ends cleanly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Reads answered with a response.
    pub messages: u64,
    pub bytes_received: u64,
}

/// One client connection and its read buffer.
pub struct Session<S> {
    stream: S,
    buffer: BytesMut,
    summary: SessionSummary,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            summary: SessionSummary::default(),
        }
    }

    /// Greet the client, then answer every message until end of stream.
    pub async fn run(mut self) -> Result<SessionSummary, SessionError> {
        self.greet().await?;

        loop {
            let Some(message) = self.read_message().await? else {
                trace!("Connection closed by client");
                return Ok(self.summary);
            };
            log_message(message);

            self.respond().await?;
        }
    }

    async fn greet(&mut self) -> Result<(), SessionError> {
        self.stream
            .write_all(&GREETING)
            .await
            .map_err(SessionError::Greeting)
    }

    /// Read the next chunk from the client.
    ///
    /// Returns `None` at end of stream. The returned slice holds only the
    /// bytes of this read.
    async fn read_message(&mut self) -> Result<Option<&[u8]>, SessionError> {
        self.buffer.clear();

        let n = (&mut self.stream)
            .take(MAX_READ as u64)
            .read_buf(&mut self.buffer)
            .await
            .map_err(SessionError::Read)?;
        if n == 0 {
            return Ok(None);
        }

        self.summary.messages += 1;
        self.summary.bytes_received += n as u64;
        Ok(Some(&self.buffer[..n]))
    }

    async fn respond(&mut self) -> Result<(), SessionError> {
        self.stream
            .write_all(&RESPONSE)
            .await
            .map_err(SessionError::Respond)
    }
}

fn log_message(message: &[u8]) {
    let text = String::from_utf8_lossy(message);
    info!(message = %text.trim_end(), "The client says");
}

/// Hand a connection to its own task.
///
/// The task owns the stream; errors are logged here and go no further.
pub fn spawn(id: u64, peer: SocketAddr, stream: TcpStream) {
    let span = info_span!("session", id, %peer);

    tokio::spawn(
        async move {
            match Session::new(stream).run().await {
                Ok(summary) => debug!(
                    messages = summary.messages,
                    bytes = summary.bytes_received,
                    "Session closed"
                ),
                Err(e) => warn!(error = %e, "Session terminated"),
            }
        }
        .instrument(span),
    );
}
