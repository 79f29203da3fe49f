//! Framed, optionally encrypted message transport over one TCP session.
//!
//! Turns a raw bidirectional byte stream into a message-oriented channel.
//! All wire failures are converted to `bool`/`Option` here so that the
//! gatekeeper and the desktop manager never handle I/O errors directly.
//!
//! A shared failure counter tracks consecutive send/read problems: after more
//! than [`MAX_SEND_FAILURES`] consecutive failures, sends fail fast without
//! touching the socket until one success resets the streak.  Only the first
//! failure of a streak is logged, so a dead socket cannot flood the log.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use deskspan_core::protocol::codec;
use deskspan_core::protocol::messages::{ClientBody, ClientMessage, Request, ServerMessage};

use crate::connection::cipher::TransportCipher;

/// Consecutive send failures tolerated before the transport fails fast.
pub const MAX_SEND_FAILURES: u32 = 3;

/// Normal window for draining one inbound response burst.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Extended window used only for the very first post-handshake read, when a
/// freshly started client may still be booting its responder.
const EXTENDED_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// One client's message channel.
///
/// Owns the socket and both directional cipher states exclusively; the
/// `&mut self` receivers are what enforce the strictly synchronous
/// request/response discipline.
pub struct CommunicationLayer {
    stream: TcpStream,
    /// `(outbound, inbound)`; `None` runs the link in plaintext (tests only).
    ciphers: Option<(TransportCipher, TransportCipher)>,
    failure_count: u32,
}

impl CommunicationLayer {
    pub fn new(stream: TcpStream, outbound: TransportCipher, inbound: TransportCipher) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            stream,
            ciphers: Some((outbound, inbound)),
            failure_count: 0,
        }
    }

    /// A layer without encryption.  Used by tests that need to observe the
    /// plaintext frames.
    pub fn plaintext(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            stream,
            ciphers: None,
            failure_count: 0,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Frames, encrypts, and writes one record.
    ///
    /// Returns `false` without touching the socket once the failure streak
    /// exceeds [`MAX_SEND_FAILURES`].
    pub async fn try_send(&mut self, message: &ServerMessage) -> bool {
        if self.failure_count > MAX_SEND_FAILURES {
            return false;
        }

        let mut frame = match codec::encode_server(message) {
            Ok(frame) => frame,
            Err(e) => {
                self.note_failure(&format!("failed to encode outbound record: {e}"));
                return false;
            }
        };
        if let Some((outbound, _)) = self.ciphers.as_mut() {
            outbound.apply(&mut frame);
        }

        match self.stream.write_all(&frame).await {
            Ok(()) => {
                self.failure_count = 0;
                true
            }
            Err(e) => {
                self.note_failure(&format!("failed to send data: {e}"));
                false
            }
        }
    }

    /// Drains the socket until the read window closes, then parses exactly
    /// one record from the collected bytes.
    ///
    /// A window that closes with zero bytes collected means "no message" and
    /// is not counted as a failure; every other problem feeds the failure
    /// streak.
    pub async fn read_response(&mut self, extended_timeout: bool) -> Option<ClientMessage> {
        let window = if extended_timeout {
            EXTENDED_READ_TIMEOUT
        } else {
            READ_TIMEOUT
        };

        let mut collected: Vec<u8> = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match timeout(window, self.stream.read(&mut buf)).await {
                // Window elapsed: the burst is over.
                Err(_) => break,
                Ok(Ok(0)) => {
                    self.note_failure("connection closed by peer while reading");
                    return None;
                }
                Ok(Ok(n)) => collected.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => {
                    self.note_failure(&format!("read response failed: {e}"));
                    return None;
                }
            }
        }

        if collected.is_empty() {
            return None;
        }
        debug!("response: {} bytes", collected.len());

        if let Some((_, inbound)) = self.ciphers.as_mut() {
            inbound.apply(&mut collected);
        }
        match codec::decode_client(&collected) {
            Ok((message, _consumed)) => {
                self.failure_count = 0;
                Some(message)
            }
            Err(e) => {
                self.note_failure(&format!("read response failed: {e}"));
                None
            }
        }
    }

    /// Sends a typed request and reads one response, validating that the
    /// payload kind answers the request.
    ///
    /// Strictly synchronous: the exclusive borrow prevents a second request
    /// on this transport before this one resolves.
    pub async fn request(&mut self, request: Request) -> Option<ClientMessage> {
        let message = crate::connection::factory::MessageFactory::new().request(request);
        if !self.try_send(&message).await {
            return None;
        }

        // Client boot is the one moment a longer wait is justified.
        let extended = matches!(request, Request::InitInfo);
        let Some(response) = self.read_response(extended).await else {
            warn!(?request, "no response received for request");
            return None;
        };

        let matches_request = matches!(
            (request, &response.body),
            (Request::InitInfo, ClientBody::InitInfo(_))
                | (Request::MousePosition, ClientBody::Cursor(_))
                | (Request::Clipboard, ClientBody::Clipboard(_))
                | (Request::Clipboard, ClientBody::NoData { .. })
        );
        if !matches_request {
            warn!(?request, "response payload does not answer the request");
            return None;
        }
        Some(response)
    }

    /// Peek-style liveness check: does the socket still look usable without
    /// consuming any data?
    pub async fn is_alive(&self) -> bool {
        let mut probe = [0u8; 1];
        match timeout(Duration::from_millis(1), self.stream.peek(&mut probe)).await {
            // Nothing readable within the poll window: healthy and idle.
            Err(_) => true,
            // Readable with zero bytes is the half-closed/dead signal.
            Ok(Ok(0)) => false,
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
        }
    }

    /// Gracefully closes the write half.  Errors during teardown are only
    /// worth a debug line.
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("socket shutdown failed: {e}");
        }
    }

    fn note_failure(&mut self, context: &str) {
        self.failure_count += 1;
        if self.failure_count == 1 {
            warn!("{context}");
        }
    }

    #[cfg(test)]
    pub(crate) fn force_failure_count(&mut self, count: u32) {
        self.failure_count = count;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
