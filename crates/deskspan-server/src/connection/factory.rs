//! Outbound message construction.
//!
//! Centralizes the padding policy: most records carry one or two short random
//! strings so that the otherwise fixed-size input events do not produce a
//! recognizable ciphertext length pattern.  Handshake echoes and input events
//! go out unpadded, matching the original traffic shape.

use rand::Rng;

use deskspan_core::protocol::messages::{
    Button, ClipboardContent, EchoResult, Request, ScrollDirection, ServerBody, ServerMessage,
};

/// Builds [`ServerMessage`]s with the appropriate padding per record kind.
#[derive(Default)]
pub struct MessageFactory;

impl MessageFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn heartbeat(&self) -> ServerMessage {
        self.padded(ServerBody::Heartbeat { one_way: true }, 1..5)
    }

    pub fn request(&self, request: Request) -> ServerMessage {
        self.padded(ServerBody::Request(request), 1..3)
    }

    pub fn handshake_echo(&self, result: EchoResult, message: String) -> ServerMessage {
        ServerMessage::bare(ServerBody::HandshakeEcho { result, message })
    }

    pub fn mouse_move(&self, x: i32, y: i32) -> ServerMessage {
        ServerMessage::bare(ServerBody::MouseMove { x, y })
    }

    pub fn mouse_wheel(&self, direction: ScrollDirection, amount: i32) -> ServerMessage {
        ServerMessage::bare(ServerBody::MouseWheel { direction, amount })
    }

    pub fn mouse_click(&self, button: Button, pressed: bool) -> ServerMessage {
        ServerMessage::bare(ServerBody::MouseClick { button, pressed })
    }

    pub fn keyboard(&self, key: u32, pressed: bool) -> ServerMessage {
        ServerMessage::bare(ServerBody::Keyboard { key, pressed })
    }

    pub fn clipboard(&self, content: ClipboardContent) -> ServerMessage {
        self.padded(ServerBody::Clipboard(content), 0..3)
    }

    pub fn session_begin(&self, relative_mouse: bool) -> ServerMessage {
        self.padded(ServerBody::SessionBegin { relative_mouse }, 0..3)
    }

    pub fn session_end(&self) -> ServerMessage {
        self.padded(ServerBody::SessionEnd, 0..3)
    }

    fn padded(&self, body: ServerBody, len_range: std::ops::Range<u32>) -> ServerMessage {
        ServerMessage {
            body,
            pad_front: random_padding(len_range.clone()),
            pad_back: random_padding(len_range),
        }
    }
}

/// A random uppercase A–Z string whose length is drawn from `len_range`.
fn random_padding(len_range: std::ops::Range<u32>) -> String {
    let mut rng = rand::thread_rng();
    if len_range.is_empty() {
        return String::new();
    }
    let len = rng.gen_range(len_range);
    (0..len).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
