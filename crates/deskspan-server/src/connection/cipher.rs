//! Symmetric transport cipher.
//!
//! ChaCha20 (RFC 8439, 96-bit nonce) seeded from an [`Agreement`]: the full
//! 32-byte shared key plus the first 12 bytes of the IV secret, block counter
//! starting at 0.  A stream cipher XORs a keystream over the data, so the
//! same operation encrypts and decrypts; each connection direction owns its
//! own instance because each direction negotiated its own agreement.
//!
//! Confidentiality only: no authentication tag is computed.  See DESIGN.md
//! before changing this — adding AEAD changes the wire format and handshake.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;

use crate::connection::key_exchange::Agreement;

/// Nonce length consumed from the agreement's IV secret.
const NONCE_SIZE: usize = 12;

/// One direction's cipher state.
pub struct TransportCipher {
    cipher: ChaCha20,
}

impl TransportCipher {
    pub fn new(agreement: &Agreement) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&agreement.iv[..NONCE_SIZE]);
        Self {
            cipher: ChaCha20::new(&agreement.key.into(), &nonce.into()),
        }
    }

    /// Encrypts or decrypts `data` in place, advancing the keystream.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
