//! X25519 key agreement over a raw byte stream.
//!
//! Before any protocol record is exchanged, server and client derive two
//! independent secrets per connection direction by running the agreement
//! twice: the first shared secret becomes the stream-cipher key, the second
//! becomes the IV material.  A connection therefore performs four raw
//! 32-byte public-key exchanges in total (key + IV, once per direction).
//!
//! Failure of any round aborts the whole connection setup: partial key
//! material is never reused and a failed agreement is never retried.

use std::fmt;
use std::time::Duration;

use rand::rngs::OsRng;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use x25519_dalek::{EphemeralSecret, PublicKey};

/// Raw X25519 public-key size on the wire.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// How long one side waits for the peer's public key in a single round.
/// The exchange is the very first traffic on a fresh connection, so a peer
/// that stays silent this long is not speaking the protocol.
const ROUND_TIMEOUT: Duration = Duration::from_millis(50);

/// Errors that abort the connection setup.
#[derive(Debug, Error)]
pub enum KeyExchangeError {
    #[error("i/o failure during key exchange: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer did not answer the key exchange within {}ms", ROUND_TIMEOUT.as_millis())]
    Timeout,
}

/// A derived symmetric key + IV pair for one connection direction.
///
/// Lives only as long as the cipher built from it; never persisted.
pub struct Agreement {
    pub key: [u8; PUBLIC_KEY_SIZE],
    pub iv: [u8; PUBLIC_KEY_SIZE],
}

impl fmt::Debug for Agreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material must never reach the logs.
        write!(f, "Agreement([REDACTED])")
    }
}

/// Runs one full agreement (two X25519 rounds) against the peer.
///
/// # Errors
///
/// Any I/O error or timeout in either round fails with [`KeyExchangeError`];
/// the caller must drop the connection.
pub async fn agree<S>(stream: &mut S) -> Result<Agreement, KeyExchangeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Ok(Agreement {
        key: round(stream).await?,
        iv: round(stream).await?,
    })
}

/// One write-our-public / read-their-public / Diffie-Hellman round.
async fn round<S>(stream: &mut S) -> Result<[u8; 32], KeyExchangeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let ours = public.as_bytes();
    debug_assert_eq!(ours.len(), PUBLIC_KEY_SIZE);

    stream.write_all(ours).await?;
    stream.flush().await?;

    let mut theirs = [0u8; PUBLIC_KEY_SIZE];
    match timeout(ROUND_TIMEOUT, stream.read_exact(&mut theirs)).await {
        Err(_) => return Err(KeyExchangeError::Timeout),
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(_)) => {}
    }

    let shared = secret.diffie_hellman(&PublicKey::from(theirs));
    Ok(*shared.as_bytes())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
