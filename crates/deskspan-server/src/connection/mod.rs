//! The connection/session engine: key agreement, encrypted framed transport,
//! the handshake gatekeeper, client health supervision, and the TCP accept
//! loop.

pub mod cipher;
pub mod factory;
pub mod gatekeeper;
pub mod health;
pub mod key_exchange;
pub mod listener;
pub mod transport;

use deskspan_core::domain::ticket::Ticket;
use deskspan_core::domain::validation::ClientValidInfo;

use transport::CommunicationLayer;

/// A successfully handshaken client: its transport session, the session
/// ticket, and the repaired self-description.  Owned by the desktop registry
/// from registration until disconnect.
pub struct ConnectedClient {
    pub layer: CommunicationLayer,
    pub ticket: Ticket,
    pub info: ClientValidInfo,
}

pub use gatekeeper::{Gatekeeper, HandshakeResult, Rejection};
pub use health::ClientHealthChecker;
pub use key_exchange::{agree, Agreement, KeyExchangeError};
pub use listener::TcpServer;
