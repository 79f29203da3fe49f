//! Connection-establishment protocol.
//!
//! One handshake per accepted socket, strictly linear:
//!
//! ```text
//! AwaitingKeyExchange → AwaitingClientInfo → Validating → Accepted | Rejected
//! ```
//!
//! The gatekeeper derives the per-direction ciphers, requests the peer's
//! self-description, validates and repairs it, reserves a (ticket, guid) pair
//! in the live registry, echoes the outcome, and hands the accepted session
//! to the desktop manager.  No step is retried within an attempt.

use std::fmt;
use std::time::Instant;

use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use deskspan_core::domain::ticket::TicketCounter;
use deskspan_core::domain::validation::{repair, ClientValidInfo, FixableIssues};
use deskspan_core::protocol::messages::{ClientBody, EchoResult, Request};

use crate::connection::cipher::TransportCipher;
use crate::connection::factory::MessageFactory;
use crate::connection::key_exchange::agree;
use crate::connection::transport::CommunicationLayer;
use crate::connection::ConnectedClient;
use crate::desktop::DesktopHandle;

/// Why a handshake was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Late-stage registry collision or other unexpected refusal.
    Unknown,
    KeyExchangeFailed,
    InitialInfoMissing,
    UnexpectedResolution,
    WrongPassword,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::Unknown => "Connection rejected",
            Rejection::KeyExchangeFailed => "Key exchange failed",
            Rejection::InitialInfoMissing => "ClientInfo",
            Rejection::UnexpectedResolution => "Unexpected resolution",
            Rejection::WrongPassword => "Password rejected",
        };
        write!(f, "{text}")
    }
}

/// Terminal outcome of one handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeResult {
    Accepted {
        info: ClientValidInfo,
        warnings: FixableIssues,
    },
    Rejected {
        reason: Rejection,
    },
}

impl HandshakeResult {
    pub fn succeeded(&self) -> bool {
        matches!(self, HandshakeResult::Accepted { .. })
    }
}

/// Runs the connection-establishment protocol for every accepted socket.
pub struct Gatekeeper {
    password: String,
    server_id: Uuid,
    desktop: DesktopHandle,
    tickets: TicketCounter,
    factory: MessageFactory,
}

impl Gatekeeper {
    pub fn new(password: String, server_id: Uuid, desktop: DesktopHandle) -> Self {
        Self {
            password,
            server_id,
            desktop,
            tickets: TicketCounter::new(),
            factory: MessageFactory::new(),
        }
    }

    /// Handles one incoming socket to completion.
    pub async fn handle_incoming(&self, mut stream: TcpStream) -> HandshakeResult {
        let started = Instant::now();

        // Kick off the connected-set snapshot now: the sweep prunes dead
        // sessions while the key exchange round trips run.
        let prefetch = self.desktop.connected_guids_deferred().await;

        // Two agreements: one per connection direction.
        let outbound = match agree(&mut stream).await {
            Ok(agreement) => agreement,
            Err(e) => {
                error!("key exchange failed; no cipher agreement with the peer: {e}");
                return HandshakeResult::Rejected {
                    reason: Rejection::KeyExchangeFailed,
                };
            }
        };
        let inbound = match agree(&mut stream).await {
            Ok(agreement) => agreement,
            Err(e) => {
                error!("key exchange failed; no cipher agreement with the peer: {e}");
                return HandshakeResult::Rejected {
                    reason: Rejection::KeyExchangeFailed,
                };
            }
        };

        let mut layer = CommunicationLayer::new(
            stream,
            TransportCipher::new(&outbound),
            TransportCipher::new(&inbound),
        );

        let (result, accepted) = self.handshake(&mut layer, prefetch).await;
        self.send_echo(&mut layer, &result).await;

        match (&result, accepted) {
            (HandshakeResult::Accepted { info, warnings }, Some(ticket)) => {
                debug!("{info:?}");
                self.desktop
                    .register(ConnectedClient {
                        layer,
                        ticket,
                        info: info.clone(),
                    })
                    .await;
                debug!(
                    "handshake completed in {}ms; warnings: {warnings}",
                    started.elapsed().as_millis()
                );
            }
            _ => {
                warn!("handshake failed: {result:?}");
                layer.disconnect().await;
            }
        }
        result
    }

    /// The application-level part of the handshake, once the encrypted
    /// channel exists.
    async fn handshake(
        &self,
        layer: &mut CommunicationLayer,
        prefetch: tokio::sync::oneshot::Receiver<Vec<Uuid>>,
    ) -> (
        HandshakeResult,
        Option<deskspan_core::domain::ticket::Ticket>,
    ) {
        let Some(response) = layer.request(Request::InitInfo).await else {
            return (
                HandshakeResult::Rejected {
                    reason: Rejection::InitialInfoMissing,
                },
                None,
            );
        };
        let ClientBody::InitInfo(declared) = response.body else {
            return (
                HandshakeResult::Rejected {
                    reason: Rejection::InitialInfoMissing,
                },
                None,
            );
        };
        info!(
            "incoming client info: name={} resolution={}x{} os={:?}",
            declared.name, declared.width, declared.height, declared.os
        );

        // Password precedes every other application-level check.
        if declared.password != self.password {
            debug!(
                "wrong password; expected '{}' - received '{}'",
                self.password, declared.password
            );
            return (
                HandshakeResult::Rejected {
                    reason: Rejection::WrongPassword,
                },
                None,
            );
        }
        if declared.width < 1 || declared.height < 1 {
            return (
                HandshakeResult::Rejected {
                    reason: Rejection::UnexpectedResolution,
                },
                None,
            );
        }

        // The prefetched snapshot already swept the registry; refresh it once
        // more so the collision window against concurrent connects stays as
        // small as possible.
        let _warmed = prefetch.await.unwrap_or_default();
        let connected = self.desktop.connected_guids().await;

        let (info, warnings) = repair(&declared, &connected, self.server_id);

        let ticket = self.tickets.allocate();
        if !self.desktop.reserve(ticket, info.guid).await {
            // Ticket stays burned; it is never reissued.
            return (
                HandshakeResult::Rejected {
                    reason: Rejection::Unknown,
                },
                None,
            );
        }

        (HandshakeResult::Accepted { info, warnings }, Some(ticket))
    }

    /// Reports the outcome to the peer.  This is the only record sent after
    /// an application-level rejection; key-exchange failures have no channel
    /// to report on.
    async fn send_echo(&self, layer: &mut CommunicationLayer, result: &HandshakeResult) {
        let echo = match result {
            HandshakeResult::Accepted { warnings, .. } if warnings.is_empty() => {
                self.factory.handshake_echo(EchoResult::Success, String::new())
            }
            HandshakeResult::Accepted { warnings, .. } => self
                .factory
                .handshake_echo(EchoResult::SuccessWarning, warnings.to_string()),
            HandshakeResult::Rejected { reason } => self
                .factory
                .handshake_echo(EchoResult::Rejection, reason.to_string()),
        };
        layer.try_send(&echo).await;
    }

    /// Disconnects every registered client.  Used at server shutdown.
    pub async fn disconnect_all(&self) {
        self.desktop.disconnect_all().await;
    }
}
