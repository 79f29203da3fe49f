//! End-to-end handshake tests over real loopback sockets.
//!
//! A scripted wire-level client performs the same steps a production client
//! would: two X25519 agreements, ChaCha20 ciphers per direction, and framed
//! bincode records.  The tests then assert both sides of the contract — the
//! `HandshakeResult` the server produces and the echo the peer observes.
//!
//! Direction mapping: the server's *first* agreement seeds its outbound
//! cipher, so on the client it seeds the inbound decryptor; the second seeds
//! the client's outbound encryptor.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use deskspan_core::protocol::codec::{decode_server, encode_client};
use deskspan_core::protocol::messages::{
    ClientBody, ClientInfo, ClientMessage, CursorPosition, EchoResult, OsFamily, Request,
    ServerBody, ServerMessage,
};
use deskspan_server::connection::cipher::TransportCipher;
use deskspan_server::connection::gatekeeper::{Gatekeeper, HandshakeResult, Rejection};
use deskspan_server::connection::key_exchange::agree;
use deskspan_server::desktop::{spawn, DesktopHandle, DesktopManager, SwitchMode};
use deskspan_server::platform::MockPlatform;

const PASSWORD: &str = "open sesame";

// ── Server harness ────────────────────────────────────────────────────────────

struct Harness {
    addr: SocketAddr,
    desktop: DesktopHandle,
    results: mpsc::UnboundedReceiver<HandshakeResult>,
}

/// Starts a desktop actor plus a gatekeeper accept loop on an ephemeral port.
async fn start_server() -> Harness {
    let platform = Arc::new(MockPlatform::with_primary_screen(1920, 1080));
    let (notify_tx, _notify_rx) = mpsc::unbounded_channel();
    let manager = DesktopManager::new(
        SwitchMode::Basic,
        platform.clone(),
        platform.clone(),
        platform.as_ref(),
        notify_tx,
    );
    let (desktop, _actor) = spawn(manager);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gatekeeper = Gatekeeper::new(PASSWORD.to_string(), Uuid::new_v4(), desktop.clone());

    let (result_tx, results) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let result = gatekeeper.handle_incoming(stream).await;
            if result_tx.send(result).is_err() {
                break;
            }
        }
    });

    Harness {
        addr,
        desktop,
        results,
    }
}

// ── Scripted wire-level client ────────────────────────────────────────────────

struct TestClient {
    stream: TcpStream,
    inbound: TransportCipher,
    outbound: TransportCipher,
    plain: Vec<u8>,
}

impl TestClient {
    /// Connects and completes the key exchange.
    async fn connect(addr: SocketAddr) -> TestClient {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let first = agree(&mut stream).await.expect("first agreement");
        let second = agree(&mut stream).await.expect("second agreement");
        TestClient {
            stream,
            inbound: TransportCipher::new(&first),
            outbound: TransportCipher::new(&second),
            plain: Vec::new(),
        }
    }

    /// Reads, decrypts, and decodes the next server record.
    async fn read_message(&mut self) -> ServerMessage {
        use tokio::io::AsyncReadExt;
        loop {
            match decode_server(&self.plain) {
                Ok((message, consumed)) => {
                    self.plain.drain(..consumed);
                    return message;
                }
                Err(_) => {
                    let mut buf = [0u8; 1024];
                    let n = self.stream.read(&mut buf).await.expect("server read");
                    assert!(n > 0, "server closed before a full record arrived");
                    let mut chunk = buf[..n].to_vec();
                    self.inbound.apply(&mut chunk);
                    self.plain.extend_from_slice(&chunk);
                }
            }
        }
    }

    async fn send(&mut self, message: &ClientMessage) {
        let mut frame = encode_client(message).unwrap();
        self.outbound.apply(&mut frame);
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Drives the info exchange: waits for the InitInfo request, answers it,
    /// and returns the handshake echo.
    async fn complete_handshake(&mut self, info: ClientInfo) -> (EchoResult, String) {
        let request = self.read_message().await;
        assert!(
            matches!(request.body, ServerBody::Request(Request::InitInfo)),
            "expected an InitInfo request, got {:?}",
            request.body
        );
        self.send(&ClientMessage::new(ClientBody::InitInfo(info))).await;

        let echo = self.read_message().await;
        match echo.body {
            ServerBody::HandshakeEcho { result, message } => (result, message),
            other => panic!("expected a handshake echo, got {other:?}"),
        }
    }
}

fn valid_info(name: &str) -> ClientInfo {
    ClientInfo {
        width: 1920,
        height: 1080,
        name: name.to_string(),
        guid: Uuid::new_v4().to_string(),
        cursor: Some(CursorPosition { x: 100, y: 100 }),
        os: OsFamily::Mock,
        password: PASSWORD.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_valid_client_is_accepted_and_registered() {
    let mut harness = start_server().await;
    let mut client = TestClient::connect(harness.addr).await;

    let info = valid_info("dev-box");
    let declared_guid = info.guid.clone();
    let (echo, message) = client.complete_handshake(info).await;

    assert_eq!(echo, EchoResult::Success);
    assert!(message.is_empty());

    let result = harness.results.recv().await.unwrap();
    match result {
        HandshakeResult::Accepted { info, warnings } => {
            assert!(warnings.is_empty());
            assert_eq!(info.guid.to_string(), declared_guid);
        }
        other => panic!("expected acceptance, got {other:?}"),
    }

    let connected = harness.desktop.connected_guids().await;
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].to_string(), declared_guid);
}

#[tokio::test]
async fn test_malformed_guid_and_cursor_are_repaired_not_rejected() {
    let mut harness = start_server().await;
    let mut client = TestClient::connect(harness.addr).await;

    // The declared cursor lies outside the declared 1920x1080 screen and the
    // guid does not parse; both must be repaired, neither must reject.
    let mut info = valid_info("sloppy-box");
    info.guid = "not-a-guid".to_string();
    info.cursor = Some(CursorPosition { x: 2000, y: 1090 });
    let (echo, message) = client.complete_handshake(info).await;

    assert_eq!(echo, EchoResult::SuccessWarning);
    assert!(message.contains("GuidInvalid"), "echo carries the flags: {message}");
    assert!(message.contains("MousePositionOutOfBounds"));

    match harness.results.recv().await.unwrap() {
        HandshakeResult::Accepted { info, warnings } => {
            assert!(!warnings.is_empty());
            assert_eq!((info.cursor.x, info.cursor.y), (1919, 1079));
            assert_ne!(info.guid.to_string(), "not-a-guid");
        }
        other => panic!("expected acceptance with warnings, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wrong_password_is_rejected_with_echo() {
    let mut harness = start_server().await;
    let mut client = TestClient::connect(harness.addr).await;

    let mut info = valid_info("intruder");
    info.password = "wrong".to_string();
    let (echo, message) = client.complete_handshake(info).await;

    assert_eq!(echo, EchoResult::Rejection);
    assert_eq!(message, "Password rejected");
    assert!(matches!(
        harness.results.recv().await.unwrap(),
        HandshakeResult::Rejected {
            reason: Rejection::WrongPassword
        }
    ));
    assert!(harness.desktop.connected_guids().await.is_empty());
}

#[tokio::test]
async fn test_password_check_precedes_resolution_check() {
    let mut harness = start_server().await;
    let mut client = TestClient::connect(harness.addr).await;

    // Both the password and the resolution are wrong; the password verdict
    // must win.
    let mut info = valid_info("doubly-wrong");
    info.password = "wrong".to_string();
    info.width = 0;
    let (echo, _) = client.complete_handshake(info).await;

    assert_eq!(echo, EchoResult::Rejection);
    assert!(matches!(
        harness.results.recv().await.unwrap(),
        HandshakeResult::Rejected {
            reason: Rejection::WrongPassword
        }
    ));
}

#[tokio::test]
async fn test_non_positive_resolution_is_rejected() {
    let mut harness = start_server().await;
    let mut client = TestClient::connect(harness.addr).await;

    let mut info = valid_info("no-screen");
    info.height = 0;
    let (echo, _) = client.complete_handshake(info).await;

    assert_eq!(echo, EchoResult::Rejection);
    assert!(matches!(
        harness.results.recv().await.unwrap(),
        HandshakeResult::Rejected {
            reason: Rejection::UnexpectedResolution
        }
    ));
}

#[tokio::test]
async fn test_silent_client_is_rejected_for_missing_info() {
    let mut harness = start_server().await;
    // Complete the key exchange, then never answer the InitInfo request.
    let mut client = TestClient::connect(harness.addr).await;

    assert!(matches!(
        harness.results.recv().await.unwrap(),
        HandshakeResult::Rejected {
            reason: Rejection::InitialInfoMissing
        }
    ));

    // The request went out before the server gave up on the response...
    let request = client.read_message().await;
    assert!(matches!(request.body, ServerBody::Request(Request::InitInfo)));

    // ...and the rejection is still echoed over the established channel.
    let echo = client.read_message().await;
    match echo.body {
        ServerBody::HandshakeEcho { result, message } => {
            assert_eq!(result, EchoResult::Rejection);
            assert_eq!(message, "ClientInfo");
        }
        other => panic!("expected a handshake echo, got {other:?}"),
    }
}

#[tokio::test]
async fn test_immediate_disconnect_fails_the_key_exchange() {
    let mut harness = start_server().await;
    let stream = TcpStream::connect(harness.addr).await.unwrap();
    drop(stream);

    assert!(matches!(
        harness.results.recv().await.unwrap(),
        HandshakeResult::Rejected {
            reason: Rejection::KeyExchangeFailed
        }
    ));
}

#[tokio::test]
async fn test_duplicate_guid_from_second_client_is_regenerated() {
    let mut harness = start_server().await;

    let mut first = TestClient::connect(harness.addr).await;
    let info = valid_info("first");
    let shared_guid = info.guid.clone();
    let (echo, _) = first.complete_handshake(info).await;
    assert_eq!(echo, EchoResult::Success);
    let _ = harness.results.recv().await.unwrap();

    // The second client claims the first one's GUID.
    let mut second = TestClient::connect(harness.addr).await;
    let mut info = valid_info("second");
    info.guid = shared_guid.clone();
    let (echo, message) = second.complete_handshake(info).await;

    assert_eq!(echo, EchoResult::SuccessWarning);
    assert!(message.contains("GuidAlreadyUsed"));

    match harness.results.recv().await.unwrap() {
        HandshakeResult::Accepted { info, .. } => {
            assert_ne!(info.guid.to_string(), shared_guid);
        }
        other => panic!("expected acceptance, got {other:?}"),
    }

    // Both sessions stay registered, with two distinct GUIDs.
    let connected = harness.desktop.connected_guids().await;
    assert_eq!(connected.len(), 2);
    assert_ne!(connected[0], connected[1]);
}
