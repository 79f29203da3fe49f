//! Desktop-manager behaviour through the actor, with live remote sessions.
//!
//! Each "remote" here is a plaintext transport over a real loopback socket
//! pair, with a scripted peer that answers clipboard requests and records
//! every other record the server sends.  That lets the tests observe exactly
//! what a client would: session begin/end ordering, clipboard handoff, and
//! the cursor positioning around layout edge crossings.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use deskspan_core::domain::geometry::LocalPoint;
use deskspan_core::domain::ticket::{Ticket, TicketCounter};
use deskspan_core::domain::validation::ClientValidInfo;
use deskspan_core::protocol::codec::{decode_server, encode_client};
use deskspan_core::protocol::messages::{
    ClientBody, ClientMessage, ClipboardContent, ClipboardFormat, OsFamily, Request, ServerBody,
};
use deskspan_server::connection::transport::CommunicationLayer;
use deskspan_server::connection::ConnectedClient;
use deskspan_server::desktop::{
    spawn, ActiveChanged, DesktopHandle, DesktopManager, HotkeyAction, SwitchMode,
};
use deskspan_server::platform::{ClipboardProvider, MockPlatform, MouseMoveEvent};

const WAIT: Duration = Duration::from_secs(5);

// ── Harness ───────────────────────────────────────────────────────────────────

struct Desk {
    desktop: DesktopHandle,
    notify: mpsc::UnboundedReceiver<ActiveChanged>,
    platform: Arc<MockPlatform>,
    tickets: TicketCounter,
}

async fn start_desktop(mode: SwitchMode) -> Desk {
    let platform = Arc::new(MockPlatform::with_primary_screen(1920, 1080));
    let (notify_tx, notify) = mpsc::unbounded_channel();
    let manager = DesktopManager::new(
        mode,
        platform.clone(),
        platform.clone(),
        platform.as_ref(),
        notify_tx,
    );
    let (desktop, _actor) = spawn(manager);
    Desk {
        desktop,
        notify,
        platform,
        tickets: TicketCounter::new(),
    }
}

impl Desk {
    async fn expect_change(&mut self) -> ActiveChanged {
        timeout(WAIT, self.notify.recv())
            .await
            .expect("an active-target change within the wait budget")
            .expect("notify channel open")
    }
}

/// The client side of one registered remote session.
struct RemotePeer {
    bodies: mpsc::UnboundedReceiver<ServerBody>,
    task: JoinHandle<()>,
}

impl RemotePeer {
    /// The next record the server sent, heartbeats and requests filtered out.
    async fn next_body(&mut self) -> ServerBody {
        timeout(WAIT, self.bodies.recv())
            .await
            .expect("a record from the server within the wait budget")
            .expect("peer task alive")
    }

    /// Drops the socket, simulating a vanished client.
    fn vanish(self) {
        self.task.abort();
    }
}

async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    (server, client)
}

/// Registers a remote target and returns its scripted peer.
async fn attach_remote(desk: &Desk, name: &str) -> (Ticket, Uuid, RemotePeer) {
    let (server_side, peer_side) = socket_pair().await;
    let ticket = desk.tickets.allocate();
    let guid = Uuid::new_v4();
    assert!(desk.desktop.reserve(ticket, guid).await, "reservation must win");

    let info = ClientValidInfo {
        name: name.to_string(),
        width: 1920,
        height: 1080,
        guid,
        cursor: LocalPoint::new(100, 100),
        os: OsFamily::Mock,
    };
    desk.desktop
        .register(ConnectedClient {
            layer: CommunicationLayer::plaintext(server_side),
            ticket,
            info,
        })
        .await;

    let (tx, bodies) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_peer(peer_side, tx));
    (ticket, guid, RemotePeer { bodies, task })
}

/// Scripted client: answers clipboard requests with "no data" and forwards
/// everything except heartbeats for the test to assert on.
async fn run_peer(mut socket: TcpStream, bodies: mpsc::UnboundedSender<ServerBody>) {
    let mut collected: Vec<u8> = Vec::new();
    let mut buf = [0u8; 2048];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        collected.extend_from_slice(&buf[..n]);
        while let Ok((message, consumed)) = decode_server(&collected) {
            collected.drain(..consumed);
            match message.body {
                ServerBody::Request(Request::Clipboard) => {
                    let reply = ClientMessage::new(ClientBody::NoData {
                        reason: "clipboard empty".to_string(),
                    });
                    if socket
                        .write_all(&encode_client(&reply).unwrap())
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                ServerBody::Request(_) | ServerBody::Heartbeat { .. } => {}
                other => {
                    let _ = bodies.send(other);
                }
            }
        }
    }
}

// ── Switching ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cycle_walks_remotes_and_wraps_back_to_local() {
    let mut desk = start_desktop(SwitchMode::Basic).await;
    let (_t1, _g1, mut first) = attach_remote(&desk, "r1").await;
    let (_t2, _g2, mut second) = attach_remote(&desk, "r2").await;

    // Local → r1.
    desk.desktop.gesture(HotkeyAction::SwitchDestination).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Remote);
    assert!(matches!(first.next_body().await, ServerBody::SessionBegin { .. }));

    // r1 → r2: r1 is closed out, r2 begins.
    desk.desktop.gesture(HotkeyAction::SwitchDestination).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Remote);
    assert!(matches!(first.next_body().await, ServerBody::SessionEnd));
    assert!(matches!(second.next_body().await, ServerBody::SessionBegin { .. }));

    // r2 → local: the ring has local at both ends.
    desk.desktop.gesture(HotkeyAction::SwitchDestination).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Local);
    assert!(matches!(second.next_body().await, ServerBody::SessionEnd));

    // And around again.
    desk.desktop.gesture(HotkeyAction::SwitchDestination).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Remote);
    assert!(matches!(first.next_body().await, ServerBody::SessionBegin { .. }));
}

#[tokio::test]
async fn test_cycle_with_no_remotes_stays_local() {
    let mut desk = start_desktop(SwitchMode::Basic).await;
    desk.desktop.gesture(HotkeyAction::SwitchDestination).await;
    // Switching to the already-active local machine re-asserts the local
    // strategy rather than switching.
    assert_eq!(desk.expect_change().await, ActiveChanged::Local);
}

#[tokio::test]
async fn test_switch_home_returns_to_local() {
    let mut desk = start_desktop(SwitchMode::Basic).await;
    let (_ticket, _guid, mut peer) = attach_remote(&desk, "r1").await;

    desk.desktop.gesture(HotkeyAction::SwitchDestination).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Remote);
    assert!(matches!(peer.next_body().await, ServerBody::SessionBegin { .. }));

    desk.desktop.gesture(HotkeyAction::SwitchToServer).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Local);
    assert!(matches!(peer.next_body().await, ServerBody::SessionEnd));
}

#[tokio::test]
async fn test_disconnecting_the_active_target_falls_back_to_local() {
    let mut desk = start_desktop(SwitchMode::Basic).await;
    let (ticket, _guid, mut peer) = attach_remote(&desk, "r1").await;

    desk.desktop.gesture(HotkeyAction::SwitchDestination).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Remote);
    assert!(matches!(peer.next_body().await, ServerBody::SessionBegin { .. }));

    desk.desktop.disconnect(ticket).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Local);
    assert!(desk.desktop.connected_guids().await.is_empty());
}

#[tokio::test]
async fn test_clipboard_travels_to_the_newly_active_remote() {
    let mut desk = start_desktop(SwitchMode::Basic).await;
    let (_ticket, _guid, mut peer) = attach_remote(&desk, "r1").await;

    let content = ClipboardContent {
        format: ClipboardFormat::Text,
        content: "shared text".to_string(),
    };
    desk.platform.set(&content);

    desk.desktop.gesture(HotkeyAction::SwitchDestination).await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Remote);

    assert!(matches!(peer.next_body().await, ServerBody::SessionBegin { .. }));
    match peer.next_body().await {
        ServerBody::Clipboard(received) => assert_eq!(received, content),
        other => panic!("expected the clipboard payload, got {other:?}"),
    }
}

// ── Registration and health ───────────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_guid_reservation_is_refused() {
    let desk = start_desktop(SwitchMode::Basic).await;
    let guid = Uuid::new_v4();
    assert!(desk.desktop.reserve(desk.tickets.allocate(), guid).await);
    assert!(
        !desk.desktop.reserve(desk.tickets.allocate(), guid).await,
        "the same guid must not be claimable twice"
    );
}

#[tokio::test]
async fn test_registration_without_reservation_is_dropped() {
    let desk = start_desktop(SwitchMode::Basic).await;
    let (server_side, _peer_side) = socket_pair().await;
    let info = ClientValidInfo {
        name: "ghost".to_string(),
        width: 800,
        height: 600,
        guid: Uuid::new_v4(),
        cursor: LocalPoint::new(0, 0),
        os: OsFamily::Mock,
    };
    desk.desktop
        .register(ConnectedClient {
            layer: CommunicationLayer::plaintext(server_side),
            ticket: desk.tickets.allocate(),
            info,
        })
        .await;
    assert!(desk.desktop.connected_guids().await.is_empty());
}

#[tokio::test]
async fn test_vanished_client_is_pruned_by_the_sweep() {
    let desk = start_desktop(SwitchMode::Basic).await;
    let (_t1, g1, _first) = attach_remote(&desk, "stays").await;
    let (_t2, _g2, second) = attach_remote(&desk, "vanishes").await;
    second.vanish();

    // The first heartbeat after the peer vanished may still land in the OS
    // buffer; sweep until the failed send surfaces.
    let mut connected = Vec::new();
    for _ in 0..20 {
        connected = desk.desktop.connected_guids().await;
        if connected.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(connected, vec![g1]);
}

// ── Layout switching ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_layout_crossing_switches_target_and_places_both_cursors() {
    let mut desk = start_desktop(SwitchMode::Layout).await;
    let (_ticket, _guid, mut peer) = attach_remote(&desk, "right-neighbour").await;

    // Park the physical cursor near the right edge of the local screen.
    desk.desktop
        .mouse_move(MouseMoveEvent {
            dx: 0,
            dy: 0,
            x: 1910,
            y: 540,
        })
        .await;
    // Push over the edge into the remote placed at (1920, 0).
    desk.desktop
        .mouse_move(MouseMoveEvent {
            dx: 20,
            dy: 0,
            x: 1930,
            y: 540,
        })
        .await;

    assert_eq!(desk.expect_change().await, ActiveChanged::Remote);
    assert!(matches!(peer.next_body().await, ServerBody::SessionBegin { .. }));
    match peer.next_body().await {
        ServerBody::MouseMove { x, y } => {
            assert_eq!((x, y), (0, 540), "entry point on the remote's left edge");
        }
        other => panic!("expected the entry mouse move, got {other:?}"),
    }
    // The physical cursor was parked at the local exit point.
    assert!(desk
        .platform
        .injected_moves()
        .contains(&(1920, 540)));
}

#[tokio::test]
async fn test_layout_crossing_back_returns_to_local() {
    let mut desk = start_desktop(SwitchMode::Layout).await;
    let (_ticket, _guid, mut peer) = attach_remote(&desk, "right-neighbour").await;

    desk.desktop
        .mouse_move(MouseMoveEvent {
            dx: 0,
            dy: 0,
            x: 1910,
            y: 540,
        })
        .await;
    desk.desktop
        .mouse_move(MouseMoveEvent {
            dx: 20,
            dy: 0,
            x: 1930,
            y: 540,
        })
        .await;
    assert_eq!(desk.expect_change().await, ActiveChanged::Remote);
    assert!(matches!(peer.next_body().await, ServerBody::SessionBegin { .. }));
    assert!(matches!(peer.next_body().await, ServerBody::MouseMove { .. }));

    // Now drive left, back across the shared edge.
    desk.desktop
        .mouse_move(MouseMoveEvent {
            dx: -10,
            dy: 0,
            x: 1920,
            y: 540,
        })
        .await;

    assert_eq!(desk.expect_change().await, ActiveChanged::Local);
    // The remote saw its exit position, then the session close.
    match peer.next_body().await {
        ServerBody::MouseMove { x, y } => assert_eq!((x, y), (0, 540)),
        other => panic!("expected the exit mouse move, got {other:?}"),
    }
    assert!(matches!(peer.next_body().await, ServerBody::SessionEnd));
}

#[tokio::test]
async fn test_unallocated_area_does_not_switch() {
    let mut desk = start_desktop(SwitchMode::Layout).await;
    let (_ticket, _guid, _peer) = attach_remote(&desk, "right-neighbour").await;

    desk.desktop
        .mouse_move(MouseMoveEvent {
            dx: 0,
            dy: 0,
            x: 100,
            y: 1070,
        })
        .await;
    // Straight down into the dead space below the local screen.
    desk.desktop
        .mouse_move(MouseMoveEvent {
            dx: 0,
            dy: 50,
            x: 100,
            y: 1120,
        })
        .await;

    // Give the actor a moment; no active-target change may appear.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        desk.notify.try_recv().is_err(),
        "dead space between screens must not switch the active target"
    );
}
