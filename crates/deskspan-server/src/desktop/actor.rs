//! Single-consumer command queue in front of the desktop manager.
//!
//! Registry mutations, switching, and input forwarding are invoked from three
//! independent contexts: the accept loop, the health checker, and the input
//! router.  All of them go through a bounded command channel drained by one
//! task, which linearizes every manager operation without a lock.
//!
//! Enqueueing blocks the sender when the queue is full; mouse moves instead
//! give up after a short wait and drop, since a stale movement delta is worth
//! less than stalling the capture path.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use deskspan_core::domain::ticket::Ticket;

use crate::connection::ConnectedClient;
use crate::platform::{KeyEvent, MouseMoveEvent, RawMouseButton, RawScrollDirection};
use crate::router::Modifiers;

use super::manager::{DesktopManager, HotkeyAction};

/// Bound on pending desktop operations.
pub const COMMAND_QUEUE_DEPTH: usize = 300;

/// How long a mouse move may wait for a queue slot before it is dropped.
const MOUSE_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(300);

/// Commands drained by the desktop consumer task.
pub enum DesktopCommand {
    Reserve {
        ticket: Ticket,
        guid: Uuid,
        reply: oneshot::Sender<bool>,
    },
    Register {
        client: ConnectedClient,
    },
    Disconnect {
        ticket: Ticket,
    },
    DisconnectAll,
    Gesture {
        action: HotkeyAction,
    },
    Key {
        event: KeyEvent,
    },
    MouseMove {
        event: MouseMoveEvent,
    },
    MouseButton {
        button: RawMouseButton,
        pressed: bool,
    },
    MouseWheel {
        direction: RawScrollDirection,
        amount: i32,
    },
    ReleaseModifiers {
        modifiers: Modifiers,
    },
    HeartbeatSweep {
        reply: oneshot::Sender<bool>,
    },
    ConnectedGuids {
        reply: oneshot::Sender<Vec<Uuid>>,
    },
    Poison,
}

/// Cloneable sender half of the desktop command queue.
#[derive(Clone)]
pub struct DesktopHandle {
    tx: mpsc::Sender<DesktopCommand>,
}

impl DesktopHandle {
    /// Claims a (ticket, guid) pair; `false` means a collision was detected.
    pub async fn reserve(&self, ticket: Ticket, guid: Uuid) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(DesktopCommand::Reserve {
                ticket,
                guid,
                reply,
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn register(&self, client: ConnectedClient) {
        let _ = self.tx.send(DesktopCommand::Register { client }).await;
    }

    pub async fn disconnect(&self, ticket: Ticket) {
        let _ = self.tx.send(DesktopCommand::Disconnect { ticket }).await;
    }

    pub async fn disconnect_all(&self) {
        let _ = self.tx.send(DesktopCommand::DisconnectAll).await;
    }

    pub async fn gesture(&self, action: HotkeyAction) {
        let _ = self.tx.send(DesktopCommand::Gesture { action }).await;
    }

    pub async fn key_event(&self, event: KeyEvent) {
        let _ = self.tx.send(DesktopCommand::Key { event }).await;
    }

    /// Mouse moves arrive at hook rate; rather than stall the capture path on
    /// a congested queue, a move that cannot enqueue in time is dropped.
    pub async fn mouse_move(&self, event: MouseMoveEvent) {
        if self
            .tx
            .send_timeout(DesktopCommand::MouseMove { event }, MOUSE_ENQUEUE_TIMEOUT)
            .await
            .is_err()
        {
            debug!("mouse move dropped: desktop queue congested");
        }
    }

    pub async fn mouse_button(&self, button: RawMouseButton, pressed: bool) {
        let _ = self
            .tx
            .send(DesktopCommand::MouseButton { button, pressed })
            .await;
    }

    pub async fn mouse_wheel(&self, direction: RawScrollDirection, amount: i32) {
        let _ = self
            .tx
            .send(DesktopCommand::MouseWheel { direction, amount })
            .await;
    }

    pub async fn release_modifiers(&self, modifiers: Modifiers) {
        let _ = self
            .tx
            .send(DesktopCommand::ReleaseModifiers { modifiers })
            .await;
    }

    /// Issues a heartbeat sweep and returns the receiver for its outcome
    /// without waiting for it, so a caller can overlap the sweep with other
    /// work.
    pub async fn heartbeat_sweep_deferred(&self) -> oneshot::Receiver<bool> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DesktopCommand::HeartbeatSweep { reply }).await;
        rx
    }

    pub async fn connected_guids_deferred(&self) -> oneshot::Receiver<Vec<Uuid>> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DesktopCommand::ConnectedGuids { reply }).await;
        rx
    }

    pub async fn connected_guids(&self) -> Vec<Uuid> {
        self.connected_guids_deferred()
            .await
            .await
            .unwrap_or_default()
    }

    /// Ends the consumer task after the commands already queued.
    pub async fn poison(&self) {
        let _ = self.tx.send(DesktopCommand::Poison).await;
    }
}

/// Spawns the consumer task and returns its handle pair.
pub fn spawn(manager: DesktopManager) -> (DesktopHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let task = tokio::spawn(consume(manager, rx));
    (DesktopHandle { tx }, task)
}

async fn consume(mut manager: DesktopManager, mut rx: mpsc::Receiver<DesktopCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            DesktopCommand::Reserve {
                ticket,
                guid,
                reply,
            } => {
                let _ = reply.send(manager.try_reserve(ticket, guid));
            }
            DesktopCommand::Register { client } => manager.register(client),
            DesktopCommand::Disconnect { ticket } => manager.disconnect(ticket).await,
            DesktopCommand::DisconnectAll => manager.disconnect_all().await,
            DesktopCommand::Gesture { action } => manager.key_gesture(action).await,
            DesktopCommand::Key { event } => manager.on_key_event(event).await,
            DesktopCommand::MouseMove { event } => manager.on_mouse_move(event).await,
            DesktopCommand::MouseButton { button, pressed } => {
                manager.on_mouse_button(button, pressed).await
            }
            DesktopCommand::MouseWheel { direction, amount } => {
                manager.on_mouse_wheel(direction, amount).await
            }
            DesktopCommand::ReleaseModifiers { modifiers } => {
                manager.release_modifiers(modifiers).await
            }
            DesktopCommand::HeartbeatSweep { reply } => {
                let _ = reply.send(manager.heartbeat_sweep().await);
            }
            DesktopCommand::ConnectedGuids { reply } => {
                let _ = reply.send(manager.connected_guids().await);
            }
            DesktopCommand::Poison => break,
        }
    }
    debug!("desktop command consumer completed");
}
