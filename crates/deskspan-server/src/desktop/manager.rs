//! Registry and active-target state machine.
//!
//! Owns every controllable target (the local machine plus all connected
//! remotes), tracks which one is active, and performs hotkey- and
//! layout-driven switching.  All methods are invoked from the single command
//! consumer in [`crate::desktop::actor`], which is the mutual-exclusion
//! domain for this state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use deskspan_core::domain::geometry::{Delta, LayoutPoint, LocalPoint, Rect};
use deskspan_core::domain::layout::{DesktopLayout, MoveClassification};
use deskspan_core::domain::ticket::Ticket;
use deskspan_core::protocol::messages::ClipboardContent;

use crate::connection::ConnectedClient;
use crate::platform::{
    ClipboardProvider, InputInjector, KeyEvent, MouseMoveEvent, RawMouseButton,
    RawScrollDirection, ScreenInfoProvider,
};
use crate::router::Modifiers;

use super::target::{LocalTarget, RemoteTarget, Target};

/// Switching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchMode {
    /// Cyclic switching by hotkey only.
    Basic,
    /// Geometric placement with edge-crossing detection.
    Layout,
}

/// Active-target change notification sent to the input router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveChanged {
    Local,
    Remote,
}

/// Hotkey-driven actions the manager understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    SwitchToServer,
    SwitchDestination,
    SwitchMouseMode,
}

pub struct DesktopManager {
    /// `targets[0]` is always the local machine.
    targets: Vec<Target>,
    active: Ticket,
    mode: SwitchMode,
    layout: Option<DesktopLayout>,
    global_clipboard: Option<ClipboardContent>,
    /// (ticket, guid) pairs claimed by handshakes that have not attached
    /// their session yet.
    reservations: Vec<(Ticket, Uuid)>,
    notify: mpsc::UnboundedSender<ActiveChanged>,
}

impl DesktopManager {
    pub fn new(
        mode: SwitchMode,
        clipboard: Arc<dyn ClipboardProvider>,
        injector: Arc<dyn InputInjector>,
        screens: &dyn ScreenInfoProvider,
        notify: mpsc::UnboundedSender<ActiveChanged>,
    ) -> Self {
        let layout = match mode {
            SwitchMode::Basic => None,
            SwitchMode::Layout => {
                let rects = screens
                    .list_screens()
                    .into_iter()
                    .map(|s| Rect::new(LayoutPoint::new(s.x, s.y), s.width, s.height))
                    .collect();
                Some(DesktopLayout::new(Ticket::LOCAL, rects))
            }
        };
        info!("mode: {mode:?}");
        Self {
            targets: vec![Target::Local(LocalTarget::new(clipboard, injector))],
            active: Ticket::LOCAL,
            mode,
            layout,
            global_clipboard: None,
            reservations: Vec::new(),
            notify,
        }
    }

    pub fn active_ticket(&self) -> Ticket {
        self.active
    }

    pub fn mode(&self) -> SwitchMode {
        self.mode
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Claims a (ticket, guid) pair ahead of registration.
    ///
    /// Refusal means the gatekeeper raced another handshake; it echoes an
    /// `Unknown` rejection to the peer.
    pub fn try_reserve(&mut self, ticket: Ticket, guid: Uuid) -> bool {
        let duplicate = self
            .targets
            .iter()
            .any(|t| t.ticket() == ticket || t.guid() == guid)
            || self
                .reservations
                .iter()
                .any(|(t, g)| *t == ticket || *g == guid);
        if duplicate {
            error!("client rejected due to a non-unique ticket({ticket}) or guid");
            return false;
        }
        self.reservations.push((ticket, guid));
        true
    }

    /// Attaches an accepted client as a controllable target.
    pub fn register(&mut self, client: ConnectedClient) {
        match self
            .reservations
            .iter()
            .position(|(t, g)| *t == client.ticket && *g == client.info.guid)
        {
            Some(index) => {
                self.reservations.remove(index);
            }
            None => {
                // The gatekeeper reserves before registering; reaching this
                // point is a bug upstream, not a recoverable condition.
                error!(
                    "registration without reservation for ticket {}; client dropped",
                    client.ticket
                );
                return;
            }
        }

        if let Some(layout) = &mut self.layout {
            match layout.place_remote(client.ticket, client.info.width as u32, client.info.height as u32)
            {
                Ok(origin) => debug!(
                    "client[{}] initial layout position: {}x{}",
                    client.ticket, origin.x, origin.y
                ),
                Err(e) => {
                    error!("layout placement failed: {e}; client dropped");
                    return;
                }
            }
        }

        let guid = client.info.guid;
        let ticket = client.ticket;
        self.targets.push(Target::Remote(RemoteTarget::new(client)));
        info!(
            "new client: \"{guid}\"[{ticket}]; connected clients: {}",
            self.targets.len() - 1
        );
    }

    /// Removes a target, falling back to the local machine first when the
    /// removed target is the active one.  An already-removed ticket is not an
    /// error.
    pub async fn disconnect(&mut self, ticket: Ticket) {
        if ticket == Ticket::LOCAL {
            return;
        }
        if self.active == ticket {
            self.switch(Ticket::LOCAL).await;
        }
        match self.targets.iter().position(|t| t.ticket() == ticket) {
            None => warn!("disconnect({ticket}) failed: not registered"),
            Some(index) => {
                let removed = self.targets.remove(index);
                if let Some(layout) = &mut self.layout {
                    if let Err(e) = layout.remove(ticket) {
                        error!("layout removal failed: {e}");
                    }
                }
                info!(
                    "client {}[{ticket}] disconnected; connected clients: {}",
                    removed.name(),
                    self.targets.len() - 1
                );
            }
        }
    }

    pub async fn disconnect_all(&mut self) {
        self.reservations.clear();
        let remotes: Vec<Ticket> = self
            .targets
            .iter()
            .filter(|t| !t.is_local())
            .map(Target::ticket)
            .collect();
        for ticket in remotes {
            self.disconnect(ticket).await;
        }
    }

    // ── Switching ─────────────────────────────────────────────────────────────

    /// Two-phase active-target switch with clipboard handoff.
    pub async fn switch(&mut self, to: Ticket) {
        if to == self.active {
            // Re-assert the local strategy so the router can recover even
            // when no actual switch happens.
            let _ = self.notify.send(ActiveChanged::Local);
            return;
        }
        let Some(new_index) = self.targets.iter().position(|t| t.ticket() == to) else {
            error!("switch to unknown target {to}; active target unchanged");
            return;
        };

        let old_index = self.active_index();
        if let Some(clipboard) = self.targets[old_index].on_deactivate().await {
            debug!("global clipboard length: {}", clipboard.content.len());
            self.global_clipboard = Some(clipboard);
        }

        let change = if self.targets[new_index].is_local() {
            ActiveChanged::Local
        } else {
            ActiveChanged::Remote
        };
        let _ = self.notify.send(change);
        self.active = to;

        let clipboard = self.global_clipboard.clone();
        self.targets[new_index].on_activate(clipboard.as_ref()).await;
        info!("{}[{to}]", self.targets[new_index].name());
    }

    pub async fn key_gesture(&mut self, action: HotkeyAction) {
        debug!("pressed hotkey {action:?}");
        match action {
            HotkeyAction::SwitchToServer => self.switch(Ticket::LOCAL).await,
            HotkeyAction::SwitchDestination => {
                let next = self.next_in_ring();
                self.switch(next).await;
            }
            HotkeyAction::SwitchMouseMode => {
                let index = self.active_index();
                self.targets[index].toggle_mouse_mode().await;
            }
        }
    }

    /// Walks the ring [local, r1, …, rn, local]: the next target after the
    /// last remote is the local machine again.
    fn next_in_ring(&self) -> Ticket {
        if self.targets.len() == 1 {
            return Ticket::LOCAL;
        }
        let index = self.active_index();
        let next = (index + 1) % self.targets.len();
        self.targets[next].ticket()
    }

    fn active_index(&self) -> usize {
        match self.targets.iter().position(|t| t.ticket() == self.active) {
            Some(index) => index,
            None => {
                // The active ticket always refers to a registered target;
                // fall back to local rather than corrupt state further.
                error!("active ticket {} missing from registry", self.active);
                0
            }
        }
    }

    // ── Input forwarding ──────────────────────────────────────────────────────

    pub async fn on_mouse_move(&mut self, event: MouseMoveEvent) {
        enum Action {
            Forward,
            Cross {
                target: Ticket,
                exit: LocalPoint,
                entry: LocalPoint,
            },
        }

        let action = match &self.layout {
            None => Action::Forward,
            Some(layout) => {
                let cursor = self.targets[self.active_index()].cursor_position();
                match layout.to_layout(self.active, cursor) {
                    None => Action::Forward,
                    Some(previous) => {
                        let delta = Delta::new(event.dx, event.dy);
                        match layout.classify_move(self.active, previous, delta) {
                            MoveClassification::InsideActiveArea
                            | MoveClassification::UnallocatedArea => Action::Forward,
                            MoveClassification::Crossing {
                                kind,
                                target,
                                exit,
                                entry,
                            } => {
                                debug!("edge crossing: {kind:?} into {target}");
                                let exit = layout.to_local(self.active, exit).unwrap_or(cursor);
                                let entry = layout
                                    .to_local(target, entry)
                                    .unwrap_or(LocalPoint::new(0, 0));
                                Action::Cross {
                                    target,
                                    exit,
                                    entry,
                                }
                            }
                        }
                    }
                }
            }
        };

        match action {
            Action::Forward => self.forward_mouse_move(event).await,
            Action::Cross {
                target,
                exit,
                entry,
            } => {
                let index = self.active_index();
                self.targets[index].place_cursor(exit).await;
                self.switch(target).await;
                let index = self.active_index();
                self.targets[index].place_cursor(entry).await;
            }
        }
    }

    async fn forward_mouse_move(&mut self, event: MouseMoveEvent) {
        let index = self.active_index();
        match &mut self.targets[index] {
            // The OS moved the physical cursor already; only track it.
            Target::Local(local) => local.track_cursor(event.x, event.y),
            Target::Remote(remote) => {
                remote.mouse_move(Delta::new(event.dx, event.dy)).await;
            }
        }
    }

    pub async fn on_mouse_button(&mut self, button: RawMouseButton, pressed: bool) {
        let index = self.active_index();
        self.targets[index].mouse_click(button, pressed).await;
    }

    pub async fn on_mouse_wheel(&mut self, direction: RawScrollDirection, amount: i32) {
        let index = self.active_index();
        self.targets[index].mouse_wheel(direction, amount).await;
    }

    pub async fn on_key_event(&mut self, event: KeyEvent) {
        let index = self.active_index();
        self.targets[index].key_event(event).await;
    }

    pub async fn release_modifiers(&mut self, modifiers: Modifiers) {
        let index = self.active_index();
        self.targets[index].release_modifiers(modifiers).await;
    }

    // ── Health ────────────────────────────────────────────────────────────────

    /// Probes every remote and disconnects the unreachable ones.
    ///
    /// Returns whether at least one remote target remains.
    pub async fn heartbeat_sweep(&mut self) -> bool {
        let mut unreachable = Vec::new();
        for target in self.targets.iter_mut().filter(|t| !t.is_local()) {
            if !target.heartbeat().await {
                unreachable.push(target.ticket());
            }
        }
        for ticket in unreachable {
            debug!("client [{ticket}] is considered unreachable");
            self.disconnect(ticket).await;
        }
        self.targets.len() > 1
    }

    /// Sweeps, then reports the GUIDs of every still-reachable remote.  This
    /// feeds the gatekeeper's collision snapshot.
    pub async fn connected_guids(&mut self) -> Vec<Uuid> {
        self.heartbeat_sweep().await;
        self.targets
            .iter()
            .filter(|t| !t.is_local())
            .map(Target::guid)
            .collect()
    }
}
