//! Controllable targets: the machines input can be routed to.
//!
//! A [`Target`] is a closed tagged variant over the local machine and one
//! connected remote.  The registry stays homogeneous without trait objects,
//! and every capability dispatches with a plain `match`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use deskspan_core::domain::geometry::{Delta, LocalPoint};
use deskspan_core::domain::ticket::Ticket;
use deskspan_core::domain::validation::ClientValidInfo;
use deskspan_core::keymap::layout_independent_vk;
use deskspan_core::protocol::messages::{
    Button, ClientBody, ClipboardContent, OsFamily, Request, ScrollDirection,
};

use crate::connection::factory::MessageFactory;
use crate::connection::transport::CommunicationLayer;
use crate::connection::ConnectedClient;
use crate::platform::{
    ClipboardProvider, InputInjector, KeyEvent, RawMouseButton, RawScrollDirection,
};
use crate::router::Modifiers;

/// Relative mouse deltas are grouped and flushed at most this often, bounding
/// the wire rate at 125 events per second.
const MOVE_GROUPING_INTERVAL: Duration = Duration::from_millis(8);

/// AltGr arrives as a synthetic left-Ctrl whose scan code is not the physical
/// LCtrl key; forwarding it would stick a phantom Ctrl on the client.
const LCTRL_VK: u32 = 0xA2;
const LCTRL_SCAN: u32 = 0x1D;

/// A machine capable of receiving routed input.
pub enum Target {
    Local(LocalTarget),
    Remote(RemoteTarget),
}

impl Target {
    pub fn ticket(&self) -> Ticket {
        match self {
            Target::Local(_) => Ticket::LOCAL,
            Target::Remote(remote) => remote.ticket,
        }
    }

    pub fn guid(&self) -> Uuid {
        match self {
            Target::Local(local) => local.guid,
            Target::Remote(remote) => remote.info.guid,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Target::Local(local) => &local.name,
            Target::Remote(remote) => &remote.info.name,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Target::Local(_))
    }

    pub fn cursor_position(&self) -> LocalPoint {
        match self {
            Target::Local(local) => local.cursor,
            Target::Remote(remote) => remote.cursor,
        }
    }

    pub async fn mouse_click(&mut self, button: RawMouseButton, pressed: bool) {
        if let Target::Remote(remote) = self {
            remote.mouse_click(button, pressed).await;
        }
    }

    pub async fn mouse_wheel(&mut self, direction: RawScrollDirection, amount: i32) {
        if let Target::Remote(remote) = self {
            remote.mouse_wheel(direction, amount).await;
        }
    }

    pub async fn key_event(&mut self, event: KeyEvent) {
        if let Target::Remote(remote) = self {
            remote.key_event(event).await;
        }
    }

    /// Positions the cursor absolutely, used when the cursor crosses a zone
    /// boundary in layout mode.
    pub async fn place_cursor(&mut self, point: LocalPoint) {
        match self {
            Target::Local(local) => local.place_cursor(point),
            Target::Remote(remote) => remote.place_cursor(point).await,
        }
    }

    /// Flushes the outgoing session state and reports the clipboard payload
    /// when it changed while this target was active.
    pub async fn on_deactivate(&mut self) -> Option<ClipboardContent> {
        match self {
            Target::Local(local) => local.on_deactivate(),
            Target::Remote(remote) => remote.on_deactivate().await,
        }
    }

    /// Starts an input session on this target, pushing the shared clipboard
    /// when one is carried over.
    pub async fn on_activate(&mut self, clipboard: Option<&ClipboardContent>) {
        match self {
            Target::Local(local) => local.on_activate(clipboard),
            Target::Remote(remote) => remote.on_activate(clipboard).await,
        }
    }

    pub async fn toggle_mouse_mode(&mut self) {
        if let Target::Remote(remote) = self {
            remote.toggle_mouse_mode().await;
        }
    }

    pub async fn release_modifiers(&mut self, modifiers: Modifiers) {
        if let Target::Remote(remote) = self {
            remote.release_modifiers(modifiers).await;
        }
    }

    /// Probes whether this target can still receive messages.
    pub async fn heartbeat(&mut self) -> bool {
        match self {
            Target::Local(_) => true,
            Target::Remote(remote) => remote.heartbeat().await,
        }
    }
}

// ── Local machine ─────────────────────────────────────────────────────────────

/// The server's own machine.  Input events that stay local were already
/// applied by the OS, so most capabilities reduce to cursor bookkeeping and
/// clipboard handoff.
pub struct LocalTarget {
    guid: Uuid,
    name: String,
    cursor: LocalPoint,
    clipboard: Arc<dyn ClipboardProvider>,
    injector: Arc<dyn InputInjector>,
    /// What the server last pushed onto the local clipboard, used to detect
    /// locally made changes on deactivation.
    pushed: Option<ClipboardContent>,
}

impl LocalTarget {
    pub fn new(clipboard: Arc<dyn ClipboardProvider>, injector: Arc<dyn InputInjector>) -> Self {
        let name = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
        Self {
            guid: Uuid::new_v4(),
            name,
            cursor: LocalPoint::new(100, 100),
            clipboard,
            injector,
            pushed: None,
        }
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    /// Records the physical cursor position reported by the hook.
    pub fn track_cursor(&mut self, x: i32, y: i32) {
        self.cursor = LocalPoint::new(x, y);
    }

    fn place_cursor(&mut self, point: LocalPoint) {
        self.cursor = point;
        self.injector.inject_mouse_move(point.x, point.y);
    }

    fn on_deactivate(&mut self) -> Option<ClipboardContent> {
        let current = self.clipboard.get();
        if current.is_some() && current != self.pushed {
            return current;
        }
        None
    }

    fn on_activate(&mut self, clipboard: Option<&ClipboardContent>) {
        if let Some(content) = clipboard {
            self.clipboard.set(content);
            debug!("clipboard content length: {}", content.content.len());
            self.pushed = Some(content.clone());
        }
    }
}

// ── Remote machine ────────────────────────────────────────────────────────────

/// A connected client, owning its transport session for the lifetime of the
/// registration.
pub struct RemoteTarget {
    layer: CommunicationLayer,
    info: ClientValidInfo,
    ticket: Ticket,
    cursor: LocalPoint,
    relative_mouse: bool,
    grouped: Delta,
    last_move_sent: Instant,
    factory: MessageFactory,
}

impl RemoteTarget {
    pub fn new(client: ConnectedClient) -> Self {
        let cursor = client.info.cursor;
        Self {
            layer: client.layer,
            info: client.info,
            ticket: client.ticket,
            cursor,
            relative_mouse: true,
            grouped: Delta::default(),
            last_move_sent: Instant::now(),
            factory: MessageFactory::new(),
        }
    }

    pub fn os(&self) -> OsFamily {
        self.info.os
    }

    /// Forwards a mouse delta, grouping relative moves to the polling-rate
    /// budget and clamping absolute moves to the remote's screen.
    pub async fn mouse_move(&mut self, delta: Delta) {
        self.track(delta);
        if self.relative_mouse {
            self.grouped = self.grouped.add(delta);
            if self.last_move_sent.elapsed() > MOVE_GROUPING_INTERVAL {
                let grouped = self.grouped;
                self.layer
                    .try_send(&self.factory.mouse_move(grouped.dx, grouped.dy))
                    .await;
                self.grouped = Delta::default();
                self.last_move_sent = Instant::now();
            }
        } else {
            let cursor = self.cursor;
            self.layer
                .try_send(&self.factory.mouse_move(cursor.x, cursor.y))
                .await;
        }
    }

    fn track(&mut self, delta: Delta) {
        let x = (self.cursor.x + delta.dx).clamp(0, self.info.width - 1);
        let y = (self.cursor.y + delta.dy).clamp(0, self.info.height - 1);
        self.cursor = LocalPoint::new(x, y);
    }

    async fn place_cursor(&mut self, point: LocalPoint) {
        let x = point.x.clamp(0, self.info.width - 1);
        let y = point.y.clamp(0, self.info.height - 1);
        self.cursor = LocalPoint::new(x, y);
        self.layer.try_send(&self.factory.mouse_move(x, y)).await;
    }

    async fn mouse_click(&mut self, button: RawMouseButton, pressed: bool) {
        let button = match button {
            RawMouseButton::Left => Button::Left,
            RawMouseButton::Right => Button::Right,
            RawMouseButton::Middle => Button::Middle,
            RawMouseButton::X1 => Button::X1,
            RawMouseButton::X2 => Button::X2,
        };
        self.layer
            .try_send(&self.factory.mouse_click(button, pressed))
            .await;
    }

    async fn mouse_wheel(&mut self, direction: RawScrollDirection, amount: i32) {
        if amount == 0 {
            return;
        }
        let direction = match direction {
            RawScrollDirection::Up => ScrollDirection::Up,
            RawScrollDirection::Down => ScrollDirection::Down,
            RawScrollDirection::Left => ScrollDirection::Left,
            RawScrollDirection::Right => ScrollDirection::Right,
        };
        self.layer
            .try_send(&self.factory.mouse_wheel(direction, amount))
            .await;
    }

    async fn key_event(&mut self, event: KeyEvent) {
        if event.vk == LCTRL_VK && event.scan_code != LCTRL_SCAN {
            debug!("dropping AltGr companion Ctrl event");
            return;
        }
        let key = layout_independent_vk(event.scan_code, event.vk, event.extended);
        self.layer
            .try_send(&self.factory.keyboard(key, event.pressed))
            .await;
    }

    /// Collects the remote clipboard, ends the session, and reports whether
    /// the shared clipboard payload changed.
    async fn on_deactivate(&mut self) -> Option<ClipboardContent> {
        let response = self.layer.request(Request::Clipboard).await;
        let clipboard = match response.map(|r| r.body) {
            Some(ClientBody::Clipboard(content)) if !content.content.is_empty() => Some(content),
            Some(ClientBody::NoData { reason }) => {
                debug!("client reported no clipboard access: {reason}");
                None
            }
            _ => None,
        };
        self.layer.try_send(&self.factory.session_end()).await;
        clipboard
    }

    async fn on_activate(&mut self, clipboard: Option<&ClipboardContent>) {
        self.layer
            .try_send(&self.factory.session_begin(self.relative_mouse))
            .await;
        if let Some(content) = clipboard {
            self.layer
                .try_send(&self.factory.clipboard(content.clone()))
                .await;
        }
    }

    /// Flips between relative and absolute movement; the remote hears it as
    /// a session restart with the new mode.
    async fn toggle_mouse_mode(&mut self) {
        self.layer.try_send(&self.factory.session_end()).await;
        self.relative_mouse = !self.relative_mouse;
        self.layer
            .try_send(&self.factory.session_begin(self.relative_mouse))
            .await;
    }

    async fn release_modifiers(&mut self, modifiers: Modifiers) {
        debug!("release modifiers: {modifiers}");
        // Left/right virtual-key pairs per modifier.
        const PAIRS: [(Modifiers, [u32; 2]); 4] = [
            (Modifiers::META, [0x5B, 0x5C]),
            (Modifiers::CTRL, [0xA2, 0xA3]),
            (Modifiers::ALT, [0xA4, 0xA5]),
            (Modifiers::SHIFT, [0xA0, 0xA1]),
        ];
        for (flag, keys) in PAIRS {
            if modifiers.has(flag) {
                for key in keys {
                    self.layer.try_send(&self.factory.keyboard(key, false)).await;
                }
            }
        }
    }

    async fn heartbeat(&mut self) -> bool {
        // The peek catches a vanished peer before the send would succeed
        // into the OS buffer and mask the death for one more sweep.
        if !self.layer.is_alive().await {
            return false;
        }
        self.layer.try_send(&self.factory.heartbeat()).await
    }
}
