//! Input routing strategy.
//!
//! The router sits between the raw input source and the desktop manager.
//! For every captured event it decides whether the event may also propagate
//! to the local OS (keep) or must be suppressed because a remote machine is
//! being driven (discard), detects the configured switch hotkeys, and
//! throttles duplicate switch triggers arriving from independent sources.
//!
//! Transitions exist because a switch can land in the middle of a chord:
//! until every tracked key and button is released again, the block table
//! stays in its transitional form so no key-up is ever swallowed on one side
//! and replayed on the other.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::debug;

use crate::desktop::{ActiveChanged, DesktopHandle, HotkeyAction};
use crate::platform::{KeyEvent, RawInputEvent, RawMouseButton};

/// Duplicate switch triggers inside this window are merged into one.
const THROTTLE_WINDOW: Duration = Duration::from_millis(150);

// Virtual-key codes for modifier tracking.
const VK_LSHIFT: u32 = 0xA0;
const VK_RSHIFT: u32 = 0xA1;
const VK_LCTRL: u32 = 0xA2;
const VK_RCTRL: u32 = 0xA3;
const VK_LALT: u32 = 0xA4;
const VK_RALT: u32 = 0xA5;
const VK_LMETA: u32 = 0x5B;
const VK_RMETA: u32 = 0x5C;

/// Who currently consumes raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Local,
    Remote,
    TransitionToLocal,
    TransitionToRemote,
}

/// Per-event verdict returned to the input-capture collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Let the event reach the local OS.
    Keep,
    /// Suppress local propagation; the event belongs to the remote target.
    Discard,
}

/// Modifier-key bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const SHIFT: Modifiers = Modifiers(1);
    pub const CTRL: Modifiers = Modifiers(2);
    pub const ALT: Modifiers = Modifiers(4);
    pub const META: Modifiers = Modifiers(8);

    pub fn with(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 | other.0)
    }

    pub fn has(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (flag, name) in [
            (Modifiers::CTRL, "Ctrl"),
            (Modifiers::ALT, "Alt"),
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::META, "Meta"),
        ] {
            if self.has(flag) {
                names.push(name);
            }
        }
        if names.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", names.join("+"))
        }
    }
}

/// One configured hotkey: a virtual key plus the modifiers that must be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGesture {
    pub vk: u32,
    pub modifiers: Modifiers,
}

/// The configured switch gestures.
#[derive(Debug, Clone, Copy)]
pub struct HotkeyBindings {
    pub switch_destination: KeyGesture,
    pub switch_to_server: KeyGesture,
    pub switch_mouse_mode: KeyGesture,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            // Ctrl+Alt+N cycles, Ctrl+Alt+H returns home, Ctrl+Alt+F1 flips
            // the mouse mode.
            switch_destination: KeyGesture {
                vk: 0x4E,
                modifiers: Modifiers::CTRL.with(Modifiers::ALT),
            },
            switch_to_server: KeyGesture {
                vk: 0x48,
                modifiers: Modifiers::CTRL.with(Modifiers::ALT),
            },
            switch_mouse_mode: KeyGesture {
                vk: 0x70,
                modifiers: Modifiers::CTRL.with(Modifiers::ALT),
            },
        }
    }
}

/// Merges switch triggers arriving from independent event sources within the
/// throttle window.
pub struct HotkeyThrottle {
    last_invocation: Option<Instant>,
}

impl HotkeyThrottle {
    pub fn new() -> Self {
        Self {
            last_invocation: None,
        }
    }

    /// Returns `true` when the caller may fire the gesture.
    pub fn try_invoke(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_invocation {
            if now.duration_since(last) < THROTTLE_WINDOW {
                return false;
            }
        }
        self.last_invocation = Some(now);
        true
    }
}

impl Default for HotkeyThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// Low-level pressed state, used both for gesture matching and for deciding
/// when a transition has drained.
#[derive(Default)]
struct PressedState {
    keys: HashSet<u32>,
    buttons: HashSet<RawMouseButton>,
}

impl PressedState {
    fn modifiers(&self) -> Modifiers {
        let mut modifiers = Modifiers::NONE;
        if self.keys.contains(&VK_LSHIFT) || self.keys.contains(&VK_RSHIFT) {
            modifiers = modifiers.with(Modifiers::SHIFT);
        }
        if self.keys.contains(&VK_LCTRL) || self.keys.contains(&VK_RCTRL) {
            modifiers = modifiers.with(Modifiers::CTRL);
        }
        if self.keys.contains(&VK_LALT) || self.keys.contains(&VK_RALT) {
            modifiers = modifiers.with(Modifiers::ALT);
        }
        if self.keys.contains(&VK_LMETA) || self.keys.contains(&VK_RMETA) {
            modifiers = modifiers.with(Modifiers::META);
        }
        modifiers
    }

    fn is_drained(&self) -> bool {
        self.keys.is_empty() && self.buttons.is_empty()
    }
}

/// The traffic controller for raw input.
pub struct Router {
    desktop: DesktopHandle,
    bindings: HotkeyBindings,
    throttle: HotkeyThrottle,
    strategy: Strategy,
    active_rx: mpsc::UnboundedReceiver<ActiveChanged>,
    pressed: PressedState,
}

impl Router {
    pub fn new(
        desktop: DesktopHandle,
        bindings: HotkeyBindings,
        active_rx: mpsc::UnboundedReceiver<ActiveChanged>,
    ) -> Self {
        Self {
            desktop,
            bindings,
            throttle: HotkeyThrottle::new(),
            strategy: Strategy::Local,
            active_rx,
            pressed: PressedState::default(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Processes one raw event: applies pending active-target changes,
    /// detects hotkeys, forwards the event, and answers keep/discard.
    pub async fn handle_event(&mut self, event: RawInputEvent) -> Decision {
        self.drain_active_changes();

        match event {
            RawInputEvent::Key(key) => self.handle_key(key).await,
            RawInputEvent::MouseMove(ev) => {
                self.try_end_transition();
                self.desktop.mouse_move(ev).await;
                match self.strategy {
                    Strategy::Local | Strategy::TransitionToLocal => Decision::Keep,
                    Strategy::Remote | Strategy::TransitionToRemote => Decision::Discard,
                }
            }
            RawInputEvent::MouseButton { button, pressed } => {
                self.try_end_transition();
                if pressed {
                    self.pressed.buttons.insert(button);
                } else {
                    self.pressed.buttons.remove(&button);
                }
                self.desktop.mouse_button(button, pressed).await;
                match self.strategy {
                    Strategy::Local | Strategy::TransitionToLocal => Decision::Keep,
                    Strategy::Remote => Decision::Discard,
                    // Mid-transition, button releases must still reach the
                    // local OS so no button stays logically stuck there.
                    Strategy::TransitionToRemote => {
                        if pressed {
                            Decision::Discard
                        } else {
                            Decision::Keep
                        }
                    }
                }
            }
            RawInputEvent::MouseWheel { direction, amount } => {
                self.desktop.mouse_wheel(direction, amount).await;
                match self.strategy {
                    Strategy::Local | Strategy::TransitionToLocal => Decision::Keep,
                    Strategy::Remote | Strategy::TransitionToRemote => Decision::Discard,
                }
            }
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) -> Decision {
        self.try_end_transition();

        if key.pressed {
            // Gesture matching sees the modifiers held *before* this event.
            let modifiers = self.pressed.modifiers();
            self.pressed.keys.insert(key.vk);

            if let Some(action) = self.match_gesture(key.vk, modifiers) {
                let fire = match action {
                    // Two event sources can report the cycle gesture; merge
                    // near-simultaneous triggers.
                    HotkeyAction::SwitchDestination => self.throttle.try_invoke(),
                    _ => true,
                };
                if fire {
                    // The active target should not keep phantom modifiers
                    // pressed across the switch.
                    self.desktop.release_modifiers(modifiers).await;
                    self.desktop.gesture(action).await;
                }
            }
        } else {
            self.pressed.keys.remove(&key.vk);
        }

        self.desktop.key_event(key).await;

        match self.strategy {
            Strategy::Local | Strategy::TransitionToLocal => Decision::Keep,
            Strategy::Remote => Decision::Discard,
            // Key-downs are blocked mid-transition but releases pass, so a
            // chord started locally can finish locally.
            Strategy::TransitionToRemote => {
                if key.pressed {
                    Decision::Discard
                } else {
                    Decision::Keep
                }
            }
        }
    }

    fn match_gesture(&self, vk: u32, modifiers: Modifiers) -> Option<HotkeyAction> {
        let candidates = [
            (self.bindings.switch_destination, HotkeyAction::SwitchDestination),
            (self.bindings.switch_to_server, HotkeyAction::SwitchToServer),
            (self.bindings.switch_mouse_mode, HotkeyAction::SwitchMouseMode),
        ];
        candidates
            .into_iter()
            .find(|(gesture, _)| gesture.vk == vk && modifiers.has(gesture.modifiers))
            .map(|(_, action)| action)
    }

    fn drain_active_changes(&mut self) {
        while let Ok(change) = self.active_rx.try_recv() {
            let next = match (self.strategy, change) {
                (Strategy::Local | Strategy::TransitionToLocal, ActiveChanged::Local) => {
                    self.strategy
                }
                (_, ActiveChanged::Local) => Strategy::TransitionToLocal,
                (Strategy::Remote | Strategy::TransitionToRemote, ActiveChanged::Remote) => {
                    self.strategy
                }
                (_, ActiveChanged::Remote) => Strategy::TransitionToRemote,
            };
            if next != self.strategy {
                debug!("traffic strategy: {next:?}");
                self.strategy = next;
            }
        }
    }

    /// A transition ends once every tracked key and button is released.
    fn try_end_transition(&mut self) {
        if !self.pressed.is_drained() {
            return;
        }
        let next = match self.strategy {
            Strategy::TransitionToLocal => Strategy::Local,
            Strategy::TransitionToRemote => Strategy::Remote,
            steady => steady,
        };
        if next != self.strategy {
            debug!("traffic strategy: {next:?}");
            self.strategy = next;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
