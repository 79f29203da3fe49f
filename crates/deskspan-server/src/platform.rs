//! Collaborator interfaces to the operating system.
//!
//! The connection and routing core never talks to the OS directly.  Raw input
//! capture, input injection, monitor geometry, and clipboard access are
//! consumed through the traits below; real hook-based implementations live
//! outside this crate, and [`MockPlatform`] serves tests and headless runs.

use std::sync::Mutex;

use deskspan_core::protocol::messages::ClipboardContent;

// ── Raw input events ──────────────────────────────────────────────────────────

/// Physical mouse button as reported by the input hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawMouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

/// Scroll direction as reported by the input hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// One keyboard event from the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Layout-dependent virtual-key code.
    pub vk: u32,
    /// Hardware scan code identifying the physical key position.
    pub scan_code: u32,
    /// Extended-key flag (keypad Enter, right-side modifiers, …).
    pub extended: bool,
    pub pressed: bool,
}

/// One mouse movement from the hook, carrying both the delta and the
/// resulting absolute position on the server's own screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseMoveEvent {
    pub dx: i32,
    pub dy: i32,
    pub x: i32,
    pub y: i32,
}

/// A raw event emitted by the input-capture collaborator.  The router answers
/// each one with a keep/discard decision that controls whether the event also
/// reaches the local OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInputEvent {
    Key(KeyEvent),
    MouseMove(MouseMoveEvent),
    MouseButton { button: RawMouseButton, pressed: bool },
    MouseWheel { direction: RawScrollDirection, amount: i32 },
}

// ── Collaborator traits ───────────────────────────────────────────────────────

/// One physical monitor attached to the local machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenBounds {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// Read/write access to the local clipboard.
pub trait ClipboardProvider: Send + Sync {
    fn get(&self) -> Option<ClipboardContent>;
    fn set(&self, content: &ClipboardContent);
}

/// Monitor geometry discovery.
pub trait ScreenInfoProvider: Send + Sync {
    fn list_screens(&self) -> Vec<ScreenBounds>;
}

/// Synthetic input injection on the local machine.
pub trait InputInjector: Send + Sync {
    fn inject_mouse_move(&self, x: i32, y: i32);
    fn inject_key(&self, vk: u32, pressed: bool);
}

// ── Mock implementation ───────────────────────────────────────────────────────

/// In-memory platform double for tests and headless runs.
pub struct MockPlatform {
    clipboard: Mutex<Option<ClipboardContent>>,
    screens: Vec<ScreenBounds>,
    injected_moves: Mutex<Vec<(i32, i32)>>,
    injected_keys: Mutex<Vec<(u32, bool)>>,
}

impl MockPlatform {
    /// A platform with a single primary monitor of the given size at (0, 0).
    pub fn with_primary_screen(width: u32, height: u32) -> Self {
        Self {
            clipboard: Mutex::new(None),
            screens: vec![ScreenBounds {
                name: "mock-primary".to_string(),
                x: 0,
                y: 0,
                width,
                height,
                is_primary: true,
            }],
            injected_moves: Mutex::new(Vec::new()),
            injected_keys: Mutex::new(Vec::new()),
        }
    }

    pub fn injected_moves(&self) -> Vec<(i32, i32)> {
        self.injected_moves.lock().unwrap().clone()
    }

    pub fn injected_keys(&self) -> Vec<(u32, bool)> {
        self.injected_keys.lock().unwrap().clone()
    }
}

impl ClipboardProvider for MockPlatform {
    fn get(&self) -> Option<ClipboardContent> {
        self.clipboard.lock().unwrap().clone()
    }

    fn set(&self, content: &ClipboardContent) {
        *self.clipboard.lock().unwrap() = Some(content.clone());
    }
}

impl ScreenInfoProvider for MockPlatform {
    fn list_screens(&self) -> Vec<ScreenBounds> {
        self.screens.clone()
    }
}

impl InputInjector for MockPlatform {
    fn inject_mouse_move(&self, x: i32, y: i32) {
        self.injected_moves.lock().unwrap().push((x, y));
    }

    fn inject_key(&self, vk: u32, pressed: bool) {
        self.injected_keys.lock().unwrap().push((vk, pressed));
    }
}
