//! The desktop manager: client registry, active-target switching, and input
//! forwarding, serialized behind a single-consumer command queue.

pub mod actor;
pub mod manager;
pub mod target;

pub use actor::{spawn, DesktopCommand, DesktopHandle, COMMAND_QUEUE_DEPTH};
pub use manager::{ActiveChanged, DesktopManager, HotkeyAction, SwitchMode};
pub use target::{LocalTarget, RemoteTarget, Target};
