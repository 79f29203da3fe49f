//! TOML-based server settings.
//!
//! Settings live next to the binary in `deskspan_server.toml`.  A missing
//! file is generated with defaults (including a random numeric password); a
//! file that parses but fails validation is reported and replaced by the
//! defaults for this run, leaving the file untouched for the operator to fix.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::desktop::SwitchMode;
use crate::router::{HotkeyBindings, KeyGesture, Modifiers};

/// Default settings file name, resolved relative to the working directory.
pub const SETTINGS_PATH: &str = "deskspan_server.toml";

/// Errors raised when persisting settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error accessing configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// One configurable key chord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    #[serde(default)]
    pub windows: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    /// A single letter or digit.
    pub key: String,
}

impl Shortcut {
    /// Resolves the chord into a gesture, falling back to `default` when the
    /// key name is not a single letter or digit.
    pub fn to_gesture(&self, default: KeyGesture) -> KeyGesture {
        let vk = match self.key.chars().next() {
            Some(c) if self.key.chars().count() == 1 && c.is_ascii_alphanumeric() => {
                c.to_ascii_uppercase() as u32
            }
            _ => {
                error!(
                    "configuration file is not valid: '{}' is not a single letter or digit",
                    self.key
                );
                return default;
            }
        };
        let mut modifiers = Modifiers::NONE;
        if self.windows {
            modifiers = modifiers.with(Modifiers::META);
        }
        if self.shift {
            modifiers = modifiers.with(Modifiers::SHIFT);
        }
        if self.ctrl {
            modifiers = modifiers.with(Modifiers::CTRL);
        }
        if self.alt {
            modifiers = modifiers.with(Modifiers::ALT);
        }
        KeyGesture { vk, modifiers }
    }
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Connection password; compared verbatim during the handshake.
    #[serde(default = "default_password")]
    pub password: String,
    /// TCP listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Switching policy: `"basic"` or `"layout"`.
    #[serde(default = "default_mode")]
    pub mode: SwitchMode,
    #[serde(default = "default_switch_screens")]
    pub switch_screens: Shortcut,
    #[serde(default = "default_switch_home")]
    pub switch_home: Shortcut,
}

fn default_password() -> String {
    let mut rng = rand::thread_rng();
    (0..4).map(|_| rng.gen_range(0..10).to_string()).collect()
}

fn default_port() -> u16 {
    8888
}

fn default_mode() -> SwitchMode {
    SwitchMode::Basic
}

fn default_switch_screens() -> Shortcut {
    Shortcut {
        windows: false,
        shift: false,
        ctrl: true,
        alt: true,
        key: "N".to_string(),
    }
}

fn default_switch_home() -> Shortcut {
    Shortcut {
        windows: false,
        shift: false,
        ctrl: true,
        alt: true,
        key: "H".to_string(),
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            password: default_password(),
            port: default_port(),
            mode: default_mode(),
            switch_screens: default_switch_screens(),
            switch_home: default_switch_home(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, generating and persisting defaults when
    /// the file does not exist.  Never fails: invalid content is reported and
    /// replaced by defaults for this run.
    pub fn load_or_default(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str::<Settings>(&text) {
                Ok(settings) => {
                    let problems = settings.validation_problems();
                    if problems.is_empty() {
                        return settings;
                    }
                    for problem in problems {
                        warn!("configuration file is not valid: {problem}");
                    }
                    warn!("falling back to the default configuration");
                    Settings::default()
                }
                Err(e) => {
                    error!("failed to parse configuration ({}): {e}", path.display());
                    Settings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Settings::default();
                if let Err(e) = settings.save(path) {
                    error!("could not save the generated configuration: {e}");
                } else {
                    info!("generated default configuration: {}", path.display());
                }
                settings
            }
            Err(e) => {
                error!("failed to read configuration ({}): {e}", path.display());
                Settings::default()
            }
        }
    }

    /// Persists the settings as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on serialization or file-system failure.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// All validation problems, empty when the settings are usable.
    pub fn validation_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.password.len() < 4 {
            problems.push("the password must be at least 4 characters long".to_string());
        }
        // Ports below 1024 need elevation; above 49151 is the ephemeral range.
        if !(1024..=49151).contains(&self.port) {
            problems.push(format!(
                "value for port must be between 1024 and 49151, got {}",
                self.port
            ));
        }
        for (name, shortcut) in [
            ("switch_screens", &self.switch_screens),
            ("switch_home", &self.switch_home),
        ] {
            let key_ok = shortcut.key.chars().count() == 1
                && shortcut.key.chars().all(|c| c.is_ascii_alphanumeric());
            if !key_ok {
                problems.push(format!(
                    "{name}.key must be a single letter or digit, got '{}'",
                    shortcut.key
                ));
            }
        }
        problems
    }

    /// Resolves the configured chords into router bindings.
    pub fn hotkey_bindings(&self) -> HotkeyBindings {
        let defaults = HotkeyBindings::default();
        HotkeyBindings {
            switch_destination: self.switch_screens.to_gesture(defaults.switch_destination),
            switch_to_server: self.switch_home.to_gesture(defaults.switch_to_server),
            switch_mouse_mode: defaults.switch_mouse_mode,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
