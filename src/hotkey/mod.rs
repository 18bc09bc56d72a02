//! Global hotkeys bound to display profiles.

pub mod backend;
pub mod keys;
pub mod manager;
pub mod persistence;
pub mod registration;
#[cfg(windows)]
pub mod windows;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use backend::{BackendError, HotkeyBackend, MemoryBackend, OwnerHandle, SlotId};
pub use keys::Key;
pub use manager::{BindingChange, HotkeyBinding, HotkeyManager};
pub use registration::{HotkeyRegistration, Registrar, RegistrationError, SharedRegistrar};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChordParseError {
    #[error("hotkey is empty")]
    Empty,
    #[error("hotkey has no key, only modifiers")]
    MissingKey,
    #[error("hotkey has more than one key ('{0}' and '{1}')")]
    MultipleKeys(String, String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
}

/// Modifier keys held together with the primary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const CTRL_ALT: Modifiers = Modifiers {
        ctrl: true,
        alt: true,
        shift: false,
        meta: false,
    };

    pub fn any(&self) -> bool {
        self.ctrl || self.alt || self.shift || self.meta
    }

    /// Names in display order.
    fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.ctrl {
            names.push("Ctrl");
        }
        if self.alt {
            names.push("Alt");
        }
        if self.shift {
            names.push("Shift");
        }
        if self.meta {
            names.push("Win");
        }
        names
    }
}

/// A key combination: modifier flags plus one non-modifier key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Chord {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl Chord {
    pub fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    /// A chord without a key is never registered nor persisted.
    pub fn is_empty(&self) -> bool {
        self.key.is_none()
    }

    /// Whether a chord typed by the user is acceptable as a hotkey: at least
    /// one of Ctrl/Alt/Shift and a key from `0` upward in virtual-key order.
    pub fn is_capturable(&self) -> bool {
        let m = self.modifiers;
        !self.is_empty() && (m.ctrl || m.alt || m.shift) && self.key.vk() >= Key::D0.vk()
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(none)");
        }
        let mut parts = self.modifiers.names();
        parts.push(self.key.display_name());
        write!(f, "{}", parts.join("+"))
    }
}

impl FromStr for Chord {
    type Err = ChordParseError;

    /// Parses `"Ctrl+Alt+F1"`, `"ctrl + alt + f1"`, `"Control+Shift+5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ChordParseError::Empty);
        }

        let mut chord = Chord::default();
        for token in s.split('+').map(str::trim) {
            match token.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => chord.modifiers.ctrl = true,
                "alt" => chord.modifiers.alt = true,
                "shift" => chord.modifiers.shift = true,
                "win" | "windows" | "meta" | "super" => chord.modifiers.meta = true,
                _ => {
                    let key = Key::from_name(token)
                        .filter(|k| !k.is_none())
                        .ok_or_else(|| ChordParseError::UnknownKey(token.to_string()))?;
                    if !chord.key.is_none() {
                        return Err(ChordParseError::MultipleKeys(
                            chord.key.name().to_string(),
                            token.to_string(),
                        ));
                    }
                    chord.key = key;
                }
            }
        }

        if chord.is_empty() {
            return Err(ChordParseError::MissingKey);
        }
        Ok(chord)
    }
}
