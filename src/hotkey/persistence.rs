//! `Hotkeys.xml`: a `<hotkeys>` root holding one `<Hotkey>` element per binding.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <hotkeys>
//!   <Hotkey>
//!     <Ctrl>true</Ctrl>
//!     <Alt>true</Alt>
//!     <Shift>false</Shift>
//!     <Win>false</Win>
//!     <Key>F1</Key>
//!     <profileName>Office</profileName>
//!   </Hotkey>
//! </hotkeys>
//! ```
//!
//! Older files carry extra elements such as `RemoveKey` and lack `Win`; both
//! are accepted.

use log::{debug, warn};
use quick_xml::se::Serializer;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::manager::HotkeyBinding;
use super::{Chord, Key, Modifiers};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("hotkey file is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to encode hotkeys: {0}")]
    Encode(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "hotkeys")]
struct HotkeysDocument {
    #[serde(rename = "Hotkey", default)]
    records: Vec<HotkeyRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HotkeyRecord {
    #[serde(rename = "Ctrl", default, deserialize_with = "flag")]
    ctrl: bool,
    #[serde(rename = "Alt", default, deserialize_with = "flag")]
    alt: bool,
    #[serde(rename = "Shift", default, deserialize_with = "flag")]
    shift: bool,
    #[serde(rename = "Win", default, deserialize_with = "flag")]
    win: bool,
    #[serde(rename = "Key", default)]
    key: String,
    #[serde(rename = "profileName", default)]
    profile_name: String,
}

/// Modifier flag. Empty or unreadable text counts as unset so one bad
/// element does not cost the whole file.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") || text == "1" {
        Ok(true)
    } else {
        if !text.is_empty() && !text.eq_ignore_ascii_case("false") && text != "0" {
            debug!("Treating modifier value '{}' as unset", text);
        }
        Ok(false)
    }
}

impl From<&HotkeyBinding> for HotkeyRecord {
    fn from(binding: &HotkeyBinding) -> Self {
        let m = binding.chord.modifiers;
        Self {
            ctrl: m.ctrl,
            alt: m.alt,
            shift: m.shift,
            win: m.meta,
            key: binding.chord.key.name().to_string(),
            profile_name: binding.profile_name.clone(),
        }
    }
}

impl HotkeyRecord {
    fn into_binding(self) -> Option<HotkeyBinding> {
        let key = match Key::from_name(self.key.trim()) {
            Some(key) if !key.is_none() => key,
            _ => {
                warn!(
                    "Skipping hotkey for '{}': unknown key '{}'",
                    self.profile_name, self.key
                );
                return None;
            }
        };
        if self.profile_name.is_empty() {
            warn!("Skipping hotkey {} without profile name", key.name());
            return None;
        }

        let modifiers = Modifiers {
            ctrl: self.ctrl,
            alt: self.alt,
            shift: self.shift,
            meta: self.win,
        };
        Some(HotkeyBinding::new(self.profile_name, Chord::new(modifiers, key)))
    }
}

/// Encode bindings as a complete document. Bindings without a key are left
/// out; the removal mark is never written.
pub fn encode(bindings: &[HotkeyBinding]) -> Result<String, PersistenceError> {
    let document = HotkeysDocument {
        records: bindings
            .iter()
            .filter(|b| !b.chord.is_empty())
            .map(HotkeyRecord::from)
            .collect(),
    };

    let mut body = String::new();
    let mut serializer = Serializer::new(&mut body);
    serializer.indent(' ', 2);
    document
        .serialize(serializer)
        .map_err(|e| PersistenceError::Encode(e.to_string()))?;

    Ok(format!("{XML_DECLARATION}\n{body}\n"))
}

/// Strict decode. Records with unknown keys are skipped, a malformed
/// document is an error.
pub fn decode(text: &str) -> Result<Vec<HotkeyBinding>, PersistenceError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: HotkeysDocument =
        quick_xml::de::from_str(text).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;

    Ok(document
        .records
        .into_iter()
        .filter_map(HotkeyRecord::into_binding)
        .collect())
}

/// Lenient decode: a malformed document yields no bindings and is reported
/// to `on_corrupt` instead of failing.
pub fn deserialize(text: &str, on_corrupt: impl FnOnce(&PersistenceError)) -> Vec<HotkeyBinding> {
    match decode(text) {
        Ok(bindings) => bindings,
        Err(e) => {
            warn!("{}", e);
            on_corrupt(&e);
            Vec::new()
        }
    }
}

/// Read bindings from `path`. A missing file is an empty collection.
pub fn load_file(path: &Path, on_corrupt: impl FnOnce(&PersistenceError)) -> Vec<HotkeyBinding> {
    match fs::read_to_string(path) {
        Ok(text) => deserialize(&text, on_corrupt),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No hotkey file at {}", path.display());
            Vec::new()
        }
        Err(source) => {
            let e = PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            };
            warn!("{}", e);
            on_corrupt(&e);
            Vec::new()
        }
    }
}

/// Write bindings to `path`, creating its directory if needed.
pub fn save_file(path: &Path, bindings: &[HotkeyBinding]) -> Result<(), PersistenceError> {
    let io_error = |source: io::Error| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let text = encode(bindings)?;
    fs::write(path, text).map_err(io_error)?;
    debug!("Saved {} hotkey(s) to {}", bindings.len(), path.display());
    Ok(())
}
