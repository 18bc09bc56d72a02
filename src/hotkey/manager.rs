//! The collection of hotkey bindings and its registrations.
//!
//! `HotkeyManager` is deliberately not `Send`: it shares the registrar through
//! `Rc`, which pins it to the thread that pumps hotkey messages. Edits through
//! [`HotkeyManager::set_binding`] only touch the collection; the OS table is
//! brought in line by [`HotkeyManager::refresh_all_registrations`].

use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::path::Path;

use super::backend::{OwnerHandle, SlotId};
use super::persistence::{self, PersistenceError};
use super::registration::{HotkeyRegistration, RegistrationError, SharedRegistrar};
use super::Chord;

/// A chord bound to the profile it switches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub chord: Chord,
    pub profile_name: String,
    /// Set while editing when the user cleared the hotkey. Never persisted.
    pub marked_for_removal: bool,
}

impl HotkeyBinding {
    pub fn new(profile_name: impl Into<String>, chord: Chord) -> Self {
        Self {
            chord,
            profile_name: profile_name.into(),
            marked_for_removal: false,
        }
    }

    /// An edit that clears the hotkey of `profile_name`.
    pub fn removal(profile_name: impl Into<String>) -> Self {
        Self {
            chord: Chord::default(),
            profile_name: profile_name.into(),
            marked_for_removal: true,
        }
    }
}

/// What `set_binding` did to the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingChange {
    /// A new binding; `displaced` names a profile that held the same chord
    /// and lost its binding.
    Added { displaced: Option<String> },
    Updated {
        previous: Chord,
        displaced: Option<String>,
    },
    Removed { previous: Chord },
    Unchanged,
}

struct Entry {
    binding: HotkeyBinding,
    registration: HotkeyRegistration,
}

pub struct HotkeyManager {
    registrar: SharedRegistrar,
    entries: Vec<Entry>,
}

impl HotkeyManager {
    pub fn new(registrar: SharedRegistrar) -> Self {
        Self {
            registrar,
            entries: Vec::new(),
        }
    }

    pub fn bindings(&self) -> impl Iterator<Item = &HotkeyBinding> {
        self.entries.iter().map(|e| &e.binding)
    }

    pub fn binding_for(&self, profile_name: &str) -> Option<&HotkeyBinding> {
        self.bindings().find(|b| b.profile_name == profile_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot currently registered for a profile.
    pub fn slot_for(&self, profile_name: &str) -> Option<SlotId> {
        self.entries
            .iter()
            .find(|e| e.binding.profile_name == profile_name)
            .and_then(|e| e.registration.slot_id())
    }

    /// Create, update or (for an empty chord) remove the binding of a profile.
    ///
    /// Only the collection changes here, except that a removed binding
    /// releases its slot. Another profile holding the same chord loses it.
    pub fn set_binding(&mut self, profile_name: &str, chord: Chord) -> BindingChange {
        let existing = self
            .entries
            .iter()
            .position(|e| e.binding.profile_name == profile_name);

        if chord.is_empty() {
            let Some(idx) = existing else {
                return BindingChange::Unchanged;
            };
            let mut entry = self.entries.remove(idx);
            release(&mut entry);
            info!("Removed hotkey {} for profile '{}'", entry.binding.chord, profile_name);
            return BindingChange::Removed {
                previous: entry.binding.chord,
            };
        }

        if let Some(idx) = existing
            && self.entries[idx].binding.chord == chord
        {
            return BindingChange::Unchanged;
        }

        let displaced = self.take_chord_from_others(profile_name, chord);

        match self
            .entries
            .iter_mut()
            .find(|e| e.binding.profile_name == profile_name)
        {
            Some(entry) => {
                let previous = entry.binding.chord;
                entry.binding.chord = chord;
                info!("Hotkey for profile '{}' changed {} -> {}", profile_name, previous, chord);
                BindingChange::Updated {
                    previous,
                    displaced,
                }
            }
            None => {
                self.entries.push(Entry {
                    binding: HotkeyBinding::new(profile_name, chord),
                    registration: HotkeyRegistration::new(self.registrar.clone(), chord),
                });
                info!("Added hotkey {} for profile '{}'", chord, profile_name);
                BindingChange::Added { displaced }
            }
        }
    }

    /// Commit an edited binding, honouring its removal mark.
    pub fn apply_edit(&mut self, edit: &HotkeyBinding) -> BindingChange {
        if edit.marked_for_removal {
            self.set_binding(&edit.profile_name, Chord::default())
        } else {
            self.set_binding(&edit.profile_name, edit.chord)
        }
    }

    fn take_chord_from_others(&mut self, profile_name: &str, chord: Chord) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.binding.profile_name != profile_name && e.binding.chord == chord)?;
        let mut entry = self.entries.remove(idx);
        release(&mut entry);
        warn!(
            "Hotkey {} moved from profile '{}' to '{}'",
            chord, entry.binding.profile_name, profile_name
        );
        Some(entry.binding.profile_name)
    }

    /// Drop every binding whose profile is not in `existing`, releasing its
    /// slot first. Returns the removed profile names.
    pub fn reconcile(&mut self, existing: &BTreeSet<String>) -> Vec<String> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());

        for mut entry in self.entries.drain(..) {
            if existing.contains(&entry.binding.profile_name) {
                kept.push(entry);
            } else {
                release(&mut entry);
                info!(
                    "Profile '{}' no longer exists, dropping its hotkey {}",
                    entry.binding.profile_name, entry.binding.chord
                );
                removed.push(entry.binding.profile_name);
            }
        }

        self.entries = kept;
        removed
    }

    /// Unregister every slot, then register every binding against `owner`.
    ///
    /// Bindings that cannot be registered stay in the collection,
    /// unregistered; they are returned with the reason.
    pub fn refresh_all_registrations(
        &mut self,
        owner: OwnerHandle,
    ) -> Vec<(String, RegistrationError)> {
        self.unregister_all();

        let mut failures = Vec::new();
        for entry in &mut self.entries {
            let result = entry
                .registration
                .set_chord(entry.binding.chord)
                .and_then(|()| entry.registration.register(owner));

            if let Err(e) = result {
                if e.is_chord_taken() {
                    warn!(
                        "Hotkey {} for profile '{}' is taken by another application",
                        entry.binding.chord, entry.binding.profile_name
                    );
                } else {
                    error!(
                        "Failed to register hotkey {} for profile '{}': {}",
                        entry.binding.chord, entry.binding.profile_name, e
                    );
                }
                failures.push((entry.binding.profile_name.clone(), e));
            }
        }

        debug!(
            "Registered {} of {} hotkey(s)",
            self.entries.len() - failures.len(),
            self.entries.len()
        );
        failures
    }

    /// Release every slot while keeping the bindings.
    pub fn unregister_all(&mut self) {
        for entry in &mut self.entries {
            release(entry);
        }
    }

    /// Profile bound to a fired slot. `None` when nothing live owns the slot,
    /// e.g. a message that was queued before its slot was released.
    pub fn resolve_trigger(&self, slot_id: SlotId) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.registration.slot_id() == Some(slot_id))
            .map(|e| e.binding.profile_name.as_str())
    }

    /// Handle a fired slot: hand the bound profile to `load_profile`. A
    /// matched event is always reported handled, whether or not the load
    /// succeeds, so the combination never reaches other applications.
    pub fn on_hotkey_fired<F>(&self, slot_id: SlotId, load_profile: F) -> bool
    where
        F: FnOnce(&str) -> bool,
    {
        let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.registration.slot_id() == Some(slot_id))
        else {
            debug!("Ignoring hotkey message for unknown slot {}", slot_id);
            return false;
        };

        entry.registration.dispatch(slot_id, |_| {
            let name = entry.binding.profile_name.as_str();
            info!("Hotkey {} pressed, loading profile '{}'", entry.binding.chord, name);
            if !load_profile(name) {
                warn!("Loading profile '{}' failed", name);
            }
            true
        })
    }

    /// Replace the collection with `bindings`, releasing all current slots.
    /// Empty chords are dropped; later duplicates of a profile or chord win.
    pub fn replace_all(&mut self, bindings: Vec<HotkeyBinding>) {
        self.unregister_all();
        self.entries.clear();
        for binding in bindings {
            if binding.chord.is_empty() {
                debug!("Skipping hotkey without key for '{}'", binding.profile_name);
                continue;
            }
            self.set_binding(&binding.profile_name, binding.chord);
        }
    }

    /// Reload from `path`. Unreadable content yields an empty collection and
    /// is reported through `on_corrupt`.
    pub fn load(&mut self, path: &Path, on_corrupt: impl FnOnce(&PersistenceError)) {
        let bindings = persistence::load_file(path, on_corrupt);
        self.replace_all(bindings);
        info!("Loaded {} hotkey(s) from {}", self.entries.len(), path.display());
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let bindings: Vec<HotkeyBinding> = self.bindings().cloned().collect();
        persistence::save_file(path, &bindings)
    }
}

fn release(entry: &mut Entry) {
    if entry.registration.is_registered() {
        // Only fails when not registered, which was just checked.
        let _ = entry.registration.unregister();
    }
}
