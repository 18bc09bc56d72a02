//! The application service: profiles, hotkey bindings and the display engine
//! behind one handle, with notifications for the outer layer.

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender, bounded};
use log::{error, info, warn};
use std::collections::BTreeSet;

use crate::hotkey::{
    BindingChange, Chord, HotkeyBinding, HotkeyManager, OwnerHandle, RegistrationError,
    SharedRegistrar, SlotId,
};
use crate::profile::{DisplayEngine, ProfileStore, sanitize_name};
use crate::settings::{Settings, SettingsPaths};

const EVENT_QUEUE_SIZE: usize = 64;

/// Notifications for whoever presents status to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitcherEvent {
    ProfileLoaded(String),
    ProfileLoadFailed(String),
    ProfileSaved(String),
    ProfileSaveFailed(String),
    /// Bindings dropped because their profile file is gone.
    BindingsPruned(Vec<String>),
    /// `Hotkeys.xml` could not be read; bindings start empty.
    SettingsCorrupt(String),
    /// Another application holds the chord.
    HotkeyUnavailable { profile: String, chord: Chord },
    RegistrationFailed { profile: String, reason: String },
    /// `profile` lost its binding because the chord was given to another one.
    BindingDisplaced { profile: String, chord: Chord },
}

impl std::fmt::Display for SwitcherEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitcherEvent::ProfileLoaded(name) => write!(f, "Loaded profile \"{name}\""),
            SwitcherEvent::ProfileLoadFailed(name) => {
                write!(f, "Unable to load the previously saved profile \"{name}\"")
            }
            SwitcherEvent::ProfileSaved(name) => write!(f, "Saved profile \"{name}\""),
            SwitcherEvent::ProfileSaveFailed(name) => {
                write!(f, "Unable to save the current layout to profile \"{name}\"")
            }
            SwitcherEvent::BindingsPruned(names) => {
                write!(f, "Removed hotkeys of deleted profiles: {}", names.join(", "))
            }
            SwitcherEvent::SettingsCorrupt(reason) => {
                write!(f, "Hotkey settings could not be read ({reason}), starting empty")
            }
            SwitcherEvent::HotkeyUnavailable { profile, chord } => write!(
                f,
                "{chord} for \"{profile}\" is already used by another application"
            ),
            SwitcherEvent::RegistrationFailed { profile, reason } => {
                write!(f, "Hotkey for \"{profile}\" could not be registered: {reason}")
            }
            SwitcherEvent::BindingDisplaced { profile, chord } => {
                write!(f, "{chord} was moved away from \"{profile}\"")
            }
        }
    }
}

pub struct Switcher {
    paths: SettingsPaths,
    settings: Settings,
    profiles: ProfileStore,
    hotkeys: HotkeyManager,
    engine: Box<dyn DisplayEngine>,
    owner: Option<OwnerHandle>,
    /// Profile names seen by the last reconciliation.
    known_profiles: BTreeSet<String>,
    event_sender: Sender<SwitcherEvent>,
    event_receiver: Receiver<SwitcherEvent>,
}

impl Switcher {
    /// Load settings and bindings from `paths` and drop bindings whose
    /// profile no longer exists. Nothing is registered until [`attach`].
    ///
    /// [`attach`]: Switcher::attach
    pub fn open(
        paths: SettingsPaths,
        registrar: SharedRegistrar,
        engine: Box<dyn DisplayEngine>,
    ) -> Result<Self> {
        let settings = Settings::load(&paths.settings_file())?;
        Self::open_with_settings(paths, settings, registrar, engine)
    }

    /// Like [`open`](Switcher::open) with settings the caller already loaded.
    pub fn open_with_settings(
        paths: SettingsPaths,
        settings: Settings,
        registrar: SharedRegistrar,
        engine: Box<dyn DisplayEngine>,
    ) -> Result<Self> {
        paths.create_dirs()?;
        let profiles = ProfileStore::new(paths.profiles_dir())?;
        let (event_sender, event_receiver) = bounded(EVENT_QUEUE_SIZE);

        let mut switcher = Self {
            paths,
            settings,
            profiles,
            hotkeys: HotkeyManager::new(registrar),
            engine,
            owner: None,
            known_profiles: BTreeSet::new(),
            event_sender,
            event_receiver,
        };

        switcher.load_hotkeys();
        switcher.prune()?;

        info!(
            "Opened {} with {} hotkey(s)",
            switcher.paths.root.display(),
            switcher.hotkeys.len()
        );
        Ok(switcher)
    }

    pub fn events(&self) -> Receiver<SwitcherEvent> {
        self.event_receiver.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &SettingsPaths {
        &self.paths
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn hotkeys(&self) -> &HotkeyManager {
        &self.hotkeys
    }

    pub fn owner(&self) -> Option<OwnerHandle> {
        self.owner
    }

    fn notify(&self, event: SwitcherEvent) {
        if let Err(e) = self.event_sender.try_send(event) {
            warn!("Failed to queue switcher event: {}", e);
        }
    }

    fn load_hotkeys(&mut self) {
        let path = self.paths.hotkeys_file();
        let sender = &self.event_sender;
        self.hotkeys.load(&path, |e| {
            let _ = sender.try_send(SwitcherEvent::SettingsCorrupt(e.to_string()));
        });
    }

    pub fn save_hotkeys(&self) -> Result<()> {
        self.hotkeys
            .save(&self.paths.hotkeys_file())
            .context("Failed to save hotkeys")
    }

    /// Reconcile bindings against the profile files, saving when anything
    /// was removed.
    fn prune(&mut self) -> Result<Vec<String>> {
        let existing = self.profiles.names()?;
        let removed = self.hotkeys.reconcile(&existing);
        self.known_profiles = existing;

        if !removed.is_empty() {
            warn!("Dropped hotkeys of missing profiles: {}", removed.join(", "));
            self.save_hotkeys()?;
            if self.settings.notify_on_prune {
                self.notify(SwitcherEvent::BindingsPruned(removed.clone()));
            }
        }
        Ok(removed)
    }

    /// Set the message sink hotkeys are delivered to and register every
    /// binding against it.
    pub fn attach(&mut self, owner: OwnerHandle) -> Result<()> {
        info!("Attaching hotkeys to owner {:?}", owner);
        self.owner = Some(owner);
        self.refresh().map(|_| ())
    }

    /// Prune, then re-register everything if an owner is attached. Returns
    /// the pruned profile names.
    pub fn refresh(&mut self) -> Result<Vec<String>> {
        let removed = self.prune()?;

        if let Some(owner) = self.owner {
            for (profile, e) in self.hotkeys.refresh_all_registrations(owner) {
                self.report_registration_failure(profile, e);
            }
        }
        Ok(removed)
    }

    /// Rescan the profiles directory and refresh when the set of profiles
    /// changed since the last reconciliation. Returns whether it did.
    pub fn poll_profiles(&mut self) -> Result<bool> {
        let current = self.profiles.names()?;
        if current == self.known_profiles {
            return Ok(false);
        }
        info!("Profile files changed, refreshing hotkeys");
        self.refresh()?;
        Ok(true)
    }

    fn report_registration_failure(&self, profile: String, e: RegistrationError) {
        let event = match e {
            RegistrationError::ChordTaken(chord) => {
                SwitcherEvent::HotkeyUnavailable { profile, chord }
            }
            other => SwitcherEvent::RegistrationFailed {
                profile,
                reason: other.to_string(),
            },
        };
        self.notify(event);
    }

    /// Drop all bindings and read them again from disk.
    pub fn reload_hotkeys(&mut self) -> Result<()> {
        self.load_hotkeys();
        self.refresh().map(|_| ())
    }

    /// Release every registration. Bindings stay in memory.
    pub fn shutdown(&mut self) {
        info!("Releasing all hotkeys");
        self.hotkeys.unregister_all();
        self.owner = None;
    }

    pub fn profile_names(&self) -> Result<BTreeSet<String>> {
        self.profiles.names()
    }

    /// `"<profile> (<chord>)"`, or `"<profile> (No Hotkey)"` when unbound.
    pub fn binding_label(&self, profile: &str) -> String {
        match self.hotkeys.binding_for(profile) {
            Some(binding) => format!("{profile} ({})", binding.chord),
            None => format!("{profile} (No Hotkey)"),
        }
    }

    /// Capture the current layout as `name`. The name is sanitised first;
    /// the stored name is returned.
    pub fn save_profile(&mut self, name: &str) -> Result<String> {
        let Some(name) = sanitize_name(name) else {
            anyhow::bail!("profile name \"{name}\" is empty after removing invalid characters");
        };

        let path = self.profiles.path_for(&name);
        if self.engine.save_profile(&path) {
            info!("Saved profile '{}' to {}", name, path.display());
            self.notify(SwitcherEvent::ProfileSaved(name.clone()));
            Ok(name)
        } else {
            error!("Failed to save profile '{}'", name);
            self.notify(SwitcherEvent::ProfileSaveFailed(name.clone()));
            anyhow::bail!("unable to save the current layout to profile \"{name}\"")
        }
    }

    /// Apply the profile `name`. Failures are reported as events.
    pub fn load_profile(&mut self, name: &str) -> bool {
        load_with(
            self.engine.as_mut(),
            &self.profiles,
            &self.event_sender,
            name,
        )
    }

    /// Delete a profile file and drop its binding. Returns the pruned names.
    pub fn delete_profile(&mut self, name: &str) -> Result<Vec<String>> {
        self.profiles.delete(name)?;
        self.refresh()
    }

    /// Commit an edited binding: apply it, re-register, save.
    pub fn apply_edit(&mut self, edit: &HotkeyBinding) -> Result<BindingChange> {
        if !edit.marked_for_removal {
            if !self.profiles.exists(&edit.profile_name) {
                anyhow::bail!("profile \"{}\" does not exist", edit.profile_name);
            }
            if !edit.chord.is_capturable() {
                anyhow::bail!(
                    "{} is not a valid hotkey: use Ctrl, Alt or Shift with a non-modifier key",
                    edit.chord
                );
            }
        }

        let change = self.hotkeys.apply_edit(edit);
        if let BindingChange::Added {
            displaced: Some(profile),
        }
        | BindingChange::Updated {
            displaced: Some(profile),
            ..
        } = &change
        {
            self.notify(SwitcherEvent::BindingDisplaced {
                profile: profile.clone(),
                chord: edit.chord,
            });
        }

        self.refresh()?;
        self.save_hotkeys()?;
        Ok(change)
    }

    pub fn set_hotkey(&mut self, profile: &str, chord: Chord) -> Result<BindingChange> {
        if chord.is_empty() {
            return self.clear_hotkey(profile);
        }
        self.apply_edit(&HotkeyBinding::new(profile, chord))
    }

    pub fn clear_hotkey(&mut self, profile: &str) -> Result<BindingChange> {
        self.apply_edit(&HotkeyBinding::removal(profile))
    }

    /// Route a fired slot to its profile. `false` when no binding owns it.
    /// A binding whose profile file is gone is pruned instead of loaded.
    pub fn handle_hotkey(&mut self, slot_id: SlotId) -> bool {
        if let Some(name) = self.hotkeys.resolve_trigger(slot_id)
            && !self.profiles.exists(name)
        {
            warn!("Profile '{}' is gone, dropping its hotkey", name);
            if let Err(e) = self.refresh() {
                error!("Failed to refresh hotkeys: {:#}", e);
            }
            return true;
        }

        let engine = self.engine.as_mut();
        let profiles = &self.profiles;
        let sender = &self.event_sender;
        self.hotkeys
            .on_hotkey_fired(slot_id, |name| load_with(engine, profiles, sender, name))
    }
}

impl Drop for Switcher {
    fn drop(&mut self) {
        if self.owner.is_some() {
            self.shutdown();
        }
    }
}

fn load_with(
    engine: &mut dyn DisplayEngine,
    profiles: &ProfileStore,
    sender: &Sender<SwitcherEvent>,
    name: &str,
) -> bool {
    let path = profiles.path_for(name);
    let loaded = engine.load_profile(&path);

    let event = if loaded {
        info!("Loaded profile '{}'", name);
        SwitcherEvent::ProfileLoaded(name.to_string())
    } else {
        error!("Failed to load profile '{}' from {}", name, path.display());
        SwitcherEvent::ProfileLoadFailed(name.to_string())
    };
    if let Err(e) = sender.try_send(event) {
        warn!("Failed to queue switcher event: {}", e);
    }
    loaded
}
