//! One OS registration slot per binding.
//!
//! A [`HotkeyRegistration`] owns at most one live entry in the OS hotkey
//! table. Slot ids come from the [`Registrar`], which never hands out an id
//! that is still live. Everything here runs on the thread that pumps hotkey
//! messages; the registrar is shared through `Rc<RefCell<_>>`, so none of
//! these types can leave that thread.

use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use thiserror::Error;

use super::backend::{BackendError, HotkeyBackend, OwnerHandle, SlotId};
use super::{Chord, Key, Modifiers};

/// Highest id an application may pass to the OS.
pub const MAX_SLOT_ID: u16 = 0xBFFF;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("cannot register a hotkey without a key")]
    EmptyChord,
    #[error("hotkey is already registered")]
    AlreadyRegistered,
    #[error("hotkey is not registered")]
    NotRegistered,
    #[error("{0} is already in use by another application")]
    ChordTaken(Chord),
    #[error("the system rejected the hotkey (error {code}): {message}")]
    OsRejected { code: i32, message: String },
    #[error("no free hotkey ids left")]
    SlotsExhausted,
}

impl RegistrationError {
    /// The chord is held elsewhere; the user should pick another one.
    pub fn is_chord_taken(&self) -> bool {
        matches!(self, RegistrationError::ChordTaken(_))
    }
}

/// Hands out slot ids from a wrapping counter, skipping ids still in use.
#[derive(Debug)]
struct SlotIds {
    next: u32,
    span: u32,
    live: BTreeSet<u16>,
}

impl SlotIds {
    fn new(span: u32) -> Self {
        Self {
            next: 0,
            span,
            live: BTreeSet::new(),
        }
    }

    fn allocate(&mut self) -> Option<SlotId> {
        for offset in 0..self.span {
            let candidate = ((self.next + offset) % self.span) as u16;
            if self.live.insert(candidate) {
                self.next = (u32::from(candidate) + 1) % self.span;
                return Some(SlotId(candidate));
            }
        }
        None
    }

    fn release(&mut self, id: SlotId) {
        self.live.remove(&id.0);
    }
}

/// The OS backend together with the slot id allocator.
pub struct Registrar {
    backend: Box<dyn HotkeyBackend>,
    ids: SlotIds,
}

pub type SharedRegistrar = Rc<RefCell<Registrar>>;

impl Registrar {
    pub fn new(backend: Box<dyn HotkeyBackend>) -> Self {
        Self::with_id_span(backend, u32::from(MAX_SLOT_ID) + 1)
    }

    /// Registrar handing out ids in `0..span`.
    pub fn with_id_span(backend: Box<dyn HotkeyBackend>, span: u32) -> Self {
        Self {
            backend,
            ids: SlotIds::new(span.clamp(1, u32::from(MAX_SLOT_ID) + 1)),
        }
    }

    pub fn shared(backend: Box<dyn HotkeyBackend>) -> SharedRegistrar {
        Rc::new(RefCell::new(Self::new(backend)))
    }

    pub fn live_slots(&self) -> usize {
        self.ids.live.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveSlot {
    id: SlotId,
    owner: OwnerHandle,
}

/// A chord plus its (possibly absent) live OS registration.
pub struct HotkeyRegistration {
    registrar: SharedRegistrar,
    chord: Chord,
    active: Option<ActiveSlot>,
}

impl HotkeyRegistration {
    pub fn new(registrar: SharedRegistrar, chord: Chord) -> Self {
        Self {
            registrar,
            chord,
            active: None,
        }
    }

    pub fn chord(&self) -> Chord {
        self.chord
    }

    pub fn is_registered(&self) -> bool {
        self.active.is_some()
    }

    pub fn slot_id(&self) -> Option<SlotId> {
        self.active.map(|slot| slot.id)
    }

    pub fn owner(&self) -> Option<OwnerHandle> {
        self.active.map(|slot| slot.owner)
    }

    /// Check whether the OS accepts the chord by registering and immediately
    /// unregistering it. Any failure means "no". A live slot already holds
    /// the chord, so the answer is "yes" without touching the OS.
    pub fn can_register(&mut self, owner: OwnerHandle) -> bool {
        if self.active.is_some() {
            return true;
        }
        match self.register(owner) {
            Ok(()) => self.unregister().is_ok(),
            Err(e) => {
                debug!("{} cannot be registered: {}", self.chord, e);
                false
            }
        }
    }

    pub fn register(&mut self, owner: OwnerHandle) -> Result<(), RegistrationError> {
        if self.active.is_some() {
            return Err(RegistrationError::AlreadyRegistered);
        }
        if self.chord.is_empty() {
            return Err(RegistrationError::EmptyChord);
        }

        let mut registrar = self.registrar.borrow_mut();
        let id = registrar
            .ids
            .allocate()
            .ok_or(RegistrationError::SlotsExhausted)?;

        match registrar.backend.register(owner, id, &self.chord) {
            Ok(()) => {
                info!("Registered hotkey {} (slot {})", self.chord, id);
                self.active = Some(ActiveSlot { id, owner });
                Ok(())
            }
            Err(e) => {
                registrar.ids.release(id);
                Err(match e {
                    BackendError::AlreadyTaken => RegistrationError::ChordTaken(self.chord),
                    BackendError::Os { code, message } => {
                        RegistrationError::OsRejected { code, message }
                    }
                })
            }
        }
    }

    /// Release the slot. The bookkeeping is cleared even when the OS call
    /// fails; a destroyed owner means the OS already dropped the entry.
    pub fn unregister(&mut self) -> Result<(), RegistrationError> {
        let slot = self.active.take().ok_or(RegistrationError::NotRegistered)?;
        release(&mut self.registrar.borrow_mut(), slot, self.chord);
        Ok(())
    }

    /// Replace the chord. A registered slot is moved to the new chord with
    /// the same owner; if that fails the slot stays unregistered and the
    /// error is returned.
    pub fn set_chord(&mut self, chord: Chord) -> Result<(), RegistrationError> {
        if chord == self.chord {
            return Ok(());
        }

        let Some(owner) = self.owner() else {
            self.chord = chord;
            return Ok(());
        };

        self.unregister()?;
        self.chord = chord;
        self.register(owner)
    }

    pub fn set_modifiers(&mut self, modifiers: Modifiers) -> Result<(), RegistrationError> {
        self.set_chord(Chord::new(modifiers, self.chord.key))
    }

    pub fn set_key(&mut self, key: Key) -> Result<(), RegistrationError> {
        self.set_chord(Chord::new(self.chord.modifiers, key))
    }

    /// Route one hotkey message. `on_pressed` runs only when the message is
    /// for this live slot; its return value says whether the event was
    /// handled. Anything else is passed through as unhandled.
    pub fn dispatch<F>(&self, slot_id: SlotId, on_pressed: F) -> bool
    where
        F: FnOnce(SlotId) -> bool,
    {
        match self.active {
            Some(slot) if slot.id == slot_id => on_pressed(slot_id),
            _ => false,
        }
    }
}

impl Drop for HotkeyRegistration {
    fn drop(&mut self) {
        let Some(slot) = self.active.take() else {
            return;
        };
        match self.registrar.try_borrow_mut() {
            Ok(mut registrar) => release(&mut registrar, slot, self.chord),
            Err(_) => warn!(
                "Registrar busy while dropping hotkey {} (slot {}), slot leaked",
                self.chord, slot.id
            ),
        }
    }
}

fn release(registrar: &mut Registrar, slot: ActiveSlot, chord: Chord) {
    if registrar.backend.owner_alive(slot.owner) {
        if let Err(e) = registrar.backend.unregister(slot.owner, slot.id) {
            warn!("Failed to unregister hotkey {} (slot {}): {}", chord, slot.id, e);
        }
    } else {
        debug!("Owner of slot {} is gone, nothing to unregister", slot.id);
    }
    registrar.ids.release(slot.id);
    info!("Unregistered hotkey {} (slot {})", chord, slot.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::MemoryBackend;

    const OWNER: OwnerHandle = OwnerHandle(7);

    fn ctrl_alt(key: Key) -> Chord {
        Chord::new(Modifiers::CTRL_ALT, key)
    }

    fn setup() -> (MemoryBackend, SharedRegistrar) {
        let backend = MemoryBackend::new();
        let registrar = Registrar::shared(Box::new(backend.clone()));
        (backend, registrar)
    }

    #[test]
    fn test_register_and_unregister() {
        let (backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar.clone(), ctrl_alt(Key::F1));

        reg.register(OWNER).unwrap();
        let id = reg.slot_id().unwrap();
        assert!(backend.is_active(id));
        assert_eq!(reg.owner(), Some(OWNER));

        reg.unregister().unwrap();
        assert!(!reg.is_registered());
        assert!(!backend.is_active(id));
        assert_eq!(reg.owner(), None);
        assert_eq!(registrar.borrow().live_slots(), 0);
    }

    #[test]
    fn test_double_register_and_unregister_are_rejected() {
        let (_backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar, ctrl_alt(Key::F1));

        assert_eq!(reg.unregister(), Err(RegistrationError::NotRegistered));
        reg.register(OWNER).unwrap();
        assert_eq!(reg.register(OWNER), Err(RegistrationError::AlreadyRegistered));
    }

    #[test]
    fn test_empty_chord_never_reaches_backend() {
        let (backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar, Chord::default());

        assert_eq!(reg.register(OWNER), Err(RegistrationError::EmptyChord));
        assert_eq!(backend.active_count(), 0);
    }

    #[test]
    fn test_chord_taken_elsewhere() {
        let (backend, registrar) = setup();
        backend.reserve_elsewhere(ctrl_alt(Key::F1));
        let mut reg = HotkeyRegistration::new(registrar.clone(), ctrl_alt(Key::F1));

        assert!(!reg.can_register(OWNER));
        let err = reg.register(OWNER).unwrap_err();
        assert!(err.is_chord_taken());
        assert!(!reg.is_registered());
        assert_eq!(registrar.borrow().live_slots(), 0);
    }

    #[test]
    fn test_os_rejection_is_hard_error() {
        let (backend, registrar) = setup();
        backend.fail_registrations(Some(BackendError::Os {
            code: 5,
            message: "access denied".to_string(),
        }));
        let mut reg = HotkeyRegistration::new(registrar, ctrl_alt(Key::F1));

        assert!(matches!(
            reg.register(OWNER),
            Err(RegistrationError::OsRejected { code: 5, .. })
        ));
        assert!(!reg.is_registered());
    }

    #[test]
    fn test_can_register_leaves_no_trace() {
        let (backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar, ctrl_alt(Key::F2));

        assert!(reg.can_register(OWNER));
        assert!(!reg.is_registered());
        assert_eq!(backend.active_count(), 0);
    }

    #[test]
    fn test_can_register_on_live_slot_keeps_it() {
        let (backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar, ctrl_alt(Key::F2));
        reg.register(OWNER).unwrap();
        let id = reg.slot_id().unwrap();

        assert!(reg.can_register(OWNER));
        assert_eq!(reg.slot_id(), Some(id));
        assert!(backend.is_active(id));
    }

    #[test]
    fn test_set_chord_reregisters() {
        let (backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar, ctrl_alt(Key::F1));
        reg.register(OWNER).unwrap();

        reg.set_key(Key::F5).unwrap();
        let id = reg.slot_id().unwrap();
        assert_eq!(backend.chord_for(id), Some(ctrl_alt(Key::F5)));
        assert_eq!(backend.active_count(), 1);

        let shift = Modifiers {
            shift: true,
            ..Modifiers::default()
        };
        reg.set_modifiers(shift).unwrap();
        let id = reg.slot_id().unwrap();
        assert_eq!(backend.chord_for(id), Some(Chord::new(shift, Key::F5)));
    }

    #[test]
    fn test_set_chord_failure_leaves_unregistered() {
        let (backend, registrar) = setup();
        backend.reserve_elsewhere(ctrl_alt(Key::F9));
        let mut reg = HotkeyRegistration::new(registrar, ctrl_alt(Key::F1));
        reg.register(OWNER).unwrap();

        let err = reg.set_key(Key::F9).unwrap_err();
        assert!(err.is_chord_taken());
        assert!(!reg.is_registered());
        assert_eq!(reg.chord(), ctrl_alt(Key::F9));
        assert_eq!(backend.active_count(), 0);
    }

    #[test]
    fn test_set_chord_while_unregistered_only_updates() {
        let (backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar, ctrl_alt(Key::F1));

        reg.set_key(Key::F2).unwrap();
        assert_eq!(reg.chord(), ctrl_alt(Key::F2));
        assert_eq!(backend.active_count(), 0);
    }

    #[test]
    fn test_unregister_after_owner_destroyed() {
        let (backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar.clone(), ctrl_alt(Key::F1));
        reg.register(OWNER).unwrap();

        backend.destroy_owner(OWNER);
        assert!(reg.unregister().is_ok());
        assert!(!reg.is_registered());
        assert_eq!(registrar.borrow().live_slots(), 0);
    }

    #[test]
    fn test_dispatch_only_for_own_live_slot() {
        let (_backend, registrar) = setup();
        let mut reg = HotkeyRegistration::new(registrar, ctrl_alt(Key::F1));

        assert!(!reg.dispatch(SlotId(0), |_| true));

        reg.register(OWNER).unwrap();
        let id = reg.slot_id().unwrap();
        assert!(reg.dispatch(id, |_| true));
        assert!(!reg.dispatch(id, |_| false));
        assert!(!reg.dispatch(SlotId(id.0 + 1), |_| true));
    }

    #[test]
    fn test_drop_releases_slot() {
        let (backend, registrar) = setup();
        {
            let mut reg = HotkeyRegistration::new(registrar.clone(), ctrl_alt(Key::F1));
            reg.register(OWNER).unwrap();
            assert_eq!(backend.active_count(), 1);
        }
        assert_eq!(backend.active_count(), 0);
        assert_eq!(registrar.borrow().live_slots(), 0);
    }

    #[test]
    fn test_ids_never_collide_with_live_slots() {
        let backend = MemoryBackend::new();
        let registrar = Rc::new(RefCell::new(Registrar::with_id_span(
            Box::new(backend.clone()),
            3,
        )));
        let keys = [Key::F1, Key::F2, Key::F3];
        let mut regs: Vec<_> = keys
            .iter()
            .map(|k| HotkeyRegistration::new(registrar.clone(), ctrl_alt(*k)))
            .collect();
        for reg in &mut regs {
            reg.register(OWNER).unwrap();
        }

        let mut extra = HotkeyRegistration::new(registrar.clone(), ctrl_alt(Key::F4));
        assert_eq!(extra.register(OWNER), Err(RegistrationError::SlotsExhausted));

        // Free the middle id; the counter has wrapped and must land on it.
        let freed = regs[1].slot_id().unwrap();
        regs[1].unregister().unwrap();
        extra.register(OWNER).unwrap();
        assert_eq!(extra.slot_id(), Some(freed));

        let mut ids: Vec<_> = regs
            .iter()
            .filter_map(HotkeyRegistration::slot_id)
            .chain(extra.slot_id())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
