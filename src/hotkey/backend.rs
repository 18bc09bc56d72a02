//! The OS-level hotkey table seen through a trait, plus an in-process table.

use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use super::Chord;

/// Identifier handed to the OS for one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u16);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the window or message queue that receives hotkey messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerHandle(pub u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Another process (or another slot) already holds this exact combination.
    #[error("key combination is already registered")]
    AlreadyTaken,
    #[error("os error {code}: {message}")]
    Os { code: i32, message: String },
}

/// The process-global hotkey registration table.
pub trait HotkeyBackend {
    fn register(
        &mut self,
        owner: OwnerHandle,
        id: SlotId,
        chord: &Chord,
    ) -> Result<(), BackendError>;

    fn unregister(&mut self, owner: OwnerHandle, id: SlotId) -> Result<(), BackendError>;

    /// `false` once the owner has been destroyed; the OS has then already
    /// released every registration made against it.
    fn owner_alive(&self, owner: OwnerHandle) -> bool;
}

/// In-process registration table.
///
/// Used where no global hotkey facility exists and in tests. Clones share one
/// table, so a test can keep a handle while the registrar owns another. Chords
/// can be reserved to stand in for other processes, and owners can be
/// destroyed.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    table: Rc<RefCell<MemoryTable>>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    active: HashMap<(OwnerHandle, SlotId), Chord>,
    foreign: HashSet<Chord>,
    destroyed: HashSet<OwnerHandle>,
    failing: Option<BackendError>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend another process holds `chord`.
    pub fn reserve_elsewhere(&self, chord: Chord) {
        self.table.borrow_mut().foreign.insert(chord);
    }

    pub fn release_elsewhere(&self, chord: &Chord) {
        self.table.borrow_mut().foreign.remove(chord);
    }

    /// Destroy an owner, dropping everything registered against it.
    pub fn destroy_owner(&self, owner: OwnerHandle) {
        let mut table = self.table.borrow_mut();
        table.destroyed.insert(owner);
        table.active.retain(|(o, _), _| *o != owner);
    }

    /// Make every following `register` call fail with `error`.
    pub fn fail_registrations(&self, error: Option<BackendError>) {
        self.table.borrow_mut().failing = error;
    }

    pub fn is_active(&self, id: SlotId) -> bool {
        self.table.borrow().active.keys().any(|(_, slot)| *slot == id)
    }

    pub fn chord_for(&self, id: SlotId) -> Option<Chord> {
        self.table
            .borrow()
            .active
            .iter()
            .find(|((_, slot), _)| *slot == id)
            .map(|(_, chord)| *chord)
    }

    pub fn active_count(&self) -> usize {
        self.table.borrow().active.len()
    }
}

impl HotkeyBackend for MemoryBackend {
    fn register(
        &mut self,
        owner: OwnerHandle,
        id: SlotId,
        chord: &Chord,
    ) -> Result<(), BackendError> {
        let mut table = self.table.borrow_mut();
        if let Some(error) = &table.failing {
            return Err(error.clone());
        }
        if table.destroyed.contains(&owner) {
            return Err(BackendError::Os {
                code: 1400,
                message: "invalid window handle".to_string(),
            });
        }
        if table.foreign.contains(chord) || table.active.values().any(|c| c == chord) {
            return Err(BackendError::AlreadyTaken);
        }
        if table.active.contains_key(&(owner, id)) {
            return Err(BackendError::Os {
                code: 1409,
                message: format!("slot {id} already in use"),
            });
        }

        debug!("memory backend: register slot {} -> {}", id, chord);
        table.active.insert((owner, id), *chord);
        Ok(())
    }

    fn unregister(&mut self, owner: OwnerHandle, id: SlotId) -> Result<(), BackendError> {
        match self.table.borrow_mut().active.remove(&(owner, id)) {
            Some(_) => Ok(()),
            None => Err(BackendError::Os {
                code: 1419,
                message: format!("slot {id} is not registered"),
            }),
        }
    }

    fn owner_alive(&self, owner: OwnerHandle) -> bool {
        !self.table.borrow().destroyed.contains(&owner)
    }
}
