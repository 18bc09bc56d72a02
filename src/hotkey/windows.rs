//! Win32 `RegisterHotKey` backend.
//!
//! Hotkeys are registered against the calling thread's message queue (no
//! window), so the owner is the thread id and `WM_HOTKEY` arrives as a thread
//! message picked up by [`pump_messages`].

use log::{debug, trace};
use windows::Win32::Foundation::ERROR_HOTKEY_ALREADY_REGISTERED;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    HOT_KEY_MODIFIERS, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, MOD_WIN, RegisterHotKey,
    UnregisterHotKey,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, MSG, PM_REMOVE, PeekMessageW, TranslateMessage, WM_HOTKEY,
};

use super::backend::{BackendError, HotkeyBackend, OwnerHandle, SlotId};
use super::Chord;

#[derive(Debug, Default)]
pub struct Win32Backend;

impl Win32Backend {
    pub fn new() -> Self {
        Self
    }

    /// Owner handle for registrations made from the current thread.
    pub fn current_owner() -> OwnerHandle {
        // SAFETY: no preconditions.
        OwnerHandle(u64::from(unsafe { GetCurrentThreadId() }))
    }
}

fn modifier_flags(chord: &Chord) -> HOT_KEY_MODIFIERS {
    let m = chord.modifiers;
    let mut flags = MOD_NOREPEAT;
    if m.ctrl {
        flags |= MOD_CONTROL;
    }
    if m.alt {
        flags |= MOD_ALT;
    }
    if m.shift {
        flags |= MOD_SHIFT;
    }
    if m.meta {
        flags |= MOD_WIN;
    }
    flags
}

fn os_error(e: windows::core::Error) -> BackendError {
    if e.code() == ERROR_HOTKEY_ALREADY_REGISTERED.to_hresult() {
        BackendError::AlreadyTaken
    } else {
        BackendError::Os {
            code: e.code().0,
            message: e.message().to_string(),
        }
    }
}

fn wrong_thread(owner: OwnerHandle) -> BackendError {
    BackendError::Os {
        code: 0,
        message: format!("hotkeys of thread {} must be managed on that thread", owner.0),
    }
}

impl HotkeyBackend for Win32Backend {
    fn register(
        &mut self,
        owner: OwnerHandle,
        id: SlotId,
        chord: &Chord,
    ) -> Result<(), BackendError> {
        if owner != Self::current_owner() {
            return Err(wrong_thread(owner));
        }
        trace!("RegisterHotKey id={} vk={:#04x}", id, chord.key.vk());
        // SAFETY: a None window binds the hotkey to this thread's queue.
        unsafe { RegisterHotKey(None, i32::from(id.0), modifier_flags(chord), chord.key.vk()) }
            .map_err(os_error)
    }

    fn unregister(&mut self, owner: OwnerHandle, id: SlotId) -> Result<(), BackendError> {
        if owner != Self::current_owner() {
            return Err(wrong_thread(owner));
        }
        // SAFETY: only ids registered by this thread are passed here.
        unsafe { UnregisterHotKey(None, i32::from(id.0)) }.map_err(os_error)
    }

    fn owner_alive(&self, _owner: OwnerHandle) -> bool {
        // A thread queue lives as long as the process thread that owns it.
        true
    }
}

/// Drain the current thread's message queue without blocking. Each
/// `WM_HOTKEY` is handed to `on_hotkey`; everything else is dispatched as
/// usual. Returns the number of hotkey messages seen.
pub fn pump_messages<F>(mut on_hotkey: F) -> usize
where
    F: FnMut(SlotId) -> bool,
{
    let mut seen = 0;
    let mut msg = MSG::default();

    // SAFETY: msg is a valid out-parameter for the whole loop.
    while unsafe { PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE) }.as_bool() {
        if msg.message == WM_HOTKEY {
            seen += 1;
            match u16::try_from(msg.wParam.0) {
                Ok(id) => {
                    if !on_hotkey(SlotId(id)) {
                        debug!("Hotkey message for slot {} not handled", id);
                    }
                }
                Err(_) => debug!("Ignoring hotkey message with id {}", msg.wParam.0),
            }
            continue;
        }

        // SAFETY: msg was filled in by PeekMessageW.
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    seen
}
