//! Monitor power control.

use anyhow::Result;
use std::time::Duration;

/// Pause before switching off so the mouse movement that triggered the
/// command does not wake the monitors right away.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Ask every top-level window to put the monitors into power-off state.
#[cfg(windows)]
pub fn turn_off_monitors() -> Result<()> {
    use anyhow::Context;
    use log::info;
    use windows::Win32::Foundation::{LPARAM, WPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        HWND_BROADCAST, PostMessageW, SC_MONITORPOWER, WM_SYSCOMMAND,
    };

    const MONITOR_OFF: isize = 2;

    std::thread::sleep(SETTLE_DELAY);
    info!("Turning off all monitors");
    // SAFETY: posting to HWND_BROADCAST takes no pointers.
    unsafe {
        PostMessageW(
            Some(HWND_BROADCAST),
            WM_SYSCOMMAND,
            WPARAM(SC_MONITORPOWER as usize),
            LPARAM(MONITOR_OFF),
        )
    }
    .context("failed to broadcast monitor power-off")
}

#[cfg(not(windows))]
pub fn turn_off_monitors() -> Result<()> {
    anyhow::bail!("turning off monitors is only supported on Windows")
}
