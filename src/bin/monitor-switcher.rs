use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam::channel::Receiver;
use log::{info, warn};
use monitor_switcher::hotkey::{BindingChange, Chord, OwnerHandle, Registrar, SharedRegistrar};
use monitor_switcher::profile::ExternalTool;
use monitor_switcher::settings::{Settings, SettingsPaths};
use monitor_switcher::switcher::{Switcher, SwitcherEvent};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "monitor-switcher")]
#[command(version)]
#[command(about = "Save monitor layouts as profiles and switch between them with global hotkeys.")]
struct Args {
    #[arg(
        long,
        env = "MONITOR_SWITCHER_SETTINGS",
        help = "Directory holding Hotkeys.xml, settings.json and Profiles/"
    )]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List profiles and their hotkeys
    List,
    /// Save the current monitor layout as a profile
    Save { name: String },
    /// Apply a saved profile
    Load { name: String },
    /// Delete a profile and its hotkey
    Delete { name: String },
    /// Edit hotkey bindings
    #[command(subcommand)]
    Hotkey(HotkeyCommand),
    /// Turn off all monitors
    Off,
    /// Listen for hotkeys until Ctrl+C (default)
    Run,
}

#[derive(Subcommand, Debug)]
enum HotkeyCommand {
    /// Bind a chord such as "Ctrl+Alt+F1" to a profile
    Set { profile: String, chord: String },
    /// Remove the hotkey of a profile
    Clear { profile: String },
}

/// Accept the old `-settings:<dir>` switch alongside `--settings <dir>`.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out = Vec::new();
    for arg in args {
        match arg.strip_prefix("-settings:") {
            Some(dir) => {
                out.push("--settings".to_string());
                out.push(dir.to_string());
            }
            None => out.push(arg),
        }
    }
    out
}

#[cfg(windows)]
fn platform_registrar() -> (SharedRegistrar, OwnerHandle) {
    use monitor_switcher::hotkey::windows::Win32Backend;

    (
        Registrar::shared(Box::new(Win32Backend::new())),
        Win32Backend::current_owner(),
    )
}

#[cfg(not(windows))]
fn platform_registrar() -> (SharedRegistrar, OwnerHandle) {
    use monitor_switcher::hotkey::MemoryBackend;

    warn!("No global hotkey facility on this platform, hotkeys are only simulated");
    (
        Registrar::shared(Box::new(MemoryBackend::new())),
        OwnerHandle(u64::from(std::process::id())),
    )
}

fn report(events: &Receiver<SwitcherEvent>) {
    for event in events.try_iter() {
        match event {
            SwitcherEvent::ProfileLoaded(_) | SwitcherEvent::ProfileSaved(_) => info!("{event}"),
            _ => {
                warn!("{event}");
                println!("{event}");
            }
        }
    }
}

fn list(switcher: &Switcher) -> Result<()> {
    let names = switcher.profile_names()?;
    if names.is_empty() {
        println!("No profiles in {}", switcher.profiles().dir().display());
    }
    for name in names {
        println!("{}", switcher.binding_label(&name));
    }
    Ok(())
}

fn describe(change: &BindingChange, profile: &str) -> String {
    match change {
        BindingChange::Added { .. } | BindingChange::Updated { .. } => {
            format!("Hotkey set: {profile}")
        }
        BindingChange::Removed { previous } => format!("Removed {previous} from {profile}"),
        BindingChange::Unchanged => format!("No change for {profile}"),
    }
}

#[cfg(windows)]
fn run(switcher: &mut Switcher, owner: OwnerHandle) -> Result<()> {
    use monitor_switcher::hotkey::windows::pump_messages;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    const PROFILE_SCAN_INTERVAL: Duration = Duration::from_secs(1);

    let running = Arc::new(AtomicBool::new(true));
    let shutdown_flag = Arc::clone(&running);

    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        shutdown_flag.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl+C handler")?;

    let events = switcher.events();
    switcher.attach(owner)?;
    report(&events);

    let poll = Duration::from_millis(switcher.settings().poll_interval_ms.max(1));
    info!("Listening for {} hotkey(s)", switcher.hotkeys().len());

    let mut last_scan = Instant::now();
    while running.load(Ordering::SeqCst) {
        pump_messages(|slot| switcher.handle_hotkey(slot));

        if last_scan.elapsed() >= PROFILE_SCAN_INTERVAL {
            last_scan = Instant::now();
            if let Err(e) = switcher.poll_profiles() {
                warn!("Failed to rescan profiles: {:#}", e);
            }
        }

        report(&events);
        thread::sleep(poll);
    }

    switcher.shutdown();
    Ok(())
}

#[cfg(not(windows))]
fn run(_switcher: &mut Switcher, _owner: OwnerHandle) -> Result<()> {
    anyhow::bail!("listening for global hotkeys is only supported on Windows")
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse_from(normalize_args(std::env::args()));
    info!("Monitor Switcher v{}", env!("CARGO_PKG_VERSION"));
    info!("Args: {:?}", args);

    let paths = args
        .settings
        .map_or_else(SettingsPaths::from_environment, SettingsPaths::new);
    info!("Settings directory: {}", paths.root.display());

    let settings = Settings::load(&paths.settings_file())
        .with_context(|| format!("failed to load settings from '{}'", paths.root.display()))?;
    let engine = ExternalTool::new(&settings.display_tool);

    let (registrar, owner) = platform_registrar();
    let mut switcher = Switcher::open_with_settings(paths, settings, registrar, Box::new(engine))
        .context("failed to open settings directory")?;
    let events = switcher.events();
    report(&events);

    match args.command.unwrap_or(Command::Run) {
        Command::List => list(&switcher)?,
        Command::Save { name } => {
            let saved = switcher.save_profile(&name)?;
            println!("Saved profile {saved}");
        }
        Command::Load { name } => {
            if !switcher.profiles().exists(&name) {
                anyhow::bail!("profile \"{name}\" does not exist");
            }
            if !switcher.load_profile(&name) {
                report(&events);
                anyhow::bail!("unable to load profile \"{name}\"");
            }
        }
        Command::Delete { name } => {
            switcher.delete_profile(&name)?;
            println!("Deleted profile {name}");
        }
        Command::Hotkey(HotkeyCommand::Set { profile, chord }) => {
            let chord: Chord = chord
                .parse()
                .with_context(|| format!("invalid hotkey '{chord}'"))?;
            // Registering against this process shows whether the chord is free.
            switcher.attach(owner)?;
            let change = switcher.set_hotkey(&profile, chord)?;
            println!("{}", describe(&change, &profile));
            println!("{}", switcher.binding_label(&profile));
        }
        Command::Hotkey(HotkeyCommand::Clear { profile }) => {
            let change = switcher.clear_hotkey(&profile)?;
            println!("{}", describe(&change, &profile));
        }
        Command::Off => monitor_switcher::power::turn_off_monitors()?,
        Command::Run => run(&mut switcher, owner)?,
    }

    report(&events);
    switcher.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_legacy_settings_switch_is_rewritten() {
        assert_eq!(
            normalize_args(strings(&["monitor-switcher", "-settings:C:\\cfg", "list"])),
            strings(&["monitor-switcher", "--settings", "C:\\cfg", "list"])
        );
    }

    #[test]
    fn test_parse_hotkey_set() {
        let args = Args::parse_from(strings(&[
            "monitor-switcher",
            "hotkey",
            "set",
            "Office",
            "Ctrl+Alt+F1",
        ]));
        match args.command {
            Some(Command::Hotkey(HotkeyCommand::Set { profile, chord })) => {
                assert_eq!(profile, "Office");
                assert_eq!(chord, "Ctrl+Alt+F1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_off() {
        let args = Args::parse_from(strings(&["monitor-switcher", "off"]));
        assert!(matches!(args.command, Some(Command::Off)));
    }
}
