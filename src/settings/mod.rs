use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "monitor-switcher";
const WINDOWS_APP_DIR_NAME: &str = "MonitorSwitcher";
const SETTINGS_FILENAME: &str = "settings.json";
const HOTKEYS_FILENAME: &str = "Hotkeys.xml";
const PROFILES_DIR_NAME: &str = "Profiles";

/// Where everything lives inside one settings directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsPaths {
    pub root: PathBuf,
}

impl SettingsPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The platform default settings directory.
    pub fn from_environment() -> Self {
        Self::new(Self::default_root())
    }

    fn default_root() -> PathBuf {
        if cfg!(windows)
            && let Ok(appdata) = std::env::var("APPDATA")
        {
            return PathBuf::from(appdata).join(WINDOWS_APP_DIR_NAME);
        }

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir).join(APP_DIR_NAME)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".config").join(APP_DIR_NAME)
        } else {
            // Fallback to current directory
            PathBuf::from(".")
        }
    }

    pub fn hotkeys_file(&self) -> PathBuf {
        self.root.join(HOTKEYS_FILENAME)
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILENAME)
    }

    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.profiles_dir()).context("Failed to create settings directory")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Program that captures and applies display layouts.
    pub display_tool: String,
    /// Idle sleep between message pump passes.
    pub poll_interval_ms: u64,
    /// Report bindings dropped because their profile disappeared.
    pub notify_on_prune: bool,
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Display Tool: {}", self.display_tool)?;
        writeln!(f, "Poll Interval: {} ms", self.poll_interval_ms)?;
        writeln!(f, "Notify On Prune: {}", self.notify_on_prune)?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_tool: "MonitorSwitcher.exe".to_string(),
            poll_interval_ms: 25,
            notify_on_prune: true,
        }
    }
}

impl Settings {
    /// Load from `path`, writing the defaults back when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path).context("Failed to read settings file")?;
            let settings: Settings =
                serde_json::from_str(&contents).context("Failed to parse settings")?;
            debug!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            info!("No settings file found, using defaults");
            let settings = Settings::default();
            // Try to save defaults, but don't fail if we can't
            let _ = settings.save(path);
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, json).context("Failed to write settings file")?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = SettingsPaths::new(dir.path()).settings_file();

        let settings = Settings::load(&path)?;
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_partial_file_fills_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, r#"{ "display_tool": "C:\\Tools\\ms.exe" }"#)?;

        let settings = Settings::load(&path)?;
        assert_eq!(settings.display_tool, "C:\\Tools\\ms.exe");
        assert_eq!(settings.poll_interval_ms, 25);
        assert!(settings.notify_on_prune);
        Ok(())
    }

    #[test]
    fn test_invalid_json_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "{ not json")?;

        assert!(Settings::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_paths_layout() {
        let paths = SettingsPaths::new("/cfg");
        assert_eq!(paths.hotkeys_file(), Path::new("/cfg/Hotkeys.xml"));
        assert_eq!(paths.profiles_dir(), Path::new("/cfg/Profiles"));
        assert_eq!(paths.settings_file(), Path::new("/cfg/settings.json"));
    }
}
