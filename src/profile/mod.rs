use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Extension of profile files inside the profiles directory.
pub const PROFILE_EXTENSION: &str = "xml";

/// The display configuration engine that captures and applies profiles.
pub trait DisplayEngine {
    /// Capture the current display layout into `path`.
    fn save_profile(&mut self, path: &Path) -> bool;
    /// Apply the layout stored in `path`.
    fn load_profile(&mut self, path: &Path) -> bool;
}

/// Delegates to an external display configuration program, invoked as
/// `<program> -save:<path>` or `<program> -load:<path>`.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: PathBuf,
}

impl ExternalTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, verb: &str, path: &Path) -> bool {
        let arg = format!("-{verb}:{}", path.display());
        debug!("Running {} {}", self.program.display(), arg);

        match Command::new(&self.program).arg(&arg).status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!("{} {} exited with {}", self.program.display(), arg, status);
                false
            }
            Err(e) => {
                warn!("Failed to start {}: {e}", self.program.display());
                false
            }
        }
    }
}

impl DisplayEngine for ExternalTool {
    fn save_profile(&mut self, path: &Path) -> bool {
        self.run("save", path)
    }

    fn load_profile(&mut self, path: &Path) -> bool {
        self.run("load", path)
    }
}

/// The directory of saved profiles, one `<name>.xml` per profile.
pub struct ProfileStore {
    profiles_dir: PathBuf,
}

impl ProfileStore {
    pub fn new(profiles_dir: impl Into<PathBuf>) -> Result<Self> {
        let profiles_dir = profiles_dir.into();
        fs::create_dir_all(&profiles_dir).context("Failed to create profiles directory")?;
        Ok(Self { profiles_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.profiles_dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.profiles_dir
            .join(format!("{name}.{PROFILE_EXTENSION}"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Base names of every profile file, sorted.
    pub fn names(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();

        if !self.profiles_dir.exists() {
            return Ok(names);
        }

        for entry in fs::read_dir(&self.profiles_dir).context("Failed to read profiles directory")? {
            let path = entry?.path();

            if !path.is_file()
                || path.extension().and_then(|s| s.to_str()) != Some(PROFILE_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.insert(stem.to_string());
            }
        }

        Ok(names)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);

        if path.exists() {
            fs::remove_file(&path).context("Failed to delete profile file")?;
            info!("Deleted profile '{name}'");
            Ok(())
        } else {
            Err(anyhow::anyhow!("Profile not found: {name}"))
        }
    }
}

/// Strip characters that cannot appear in a file name. Returns `None` when
/// nothing but whitespace is left.
pub fn sanitize_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?' | '\\' | '/') && !c.is_control())
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_names_lists_only_profile_files() -> Result<()> {
        let dir = TempDir::new()?;
        let store = ProfileStore::new(dir.path().join("Profiles"))?;

        fs::write(store.path_for("Office"), "<xml/>")?;
        fs::write(store.path_for("Home"), "<xml/>")?;
        fs::write(store.dir().join("notes.txt"), "")?;
        fs::create_dir(store.dir().join("Nested.xml"))?;

        let names: Vec<String> = store.names()?.into_iter().collect();
        assert_eq!(names, vec!["Home".to_string(), "Office".to_string()]);
        Ok(())
    }

    #[test]
    fn test_delete() -> Result<()> {
        let dir = TempDir::new()?;
        let store = ProfileStore::new(dir.path())?;
        fs::write(store.path_for("Office"), "")?;

        assert!(store.exists("Office"));
        store.delete("Office")?;
        assert!(!store.exists("Office"));
        assert!(store.delete("Office").is_err());
        Ok(())
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Desk: left/right?").as_deref(), Some("Desk leftright"));
        assert_eq!(sanitize_name("  Office  ").as_deref(), Some("Office"));
        assert_eq!(sanitize_name("Gaming & TV").as_deref(), Some("Gaming & TV"));
        assert_eq!(sanitize_name("<>|"), None);
        assert_eq!(sanitize_name("   "), None);
    }

    #[test]
    fn test_external_tool_missing_program_fails() {
        let mut tool = ExternalTool::new("/nonexistent/display-tool");
        assert!(!tool.load_profile(Path::new("Office.xml")));
        assert!(!tool.save_profile(Path::new("Office.xml")));
    }
}
