//! Configuration for the `scmt` CLI — heap size, GC verbosity, and the
//! default entry-point behavior, loaded from a `scmt.toml` found by
//! searching the current directory and then the user's config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScmtError};

pub const CONFIG_FILE_NAME: &str = "scmt.toml";

/// What a bare `scmt <file>` invocation (no subcommand) does by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryMode {
    /// Tree-walk evaluate the source.
    Eval,
    /// Compile, assemble, and execute on the VM.
    Run,
}

impl Default for EntryMode {
    fn default() -> Self {
        EntryMode::Run
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_heap_bytes")]
    pub heap_bytes: usize,

    #[serde(default)]
    pub gc_verbose: bool,

    #[serde(default)]
    pub default_mode: EntryMode,
}

fn default_heap_bytes() -> usize {
    1 << 20
}

impl Default for Config {
    fn default() -> Self {
        Self { heap_bytes: default_heap_bytes(), gc_verbose: false, default_mode: EntryMode::default() }
    }
}

impl Config {
    /// Searches the current directory, then the user's config directory,
    /// for `scmt.toml`; falls back to defaults if neither has one.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ScmtError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    fn find_config_file() -> Option<PathBuf> {
        let here = PathBuf::from(CONFIG_FILE_NAME);
        if here.exists() {
            return Some(here);
        }
        dirs::config_dir().map(|dir| dir.join("scmt").join(CONFIG_FILE_NAME)).filter(|p| p.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_runs_on_the_vm_by_default() {
        let config = Config::default();
        assert_eq!(config.default_mode, EntryMode::Run);
        assert!(config.heap_bytes > 0);
    }

    #[test]
    fn load_from_path_parses_a_partial_toml_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scmt.toml");
        std::fs::write(&path, "heap_bytes = 4096\n").unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.heap_bytes, 4096);
        assert_eq!(config.default_mode, EntryMode::Run);
    }
}
