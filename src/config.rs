//! Configuration for mosaic.
//!
//! The configuration file is located at `~/.mosaic/config.toml` unless
//! `--config` names another one:
//!
//! ```toml
//! sidebar_width = 20
//! padding = 0
//! scrollback = 10000
//! term = "xterm-256color"
//! log_level = "debug"
//!
//! [[process]]
//! key = "shell"
//! icon = ">"
//! command = ["bash", "-l"]
//! killable = false
//!
//! [[process]]
//! key = "web"
//! title = "Web"
//! command = ["npm", "run", "dev"]
//! cwd = "packages/web"
//! autostart = false
//! env = { PORT = "3000" }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::term::DEFAULT_SCROLLBACK;
use crate::wm::{LayoutConfig, ProcessSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sidebar_width: u16,
    pub padding: u16,
    /// Primary-screen history lines per pane
    pub scrollback: usize,
    /// `TERM` exported to every child
    pub term: String,
    /// Tracing filter, overridden by `MOSAIC_LOG`
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    #[serde(rename = "process")]
    pub processes: Vec<ProcessConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sidebar_width: 20,
            padding: 0,
            scrollback: DEFAULT_SCROLLBACK,
            term: "xterm-256color".to_string(),
            log_level: None,
            log_file: None,
            processes: Vec::new(),
        }
    }
}

/// One `[[process]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub key: String,
    /// Sidebar title; the key when absent
    pub title: Option<String>,
    pub icon: String,
    pub command: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub killable: bool,
    pub autostart: bool,
    pub env: BTreeMap<String, String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            title: None,
            icon: String::new(),
            command: Vec::new(),
            cwd: None,
            killable: true,
            autostart: true,
            env: BTreeMap::new(),
        }
    }
}

impl ProcessConfig {
    pub fn to_spec(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::new(self.key.clone(), self.command.clone())
            .icon(self.icon.clone())
            .killable(self.killable)
            .autostart(self.autostart);
        if let Some(title) = &self.title {
            spec = spec.title(title.clone());
        }
        if let Some(cwd) = &self.cwd {
            spec = spec.cwd(cwd.clone());
        }
        for (key, value) in &self.env {
            spec = spec.env(key.clone(), value.clone());
        }
        spec
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing default file gives the defaults; an explicitly named file
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !required => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `~/.mosaic`, where the config and log file live
    pub fn config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".mosaic"))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Where the log goes: `log_file`, else `~/.mosaic/mosaic.log`
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .or_else(|| Self::config_dir().map(|dir| dir.join("mosaic.log")))
    }

    pub fn layout(&self) -> LayoutConfig {
        LayoutConfig {
            sidebar_width: self.sidebar_width,
            padding: self.padding,
            scrollback: self.scrollback,
        }
    }

    /// Process specs in file order
    pub fn specs(&self) -> Vec<ProcessSpec> {
        self.processes.iter().map(ProcessConfig::to_spec).collect()
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sidebar_width, 20);
        assert_eq!(config.term, "xterm-256color");
        assert_eq!(config.layout(), LayoutConfig::default());
    }

    #[test]
    fn test_process_tables() {
        let config = Config::from_toml_str(
            r#"
            padding = 1
            log_level = "debug"

            [[process]]
            key = "shell"
            command = ["bash", "-l"]
            killable = false

            [[process]]
            key = "web"
            title = "Web"
            icon = "W"
            command = ["npm", "run", "dev"]
            cwd = "packages/web"
            autostart = false
            env = { PORT = "3000" }
            "#,
        )
        .unwrap();

        assert_eq!(config.padding, 1);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        let specs = config.specs();
        assert_eq!(specs.len(), 2);

        assert_eq!(specs[0].key, "shell");
        assert_eq!(specs[0].title, "shell");
        assert!(!specs[0].killable);
        assert!(specs[0].autostart);

        assert_eq!(specs[1].title, "Web");
        assert_eq!(specs[1].icon, "W");
        assert_eq!(specs[1].args, vec!["npm", "run", "dev"]);
        assert_eq!(specs[1].cwd, Some(PathBuf::from("packages/web")));
        assert!(!specs[1].autostart);
        assert_eq!(specs[1].env.get("PORT").map(String::as_str), Some("3000"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml_str("sidebar_width = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join("mosaic-config-does-not-exist.toml");
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let path = std::env::temp_dir().join(format!("mosaic-config-{}.toml", std::process::id()));
        fs::write(&path, "sidebar_width = 30\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(config.sidebar_width, 30);
    }

    #[test]
    fn test_log_path_prefers_config() {
        let config = Config {
            log_file: Some(PathBuf::from("/tmp/m.log")),
            ..Config::default()
        };
        assert_eq!(config.log_path(), Some(PathBuf::from("/tmp/m.log")));
    }
}
