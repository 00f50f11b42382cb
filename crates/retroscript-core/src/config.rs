//! Persistent configuration for RetroScript.
//!
//! Stores user settings in `~/.retroscript/config.json`. Missing fields take
//! their defaults, so an empty file (or no file at all) is a valid config.
//!
//! # Example
//!
//! ```no_run
//! use retroscript_core::config::RetroConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = RetroConfig::load();
//! println!("max call depth: {}", config.max_call_depth);
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::interpreter::DEFAULT_MAX_CALL_DEPTH;

const CONFIG_FILENAME: &str = "config.json";

/// Returns `~/.retroscript`, creating it if needed.
pub fn retroscript_dir() -> io::Result<PathBuf> {
    let dir = dirs::home_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Could not determine home directory"))?
        .join(".retroscript");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn default_max_call_depth() -> usize {
    DEFAULT_MAX_CALL_DEPTH
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Persistent RetroScript configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetroConfig {
    /// Deepest allowed nesting of function calls.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,

    /// Capacity of buses built with [`EventBus::from_config`](crate::events::EventBus::from_config).
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Directory for log files. Logs go to stderr when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for RetroConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_dir: None,
        }
    }
}

impl RetroConfig {
    /// Load config from `~/.retroscript/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        match retroscript_dir() {
            Ok(dir) => Self::load_from(&dir.join(CONFIG_FILENAME)),
            Err(_) => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to `~/.retroscript/config.json`.
    pub fn save(&self) -> io::Result<()> {
        self.save_to(&retroscript_dir()?.join(CONFIG_FILENAME))
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}
