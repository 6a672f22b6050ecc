// SDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Debugger configuration.
//!
//! The configuration is a small TOML file (`~/.sdb.toml` by default, or the path in the
//! `SDB_CONFIG` environment variable). Every field has a default, so partial files and
//! missing files are both fine.

use std::{
    collections::BTreeSet,
    env, fs,
    path::{Path, PathBuf},
};

use eyre::{eyre, Result, WrapErr};
use sdb_common::env::SDB_CONFIG;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default cap on the number of entries produced when expanding an iterable value.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default number of characters of a value shown before truncation.
pub const DEFAULT_MAX_DISPLAY_LEN: usize = 32;

/// Tunables of the evaluator registry and the execution cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Maximum number of iteration steps listed when expanding an iterable value.
    pub max_entries: usize,
    /// Number of characters of a value shown in a value column before truncation.
    pub max_display_len: usize,
    /// Enum types (by unqualified or qualified name) always rendered as bit-flag sets.
    pub flag_enums: BTreeSet<String>,
    /// Whether to walk the runtime's functions to build the section index.
    pub discover_sections: bool,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_display_len: DEFAULT_MAX_DISPLAY_LEN,
            flag_enums: BTreeSet::new(),
            discover_sections: true,
        }
    }
}

impl DebuggerConfig {
    /// Marks an enum type as a bit-flag set.
    pub fn with_flag_enum(mut self, name: impl Into<String>) -> Self {
        self.flag_enums.insert(name.into());
        self
    }

    /// Sets the iteration cap.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Whether the enum with this (unqualified or qualified) name is a flag set.
    pub fn is_flag_enum(&self, name: &str, namespace: &str) -> bool {
        if self.flag_enums.contains(name) {
            return true;
        }
        !namespace.is_empty() && self.flag_enums.contains(&format!("{namespace}::{name}"))
    }

    /// Shortens a display value for a value column.
    pub fn truncate<'a>(&self, display: &'a str) -> &'a str {
        match display.char_indices().nth(self.max_display_len) {
            Some((idx, _)) => &display[..idx],
            None => display,
        }
    }

    /// Get the config file path (`$SDB_CONFIG`, or `~/.sdb.toml`)
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(SDB_CONFIG).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().ok_or_else(|| eyre!("Unable to determine home directory"))?;
        Ok(home.join(".sdb.toml"))
    }

    /// Load configuration from the default path, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    /// Load configuration from a file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {path:?}"))?;

        let config: Self =
            toml::from_str(&content).wrap_err("Failed to parse config file as TOML")?;

        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).wrap_err("Failed to serialize config to TOML")?;

        fs::write(path, content)
            .wrap_err_with(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved configuration to {:?}", path);
        Ok(())
    }
}
