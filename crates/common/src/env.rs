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

//! Environment variable name constants for SDB configuration.
//!
//! # Environment Variables
//!
//! - [`SDB_CONFIG`] - Overrides the location of the debugger configuration file
//! - [`SDB_LOG_DIR`] - Overrides the directory log files are written to

/// Environment variable for specifying the configuration file.
///
/// When set, the debugger configuration is read from (and saved to) this path instead
/// of `~/.sdb.toml`.
///
/// # Example
///
/// ```bash
/// SDB_CONFIG=./debugger.toml my-game
/// ```
pub const SDB_CONFIG: &str = "SDB_CONFIG";

/// Environment variable for specifying the log directory.
///
/// # Default
///
/// When not set, log files go to `<temp>/sdb-logs/<component>`.
pub const SDB_LOG_DIR: &str = "SDB_LOG_DIR";
