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

//! Breakpoints and the set the debugger matches against.

use std::{collections::HashSet, fmt::Display, str::FromStr};

use eyre::{bail, Error, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Represents a breakpoint in the debugger.
/// A breakpoint either fires when a named function is entered or when execution reaches
/// a specific line of a script section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Breakpoint {
    /// Break on entry to the function with this qualified name.
    Function(String),
    /// Break when a statement on this line of this section is reached.
    Source {
        /// Script section (source unit path).
        section: String,
        /// Line number in the section (1-based).
        line: u32,
    },
}

impl Breakpoint {
    /// Creates a function breakpoint.
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function(name.into())
    }

    /// Creates a source location breakpoint.
    pub fn source(section: impl Into<String>, line: u32) -> Self {
        Self::Source { section: section.into(), line }
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function(name) => write!(f, "{name}"),
            Self::Source { section, line } => write!(f, "{section}:{line}"),
        }
    }
}

impl FromStr for Breakpoint {
    type Err = Error;

    /// Parses a breakpoint from a string.
    /// Format: `<section>:<line>` or `<function>`
    /// Examples:
    /// - `main.as:10` - Breakpoint at source location
    /// - `scripts/ai/monster.as:120` - Section paths may contain directories
    /// - `Player::think` - Breakpoint on function entry
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            bail!("Empty breakpoint");
        }

        if let Some((section, line)) = trimmed.rsplit_once(':') {
            // `ns::func` splits into `ns:` and `func`, which is not a line
            if !section.is_empty() && !section.ends_with(':') {
                let line = line.trim();
                if line.is_empty() {
                    bail!("Missing line number in breakpoint: {s}");
                }
                return match line.parse::<u32>() {
                    Ok(0) => bail!("Line numbers are 1-based, got 0 in: {s}"),
                    Ok(line) => Ok(Self::source(section.trim(), line)),
                    Err(e) => bail!("Invalid line number in breakpoint {s}: {e}"),
                };
            }
        }

        if trimmed.chars().any(char::is_whitespace) {
            bail!("Invalid function name in breakpoint: {s}");
        }
        Ok(Self::function(trimmed))
    }
}

/// The set of active breakpoints.
///
/// Membership is structural; toggling inserts an absent breakpoint and removes a present
/// one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakpointSet {
    breakpoints: HashSet<Breakpoint>,
}

impl BreakpointSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles a breakpoint; returns whether it is now set.
    pub fn toggle(&mut self, breakpoint: Breakpoint) -> bool {
        if self.breakpoints.remove(&breakpoint) {
            false
        } else {
            self.breakpoints.insert(breakpoint);
            true
        }
    }

    /// Toggles a line breakpoint; returns whether it is now set.
    pub fn toggle_line(&mut self, section: &str, line: u32) -> bool {
        self.toggle(Breakpoint::source(section, line))
    }

    /// Toggles a function breakpoint; returns whether it is now set.
    pub fn toggle_function(&mut self, name: &str) -> bool {
        self.toggle(Breakpoint::function(name))
    }

    /// Adds a breakpoint; returns `false` if it was already present.
    pub fn insert(&mut self, breakpoint: Breakpoint) -> bool {
        self.breakpoints.insert(breakpoint)
    }

    /// Removes a breakpoint; returns `false` if it was not present.
    pub fn remove(&mut self, breakpoint: &Breakpoint) -> bool {
        self.breakpoints.remove(breakpoint)
    }

    /// Whether the breakpoint is set.
    pub fn contains(&self, breakpoint: &Breakpoint) -> bool {
        self.breakpoints.contains(breakpoint)
    }

    /// Whether a line breakpoint exists at exactly this section and line.
    pub fn matches_line(&self, section: &str, line: u32) -> bool {
        self.breakpoints.iter().any(|bp| {
            matches!(bp, Breakpoint::Source { section: s, line: l } if *l == line && s == section)
        })
    }

    /// Whether a function breakpoint exists for this qualified name.
    pub fn matches_function(&self, qualified_name: &str) -> bool {
        self.breakpoints
            .iter()
            .any(|bp| matches!(bp, Breakpoint::Function(name) if name == qualified_name))
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether no breakpoint is set.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Removes every breakpoint.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// All breakpoints in a stable order (functions first, then by section and line).
    pub fn sorted(&self) -> Vec<Breakpoint> {
        self.breakpoints.iter().cloned().sorted().collect()
    }

    /// Iterates over the breakpoints in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }
}
