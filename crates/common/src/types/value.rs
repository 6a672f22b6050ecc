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

//! Addresses and displayable values.
//!
//! [`VariableAddress`] is the identity under which every rendered value is cached for the
//! duration of a suspension episode. It never grants access to the memory it names; all
//! reads go through the execution cache, which knows whether a location lives in runtime
//! memory or in a buffer captured out of it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TypeId;

/// Opaque location of a value in runtime-owned memory.
///
/// The value is only meaningful while the owning context stays suspended at the
/// episode that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawAddress(u64);

impl RawAddress {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Wraps a runtime pointer value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The runtime pointer value. Only runtime implementations should need this.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the null address.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `offset` bytes past this one.
    pub const fn offset(self, offset: usize) -> Self {
        Self(self.0.wrapping_add(offset as u64))
    }
}

impl fmt::Display for RawAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifier of a buffer captured out of runtime memory within one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureId(pub u32);

/// Where the bytes of a value live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    /// Borrowed runtime memory.
    Runtime(RawAddress),
    /// A byte offset into a buffer owned by a cached variable state.
    Captured {
        /// Capture the buffer belongs to.
        capture: CaptureId,
        /// Offset into the buffer.
        offset: usize,
    },
}

impl Location {
    /// Location `offset` bytes further into the same memory region.
    pub const fn offset(self, offset: usize) -> Self {
        match self {
            Self::Runtime(addr) => Self::Runtime(addr.offset(offset)),
            Self::Captured { capture, offset: base } => {
                Self::Captured { capture, offset: base + offset }
            }
        }
    }

    /// Whether this location is the null runtime address.
    pub const fn is_null(self) -> bool {
        matches!(self, Self::Runtime(addr) if addr.is_null())
    }

    /// Whether this location points into a captured buffer.
    pub const fn is_captured(self) -> bool {
        matches!(self, Self::Captured { .. })
    }
}

/// Type identity plus location: the cache key of a rendered value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableAddress {
    /// Declared type of the value at `location`.
    pub type_id: TypeId,
    /// Where the value lives.
    pub location: Location,
}

impl VariableAddress {
    /// Address of a value in runtime memory.
    pub const fn runtime(type_id: TypeId, address: RawAddress) -> Self {
        Self { type_id, location: Location::Runtime(address) }
    }

    /// Address of a value at `offset` into a captured buffer.
    pub const fn captured(type_id: TypeId, capture: CaptureId, offset: usize) -> Self {
        Self { type_id, location: Location::Captured { capture, offset } }
    }

    /// Same location reinterpreted as another type.
    pub const fn with_type(self, type_id: TypeId) -> Self {
        Self { type_id, location: self.location }
    }
}

impl fmt::Display for VariableAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Location::Runtime(addr) => write!(f, "{}@{addr}", self.type_id),
            Location::Captured { capture, offset } => {
                write!(f, "{}@capture{}+{offset}", self.type_id, capture.0)
            }
        }
    }
}

/// How a rendered value can be expanded by a front-end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpandKind {
    /// Leaf value.
    #[default]
    None,
    /// Expands to show the full display value (long strings).
    Value,
    /// Expands to named child views.
    Children,
    /// Expands to leaf entries.
    Entries,
}

/// A single displayable value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableValue {
    /// Text shown in the value column.
    pub display: String,
    /// Render with muted styling (handles, sentinels, truncation markers).
    pub disabled: bool,
    /// How the value expands.
    pub expand: ExpandKind,
}

impl VariableValue {
    /// A plain leaf value.
    pub fn new(display: impl Into<String>) -> Self {
        Self { display: display.into(), disabled: false, expand: ExpandKind::None }
    }

    /// A leaf value rendered with muted styling.
    pub fn muted(display: impl Into<String>) -> Self {
        Self { display: display.into(), disabled: true, expand: ExpandKind::None }
    }

    /// Sets the expansion kind.
    pub fn expandable(mut self, expand: ExpandKind) -> Self {
        self.expand = expand;
        self
    }

    /// Sets muted styling.
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

impl From<&str> for VariableValue {
    fn from(display: &str) -> Self {
        Self::new(display)
    }
}

impl From<String> for VariableValue {
    fn from(display: String) -> Self {
        Self::new(display)
    }
}

/// A leaf entry shown under a value whose expansion kind is [`ExpandKind::Entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
pub enum VariableEntry {
    /// One value, e.g. one iteration step or one named flag bit.
    Value(VariableValue),
    /// One iteration step that yielded several values.
    Group {
        /// Position of the step in the iteration.
        index: usize,
        /// Values yielded by the step, in order.
        values: Vec<VariableValue>,
    },
}

impl VariableEntry {
    /// Flattened display text of the entry.
    pub fn display(&self) -> String {
        match self {
            Self::Value(value) => value.display.clone(),
            Self::Group { index, values } => {
                let parts: Vec<&str> = values.iter().map(|v| v.display.as_str()).collect();
                format!("[{index}] {}", parts.join(", "))
            }
        }
    }
}
