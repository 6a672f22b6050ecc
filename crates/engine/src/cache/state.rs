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

//! Arena handles, cached states and the named views pointing at them.

use sdb_common::types::{VariableAddress, VariableEntry, VariableValue};
use serde::{Deserialize, Serialize};

/// Handle of a [`VariableState`] inside an [`ExecutionCache`](crate::ExecutionCache).
///
/// Handles are only meaningful for the cache (and episode) that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// Position of the state in the cache's arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Cached, displayable content of one [`VariableAddress`].
#[derive(Debug, Clone, Default)]
pub struct VariableState {
    /// The rendered value.
    pub value: VariableValue,
    /// Copy of a temporary's bytes. When present, `address` points into it.
    pub(crate) buffer: Option<Box<[u8]>>,
    /// Set once children or entries have been queried.
    pub queried: bool,
    /// Child views; meaningful when the value expands to children.
    pub children: Vec<VariableView>,
    /// Leaf entries; meaningful when the value expands to entries.
    pub entries: Vec<VariableEntry>,
    /// Key under which the state is cached.
    pub(crate) address: Option<VariableAddress>,
    /// Concrete object the address resolved to when last evaluated.
    pub(crate) target: Option<VariableAddress>,
}

impl VariableState {
    /// The address this state is cached under.
    pub fn address(&self) -> Option<VariableAddress> {
        self.address
    }

    /// Whether the state owns a private copy of its bytes.
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// The private copy of a temporary's bytes, if any.
    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// Drops previously queried children and entries so the next expansion re-queries.
    pub(crate) fn reset_expansion(&mut self) {
        self.queried = false;
        self.children.clear();
        self.entries.clear();
    }
}

/// A named reference to a cached [`VariableState`].
///
/// Several views may share one state, e.g. the same global reached through two names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableView {
    /// Name shown for the variable.
    pub name: String,
    /// Declared type shown for the variable.
    pub type_name: String,
    /// The referenced state.
    pub state: StateId,
}

impl VariableView {
    /// Creates a view.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, state: StateId) -> Self {
        Self { name: name.into(), type_name: type_name.into(), state }
    }
}

impl PartialEq for VariableView {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.state == other.state
    }
}

impl Eq for VariableView {}
