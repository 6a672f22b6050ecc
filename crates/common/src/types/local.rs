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

use serde::{Deserialize, Serialize};

/// Category of a stack-frame local.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum LocalKind {
    /// Parameter passed to the function.
    Parameter,
    /// Named local variable.
    Variable,
    /// Compiler-introduced temporary; has a stack offset and a type but no name.
    Temporary,
}

/// Key of a cached local list: which frame, and which kind of locals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalKey {
    /// Stack level, 0 being the innermost frame.
    pub level: usize,
    /// Kind of locals listed under this key.
    pub kind: LocalKind,
}

impl LocalKey {
    /// Creates a new key.
    pub const fn new(level: usize, kind: LocalKind) -> Self {
        Self { level, kind }
    }
}
