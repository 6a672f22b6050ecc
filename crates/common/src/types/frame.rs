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

/// One script frame of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStackEntry {
    /// Function declaration, e.g. `void Player::think(float)`.
    pub declaration: String,
    /// Script section the frame is executing in.
    pub section: String,
    /// 1-based line.
    pub row: u32,
    /// 1-based column.
    pub column: u32,
}

/// Pending control-flow action of the debugger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebugAction {
    /// Run until a breakpoint.
    #[default]
    None,
    /// Break on the next instruction boundary.
    StepInto,
    /// Break once the stack is no deeper than where the step was requested.
    StepOver,
    /// Break once the stack is shallower than where the step was requested.
    StepOut,
}
