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

//! SDB Common - Shared types for SDB components
//!
//! This crate holds the plain data shared by the debugging engine and whatever drives
//! it: type identities, cache addresses, displayable values, local-variable keys, call
//! stack entries and breakpoints.

/// Common types used throughout the SDB ecosystem including addresses, values and breakpoints
pub mod types;

/// Environment variable names recognised by SDB components
pub mod env;
