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

//! SDB Engine - debugging core for embedded script runtimes
//!
//! The engine sits between a script runtime, described by the [`ScriptContext`] trait, and
//! a driver such as a debugger UI or an automation script:
//!
//! - [`Debugger`] decides on every instruction boundary whether to break, based on the
//!   breakpoint set and the pending step action, and parks the runtime thread in a
//!   [`DebuggerBackend`] until the driver resumes or steps.
//! - [`ExecutionCache`] snapshots the suspended context (call stack, locals, globals and
//!   the watch list) and renders values lazily.
//! - [`EvaluatorRegistry`] maps runtime types to [`TypeEvaluator`]s, so hosts can plug in
//!   formatters for their own application types.

/// Snapshot of a suspended context and its value tree
pub mod cache;
/// Debugger configuration and its TOML persistence
pub mod config;
/// Interface the engine needs from a script runtime
pub mod context;
/// Breakpoint and step state machine, and the suspend/resume bridge
pub mod debugger;
/// Type evaluators and their registry
pub mod eval;
/// In-memory runtime for tests and examples
pub mod test_utils;

pub use cache::*;
pub use config::*;
pub use context::{same_context, ScriptContext};
pub use debugger::*;
pub use eval::*;
