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

//! The watch list and dotted-path lookup of variables to watch.

use sdb_common::types::{ExpandKind, LocalKey, LocalKind};
use thiserror::Error;

use super::{ExecutionCache, VariableView};

/// Failure to resolve a dotted watch path such as `player.stats.health`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchPathError {
    /// The path was empty or had an empty component.
    #[error("invalid watch path `{0}`")]
    InvalidPath(String),
    /// No parameter, local or global carries the root name.
    #[error("no variable named `{0}` is visible")]
    UnknownVariable(String),
    /// A component is not a property of the value before it.
    #[error("`{parent}` has no member named `{member}`")]
    UnknownMember {
        /// Path resolved so far.
        parent: String,
        /// Missing member.
        member: String,
    },
    /// A component was applied to a value without named children.
    #[error("`{0}` has no members")]
    NotExpandable(String),
}

impl ExecutionCache {
    /// Watched views, in insertion order.
    pub fn watch(&self) -> &[VariableView] {
        &self.watch
    }

    /// Appends a view to the watch list.
    pub fn add_watch(&mut self, view: VariableView) {
        self.watch.push(view);
    }

    /// Removes the watch entry at `index`.
    pub fn remove_watch(&mut self, index: usize) -> Option<VariableView> {
        (index < self.watch.len()).then(|| self.watch.remove(index))
    }

    /// Removes the first watch entry equal to `view`; returns whether one was found.
    pub fn remove_watch_view(&mut self, view: &VariableView) -> bool {
        match self.watch.iter().position(|watched| watched == view) {
            Some(index) => {
                self.watch.remove(index);
                true
            }
            None => false,
        }
    }

    /// Adds `view` to the watch list, or removes it if already watched.
    ///
    /// Returns `true` if the view is watched afterwards.
    pub fn toggle_watch(&mut self, view: VariableView) -> bool {
        if self.remove_watch_view(&view) {
            false
        } else {
            self.add_watch(view);
            true
        }
    }

    /// Empties the watch list.
    pub fn clear_watch(&mut self) {
        self.watch.clear();
    }

    /// Resolves `path` in the frame at `level` and watches the result under the path's
    /// name.
    pub fn watch_path(&mut self, level: usize, path: &str) -> Result<VariableView, WatchPathError> {
        let mut view = self.resolve_path(level, path)?;
        view.name = path.to_string();
        self.add_watch(view.clone());
        Ok(view)
    }

    /// Resolves a dotted path of an existing variable and its properties.
    ///
    /// The root is looked up among the parameters and locals of the frame at `level`,
    /// then among globals by qualified or unqualified name. Each further component names
    /// a property child.
    pub fn resolve_path(
        &mut self,
        level: usize,
        path: &str,
    ) -> Result<VariableView, WatchPathError> {
        let mut components = path.split('.').map(str::trim);
        let root = components.next().filter(|c| !c.is_empty());
        let Some(root) = root else {
            return Err(WatchPathError::InvalidPath(path.to_string()));
        };

        let mut current = self
            .find_variable(level, root)
            .ok_or_else(|| WatchPathError::UnknownVariable(root.to_string()))?;
        let mut resolved = root.to_string();

        for member in components {
            if member.is_empty() {
                return Err(WatchPathError::InvalidPath(path.to_string()));
            }
            if self.state(current.state).value.expand != ExpandKind::Children {
                return Err(WatchPathError::NotExpandable(resolved));
            }

            self.expand(current.state);
            current = self
                .state(current.state)
                .children
                .iter()
                .find(|child| child.name == member)
                .cloned()
                .ok_or_else(|| WatchPathError::UnknownMember {
                    parent: resolved.clone(),
                    member: member.to_string(),
                })?;
            resolved.push('.');
            resolved.push_str(member);
        }

        Ok(current)
    }

    fn find_variable(&mut self, level: usize, name: &str) -> Option<VariableView> {
        for kind in [LocalKind::Parameter, LocalKind::Variable] {
            if let Some(view) =
                self.locals(LocalKey::new(level, kind)).iter().rev().find(|v| v.name == name)
            {
                return Some(view.clone());
            }
        }

        let globals = self.globals();
        globals
            .iter()
            .find(|v| v.name == name)
            .or_else(|| globals.iter().find(|v| v.name.rsplit("::").next() == Some(name)))
            .cloned()
    }
}
