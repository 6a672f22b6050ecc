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

//! Serialisable dump of what a cache currently displays.

use std::collections::{BTreeMap, HashSet};

use sdb_common::types::{CallStackEntry, VariableEntry, VariableValue};
use serde::{Deserialize, Serialize};

use super::{ExecutionCache, StateId, VariableView};

/// One materialised view and whatever of its subtree was expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    /// Variable name.
    pub name: String,
    /// Declared type.
    pub type_name: String,
    /// Rendered value.
    pub value: VariableValue,
    /// Expanded children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ViewSnapshot>,
    /// Expanded entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<VariableEntry>,
}

/// Serialisable dump of everything an [`ExecutionCache`] has materialised.
///
/// Nothing is queried or expanded while taking a snapshot, so it shows exactly what a
/// front-end would currently display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Script frames, innermost first.
    pub call_stack: Vec<CallStackEntry>,
    /// Native function at the top of the stack.
    pub system_function: Option<String>,
    /// Section paths mapped to display names.
    pub sections: BTreeMap<String, String>,
    /// Globals, if materialised.
    pub globals: Vec<ViewSnapshot>,
    /// Local lists keyed `"<level>:<kind>"`.
    pub locals: BTreeMap<String, Vec<ViewSnapshot>>,
    /// Watch list.
    pub watch: Vec<ViewSnapshot>,
}

impl CacheSnapshot {
    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl ExecutionCache {
    /// Captures everything materialised so far.
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut path = HashSet::new();
        let mut capture = |list: &[VariableView]| -> Vec<ViewSnapshot> {
            list.iter().map(|view| self.snapshot_view(view, &mut path)).collect()
        };

        CacheSnapshot {
            call_stack: self.call_stack.clone(),
            system_function: self.system_function.clone(),
            sections: self.sections.clone(),
            globals: capture(&self.globals),
            locals: self
                .locals
                .iter()
                .map(|(key, list)| (format!("{}:{}", key.level, key.kind), capture(list)))
                .collect(),
            watch: capture(&self.watch),
        }
    }

    fn snapshot_view(&self, view: &VariableView, path: &mut HashSet<StateId>) -> ViewSnapshot {
        let state = self.state(view.state);
        let mut snapshot = ViewSnapshot {
            name: view.name.clone(),
            type_name: view.type_name.clone(),
            value: state.value.clone(),
            children: Vec::new(),
            entries: Vec::new(),
        };

        // Handles can form cycles; stop at a state already on the current path.
        if !state.queried || !path.insert(view.state) {
            return snapshot;
        }
        snapshot.children =
            state.children.iter().map(|child| self.snapshot_view(child, path)).collect();
        snapshot.entries = state.entries.clone();
        path.remove(&view.state);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sdb_common::types::{LocalKey, LocalKind, TypeId};

    use crate::{
        context::{PropertyInfo, Slot},
        test_utils::MockContext,
        EvaluatorRegistry, ExecutionCache,
    };

    #[test]
    fn test_snapshot_contains_materialised_state() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 5);
        let hp = ctx.alloc_i32(12);
        ctx.add_local(0, Some("hp"), LocalKind::Variable, TypeId::INT32, Slot::Address(hp));
        let registry = Arc::new(EvaluatorRegistry::new());
        let mut cache = ExecutionCache::new(ctx.as_context(), registry, Default::default());
        cache.cache_locals(LocalKey::new(0, LocalKind::Variable));

        let snapshot = cache.snapshot();
        assert!(snapshot.globals.is_empty());
        assert_eq!(snapshot.call_stack[0].row, 5);
        let locals = &snapshot.locals["0:Variable"];
        assert_eq!(locals[0].name, "hp");
        assert_eq!(locals[0].value.display, "12");

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"hp\""));
    }

    #[test]
    fn test_snapshot_stops_at_cycles() {
        let ctx = MockContext::new();
        let node = ctx.define_object("Node", 8, vec![], false);
        let handle = TypeId(node.0 | TypeId::OBJECT_HANDLE);
        ctx.set_properties(node, vec![PropertyInfo::value("next", handle, 0)]);
        let object = ctx.alloc(&[0; 8]);
        ctx.write(object, &object.get().to_le_bytes());
        ctx.add_global("head", node, object);
        ctx.enter("main", "main.as", 1);
        let registry = Arc::new(EvaluatorRegistry::new());
        let mut cache = ExecutionCache::new(ctx.as_context(), registry, Default::default());

        let head = cache.globals()[0].clone();
        cache.expand(head.state);
        let next = cache.state(head.state).children[0].clone();
        cache.expand(next.state);

        let snapshot = cache.snapshot();
        let head = &snapshot.globals[0];
        assert_eq!(head.children[0].name, "next");
        assert_eq!(head.children[0].children[0].name, "next");
        assert!(head.children[0].children[0].children.is_empty());
    }
}
