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

//! Formatters for objects: reflected properties or iteration.

use sdb_common::types::{
    ExpandKind, Location, TypeModifiers, VariableAddress, VariableEntry, VariableValue,
};
use tracing::debug;

use crate::{ExecutionCache, StateId, TypeEvaluator};

/// Generic formatter for application and script objects.
///
/// Shows `{TypeName}`. Types with reflected properties expand to one child per property;
/// types without properties but with for-each support expand to entries; anything else is
/// a non-expandable placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectEvaluator;

impl TypeEvaluator for ObjectEvaluator {
    fn evaluate(&self, cache: &mut ExecutionCache, id: VariableAddress) -> VariableValue {
        let display = format!("{{{}}}", cache.type_name(id.type_id, TypeModifiers::NONE));
        let Some(info) = cache.type_info(id.type_id) else {
            return VariableValue::muted(display);
        };

        let expand = if !info.properties.is_empty() {
            ExpandKind::Children
        } else if info.supports_for_each && !id.location.is_captured() {
            ExpandKind::Entries
        } else {
            ExpandKind::None
        };
        VariableValue::new(display).expandable(expand)
    }

    fn expand(&self, cache: &mut ExecutionCache, id: VariableAddress, state: StateId) {
        let Some(info) = cache.type_info(id.type_id) else { return };
        if !info.properties.is_empty() {
            query_properties(cache, id, state);
        } else if info.supports_for_each {
            query_for_each(cache, id, state, None);
        }
    }
}

/// Formatter for containers, which are only ever shown through iteration.
///
/// With a `value_index`, each iteration step contributes only that value, which suits
/// dictionaries whose steps yield key and value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerEvaluator {
    /// Column of each iteration step to show; all columns when `None`.
    pub value_index: Option<usize>,
}

impl ContainerEvaluator {
    /// Shows every value of each step.
    pub const fn new() -> Self {
        Self { value_index: None }
    }

    /// Shows only the value at `index` of each step.
    pub const fn column(index: usize) -> Self {
        Self { value_index: Some(index) }
    }
}

impl TypeEvaluator for ContainerEvaluator {
    fn evaluate(&self, cache: &mut ExecutionCache, id: VariableAddress) -> VariableValue {
        let display = format!("{{{}}}", cache.type_name(id.type_id, TypeModifiers::NONE));
        let iterable = !id.location.is_captured()
            && cache.type_info(id.type_id).is_some_and(|info| info.supports_for_each);
        let expand = if iterable { ExpandKind::Entries } else { ExpandKind::None };
        VariableValue::new(display).expandable(expand)
    }

    fn expand(&self, cache: &mut ExecutionCache, id: VariableAddress, state: StateId) {
        query_for_each(cache, id, state, self.value_index);
    }
}

/// Adds one child view per reflected property of `id` to `state`, in declaration order.
pub fn query_properties(cache: &mut ExecutionCache, id: VariableAddress, state: StateId) {
    let Some(info) = cache.type_info(id.type_id) else { return };

    for property in &info.properties {
        let mut location = id.location.offset(property.offset);
        if property.is_reference {
            match cache.read_pointer(location) {
                Some(pointer) => location = Location::Runtime(pointer),
                None => {
                    debug!(property = %property.name, "skipping unreadable reference property");
                    continue;
                }
            }
        }

        let type_name = cache.type_name(property.type_id, TypeModifiers::NONE);
        let address = VariableAddress { type_id: property.type_id, location };
        let view = cache.view(property.name.clone(), type_name, address);
        cache.state_mut(state).children.push(view);
    }
}

/// Adds one entry per iteration step of `id` to `state`.
///
/// Steps yielding a single value become plain entries, steps yielding several become
/// indexed groups. With `value_index`, only that value of each step is kept. Output stops
/// at [`DebuggerConfig::max_entries`](crate::DebuggerConfig) steps with a trailing `...`.
pub fn query_for_each(
    cache: &mut ExecutionCache,
    id: VariableAddress,
    state: StateId,
    value_index: Option<usize>,
) {
    let Location::Runtime(object) = id.location else {
        cache.state_mut(state).entries.push(VariableValue::muted("(not iterable)").into());
        return;
    };

    let ctx = cache.context().clone();
    let Some(mut cursor) = ctx.for_each(id.type_id.without_handle(), object) else {
        debug!(type_id = %id.type_id, "runtime refused to iterate object");
        return;
    };

    let max_entries = cache.config().max_entries;
    let mut entries: Vec<VariableEntry> = Vec::new();
    let mut index = 0;
    while let Some(step) = cursor.next_step() {
        if index == max_entries {
            entries.push(VariableValue::muted("...").into());
            break;
        }

        let columns: Vec<_> = match value_index {
            Some(column) => step.into_iter().enumerate().nth(column).into_iter().collect(),
            None => step.into_iter().enumerate().collect(),
        };
        let mut values: Vec<VariableValue> = columns
            .into_iter()
            .map(|(column, item)| {
                let address = cache.capture_iterated(state, index, column, item.type_id, item.slot);
                cache.value_of(address)
            })
            .collect();

        let entry = if values.len() == 1 {
            VariableEntry::Value(values.remove(0))
        } else {
            VariableEntry::Group { index, values }
        };
        entries.push(entry);
        index += 1;
    }

    cache.state_mut(state).entries.extend(entries);
}
