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

//! Type evaluators: turning an opaque `(type, address)` pair into displayable content.
//!
//! The [`EvaluatorRegistry`] owns one [`TypeEvaluator`] per registered type sequence
//! number and resolves every other type to a built-in:
//!
//! 1. Null locations and `void` never reach an evaluator; they render as fixed sentinels.
//! 2. Handles are dereferenced first, so evaluators always see the concrete object. The
//!    handle itself only shows up as muted styling.
//! 3. Explicit registrations win, then the built-in scalar formatters, then the enum
//!    formatter, then the generic object formatter.
//!
//! Registrations are keyed by the sequence number of a type id, so registering `Foo`
//! also covers `Foo@` and `const Foo@`.

mod enumeration;
mod object;
mod primitive;

pub use enumeration::*;
pub use object::*;
pub use primitive::*;

use std::{collections::HashMap, fmt, sync::Arc};

use sdb_common::types::{Location, TypeId, TypeModifiers, VariableAddress, VariableValue};
use tracing::debug;

use crate::{context::TypeKind, ExecutionCache, ScriptContext, StateId};

/// Strategy rendering values of one type.
///
/// `evaluate` produces the value shown in a value column. `expand` is only called when a
/// front-end opens a value whose expansion kind is children or entries, and only once per
/// state and episode; it fills `children` or `entries` of `state` in place.
pub trait TypeEvaluator: Send + Sync {
    /// Renders the value at `id`.
    fn evaluate(&self, _cache: &mut ExecutionCache, _id: VariableAddress) -> VariableValue {
        VariableValue::default()
    }

    /// Populates the children or entries of `state`, which caches `id`.
    fn expand(&self, _cache: &mut ExecutionCache, _id: VariableAddress, _state: StateId) {}
}

/// Renders null and uninitialised locations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentinelEvaluator;

impl SentinelEvaluator {
    fn render(id: VariableAddress, via_handle: bool) -> VariableValue {
        if id.type_id.is_void() {
            VariableValue::muted("(void)")
        } else if via_handle {
            VariableValue::muted("null")
        } else {
            VariableValue::muted("(uninit)")
        }
    }
}

impl TypeEvaluator for SentinelEvaluator {
    fn evaluate(&self, _cache: &mut ExecutionCache, id: VariableAddress) -> VariableValue {
        Self::render(id, id.type_id.is_handle())
    }
}

/// Renders types the runtime cannot describe.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownEvaluator;

impl TypeEvaluator for UnknownEvaluator {
    fn evaluate(&self, cache: &mut ExecutionCache, id: VariableAddress) -> VariableValue {
        VariableValue::muted(format!("{{{}}}", cache.type_name(id.type_id, TypeModifiers::NONE)))
    }
}

/// Outcome of resolving an address to the evaluator responsible for it.
enum Resolution<'a> {
    /// Rendered without consulting any evaluator.
    Sentinel(VariableValue),
    /// Concrete object and the evaluator for its type.
    Object { address: VariableAddress, evaluator: &'a dyn TypeEvaluator, via_handle: bool },
}

/// Registry of type evaluators with built-in fallbacks.
pub struct EvaluatorRegistry {
    evaluators: HashMap<i32, Arc<dyn TypeEvaluator>>,
    primitives: HashMap<i32, Arc<dyn TypeEvaluator>>,
    enums: EnumEvaluator,
    objects: ObjectEvaluator,
    unknown: UnknownEvaluator,
}

impl fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<_> = self.evaluators.keys().copied().collect();
        registered.sort_unstable();
        f.debug_struct("EvaluatorRegistry").field("registered", &registered).finish_non_exhaustive()
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorRegistry {
    /// Creates a registry with only the built-in evaluators.
    pub fn new() -> Self {
        Self {
            evaluators: HashMap::new(),
            primitives: builtin_primitives(),
            enums: EnumEvaluator,
            objects: ObjectEvaluator,
            unknown: UnknownEvaluator,
        }
    }

    /// Registers an evaluator for a type, replacing any previous one.
    ///
    /// Only the sequence number of `type_id` is used.
    pub fn register(&mut self, type_id: TypeId, evaluator: impl TypeEvaluator + 'static) {
        self.register_arc(type_id, Arc::new(evaluator));
    }

    /// Registers a shared evaluator for a type, replacing any previous one.
    pub fn register_arc(&mut self, type_id: TypeId, evaluator: Arc<dyn TypeEvaluator>) {
        debug!(type_id = %type_id, sequence = type_id.sequence(), "registering type evaluator");
        self.evaluators.insert(type_id.sequence(), evaluator);
    }

    /// Registers an evaluator for the type the runtime knows under `name`.
    ///
    /// Returns `false` if the runtime has no such type.
    pub fn register_by_name(
        &mut self,
        ctx: &dyn ScriptContext,
        name: &str,
        evaluator: impl TypeEvaluator + 'static,
    ) -> bool {
        match ctx.type_id_by_name(name) {
            Some(type_id) => {
                self.register(type_id, evaluator);
                true
            }
            None => {
                debug!(name, "cannot register evaluator for unknown type");
                false
            }
        }
    }

    /// Removes an explicit registration; returns whether one existed.
    pub fn unregister(&mut self, type_id: TypeId) -> bool {
        self.evaluators.remove(&type_id.sequence()).is_some()
    }

    /// Whether an explicit evaluator is registered for this type.
    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.evaluators.contains_key(&type_id.sequence())
    }

    /// Renders the value at `id`.
    pub fn evaluate(&self, cache: &mut ExecutionCache, id: VariableAddress) -> VariableValue {
        match self.resolve(cache, id) {
            Resolution::Sentinel(value) => value,
            Resolution::Object { address, evaluator, via_handle } => {
                let value = evaluator.evaluate(cache, address);
                if via_handle {
                    value.with_disabled(true)
                } else {
                    value
                }
            }
        }
    }

    /// Populates the children or entries of `state`, which caches `id`.
    pub fn expand(&self, cache: &mut ExecutionCache, id: VariableAddress, state: StateId) {
        if let Resolution::Object { address, evaluator, .. } = self.resolve(cache, id) {
            evaluator.expand(cache, address, state);
        }
    }

    /// The concrete object `id` refers to after dereferencing handles, or `None` for null.
    pub fn dereference(
        &self,
        cache: &mut ExecutionCache,
        id: VariableAddress,
    ) -> Option<VariableAddress> {
        match self.resolve(cache, id) {
            Resolution::Sentinel(_) => None,
            Resolution::Object { address, .. } => Some(address),
        }
    }

    fn resolve(&self, cache: &mut ExecutionCache, mut id: VariableAddress) -> Resolution<'_> {
        if id.type_id.is_void() || id.location.is_null() {
            return Resolution::Sentinel(SentinelEvaluator::render(id, false));
        }

        let via_handle = id.type_id.is_handle();
        if via_handle {
            match cache.read_pointer(id.location) {
                Some(pointer) if pointer.is_null() => {
                    return Resolution::Sentinel(SentinelEvaluator::render(id, true));
                }
                Some(pointer) => {
                    id = VariableAddress {
                        type_id: id.type_id.without_handle(),
                        location: Location::Runtime(pointer),
                    };
                }
                None => return Resolution::Sentinel(VariableValue::muted("(unreadable)")),
            }
        }

        let evaluator = self.lookup(cache, id.type_id);
        Resolution::Object { address: id, evaluator, via_handle }
    }

    fn lookup(&self, cache: &mut ExecutionCache, type_id: TypeId) -> &dyn TypeEvaluator {
        let sequence = type_id.sequence();
        if let Some(evaluator) = self.evaluators.get(&sequence) {
            return evaluator.as_ref();
        }
        if type_id.is_primitive() {
            if let Some(evaluator) = self.primitives.get(&sequence) {
                return evaluator.as_ref();
            }
        }
        match cache.type_info(type_id).map(|info| info.kind.clone()) {
            Some(TypeKind::Enum { .. }) => &self.enums,
            Some(TypeKind::Object) => &self.objects,
            Some(TypeKind::Primitive) | None => &self.unknown,
        }
    }
}

fn builtin_primitives() -> HashMap<i32, Arc<dyn TypeEvaluator>> {
    let mut map: HashMap<i32, Arc<dyn TypeEvaluator>> = HashMap::new();
    map.insert(TypeId::BOOL.0, Arc::new(PrimitiveEvaluator::<bool>::new()));
    map.insert(TypeId::INT8.0, Arc::new(PrimitiveEvaluator::<i8>::new()));
    map.insert(TypeId::INT16.0, Arc::new(PrimitiveEvaluator::<i16>::new()));
    map.insert(TypeId::INT32.0, Arc::new(PrimitiveEvaluator::<i32>::new()));
    map.insert(TypeId::INT64.0, Arc::new(PrimitiveEvaluator::<i64>::new()));
    map.insert(TypeId::UINT8.0, Arc::new(PrimitiveEvaluator::<u8>::new()));
    map.insert(TypeId::UINT16.0, Arc::new(PrimitiveEvaluator::<u16>::new()));
    map.insert(TypeId::UINT32.0, Arc::new(PrimitiveEvaluator::<u32>::new()));
    map.insert(TypeId::UINT64.0, Arc::new(PrimitiveEvaluator::<u64>::new()));
    map.insert(TypeId::FLOAT.0, Arc::new(PrimitiveEvaluator::<f32>::new()));
    map.insert(TypeId::DOUBLE.0, Arc::new(PrimitiveEvaluator::<f64>::new()));
    map
}

#[cfg(test)]
mod tests {
    use sdb_common::types::{ExpandKind, RawAddress, VariableEntry};

    use super::*;
    use crate::{
        context::{IteratedValue, PropertyInfo, Slot},
        test_utils::MockContext,
        DebuggerConfig,
    };

    fn cache_with(
        ctx: &Arc<MockContext>,
        registry: EvaluatorRegistry,
        config: DebuggerConfig,
    ) -> ExecutionCache {
        ctx.enter("main", "main.as", 1);
        ExecutionCache::new(ctx.as_context(), Arc::new(registry), config)
    }

    fn int_step(ctx: &MockContext, value: i32) -> IteratedValue {
        IteratedValue { type_id: TypeId::INT32, slot: Slot::Address(ctx.alloc_i32(value)) }
    }

    struct Celsius;

    impl TypeEvaluator for Celsius {
        fn evaluate(&self, cache: &mut ExecutionCache, id: VariableAddress) -> VariableValue {
            let degrees = cache.read::<f32>(id.location).unwrap_or_default();
            VariableValue::new(format!("{degrees}°C"))
        }
    }

    #[test]
    fn test_sentinels() {
        let ctx = MockContext::new();
        let node = ctx.define_object("Node", 4, vec![], false);
        let mut cache = cache_with(&ctx, EvaluatorRegistry::new(), Default::default());

        let uninit = cache.value_of(VariableAddress::runtime(TypeId::INT32, RawAddress::NULL));
        assert_eq!(uninit, VariableValue::muted("(uninit)"));

        let null = ctx.alloc_pointer(RawAddress::NULL);
        let handle = TypeId(node.0 | TypeId::OBJECT_HANDLE);
        let value = cache.value_of(VariableAddress::runtime(handle, null));
        assert_eq!(value, VariableValue::muted("null"));

        let void = cache.value_of(VariableAddress::runtime(TypeId::VOID, null));
        assert_eq!(void.display, "(void)");
    }

    #[test]
    fn test_handles_are_dereferenced() {
        let ctx = MockContext::new();
        let id = PropertyInfo::value("id", TypeId::INT32, 0);
        let node = ctx.define_object("Node", 4, vec![id], false);
        let object = ctx.alloc_i32(5);
        let handle = ctx.alloc_pointer(object);
        let mut cache = cache_with(&ctx, EvaluatorRegistry::new(), Default::default());
        let registry = Arc::clone(cache.registry());

        let address = VariableAddress::runtime(TypeId(node.0 | TypeId::OBJECT_HANDLE), handle);
        let value = cache.value_of(address);
        assert_eq!(value.display, "{Node}");
        assert!(value.disabled);
        assert_eq!(value.expand, ExpandKind::Children);
        let target = registry.dereference(&mut cache, address);
        assert_eq!(target, Some(VariableAddress::runtime(node, object)));
    }

    #[test]
    fn test_registered_evaluator_wins() {
        let ctx = MockContext::new();
        let raw = PropertyInfo::value("raw", TypeId::FLOAT, 0);
        let temperature = ctx.define_object("Temperature", 4, vec![raw], false);
        let object = ctx.alloc(&21.5f32.to_le_bytes());
        let handle = ctx.alloc_pointer(object);

        let mut registry = EvaluatorRegistry::new();
        assert!(registry.register_by_name(ctx.as_ref(), "Temperature", Celsius));
        assert!(!registry.register_by_name(ctx.as_ref(), "Pressure", Celsius));
        assert!(registry.is_registered(TypeId(temperature.0 | TypeId::OBJECT_HANDLE)));
        let mut cache = cache_with(&ctx, registry, Default::default());

        let value = cache.value_of(VariableAddress::runtime(temperature, object));
        assert_eq!(value.display, "21.5°C");
        let via_handle =
            cache.value_of(VariableAddress::runtime(
                TypeId(temperature.0 | TypeId::OBJECT_HANDLE),
                handle,
            ));
        assert_eq!(via_handle.display, "21.5°C");
        assert!(via_handle.disabled);
    }

    #[test]
    fn test_enum_rendering() {
        let ctx = MockContext::new();
        let plain = ctx.define_enum("Mode", &[("Idle", 0), ("Busy", 1)], false);
        let flags = ctx.define_enum("Element", &[("Fire", 1), ("Ice", 2)], true);
        let idle = ctx.alloc_i32(0);
        let odd = ctx.alloc_i32(7);
        let mixed = ctx.alloc_i32(3 | 0x40);
        let mut cache = cache_with(&ctx, EvaluatorRegistry::new(), Default::default());

        assert_eq!(cache.value_of(VariableAddress::runtime(plain, idle)).display, "Idle");
        assert_eq!(cache.value_of(VariableAddress::runtime(plain, odd)).display, "7");

        let view = cache.view("e", "Element", VariableAddress::runtime(flags, mixed));
        assert_eq!(cache.state(view.state).value.display, "Fire | Ice | 0x40");
        cache.expand(view.state);
        let entries: Vec<String> =
            cache.state(view.state).entries.iter().map(VariableEntry::display).collect();
        assert_eq!(entries, vec!["Fire", "Ice", "0x40"]);
    }

    #[test]
    fn test_flag_enums_from_config() {
        let ctx = MockContext::new();
        let mask = ctx.define_enum("Mask", &[("Read", 1), ("Write", 2)], false);
        let both = ctx.alloc_i32(3);
        let config = DebuggerConfig::default().with_flag_enum("Mask");
        let mut cache = cache_with(&ctx, EvaluatorRegistry::new(), config);

        let value = cache.value_of(VariableAddress::runtime(mask, both));
        assert_eq!(value.display, "Read | Write");
        assert_eq!(value.expand, ExpandKind::Entries);
    }

    #[test]
    fn test_for_each_objects_list_entries() {
        let ctx = MockContext::new();
        let list = ctx.define_object("List", 8, vec![], true);
        let object = ctx.alloc(&[0; 8]);
        ctx.set_iteration(object, (1..=3).map(|v| vec![int_step(&ctx, v * 10)]).collect());
        let mut cache = cache_with(&ctx, EvaluatorRegistry::new(), Default::default());

        let view = cache.view("xs", "List", VariableAddress::runtime(list, object));
        assert_eq!(cache.state(view.state).value.expand, ExpandKind::Entries);
        cache.expand(view.state);
        let entries: Vec<String> =
            cache.state(view.state).entries.iter().map(VariableEntry::display).collect();
        assert_eq!(entries, vec!["10", "20", "30"]);
    }

    #[test]
    fn test_container_groups_and_columns() {
        let ctx = MockContext::new();
        let len = PropertyInfo::value("len", TypeId::INT32, 0);
        let map = ctx.define_object("Map", 8, vec![len], true);
        let object = ctx.alloc(&[0; 8]);
        let flag =
            |on: u8| IteratedValue { type_id: TypeId::BOOL, slot: Slot::Temporary(vec![on]) };
        let steps = vec![vec![int_step(&ctx, 1), flag(1)], vec![int_step(&ctx, 2), flag(0)]];
        ctx.set_iteration(object, steps);

        let mut registry = EvaluatorRegistry::new();
        registry.register(map, ContainerEvaluator::new());
        let mut cache = cache_with(&ctx, registry, Default::default());
        let view = cache.view("m", "Map", VariableAddress::runtime(map, object));
        assert_eq!(cache.state(view.state).value.expand, ExpandKind::Entries);
        cache.expand(view.state);
        let entries = cache.state(view.state).entries.clone();
        assert_eq!(entries[0].display(), "[0] 1, true");
        assert_eq!(entries[1].display(), "[1] 2, false");

        let mut registry = EvaluatorRegistry::new();
        registry.register(map, ContainerEvaluator::column(1));
        let mut cache =
            ExecutionCache::new(ctx.as_context(), Arc::new(registry), Default::default());
        let view = cache.view("m", "Map", VariableAddress::runtime(map, object));
        cache.expand(view.state);
        let entries: Vec<String> =
            cache.state(view.state).entries.iter().map(VariableEntry::display).collect();
        assert_eq!(entries, vec!["true", "false"]);
    }

    #[test]
    fn test_iteration_is_capped() {
        let ctx = MockContext::new();
        let list = ctx.define_object("List", 8, vec![], true);
        let object = ctx.alloc(&[0; 8]);
        ctx.set_iteration(object, (0..5).map(|v| vec![int_step(&ctx, v)]).collect());
        let config = DebuggerConfig::default().with_max_entries(3);
        let mut cache = cache_with(&ctx, EvaluatorRegistry::new(), config);

        let view = cache.view("xs", "List", VariableAddress::runtime(list, object));
        cache.expand(view.state);
        let entries = &cache.state(view.state).entries;
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3], VariableEntry::Value(VariableValue::muted("...")));
    }
}
