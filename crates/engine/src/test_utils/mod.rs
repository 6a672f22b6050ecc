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

//! In-memory script runtime for exercising the debugger without a real engine.
//!
//! [`MockContext`] keeps a flat little-endian heap, a type table, globals and a call stack
//! that tests edit directly, and replays execution by firing the installed line callback.

use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RwLock};
use sdb_common::types::{LocalKind, RawAddress, TypeId, TypeModifiers};

use crate::context::{
    ForEachCursor, FunctionInfo, GlobalInfo, IteratedValue, LineCallback, LocalInfo,
    PropertyInfo, ScriptContext, Slot, SourcePosition, TypeInfo, TypeKind,
};

/// First address handed out by the mock heap.
pub const HEAP_BASE: u64 = 0x1000;

/// First sequence number of user-defined mock types.
const FIRST_USER_SEQUENCE: i32 = 100;

const PRIMITIVES: [(&str, TypeId); 11] = [
    ("bool", TypeId::BOOL),
    ("int8", TypeId::INT8),
    ("int16", TypeId::INT16),
    ("int", TypeId::INT32),
    ("int64", TypeId::INT64),
    ("uint8", TypeId::UINT8),
    ("uint16", TypeId::UINT16),
    ("uint", TypeId::UINT32),
    ("uint64", TypeId::UINT64),
    ("float", TypeId::FLOAT),
    ("double", TypeId::DOUBLE),
];

#[derive(Debug)]
struct MockFrame {
    function: FunctionInfo,
    position: Option<SourcePosition>,
    locals: Vec<LocalInfo>,
}

#[derive(Debug, Default)]
struct MockRuntime {
    heap: Vec<u8>,
    types: HashMap<i32, (TypeId, TypeInfo)>,
    next_sequence: i32,
    globals: Vec<GlobalInfo>,
    /// Outermost frame first.
    frames: Vec<MockFrame>,
    functions: Vec<FunctionInfo>,
    iterations: HashMap<u64, Vec<Vec<IteratedValue>>>,
    sections: Option<Vec<String>>,
}

impl MockRuntime {
    fn frame(&self, level: usize) -> Option<&MockFrame> {
        let index = self.frames.len().checked_sub(level + 1)?;
        self.frames.get(index)
    }

    fn frame_mut(&mut self, level: usize) -> &mut MockFrame {
        let index = self.frames.len().checked_sub(level + 1).expect("no frame at this level");
        &mut self.frames[index]
    }

    fn define(&mut self, flags: i32, info: TypeInfo) -> TypeId {
        if self.next_sequence == 0 {
            self.next_sequence = FIRST_USER_SEQUENCE;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let type_id = TypeId(flags | sequence);
        self.types.insert(sequence, (type_id, info));
        type_id
    }

    fn remember_function(&mut self, function: &FunctionInfo) {
        if !self.functions.contains(function) {
            self.functions.push(function.clone());
        }
    }
}

/// A scriptable stand-in for a runtime execution context.
#[derive(Default)]
pub struct MockContext {
    runtime: RwLock<MockRuntime>,
    callback: Mutex<Option<LineCallback>>,
}

impl std::fmt::Debug for MockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let runtime = self.runtime.read();
        f.debug_struct("MockContext")
            .field("heap", &runtime.heap.len())
            .field("frames", &runtime.frames.len())
            .field("hooked", &self.has_line_callback())
            .finish_non_exhaustive()
    }
}

impl MockContext {
    /// Creates an empty runtime with no frames.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The same context as a trait object.
    pub fn as_context(self: &Arc<Self>) -> Arc<dyn ScriptContext> {
        Arc::clone(self) as Arc<dyn ScriptContext>
    }

    // ----- memory -----

    /// Copies `bytes` onto the heap, 8-byte aligned, and returns their address.
    pub fn alloc(&self, bytes: &[u8]) -> RawAddress {
        let mut runtime = self.runtime.write();
        let padding = (8 - runtime.heap.len() % 8) % 8;
        let new_len = runtime.heap.len() + padding;
        runtime.heap.resize(new_len, 0);

        let address = RawAddress::new(HEAP_BASE + runtime.heap.len() as u64);
        runtime.heap.extend_from_slice(bytes);
        address
    }

    /// Allocates an `int`.
    pub fn alloc_i32(&self, value: i32) -> RawAddress {
        self.alloc(&value.to_le_bytes())
    }

    /// Allocates a pointer to `target`.
    pub fn alloc_pointer(&self, target: RawAddress) -> RawAddress {
        self.alloc(&target.get().to_le_bytes())
    }

    /// Overwrites heap memory in place.
    pub fn write(&self, address: RawAddress, bytes: &[u8]) {
        let mut runtime = self.runtime.write();
        let start = address.get().checked_sub(HEAP_BASE).expect("address below heap") as usize;
        runtime.heap[start..start + bytes.len()].copy_from_slice(bytes);
    }

    // ----- types -----

    /// Declares a script class.
    pub fn define_object(
        &self,
        name: &str,
        size: usize,
        properties: Vec<PropertyInfo>,
        supports_for_each: bool,
    ) -> TypeId {
        self.runtime.write().define(
            TypeId::SCRIPT_OBJECT,
            TypeInfo {
                name: name.to_string(),
                namespace: String::new(),
                size,
                kind: TypeKind::Object,
                properties,
                supports_for_each,
            },
        )
    }

    /// Declares a 32-bit enum.
    pub fn define_enum(&self, name: &str, values: &[(&str, i64)], flags: bool) -> TypeId {
        self.runtime.write().define(
            0,
            TypeInfo {
                name: name.to_string(),
                namespace: String::new(),
                size: 4,
                kind: TypeKind::Enum {
                    values: values.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
                    flags,
                },
                properties: Vec::new(),
                supports_for_each: false,
            },
        )
    }

    /// Replaces the properties of a declared type.
    pub fn set_properties(&self, type_id: TypeId, properties: Vec<PropertyInfo>) {
        let mut runtime = self.runtime.write();
        let (_, info) = runtime.types.get_mut(&type_id.sequence()).expect("unknown type");
        info.properties = properties;
    }

    /// Makes the object at `object` iterable with the given steps.
    pub fn set_iteration(&self, object: RawAddress, steps: Vec<Vec<IteratedValue>>) {
        self.runtime.write().iterations.insert(object.get(), steps);
    }

    /// Makes the runtime report a complete section list.
    pub fn set_sections(&self, sections: Vec<String>) {
        self.runtime.write().sections = Some(sections);
    }

    // ----- variables -----

    /// Declares a global in the global namespace.
    pub fn add_global(&self, name: &str, type_id: TypeId, address: RawAddress) {
        self.add_namespaced_global("", name, type_id, address);
    }

    /// Declares a global in `namespace`.
    pub fn add_namespaced_global(
        &self,
        namespace: &str,
        name: &str,
        type_id: TypeId,
        address: RawAddress,
    ) {
        self.runtime.write().globals.push(GlobalInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            type_id,
            modifiers: TypeModifiers::NONE,
            slot: Slot::Address(address),
        });
    }

    /// Declares an in-scope local of the frame at `level`.
    pub fn add_local(
        &self,
        level: usize,
        name: Option<&str>,
        kind: LocalKind,
        type_id: TypeId,
        slot: Slot,
    ) {
        let mut runtime = self.runtime.write();
        let frame = runtime.frame_mut(level);
        let stack_offset = -8 * (frame.locals.len() as i32 + 1);
        frame.locals.push(LocalInfo {
            name: name.map(str::to_string),
            kind,
            type_id,
            modifiers: TypeModifiers::NONE,
            stack_offset,
            in_scope: true,
            slot,
        });
    }

    /// Declares a local of the frame at `level` with full control over its metadata.
    pub fn add_local_info(&self, level: usize, local: LocalInfo) {
        self.runtime.write().frame_mut(level).locals.push(local);
    }

    // ----- call stack -----

    /// Pushes a frame of the script function `name` without firing the callback.
    pub fn enter(&self, name: &str, section: &str, line: u32) {
        let function = FunctionInfo {
            declaration: format!("void {name}()"),
            qualified_name: name.to_string(),
            section: Some(section.to_string()),
            is_system: false,
        };
        let mut runtime = self.runtime.write();
        runtime.remember_function(&function);
        runtime.frames.push(MockFrame {
            function,
            position: Some(SourcePosition { section: section.to_string(), line, column: 1 }),
            locals: Vec::new(),
        });
    }

    /// Pushes a frame of the native function `name`.
    pub fn enter_system(&self, name: &str) {
        self.runtime.write().frames.push(MockFrame {
            function: FunctionInfo {
                declaration: format!("void {name}()"),
                qualified_name: name.to_string(),
                section: None,
                is_system: true,
            },
            position: None,
            locals: Vec::new(),
        });
    }

    /// Pops the innermost frame.
    pub fn leave(&self) {
        self.runtime.write().frames.pop();
    }

    /// Moves the innermost frame to `line` without firing the callback.
    pub fn set_line(&self, line: u32) {
        if let Some(position) = self.runtime.write().frame_mut(0).position.as_mut() {
            position.line = line;
        }
    }

    /// Number of frames.
    pub fn depth(&self) -> usize {
        self.runtime.read().frames.len()
    }

    // ----- execution -----

    /// Whether a line callback is installed.
    pub fn has_line_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Invokes the line callback, if any, as the runtime would before an instruction.
    pub fn fire(self: &Arc<Self>) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(&self.as_context());
        }
    }

    /// Executes `line` of the innermost frame.
    pub fn line(self: &Arc<Self>, line: u32) {
        self.set_line(line);
        self.fire();
    }

    /// Calls the script function `name` and executes its first line.
    pub fn call(self: &Arc<Self>, name: &str, section: &str, line: u32) {
        self.enter(name, section, line);
        self.fire();
    }

    /// Returns from the innermost frame.
    pub fn ret(&self) {
        self.leave();
    }
}

impl ScriptContext for MockContext {
    fn call_stack_size(&self) -> usize {
        self.runtime.read().frames.len()
    }

    fn function(&self, level: usize) -> Option<FunctionInfo> {
        self.runtime.read().frame(level).map(|frame| frame.function.clone())
    }

    fn position(&self, level: usize) -> Option<SourcePosition> {
        self.runtime.read().frame(level).and_then(|frame| frame.position.clone())
    }

    fn globals(&self) -> Vec<GlobalInfo> {
        self.runtime.read().globals.clone()
    }

    fn locals(&self, level: usize) -> Vec<LocalInfo> {
        self.runtime.read().frame(level).map(|frame| frame.locals.clone()).unwrap_or_default()
    }

    fn type_info(&self, type_id: TypeId) -> Option<TypeInfo> {
        if let Some((name, primitive)) = PRIMITIVES.iter().find(|(_, id)| *id == type_id) {
            return Some(TypeInfo {
                name: name.to_string(),
                namespace: String::new(),
                size: primitive.primitive_size().unwrap_or_default(),
                kind: TypeKind::Primitive,
                properties: Vec::new(),
                supports_for_each: false,
            });
        }
        self.runtime.read().types.get(&type_id.sequence()).map(|(_, info)| info.clone())
    }

    fn type_declaration(&self, type_id: TypeId) -> String {
        let base = PRIMITIVES
            .iter()
            .find(|(_, id)| *id == type_id.without_handle())
            .map(|(name, _)| name.to_string())
            .or_else(|| {
                let runtime = self.runtime.read();
                runtime.types.get(&type_id.sequence()).map(|(_, info)| info.name.clone())
            })
            .unwrap_or_else(|| "?".to_string());

        if type_id.is_handle_to_const() {
            format!("const {base}@")
        } else if type_id.is_handle() {
            format!("{base}@")
        } else {
            base
        }
    }

    fn type_id_by_name(&self, name: &str) -> Option<TypeId> {
        if let Some((_, id)) = PRIMITIVES.iter().find(|(n, _)| *n == name) {
            return Some(*id);
        }
        self.runtime
            .read()
            .types
            .values()
            .find(|(_, info)| info.name == name)
            .map(|(type_id, _)| *type_id)
    }

    fn read_memory(&self, address: RawAddress, len: usize) -> Option<Vec<u8>> {
        let start = usize::try_from(address.get().checked_sub(HEAP_BASE)?).ok()?;
        let runtime = self.runtime.read();
        runtime.heap.get(start..start.checked_add(len)?).map(<[u8]>::to_vec)
    }

    fn for_each(
        &self,
        _type_id: TypeId,
        object: RawAddress,
    ) -> Option<Box<dyn ForEachCursor + '_>> {
        let steps = self.runtime.read().iterations.get(&object.get())?.clone();
        Some(Box::new(steps.into_iter()))
    }

    fn functions(&self) -> Vec<FunctionInfo> {
        self.runtime.read().functions.clone()
    }

    fn sections(&self) -> Option<Vec<String>> {
        self.runtime.read().sections.clone()
    }

    fn set_line_callback(&self, callback: LineCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn clear_line_callback(&self) {
        *self.callback.lock() = None;
    }
}
