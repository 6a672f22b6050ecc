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

//! The scripting runtime as seen by the debugger.
//!
//! The engine never links against a particular runtime. Instead, a host implements
//! [`ScriptContext`] for its execution context type and hands an `Arc` of it to the
//! [`Debugger`](crate::Debugger). Everything the engine needs from the runtime goes
//! through this trait:
//!
//! - **Location**: call-stack depth, the function and source position at each level
//! - **Variables**: globals, and parameters/locals/temporaries of each frame
//! - **Reflection**: type declarations, sizes, enum values, properties, for-each support
//! - **Memory**: raw reads of runtime memory
//! - **Control**: registering the per-instruction line callback
//!
//! # Address conventions
//!
//! Every [`Slot::Address`] handed to the engine points at the *value* of the declared
//! type: for a handle (`Foo@`) it points at the pointer-sized handle slot, for a
//! non-handle object it points at the object itself. Pointers are read as 8-byte
//! little-endian values.

use std::sync::Arc;

use auto_impl::auto_impl;
use sdb_common::types::{LocalKind, RawAddress, TypeId, TypeModifiers};

/// Size of a runtime pointer, in bytes.
pub const POINTER_SIZE: usize = 8;

/// Callback invoked by the runtime on every tracked instruction boundary.
pub type LineCallback = Arc<dyn Fn(&Arc<dyn ScriptContext>) + Send + Sync>;

/// Where the runtime keeps a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Addressable runtime memory, valid while the context stays suspended.
    Address(RawAddress),
    /// A value the runtime does not keep addressable; the bytes must be copied now.
    Temporary(Vec<u8>),
}

/// A function known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    /// Full declaration, e.g. `void Player::think(float)`.
    pub declaration: String,
    /// Namespace and object qualified name, e.g. `game::Player::think`.
    pub qualified_name: String,
    /// Script section the function was declared in; `None` for native functions.
    pub section: Option<String>,
    /// Whether the function is implemented by the host application.
    pub is_system: bool,
}

/// Source position of a stack level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    /// Script section.
    pub section: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// A global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalInfo {
    /// Unqualified name.
    pub name: String,
    /// Namespace, empty for the global namespace.
    pub namespace: String,
    /// Declared type.
    pub type_id: TypeId,
    /// Declaration qualifiers.
    pub modifiers: TypeModifiers,
    /// Location of the value.
    pub slot: Slot,
}

impl GlobalInfo {
    /// `namespace::name`, or just `name` in the global namespace.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.namespace, self.name)
        }
    }
}

/// A parameter, local variable or temporary of one stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInfo {
    /// Name; `None` for temporaries.
    pub name: Option<String>,
    /// Category of the local.
    pub kind: LocalKind,
    /// Declared type.
    pub type_id: TypeId,
    /// Declaration qualifiers.
    pub modifiers: TypeModifiers,
    /// Offset of the variable in the frame.
    pub stack_offset: i32,
    /// Whether the variable is in scope at the frame's current position.
    pub in_scope: bool,
    /// Location of the value.
    pub slot: Slot,
}

/// A declared property of a composite type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Property name.
    pub name: String,
    /// Declared type.
    pub type_id: TypeId,
    /// Byte offset from the start of the owning object.
    pub offset: usize,
    /// Whether the object stores a pointer to the value rather than the value itself.
    pub is_reference: bool,
}

impl PropertyInfo {
    /// A property stored inline at `offset`.
    pub fn value(name: impl Into<String>, type_id: TypeId, offset: usize) -> Self {
        Self { name: name.into(), type_id, offset, is_reference: false }
    }

    /// A property stored as a pointer at `offset`.
    pub fn reference(name: impl Into<String>, type_id: TypeId, offset: usize) -> Self {
        Self { name: name.into(), type_id, offset, is_reference: true }
    }
}

/// Broad category of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Built-in scalar.
    Primitive,
    /// Enumeration.
    Enum {
        /// Declared enumerators, in declaration order.
        values: Vec<(String, i64)>,
        /// Whether the enum is used as a bit-flag set.
        flags: bool,
    },
    /// Application, script or template object.
    Object,
}

/// Reflection data of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Unqualified name.
    pub name: String,
    /// Namespace, empty for the global namespace.
    pub namespace: String,
    /// Size of a value of this type in bytes.
    pub size: usize,
    /// Category of the type.
    pub kind: TypeKind,
    /// Declared properties, in declaration order.
    pub properties: Vec<PropertyInfo>,
    /// Whether the type supports generic forward iteration.
    pub supports_for_each: bool,
}

/// One value yielded by an iteration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratedValue {
    /// Type of the value.
    pub type_id: TypeId,
    /// Location of the value.
    pub slot: Slot,
}

/// Cursor over the generic forward iteration of a container.
pub trait ForEachCursor {
    /// Advances one step, returning every value the step yields.
    fn next_step(&mut self) -> Option<Vec<IteratedValue>>;
}

impl<I> ForEachCursor for I
where
    I: Iterator<Item = Vec<IteratedValue>>,
{
    fn next_step(&mut self) -> Option<Vec<IteratedValue>> {
        self.next()
    }
}

/// An execution context of the scripting runtime.
#[auto_impl(&, Box, Arc)]
pub trait ScriptContext: Send + Sync {
    /// Number of frames on the call stack, including native frames.
    fn call_stack_size(&self) -> usize;

    /// Function executing at `level` (0 is the innermost frame).
    fn function(&self, level: usize) -> Option<FunctionInfo>;

    /// Source position of `level`; `None` for native frames.
    fn position(&self, level: usize) -> Option<SourcePosition>;

    /// Global variables visible to the context.
    fn globals(&self) -> Vec<GlobalInfo>;

    /// Parameters, locals and temporaries of the frame at `level`.
    fn locals(&self, level: usize) -> Vec<LocalInfo>;

    /// Reflection data of a type; handle qualifiers are ignored.
    fn type_info(&self, type_id: TypeId) -> Option<TypeInfo>;

    /// Human-readable declaration of a type, e.g. `array<int>@`.
    fn type_declaration(&self, type_id: TypeId) -> String;

    /// Resolves a declared type by name.
    fn type_id_by_name(&self, name: &str) -> Option<TypeId>;

    /// Reads `len` bytes of runtime memory.
    fn read_memory(&self, address: RawAddress, len: usize) -> Option<Vec<u8>>;

    /// Starts generic forward iteration of the object at `object`, if supported.
    fn for_each(&self, type_id: TypeId, object: RawAddress) -> Option<Box<dyn ForEachCursor + '_>>;

    /// Every script function known to the runtime.
    fn functions(&self) -> Vec<FunctionInfo>;

    /// Every script section in use, if the runtime can enumerate them.
    fn sections(&self) -> Option<Vec<String>> {
        None
    }

    /// Installs the per-instruction callback, replacing any previous one.
    fn set_line_callback(&self, callback: LineCallback);

    /// Removes the per-instruction callback.
    fn clear_line_callback(&self);
}

/// Whether two context handles refer to the same context object.
pub fn same_context(a: &Arc<dyn ScriptContext>, b: &Arc<dyn ScriptContext>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
