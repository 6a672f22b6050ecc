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

//! Runtime type identities.
//!
//! A [`TypeId`] is the 32-bit identity the scripting runtime hands out for every
//! declared type. The low bits carry a *sequence number* that is unique per concrete
//! type, while the high bits carry qualifier flags (object kind, handle, const handle).
//! Evaluators are always registered against the sequence number so that `Foo`,
//! `Foo@` and `const Foo@` share a single evaluator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a runtime type, including qualifier flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub i32);

impl TypeId {
    /// Mask selecting the sequence number portion of a type id.
    pub const MASK_SEQUENCE: i32 = 0x03FF_FFFF;
    /// Mask selecting the object-kind flags.
    pub const MASK_OBJECT: i32 = 0x1C00_0000;
    /// Flag set on application-registered object types.
    pub const APP_OBJECT: i32 = 0x0400_0000;
    /// Flag set on script-declared classes.
    pub const SCRIPT_OBJECT: i32 = 0x0800_0000;
    /// Flag set on template instances.
    pub const TEMPLATE: i32 = 0x1000_0000;
    /// Flag set on handles to const objects.
    pub const HANDLE_TO_CONST: i32 = 0x2000_0000;
    /// Flag set on object handles.
    pub const OBJECT_HANDLE: i32 = 0x4000_0000;

    /// `void`
    pub const VOID: Self = Self(0);
    /// `bool`
    pub const BOOL: Self = Self(1);
    /// `int8`
    pub const INT8: Self = Self(2);
    /// `int16`
    pub const INT16: Self = Self(3);
    /// `int`
    pub const INT32: Self = Self(4);
    /// `int64`
    pub const INT64: Self = Self(5);
    /// `uint8`
    pub const UINT8: Self = Self(6);
    /// `uint16`
    pub const UINT16: Self = Self(7);
    /// `uint`
    pub const UINT32: Self = Self(8);
    /// `uint64`
    pub const UINT64: Self = Self(9);
    /// `float`
    pub const FLOAT: Self = Self(10);
    /// `double`
    pub const DOUBLE: Self = Self(11);

    /// Returns the sequence number with all qualifier flags stripped.
    pub const fn sequence(self) -> i32 {
        self.0 & Self::MASK_SEQUENCE
    }

    /// Whether this id refers to a handle (`Foo@`).
    pub const fn is_handle(self) -> bool {
        self.0 & Self::OBJECT_HANDLE != 0
    }

    /// Whether this id refers to a handle to a const object (`const Foo@`).
    pub const fn is_handle_to_const(self) -> bool {
        self.0 & Self::HANDLE_TO_CONST != 0
    }

    /// Whether this id refers to an object type (application, script or template).
    pub const fn is_object(self) -> bool {
        self.0 & Self::MASK_OBJECT != 0
    }

    /// Whether this id refers to a built-in scalar type.
    pub const fn is_primitive(self) -> bool {
        !self.is_object() && self.sequence() <= Self::DOUBLE.0
    }

    /// Whether this is `void`.
    pub const fn is_void(self) -> bool {
        self.0 == Self::VOID.0
    }

    /// Strips the handle qualifiers, yielding the id of the referenced object type.
    pub const fn without_handle(self) -> Self {
        Self(self.0 & !(Self::OBJECT_HANDLE | Self::HANDLE_TO_CONST))
    }

    /// Size in bytes of a primitive type, or `None` for non-primitives.
    pub const fn primitive_size(self) -> Option<usize> {
        if self.is_object() {
            return None;
        }
        match self.sequence() {
            1 | 2 | 6 => Some(1),
            3 | 7 => Some(2),
            4 | 8 | 10 => Some(4),
            5 | 9 | 11 => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.0)
    }
}

/// Qualifiers attached to a particular declaration of a type (not to the type itself).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeModifiers(u8);

impl TypeModifiers {
    /// No qualifiers.
    pub const NONE: Self = Self(0);
    /// `&in` reference.
    pub const IN_REF: Self = Self(1);
    /// `&out` reference.
    pub const OUT_REF: Self = Self(2);
    /// `&inout` reference.
    pub const INOUT_REF: Self = Self(3);
    /// `const` declaration.
    pub const CONST: Self = Self(4);

    /// Whether all bits of `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of both qualifier sets.
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Decorates a base declaration (`int`) with these qualifiers (`const int &in`).
    pub fn decorate(self, base: &str) -> String {
        let mut decl = String::with_capacity(base.len() + 10);
        if self.contains(Self::CONST) {
            decl.push_str("const ");
        }
        decl.push_str(base);
        if self.contains(Self::INOUT_REF) {
            decl.push_str(" &inout");
        } else if self.contains(Self::IN_REF) {
            decl.push_str(" &in");
        } else if self.contains(Self::OUT_REF) {
            decl.push_str(" &out");
        }
        decl
    }
}
