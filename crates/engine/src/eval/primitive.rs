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

//! Formatters for the built-in scalar types.

use std::{fmt, marker::PhantomData};

use sdb_common::types::{VariableAddress, VariableValue};

use crate::{ExecutionCache, TypeEvaluator};

/// A fixed-size scalar stored little-endian in runtime memory.
pub trait Scalar: Sized + fmt::Display {
    /// Size in bytes.
    const SIZE: usize;

    /// Decodes the value from exactly [`Self::SIZE`] bytes.
    fn from_le_slice(bytes: &[u8]) -> Option<Self>;

    /// Text shown in a value column.
    fn render(&self) -> String {
        self.to_string()
    }
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Option<Self> {
                    Some(<$ty>::from_le_bytes(bytes.get(..Self::SIZE)?.try_into().ok()?))
                }
            }
        )*
    };
}

impl_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl Scalar for bool {
    const SIZE: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        bytes.first().map(|b| *b != 0)
    }
}

/// Formats a built-in scalar type.
pub struct PrimitiveEvaluator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for PrimitiveEvaluator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimitiveEvaluator<{}>", std::any::type_name::<T>())
    }
}

impl<T> Default for PrimitiveEvaluator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PrimitiveEvaluator<T> {
    /// Creates the evaluator.
    pub const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T: Scalar> TypeEvaluator for PrimitiveEvaluator<T> {
    fn evaluate(&self, cache: &mut ExecutionCache, id: VariableAddress) -> VariableValue {
        match cache.read::<T>(id.location) {
            Some(value) => VariableValue::new(value.render()),
            None => VariableValue::muted("(unreadable)"),
        }
    }
}
