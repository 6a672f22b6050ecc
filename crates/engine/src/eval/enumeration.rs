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

//! Enum formatting, including bit-flag decomposition.

use sdb_common::types::{ExpandKind, VariableAddress, VariableEntry, VariableValue};

use crate::{context::TypeKind, ExecutionCache, StateId, TypeEvaluator};

/// Formats enumerations.
///
/// A value equal to a declared enumerator shows its name. Otherwise, for enums the runtime
/// marks as flags (or listed in [`DebuggerConfig::flag_enums`](crate::DebuggerConfig)),
/// the value is split into named bits plus a hexadecimal remainder, e.g. `Fire | Ice | 0x40`,
/// and each part is listed as an entry. Anything else shows the number.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumEvaluator;

/// Splits `value` into the enumerators fully contained in it and the leftover bits.
pub fn decompose_flags(enumerators: &[(String, i64)], value: i64) -> (Vec<&str>, i64) {
    let mut names = Vec::new();
    let mut covered = 0i64;
    for (name, bits) in enumerators {
        if *bits != 0 && value & bits == *bits && covered & bits != *bits {
            names.push(name.as_str());
            covered |= bits;
        }
    }
    (names, value & !covered)
}

struct EnumReading {
    value: i64,
    enumerators: Vec<(String, i64)>,
    flags: bool,
}

fn read_enum(cache: &mut ExecutionCache, id: VariableAddress) -> Option<EnumReading> {
    let info = cache.type_info(id.type_id)?;
    let TypeKind::Enum { values, flags } = &info.kind else {
        return None;
    };
    let size = match info.size {
        1 | 2 | 4 | 8 => info.size,
        _ => 4,
    };
    let bytes = cache.read_bytes(id.location, size)?;
    let value = match size {
        1 => i64::from(bytes[0] as i8),
        2 => i64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        4 => i64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => i64::from_le_bytes(bytes.get(..8)?.try_into().ok()?),
    };
    let flags = *flags || cache.config().is_flag_enum(&info.name, &info.namespace);
    Some(EnumReading { value, enumerators: values.clone(), flags })
}

impl TypeEvaluator for EnumEvaluator {
    fn evaluate(&self, cache: &mut ExecutionCache, id: VariableAddress) -> VariableValue {
        let Some(reading) = read_enum(cache, id) else {
            return VariableValue::muted("(unreadable)");
        };

        if let Some((name, _)) = reading.enumerators.iter().find(|(_, v)| *v == reading.value) {
            return VariableValue::new(name.clone());
        }
        if !reading.flags {
            return VariableValue::new(reading.value.to_string());
        }

        let (names, remainder) = decompose_flags(&reading.enumerators, reading.value);
        let mut parts: Vec<String> = names.into_iter().map(str::to_owned).collect();
        if remainder != 0 {
            parts.push(format!("{remainder:#x}"));
        }
        if parts.is_empty() {
            return VariableValue::new(reading.value.to_string());
        }
        VariableValue::new(parts.join(" | ")).expandable(ExpandKind::Entries)
    }

    fn expand(&self, cache: &mut ExecutionCache, id: VariableAddress, state: StateId) {
        let Some(reading) = read_enum(cache, id) else { return };
        let (names, remainder) = decompose_flags(&reading.enumerators, reading.value);

        let mut entries: Vec<VariableEntry> =
            names.into_iter().map(|name| VariableValue::new(name).into()).collect();
        if remainder != 0 {
            entries.push(VariableValue::muted(format!("{remainder:#x}")).into());
        }
        cache.state_mut(state).entries.extend(entries);
    }
}
