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

//! Discovery of the script sections shown in the section index.

use std::{collections::BTreeSet, path::Path};

use auto_impl::auto_impl;

use crate::ScriptContext;

/// Strategy used to populate the section index of an execution cache.
///
/// Runtimes rarely keep a complete list of the sections they compiled, so hosts that
/// track their own script files can provide a better answer than the default.
#[auto_impl(&, Box, Arc)]
pub trait SectionDiscovery: Send + Sync {
    /// Returns every section path worth listing.
    fn discover(&self, ctx: &dyn ScriptContext) -> Vec<String>;
}

/// Default discovery: the runtime's own list if it has one, plus the declaring section of
/// every known script function.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionSections;

impl SectionDiscovery for FunctionSections {
    fn discover(&self, ctx: &dyn ScriptContext) -> Vec<String> {
        let mut sections: BTreeSet<String> =
            ctx.sections().unwrap_or_default().into_iter().collect();
        sections.extend(ctx.functions().into_iter().filter_map(|f| f.section));
        sections.into_iter().collect()
    }
}

/// Host-provided, fixed list of sections.
#[derive(Debug, Clone, Default)]
pub struct StaticSections(pub Vec<String>);

impl SectionDiscovery for StaticSections {
    fn discover(&self, _ctx: &dyn ScriptContext) -> Vec<String> {
        self.0.clone()
    }
}

/// Display name of a section path: its file name, with separators normalised.
pub fn canonical_section_name(section: &str) -> String {
    let normalized = section.replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string())
}
