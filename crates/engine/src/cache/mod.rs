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

//! Per-episode snapshot of a suspended script context.
//!
//! An [`ExecutionCache`] is created when the runtime first breaks and lives until the
//! driver resumes. It owns every [`VariableState`] in an arena keyed by
//! [`VariableAddress`], so two views of the same memory share one state and expanding one
//! expands both. Runtime addresses it hands out are only meaningful while the context stays
//! suspended; values the runtime does not keep addressable are copied into state-owned
//! buffers at capture time.

mod sections;
mod snapshot;
mod state;
mod watch;

pub use sections::*;
pub use snapshot::*;
pub use state::*;
pub use watch::*;

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt,
    sync::Arc,
};

use sdb_common::types::{
    CallStackEntry, CaptureId, ExpandKind, LocalKey, LocalKind, Location, RawAddress, TypeId,
    TypeModifiers, VariableAddress, VariableValue,
};
use tracing::{debug, trace, warn};

use crate::{
    context::{LocalInfo, Slot, TypeInfo},
    eval::Scalar,
    DebuggerConfig, EvaluatorRegistry, ScriptContext,
};

/// Where a copied value came from. A refresh that meets the same origin again overwrites
/// the existing copy, so its state keeps its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CaptureOrigin {
    Local { key: LocalKey, stack_offset: i32 },
    Iterated { parent: StateId, step: usize, column: usize },
}

/// Snapshot of one suspension episode.
pub struct ExecutionCache {
    ctx: Arc<dyn ScriptContext>,
    registry: Arc<EvaluatorRegistry>,
    config: DebuggerConfig,
    discovery: Arc<dyn SectionDiscovery>,

    states: Vec<VariableState>,
    index: HashMap<VariableAddress, StateId>,
    captures: HashMap<CaptureId, StateId>,
    origins: HashMap<CaptureOrigin, StateId>,
    next_capture: u32,

    type_names: HashMap<(TypeId, TypeModifiers), String>,
    type_infos: HashMap<TypeId, Option<Arc<TypeInfo>>>,

    globals_cached: bool,
    globals: Vec<VariableView>,
    locals: BTreeMap<LocalKey, Vec<VariableView>>,
    watch: Vec<VariableView>,

    sections_cached: bool,
    sections: BTreeMap<String, String>,
    call_stack: Vec<CallStackEntry>,
    system_function: Option<String>,
    refreshes: usize,
}

impl fmt::Debug for ExecutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionCache")
            .field("states", &self.states.len())
            .field("globals_cached", &self.globals_cached)
            .field("locals", &self.locals.keys().collect::<Vec<_>>())
            .field("watch", &self.watch.len())
            .field("call_stack", &self.call_stack.len())
            .field("refreshes", &self.refreshes)
            .finish_non_exhaustive()
    }
}

impl ExecutionCache {
    /// Captures a suspended context, discovering sections from its functions.
    pub fn new(
        ctx: Arc<dyn ScriptContext>,
        registry: Arc<EvaluatorRegistry>,
        config: DebuggerConfig,
    ) -> Self {
        Self::with_discovery(ctx, registry, config, Arc::new(FunctionSections))
    }

    /// Captures a suspended context with a custom section discovery strategy.
    pub fn with_discovery(
        ctx: Arc<dyn ScriptContext>,
        registry: Arc<EvaluatorRegistry>,
        config: DebuggerConfig,
        discovery: Arc<dyn SectionDiscovery>,
    ) -> Self {
        let mut cache = Self {
            ctx,
            registry,
            config,
            discovery,
            states: Vec::new(),
            index: HashMap::new(),
            captures: HashMap::new(),
            origins: HashMap::new(),
            next_capture: 0,
            type_names: HashMap::new(),
            type_infos: HashMap::new(),
            globals_cached: false,
            globals: Vec::new(),
            locals: BTreeMap::new(),
            watch: Vec::new(),
            sections_cached: false,
            sections: BTreeMap::new(),
            call_stack: Vec::new(),
            system_function: None,
            refreshes: 0,
        };

        if cache.config.discover_sections {
            cache.cache_sections();
        }
        cache.capture_call_stack();
        debug!(
            depth = cache.call_stack.len(),
            sections = cache.sections.len(),
            "created execution cache"
        );
        cache
    }

    /// The suspended context.
    pub fn context(&self) -> &Arc<dyn ScriptContext> {
        &self.ctx
    }

    /// Tunables in effect for this episode.
    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// The evaluators used to render values.
    pub fn registry(&self) -> &Arc<EvaluatorRegistry> {
        &self.registry
    }

    /// Number of times the cache was refreshed for a new break.
    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    // ----- states -----

    /// Returns the state cached under `address`, creating an empty one if needed.
    ///
    /// The flag is `true` when the state already existed. New states are not evaluated.
    pub fn add_or_get_state(&mut self, address: VariableAddress) -> (StateId, bool) {
        if let Some(&id) = self.index.get(&address) {
            return (id, true);
        }

        let id = StateId(self.states.len());
        self.states.push(VariableState { address: Some(address), ..Default::default() });
        self.index.insert(address, id);
        (id, false)
    }

    /// The state cached under `address`, if any.
    pub fn state_of(&self, address: &VariableAddress) -> Option<StateId> {
        self.index.get(address).copied()
    }

    /// A state of this cache.
    pub fn state(&self, id: StateId) -> &VariableState {
        &self.states[id.0]
    }

    /// A state of this cache, mutably. Evaluators use this to fill children and entries.
    pub fn state_mut(&mut self, id: StateId) -> &mut VariableState {
        &mut self.states[id.0]
    }

    /// Number of materialised states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Creates a view of `address`, evaluating its state on first sight.
    pub fn view(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        address: VariableAddress,
    ) -> VariableView {
        let id = self.materialize(address);
        VariableView::new(name, type_name, id)
    }

    /// The rendered value at `address`, evaluating its state on first sight.
    pub fn value_of(&mut self, address: VariableAddress) -> VariableValue {
        let id = self.materialize(address);
        self.states[id.0].value.clone()
    }

    fn materialize(&mut self, address: VariableAddress) -> StateId {
        let (id, existed) = self.add_or_get_state(address);
        if !existed {
            let (value, target) = self.evaluate(address);
            let state = &mut self.states[id.0];
            state.value = value;
            state.target = target;
        }
        id
    }

    /// Renders `address`. Leaf values longer than
    /// [`DebuggerConfig::max_display_len`] become expandable to their full text.
    fn evaluate(&mut self, address: VariableAddress) -> (VariableValue, Option<VariableAddress>) {
        let registry = Arc::clone(&self.registry);
        let mut value = registry.evaluate(self, address);
        let target = registry.dereference(self, address);
        if value.expand == ExpandKind::None
            && value.display.chars().count() > self.config.max_display_len
        {
            value.expand = ExpandKind::Value;
        }
        (value, target)
    }

    /// Re-evaluates a state in place. Returns whether its expansion was dropped.
    fn reevaluate(&mut self, id: StateId) -> bool {
        let Some(address) = self.states[id.0].address else { return false };
        let (value, target) = self.evaluate(address);

        let state = &mut self.states[id.0];
        let reshaped = state.value.expand != value.expand || state.target != target;
        let reexpand = state.queried && !reshaped && value.expand == ExpandKind::Entries;
        if reshaped || reexpand {
            state.reset_expansion();
        }
        state.value = value;
        state.target = target;
        if reexpand {
            self.expand(id);
        }
        reshaped || reexpand
    }

    /// Lazily populates the children or entries of `id`.
    ///
    /// Runs the evaluator at most once per state; later calls are no-ops until a refresh
    /// invalidates the expansion.
    pub fn expand(&mut self, id: StateId) {
        let state = &mut self.states[id.0];
        let expandable = matches!(state.value.expand, ExpandKind::Children | ExpandKind::Entries);
        if state.queried || !expandable {
            return;
        }
        state.queried = true;
        let Some(address) = state.address else { return };

        let registry = Arc::clone(&self.registry);
        registry.expand(self, address, id);
        trace!(state = id.0, address = %address, "expanded state");
    }

    /// Copies `bytes` into a new state-owned buffer and returns its address.
    pub fn capture_temporary(&mut self, type_id: TypeId, bytes: Vec<u8>) -> VariableAddress {
        self.capture_new(type_id, bytes).1
    }

    fn capture_new(&mut self, type_id: TypeId, bytes: Vec<u8>) -> (StateId, VariableAddress) {
        let capture = CaptureId(self.next_capture);
        self.next_capture += 1;

        let address = VariableAddress::captured(type_id, capture, 0);
        let id = StateId(self.states.len());
        self.states.push(VariableState {
            buffer: Some(bytes.into_boxed_slice()),
            address: Some(address),
            ..Default::default()
        });
        self.index.insert(address, id);
        self.captures.insert(capture, id);

        let (value, target) = self.evaluate(address);
        let state = &mut self.states[id.0];
        state.value = value;
        state.target = target;
        (id, address)
    }

    /// Copies `bytes` into the buffer already captured from `origin`, or into a new one.
    fn capture_from(
        &mut self,
        origin: CaptureOrigin,
        type_id: TypeId,
        bytes: Vec<u8>,
    ) -> VariableAddress {
        if let Some(&id) = self.origins.get(&origin) {
            if let Some(address) = self.states[id.0].address.filter(|a| a.type_id == type_id) {
                self.states[id.0].buffer = Some(bytes.into_boxed_slice());
                self.reevaluate(id);
                return address;
            }
        }

        let (id, address) = self.capture_new(type_id, bytes);
        self.origins.insert(origin, id);
        address
    }

    /// Address of a value reported by the runtime, copying it if it is not addressable.
    pub fn capture_slot(&mut self, type_id: TypeId, slot: Slot) -> VariableAddress {
        match slot {
            Slot::Address(address) => VariableAddress::runtime(type_id, address),
            Slot::Temporary(bytes) => self.capture_temporary(type_id, bytes),
        }
    }

    /// Address of one value of an iteration step of `parent`.
    ///
    /// Unaddressable values are copied into a buffer tied to `(parent, step, column)`, which
    /// later expansions of the same parent reuse.
    pub fn capture_iterated(
        &mut self,
        parent: StateId,
        step: usize,
        column: usize,
        type_id: TypeId,
        slot: Slot,
    ) -> VariableAddress {
        match slot {
            Slot::Address(address) => VariableAddress::runtime(type_id, address),
            Slot::Temporary(bytes) => {
                self.capture_from(CaptureOrigin::Iterated { parent, step, column }, type_id, bytes)
            }
        }
    }

    fn capture_local(&mut self, key: LocalKey, local: &LocalInfo) -> VariableAddress {
        let origin = CaptureOrigin::Local { key, stack_offset: local.stack_offset };
        match &local.slot {
            Slot::Temporary(bytes) => self.capture_from(origin, local.type_id, bytes.clone()),
            Slot::Address(address)
                if local.kind == LocalKind::Temporary && !local.type_id.is_handle() =>
            {
                let size = local
                    .type_id
                    .primitive_size()
                    .or_else(|| self.type_info(local.type_id).map(|info| info.size))
                    .filter(|size| *size > 0);
                let bytes = match size {
                    Some(size) if !address.is_null() => self.ctx.read_memory(*address, size),
                    _ => None,
                };
                match bytes {
                    Some(bytes) => self.capture_from(origin, local.type_id, bytes),
                    None => {
                        warn!(
                            offset = local.stack_offset,
                            "unable to copy temporary, reading in place"
                        );
                        VariableAddress::runtime(local.type_id, *address)
                    }
                }
            }
            Slot::Address(address) => VariableAddress::runtime(local.type_id, *address),
        }
    }

    // ----- memory and types -----

    /// Reads `len` bytes at `location` from runtime memory or a captured buffer.
    pub fn read_bytes(&self, location: Location, len: usize) -> Option<Vec<u8>> {
        match location {
            Location::Runtime(address) if address.is_null() => None,
            Location::Runtime(address) => {
                self.ctx.read_memory(address, len).filter(|bytes| bytes.len() == len)
            }
            Location::Captured { capture, offset } => {
                let id = self.captures.get(&capture)?;
                let buffer = self.states[id.0].buffer.as_deref()?;
                buffer.get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
            }
        }
    }

    /// Reads a scalar at `location`.
    pub fn read<T: Scalar>(&self, location: Location) -> Option<T> {
        self.read_bytes(location, T::SIZE).and_then(|bytes| T::from_le_slice(&bytes))
    }

    /// Reads a pointer at `location`.
    pub fn read_pointer(&self, location: Location) -> Option<RawAddress> {
        self.read::<u64>(location).map(RawAddress::new)
    }

    /// Reflection data of a type, memoised for the episode.
    pub fn type_info(&mut self, type_id: TypeId) -> Option<Arc<TypeInfo>> {
        let key = type_id.without_handle();
        if let Some(info) = self.type_infos.get(&key) {
            return info.clone();
        }
        let info = self.ctx.type_info(key).map(Arc::new);
        self.type_infos.insert(key, info.clone());
        info
    }

    /// Display name of a declaration, memoised for the episode.
    pub fn type_name(&mut self, type_id: TypeId, modifiers: TypeModifiers) -> String {
        self.type_names
            .entry((type_id, modifiers))
            .or_insert_with(|| modifiers.decorate(&self.ctx.type_declaration(type_id)))
            .clone()
    }

    // ----- globals, locals and call stack -----

    /// Materialises the global variable list; only the first call per episode queries the
    /// runtime.
    pub fn cache_globals(&mut self) {
        if self.globals_cached {
            return;
        }
        self.globals_cached = true;

        let globals = self.ctx.globals();
        let mut views = Vec::with_capacity(globals.len());
        for global in globals {
            let name = global.qualified_name();
            let type_name = self.type_name(global.type_id, global.modifiers);
            let address = self.capture_slot(global.type_id, global.slot);
            views.push(self.view(name, type_name, address));
        }
        debug!(count = views.len(), "cached globals");
        self.globals = views;
    }

    /// Global variables, materialised on first use.
    pub fn globals(&mut self) -> &[VariableView] {
        self.cache_globals();
        &self.globals
    }

    /// Whether globals were materialised this episode.
    pub fn globals_cached(&self) -> bool {
        self.globals_cached
    }

    /// Materialises one local list; only the first call per key per episode queries the
    /// runtime. Out-of-scope variables are skipped.
    pub fn cache_locals(&mut self, key: LocalKey) {
        if self.locals.contains_key(&key) {
            return;
        }

        let locals = self.ctx.locals(key.level);
        let mut views = Vec::new();
        for local in locals.iter().filter(|local| local.kind == key.kind && local.in_scope) {
            let name = match &local.name {
                Some(name) if !name.is_empty() => name.clone(),
                _ => format!("(temp @{})", local.stack_offset),
            };
            let type_name = self.type_name(local.type_id, local.modifiers);
            let address = self.capture_local(key, local);
            views.push(self.view(name, type_name, address));
        }
        trace!(level = key.level, kind = %key.kind, count = views.len(), "cached locals");
        self.locals.insert(key, views);
    }

    /// One local list, materialised on first use.
    pub fn locals(&mut self, key: LocalKey) -> &[VariableView] {
        self.cache_locals(key);
        self.locals.get(&key).map_or(&[], Vec::as_slice)
    }

    /// Local lists requested so far this episode.
    pub fn cached_locals(&self) -> &BTreeMap<LocalKey, Vec<VariableView>> {
        &self.locals
    }

    /// Script frames captured at the break, innermost first.
    pub fn call_stack(&self) -> &[CallStackEntry] {
        &self.call_stack
    }

    /// Declaration of the native function at the top of the stack, if the break happened
    /// inside one.
    pub fn system_function(&self) -> Option<&str> {
        self.system_function.as_deref()
    }

    fn capture_call_stack(&mut self) {
        self.call_stack.clear();
        self.system_function = None;

        for level in 0..self.ctx.call_stack_size() {
            let function = self.ctx.function(level);
            if level == 0 {
                if let Some(function) = function.as_ref().filter(|f| f.is_system) {
                    self.system_function = Some(function.declaration.clone());
                    continue;
                }
            }

            let position = self.ctx.position(level);
            let declaration = function
                .as_ref()
                .map_or_else(|| "(unknown)".to_string(), |f| f.declaration.clone());
            let section = position
                .as_ref()
                .map(|p| p.section.clone())
                .or_else(|| function.as_ref().and_then(|f| f.section.clone()))
                .unwrap_or_default();
            if !section.is_empty() {
                self.ensure_section_cached(&section);
            }

            self.call_stack.push(CallStackEntry {
                declaration,
                section,
                row: position.as_ref().map_or(0, |p| p.line),
                column: position.as_ref().map_or(0, |p| p.column),
            });
        }
    }

    // ----- sections -----

    /// Builds the section index once per episode through the discovery strategy.
    pub fn cache_sections(&mut self) {
        if self.sections_cached {
            return;
        }
        self.sections_cached = true;

        let discovered = self.discovery.discover(self.ctx.as_ref());
        for section in discovered {
            self.ensure_section_cached(&section);
        }
    }

    /// Adds `section` to the index if missing and returns its display name.
    pub fn ensure_section_cached(&mut self, section: &str) -> &str {
        self.sections
            .entry(section.to_string())
            .or_insert_with(|| canonical_section_name(section))
    }

    /// Section paths mapped to their display names.
    pub fn sections(&self) -> &BTreeMap<String, String> {
        &self.sections
    }

    // ----- refresh -----

    /// Brings a retained cache up to date after the context broke again.
    ///
    /// State identities survive: every view reachable from the globals, the requested local
    /// lists, the watch list or an expanded parent still refers to the same state, now
    /// holding the current value. Temporaries are copied again into their existing buffers.
    /// Expansions are dropped where the value changed shape or a handle now points
    /// elsewhere; expanded entry lists are re-queried since their contents cannot be
    /// tracked. States no longer reachable are evicted without touching their memory.
    pub fn refresh(&mut self) {
        self.refreshes += 1;
        self.capture_call_stack();

        let keys: Vec<LocalKey> = self.locals.keys().copied().collect();
        self.locals.clear();
        for key in keys {
            self.cache_locals(key);
        }

        let mut pending: VecDeque<StateId> = self
            .globals
            .iter()
            .chain(self.locals.values().flatten())
            .chain(&self.watch)
            .map(|view| view.state)
            .collect();
        let mut live = HashSet::new();
        let mut reset = 0;
        while let Some(id) = pending.pop_front() {
            if !live.insert(id) {
                continue;
            }
            if self.reevaluate(id) {
                reset += 1;
            }
            let state = &self.states[id.0];
            if state.queried {
                pending.extend(state.children.iter().map(|child| child.state));
            }
        }
        let iterated: Vec<StateId> = self
            .origins
            .iter()
            .filter_map(|(origin, id)| match origin {
                CaptureOrigin::Iterated { parent, .. }
                    if live.contains(parent) && self.states[parent.0].queried =>
                {
                    Some(*id)
                }
                _ => None,
            })
            .collect();
        live.extend(iterated);

        let evicted = self.evict_unreachable(&live);
        debug!(
            live = live.len(),
            evicted,
            reset,
            refresh = self.refreshes,
            "refreshed execution cache"
        );
    }

    fn evict_unreachable(&mut self, live: &HashSet<StateId>) -> usize {
        let mut evicted = 0;
        for (index, state) in self.states.iter_mut().enumerate() {
            if live.contains(&StateId(index)) {
                continue;
            }
            let Some(address) = state.address.take() else { continue };
            self.index.remove(&address);
            if let Location::Captured { capture, .. } = address.location {
                self.captures.remove(&capture);
            }
            *state = VariableState::default();
            evicted += 1;
        }
        self.origins.retain(|_, id| live.contains(id));
        evicted
    }
}
