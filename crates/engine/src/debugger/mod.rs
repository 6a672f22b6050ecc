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

//! Breakpoint and step state machine driving suspension of a script context.
//!
//! The runtime calls [`Debugger::line_callback`] once per instruction boundary of the
//! hooked context. When that decides to break, the debugger builds (or refreshes) the
//! [`ExecutionCache`], marks itself suspended and hands the runtime thread to its
//! [`DebuggerBackend`], which blocks until the driver calls [`Debugger::resume`] or one of
//! the step commands.
//!
//! Calling a command in the wrong state (stepping while running, hooking while
//! suspended, ...) is a protocol violation and panics.

mod backend;
mod tracker;

pub use backend::*;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sdb_common::types::{Breakpoint, BreakpointSet, DebugAction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    context::{same_context, ScriptContext},
    DebuggerConfig, EvaluatorRegistry, ExecutionCache, FunctionSections, SectionDiscovery,
};
use tracker::LineTracker;

/// Whether the hooked context is executing or parked at a break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebuggerStatus {
    /// Script code is executing (or the debugger is idle).
    #[default]
    Running,
    /// The runtime thread is parked in the backend.
    Suspended,
}

#[derive(Default)]
struct DebuggerState {
    breakpoints: BreakpointSet,
    action: DebugAction,
    /// Reference depth of a pending step over/out.
    stack_size: usize,
    /// Depth of the context when it last broke.
    break_depth: usize,
    cache: Option<ExecutionCache>,
    hooked: Option<Weak<dyn ScriptContext>>,
    status: DebuggerStatus,
    tracker: LineTracker,
    episodes: u64,
}

/// Builder for a [`Debugger`].
pub struct DebuggerBuilder {
    backend: Arc<dyn DebuggerBackend>,
    registry: EvaluatorRegistry,
    config: DebuggerConfig,
    sections: Arc<dyn SectionDiscovery>,
}

impl DebuggerBuilder {
    /// Evaluators used to render values.
    pub fn registry(mut self, registry: EvaluatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Tunables passed to every cache.
    pub fn config(mut self, config: DebuggerConfig) -> Self {
        self.config = config;
        self
    }

    /// Strategy for building the section index.
    pub fn sections(mut self, sections: impl SectionDiscovery + 'static) -> Self {
        self.sections = Arc::new(sections);
        self
    }

    /// Builds the debugger.
    pub fn build(self) -> Arc<Debugger> {
        Arc::new(Debugger {
            state: Mutex::new(DebuggerState::default()),
            backend: self.backend,
            registry: Arc::new(self.registry),
            config: self.config,
            sections: self.sections,
        })
    }
}

/// Debugger for a single script context.
pub struct Debugger {
    state: Mutex<DebuggerState>,
    backend: Arc<dyn DebuggerBackend>,
    registry: Arc<EvaluatorRegistry>,
    config: DebuggerConfig,
    sections: Arc<dyn SectionDiscovery>,
}

impl std::fmt::Debug for Debugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Debugger")
            .field("status", &state.status)
            .field("action", &state.action)
            .field("breakpoints", &state.breakpoints.len())
            .field("episodes", &state.episodes)
            .finish_non_exhaustive()
    }
}

impl Debugger {
    /// Creates a debugger with the built-in evaluators and default configuration.
    pub fn new(backend: Arc<dyn DebuggerBackend>) -> Arc<Self> {
        Self::builder(backend).build()
    }

    /// Starts building a debugger.
    pub fn builder(backend: Arc<dyn DebuggerBackend>) -> DebuggerBuilder {
        DebuggerBuilder {
            backend,
            registry: EvaluatorRegistry::new(),
            config: DebuggerConfig::default(),
            sections: Arc::new(FunctionSections),
        }
    }

    /// Evaluators used to render values.
    pub fn registry(&self) -> &Arc<EvaluatorRegistry> {
        &self.registry
    }

    /// Tunables passed to every cache.
    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Current status.
    pub fn status(&self) -> DebuggerStatus {
        self.state.lock().status
    }

    /// Whether the hooked context is at a break and waiting for a command.
    ///
    /// This turns true just before the runtime thread blocks in the backend. Commands issued
    /// in between are kept by the backend, so the thread then returns without blocking.
    pub fn is_suspended(&self) -> bool {
        self.status() == DebuggerStatus::Suspended
    }

    /// Pending step action.
    pub fn action(&self) -> DebugAction {
        self.state.lock().action
    }

    /// Number of breaks so far.
    pub fn episodes(&self) -> u64 {
        self.state.lock().episodes
    }

    /// Whether the debugger needs line callbacks: a breakpoint exists or a step is
    /// pending.
    pub fn has_work(&self) -> bool {
        let state = self.state.lock();
        !state.breakpoints.is_empty() || state.action != DebugAction::None
    }

    // ----- breakpoints -----

    /// Adds or removes a breakpoint; returns `true` if it is set afterwards.
    pub fn toggle_breakpoint(&self, breakpoint: Breakpoint) -> bool {
        let set = self.state.lock().breakpoints.toggle(breakpoint.clone());
        debug!(%breakpoint, set, "toggled breakpoint");
        set
    }

    /// Adds or removes a line breakpoint.
    pub fn toggle_line_breakpoint(&self, section: &str, line: u32) -> bool {
        self.toggle_breakpoint(Breakpoint::source(section, line))
    }

    /// Adds or removes a function breakpoint.
    pub fn toggle_function_breakpoint(&self, name: &str) -> bool {
        self.toggle_breakpoint(Breakpoint::function(name))
    }

    /// Sets a breakpoint; returns `false` if it was already set.
    pub fn add_breakpoint(&self, breakpoint: Breakpoint) -> bool {
        self.state.lock().breakpoints.insert(breakpoint)
    }

    /// Clears a breakpoint; returns `false` if it was not set.
    pub fn remove_breakpoint(&self, breakpoint: &Breakpoint) -> bool {
        self.state.lock().breakpoints.remove(breakpoint)
    }

    /// Current breakpoints, sorted.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.state.lock().breakpoints.sorted()
    }

    /// Removes every breakpoint.
    pub fn clear_breakpoints(&self) {
        self.state.lock().breakpoints.clear();
    }

    // ----- context -----

    /// Starts debugging `ctx`, replacing any previously hooked context.
    ///
    /// # Panics
    ///
    /// If called while suspended.
    pub fn hook_context(self: &Arc<Self>, ctx: &Arc<dyn ScriptContext>) {
        let (stale, previous) = {
            let mut state = self.state.lock();
            assert_eq!(
                state.status,
                DebuggerStatus::Running,
                "cannot hook a context while suspended"
            );
            state.tracker.reset();
            (state.cache.take(), state.hooked.replace(Arc::downgrade(ctx)))
        };
        drop(stale);

        if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
            if !same_context(&previous, ctx) {
                debug!("unhooking previous context");
                previous.clear_line_callback();
            }
        }

        let debugger = Arc::downgrade(self);
        ctx.set_line_callback(Arc::new(move |ctx: &Arc<dyn ScriptContext>| {
            if let Some(debugger) = debugger.upgrade() {
                debugger.line_callback(ctx);
            }
        }));
        info!("hooked script context");
    }

    /// Stops debugging the hooked context, if any.
    ///
    /// # Panics
    ///
    /// If called while suspended.
    pub fn unhook_context(&self) {
        let (stale, previous) = {
            let mut state = self.state.lock();
            assert_eq!(
                state.status,
                DebuggerStatus::Running,
                "cannot unhook a context while suspended"
            );
            (state.cache.take(), state.hooked.take())
        };
        drop(stale);

        if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
            previous.clear_line_callback();
            info!("unhooked script context");
        }
    }

    /// The hooked context, if it is still alive.
    pub fn hooked_context(&self) -> Option<Arc<dyn ScriptContext>> {
        self.state.lock().hooked.as_ref().and_then(Weak::upgrade)
    }

    /// Gives the driver access to the current episode's cache.
    ///
    /// Returns `None` when no cache exists, i.e. outside a break.
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut ExecutionCache) -> R) -> Option<R> {
        self.state.lock().cache.as_mut().map(f)
    }

    // ----- runtime side -----

    /// Per-instruction hook; decides whether to break.
    ///
    /// Installed by [`Debugger::hook_context`]; exposed for hosts that dispatch runtime
    /// callbacks themselves.
    pub fn line_callback(&self, ctx: &Arc<dyn ScriptContext>) {
        let should_break = {
            let mut state = self.state.lock();
            assert_eq!(
                state.status,
                DebuggerStatus::Running,
                "line callback fired while the debugger is suspended"
            );

            let depth = ctx.call_stack_size();
            let position = ctx.position(0);
            let function = ctx.function(0);
            let event = match &position {
                Some(position) => state.tracker.observe(
                    &position.section,
                    position.line,
                    depth,
                    function.as_ref().map_or("", |f| f.qualified_name.as_str()),
                ),
                None => Default::default(),
            };

            match state.action {
                DebugAction::StepInto => true,
                DebugAction::StepOver => depth <= state.stack_size,
                DebugAction::StepOut => depth < state.stack_size,
                DebugAction::None => {
                    let line_hit = event.new_line
                        && position.as_ref().is_some_and(|position| {
                            state.breakpoints.matches_line(&position.section, position.line)
                        });
                    let function_hit = event.function_entry
                        && function
                            .as_ref()
                            .is_some_and(|f| state.breakpoints.matches_function(&f.qualified_name));
                    line_hit || function_hit
                }
            }
        };

        trace!(should_break, "line callback");
        if should_break {
            self.debug_break(ctx);
        }
    }

    /// Breaks into the debugger right now, blocking until the driver resumes or steps.
    ///
    /// # Panics
    ///
    /// If no context is hooked, or if already suspended.
    pub fn debug_break(&self, ctx: &Arc<dyn ScriptContext>) {
        {
            let mut state = self.state.lock();
            assert!(state.hooked.is_some(), "debug break without a hooked context");
            assert_eq!(
                state.status,
                DebuggerStatus::Running,
                "debug break while already suspended"
            );

            match state.cache.as_mut() {
                Some(cache) if same_context(cache.context(), ctx) => cache.refresh(),
                _ => {
                    state.cache = Some(ExecutionCache::with_discovery(
                        Arc::clone(ctx),
                        Arc::clone(&self.registry),
                        self.config.clone(),
                        Arc::clone(&self.sections),
                    ));
                }
            }

            state.break_depth = ctx.call_stack_size();
            state.action = DebugAction::None;
            state.status = DebuggerStatus::Suspended;
            state.episodes += 1;
            info!(episode = state.episodes, depth = state.break_depth, "suspended");
        }

        self.backend.suspend(self);

        self.state.lock().status = DebuggerStatus::Running;
        debug!("continuing execution");
    }

    // ----- driver side -----

    /// Breaks on the next instruction boundary.
    pub fn step_into(&self) {
        self.step(DebugAction::StepInto);
    }

    /// Breaks on the next instruction boundary no deeper than the current frame.
    pub fn step_over(&self) {
        self.step(DebugAction::StepOver);
    }

    /// Breaks once the current frame has returned.
    pub fn step_out(&self) {
        self.step(DebugAction::StepOut);
    }

    fn step(&self, action: DebugAction) {
        {
            let mut state = self.state.lock();
            assert_eq!(state.status, DebuggerStatus::Suspended, "cannot step while running");
            state.status = DebuggerStatus::Running;
            state.action = action;
            if matches!(action, DebugAction::StepOver | DebugAction::StepOut) {
                state.stack_size = state.break_depth;
            }
            info!(?action, depth = state.stack_size, "stepping");
        }
        self.backend.resume();
    }

    /// Continues until the next breakpoint, discarding the cache and its watch list.
    ///
    /// # Panics
    ///
    /// If not suspended.
    pub fn resume(&self) {
        let stale = {
            let mut state = self.state.lock();
            assert_eq!(state.status, DebuggerStatus::Suspended, "cannot resume while running");
            state.status = DebuggerStatus::Running;
            state.action = DebugAction::None;
            state.cache.take()
        };
        drop(stale);
        info!("resuming");
        self.backend.resume();
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(ctx) = state.hooked.take().and_then(|weak| weak.upgrade()) {
            if !state.breakpoints.is_empty() {
                warn!(
                    breakpoints = state.breakpoints.len(),
                    "debugger dropped with breakpoints set"
                );
            }
            ctx.clear_line_callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread, time::Duration};

    use parking_lot::Mutex;
    use sdb_common::types::{LocalKind, TypeId};

    use super::*;
    use crate::{context::Slot, test_utils::MockContext};

    #[derive(Debug, Clone, Copy)]
    enum Command {
        Resume,
        StepInto,
        StepOver,
        StepOut,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Stop {
        function: String,
        line: u32,
    }

    fn stop(function: &str, line: u32) -> Stop {
        Stop { function: format!("void {function}()"), line }
    }

    fn scripted(commands: Vec<Command>) -> (Arc<Debugger>, Arc<Mutex<Vec<Stop>>>) {
        let stops = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&stops);
        let mut commands = commands.into_iter();

        let backend = InlineBackend::new(move |debugger: &Debugger| {
            let stop = debugger
                .with_cache(|cache| {
                    let top = &cache.call_stack()[0];
                    Stop { function: top.declaration.clone(), line: top.row }
                })
                .expect("suspended without a cache");
            log.lock().push(stop);

            match commands.next().unwrap_or(Command::Resume) {
                Command::Resume => debugger.resume(),
                Command::StepInto => debugger.step_into(),
                Command::StepOver => debugger.step_over(),
                Command::StepOut => debugger.step_out(),
            }
        });
        (Debugger::new(Arc::new(backend)), stops)
    }

    #[test]
    fn test_step_depth_rules() {
        let ctx = MockContext::new();
        ctx.enter("run", "main.as", 20);
        ctx.enter("main", "main.as", 1);
        let (debugger, stops) =
            scripted(vec![Command::StepOver, Command::StepInto, Command::StepOut, Command::Resume]);
        debugger.hook_context(&ctx.as_context());
        debugger.toggle_line_breakpoint("main.as", 2);

        ctx.line(2);
        ctx.call("helper", "main.as", 10);
        ctx.line(11);
        ctx.ret();
        ctx.line(3);
        ctx.call("helper", "main.as", 10);
        ctx.line(11);
        ctx.ret();
        ctx.line(4);
        ctx.ret();
        ctx.line(21);

        assert_eq!(
            *stops.lock(),
            vec![stop("main", 2), stop("main", 3), stop("helper", 10), stop("main", 4)]
        );
        assert_eq!(debugger.episodes(), 4);
        assert_eq!(debugger.action(), DebugAction::None);
        assert_eq!(debugger.status(), DebuggerStatus::Running);
    }

    #[test]
    fn test_step_over_breaks_in_caller_after_return() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 1);
        let (debugger, stops) = scripted(vec![Command::StepOver]);
        debugger.hook_context(&ctx.as_context());
        debugger.toggle_function_breakpoint("helper");

        ctx.call("helper", "main.as", 10);
        ctx.ret();
        ctx.line(2);

        assert_eq!(*stops.lock(), vec![stop("helper", 10), stop("main", 2)]);
    }

    #[test]
    fn test_function_breakpoint_fires_on_entry() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 1);
        let (debugger, stops) = scripted(vec![]);
        debugger.hook_context(&ctx.as_context());
        debugger.toggle_function_breakpoint("helper");

        ctx.line(2);
        ctx.call("helper", "main.as", 10);
        ctx.line(11);
        ctx.ret();
        ctx.line(3);
        ctx.call("helper", "main.as", 10);

        assert_eq!(*stops.lock(), vec![stop("helper", 10), stop("helper", 10)]);
    }

    #[test]
    fn test_line_breakpoint_fires_once_per_line() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 1);
        let (debugger, stops) = scripted(vec![]);
        debugger.hook_context(&ctx.as_context());
        debugger.toggle_line_breakpoint("main.as", 5);

        ctx.line(5);
        ctx.fire();
        ctx.fire();
        ctx.line(6);
        ctx.line(5);

        assert_eq!(stops.lock().len(), 2);
    }

    #[test]
    fn test_resume_discards_cache_and_watch() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 1);
        let hp = ctx.alloc_i32(30);
        ctx.add_local(0, Some("hp"), LocalKind::Variable, TypeId::INT32, Slot::Address(hp));

        let watched = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&watched);
        let backend = InlineBackend::new(move |debugger: &Debugger| {
            let count = debugger.with_cache(|cache| cache.watch().len()).unwrap_or_default();
            log.lock().push(count);
            debugger.with_cache(|cache| cache.watch_path(0, "hp").map(|_| ()));
            debugger.resume();
            assert!(debugger.with_cache(|_| ()).is_none());
        });
        let debugger = Debugger::new(Arc::new(backend));
        debugger.hook_context(&ctx.as_context());
        debugger.toggle_line_breakpoint("main.as", 2);

        ctx.line(2);
        ctx.line(3);
        ctx.line(2);

        assert_eq!(*watched.lock(), vec![0, 0]);
    }

    #[test]
    fn test_step_keeps_cache_and_watch() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 1);
        let slot = ctx.alloc_i32(1);
        ctx.add_local(0, Some("i"), LocalKind::Variable, TypeId::INT32, Slot::Address(slot));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let backend = InlineBackend::new(move |debugger: &Debugger| {
            let first = debugger.episodes() == 1;
            debugger.with_cache(|cache| {
                if first {
                    cache.watch_path(0, "i").expect("local is visible");
                }
                let view = cache.watch()[0].clone();
                log.lock().push((cache.state(view.state).value.display.clone(), cache.refreshes()));
            });
            if first {
                debugger.step_into();
            } else {
                debugger.resume();
            }
        });
        let debugger = Debugger::new(Arc::new(backend));
        debugger.hook_context(&ctx.as_context());
        debugger.toggle_line_breakpoint("main.as", 2);

        ctx.line(2);
        ctx.write(slot, &2i32.to_le_bytes());
        ctx.line(3);

        assert_eq!(*seen.lock(), vec![("1".to_string(), 0), ("2".to_string(), 1)]);
    }

    /// Gives the driver a window between the break and the runtime thread blocking.
    struct LateParking {
        inner: ThreadedBackend,
    }

    impl DebuggerBackend for LateParking {
        fn suspend(&self, debugger: &Debugger) {
            thread::sleep(Duration::from_millis(5));
            self.inner.suspend(debugger);
        }

        fn resume(&self) {
            self.inner.resume();
        }
    }

    #[test]
    fn test_resume_before_runtime_parks_is_kept() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 1);
        let backend = Arc::new(LateParking { inner: ThreadedBackend::new() });
        let debugger = Debugger::new(backend.clone());
        debugger.hook_context(&ctx.as_context());
        debugger.toggle_line_breakpoint("main.as", 2);

        let (done, finished) = mpsc::channel();
        let runtime_ctx = Arc::clone(&ctx);
        let runtime = thread::spawn(move || {
            runtime_ctx.line(2);
            runtime_ctx.line(3);
            done.send(()).unwrap();
        });

        while !debugger.is_suspended() {
            thread::yield_now();
        }
        debugger.resume();
        assert!(!debugger.is_suspended());

        assert!(finished.recv_timeout(Duration::from_secs(5)).is_ok(), "runtime stayed parked");
        runtime.join().unwrap();
        assert_eq!(debugger.status(), DebuggerStatus::Running);
        assert!(!backend.inner.is_suspended());
        assert_eq!(backend.inner.suspensions(), 1);
        assert_eq!(debugger.episodes(), 1);
    }

    #[test]
    #[should_panic(expected = "cannot resume while running")]
    fn test_second_resume_panics() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 1);
        let backend = InlineBackend::new(|debugger: &Debugger| {
            debugger.resume();
            debugger.resume();
        });
        let debugger = Debugger::new(Arc::new(backend));
        debugger.hook_context(&ctx.as_context());
        debugger.debug_break(&ctx.as_context());
    }

    #[test]
    fn test_has_work() {
        let debugger = Debugger::new(Arc::new(ThreadedBackend::new()));
        assert!(!debugger.has_work());
        assert!(debugger.toggle_line_breakpoint("main.as", 3));
        assert!(debugger.has_work());
        assert!(!debugger.toggle_line_breakpoint("main.as", 3));
        assert!(!debugger.has_work());
    }

    #[test]
    fn test_hooking_replaces_previous_context() {
        let first = MockContext::new();
        let second = MockContext::new();
        let debugger = Debugger::new(Arc::new(ThreadedBackend::new()));

        debugger.hook_context(&first.as_context());
        assert!(first.has_line_callback());
        debugger.hook_context(&second.as_context());
        assert!(!first.has_line_callback());
        assert!(second.has_line_callback());

        debugger.unhook_context();
        assert!(!second.has_line_callback());
        assert!(debugger.hooked_context().is_none());
    }

    #[test]
    fn test_drop_unhooks_context() {
        let ctx = MockContext::new();
        ctx.enter("main", "main.as", 1);
        let debugger = Debugger::new(Arc::new(ThreadedBackend::new()));
        debugger.hook_context(&ctx.as_context());
        assert!(ctx.has_line_callback());

        drop(debugger);
        assert!(!ctx.has_line_callback());
        ctx.line(2);
    }

    #[test]
    #[should_panic(expected = "cannot resume while running")]
    fn test_resume_while_running_panics() {
        Debugger::new(Arc::new(ThreadedBackend::new())).resume();
    }

    #[test]
    #[should_panic(expected = "cannot step while running")]
    fn test_step_while_running_panics() {
        Debugger::new(Arc::new(ThreadedBackend::new())).step_over();
    }

    #[test]
    #[should_panic(expected = "without a hooked context")]
    fn test_debug_break_requires_hook() {
        let ctx = MockContext::new();
        Debugger::new(Arc::new(ThreadedBackend::new())).debug_break(&ctx.as_context());
    }
}
