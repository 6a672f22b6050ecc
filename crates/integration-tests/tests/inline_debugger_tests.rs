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

//! End-to-end tests of the single-threaded model, where the host keeps running its
//! debugger front-end from inside the break on the runtime thread.

use std::sync::Arc;

use parking_lot::Mutex;
use sdb_engine::{
    ContainerEvaluator, Debugger, DebuggerConfig, EvaluatorRegistry, InlineBackend,
    StaticSections,
};
use sdb_integration_tests::test_utils::{
    game::{game_script, GAME_SECTION, MAIN_SECTION, UPDATE_LINE},
    init,
};

#[test]
fn test_inline_driver_steps_through_calls() {
    init::init_test_environment();
    let game = game_script();

    let trace = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&trace);
    let backend = InlineBackend::new(move |debugger: &Debugger| {
        let (function, line) = debugger
            .with_cache(|cache| {
                let top = &cache.call_stack()[0];
                (top.declaration.clone(), top.row)
            })
            .unwrap();
        let mut log = log.lock();
        log.push(format!("{function}:{line}"));
        if log.len() < 4 {
            debugger.step_into();
        } else {
            debugger.resume();
        }
    });
    let backend = Arc::new(backend);
    let debugger = Debugger::new(backend.clone());
    debugger.hook_context(&game.ctx.as_context());
    debugger.toggle_line_breakpoint(GAME_SECTION, UPDATE_LINE);

    let ctx = &game.ctx;
    ctx.line(UPDATE_LINE);
    ctx.call("heal", GAME_SECTION, 30);
    ctx.line(31);
    ctx.ret();
    ctx.line(13);
    ctx.line(14);

    assert_eq!(
        *trace.lock(),
        vec!["void update():12", "void heal():30", "void heal():31", "void update():13"]
    );
    assert_eq!(backend.frames(), 4);
    assert_eq!(debugger.episodes(), 4);
}

#[test]
fn test_inline_driver_with_custom_evaluators() {
    init::init_test_environment();
    let game = game_script();

    let mut registry = EvaluatorRegistry::new();
    let inventory = ContainerEvaluator::column(1);
    assert!(registry.register_by_name(game.ctx.as_ref(), "Inventory", inventory));
    let config = DebuggerConfig::default().with_max_entries(1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let backend = InlineBackend::new(move |debugger: &Debugger| {
        debugger.with_cache(|cache| {
            let items = cache.resolve_path(0, "hero.items").unwrap();
            cache.expand(items.state);
            let entries: Vec<String> =
                cache.state(items.state).entries.iter().map(|entry| entry.display()).collect();
            log.lock().push(entries);

            let sections: Vec<String> = cache.sections().values().cloned().collect();
            log.lock().push(sections);
        });
        debugger.resume();
    });
    let debugger = Debugger::builder(Arc::new(backend))
        .registry(registry)
        .config(config)
        .sections(StaticSections(vec![MAIN_SECTION.to_string()]))
        .build();
    debugger.hook_context(&game.ctx.as_context());
    debugger.toggle_line_breakpoint(GAME_SECTION, UPDATE_LINE);

    game.ctx.line(UPDATE_LINE);

    let seen = seen.lock();
    assert_eq!(seen[0], vec!["10", "..."]);
    assert_eq!(seen[1], vec!["game.as", "main.as"]);
}
