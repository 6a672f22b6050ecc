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

//! End-to-end tests driving a debugger from a second thread
//!
//! The script runtime executes on its own thread and parks in a [`ThreadedBackend`] at
//! every break, while the test thread plays the role of a debugger front-end.

use std::{sync::Arc, time::Duration};

use sdb_common::types::{Breakpoint, ExpandKind, LocalKey, LocalKind};
use sdb_engine::{Debugger, DebuggerStatus, ThreadedBackend};
use sdb_integration_tests::test_utils::{
    game::{game_script, GAME_SECTION, UPDATE_LINE},
    init, spawn_runtime, BREAK_TIMEOUT,
};
use tracing::info;

fn threaded_debugger() -> (Arc<Debugger>, Arc<ThreadedBackend>) {
    let backend = Arc::new(ThreadedBackend::new());
    (Debugger::new(backend.clone()), backend)
}

#[test]
fn test_breakpoint_inspect_step_and_resume() {
    init::init_test_environment();
    let game = game_script();
    let (debugger, backend) = threaded_debugger();
    debugger.hook_context(&game.ctx.as_context());
    debugger.toggle_line_breakpoint(GAME_SECTION, UPDATE_LINE);

    let health = game.health;
    let runtime = spawn_runtime(&game.ctx, move |ctx| {
        ctx.line(11);
        ctx.line(UPDATE_LINE);
        ctx.call("heal", GAME_SECTION, 30);
        ctx.write(health, &150i32.to_le_bytes());
        ctx.line(31);
        ctx.ret();
        ctx.line(13);
        ctx.line(14);
        ctx.ret();
        ctx.line(4);
    });

    assert!(backend.wait_until_suspended(BREAK_TIMEOUT));
    assert_eq!(debugger.status(), DebuggerStatus::Suspended);
    info!("first break reached");

    debugger
        .with_cache(|cache| {
            let stack = cache.call_stack();
            assert_eq!(stack.len(), 2);
            assert_eq!(stack[0].declaration, "void update()");
            assert_eq!(stack[0].row, UPDATE_LINE);
            assert_eq!(stack[1].declaration, "void main()");
            assert_eq!(cache.sections().get(GAME_SECTION).map(String::as_str), Some("game.as"));

            let names: Vec<String> = cache.globals().iter().map(|v| v.name.clone()).collect();
            assert_eq!(names, vec!["hero", "game::difficulty"]);

            let params = cache.locals(LocalKey::new(0, LocalKind::Parameter)).to_vec();
            assert_eq!(params[0].name, "dt");
            assert_eq!(cache.state(params[0].state).value.display, "0.25");

            let watched = cache.watch_path(0, "player.health").unwrap();
            assert_eq!(cache.state(watched.state).value.display, "100");
        })
        .unwrap();

    debugger.step_over();
    assert!(backend.wait_until_suspended(BREAK_TIMEOUT));
    info!("second break reached");

    debugger
        .with_cache(|cache| {
            assert_eq!(cache.call_stack()[0].row, 13);
            assert_eq!(cache.refreshes(), 1);
            let watched = cache.watch()[0].clone();
            assert_eq!(watched.name, "player.health");
            assert_eq!(cache.state(watched.state).value.display, "150");
        })
        .unwrap();

    debugger.resume();
    runtime.join().unwrap();

    assert_eq!(debugger.status(), DebuggerStatus::Running);
    assert!(debugger.with_cache(|_| ()).is_none());
    assert_eq!(debugger.episodes(), 2);
    assert_eq!(backend.suspensions(), 2);
}

#[test]
fn test_value_tree_of_suspended_state() {
    init::init_test_environment();
    let game = game_script();
    let (debugger, backend) = threaded_debugger();
    debugger.hook_context(&game.ctx.as_context());
    debugger.toggle_line_breakpoint(GAME_SECTION, UPDATE_LINE);

    let runtime = spawn_runtime(&game.ctx, |ctx| ctx.line(UPDATE_LINE));
    assert!(backend.wait_until_suspended(BREAK_TIMEOUT));

    debugger
        .with_cache(|cache| {
            let hero = cache.globals()[0].clone();
            assert_eq!(cache.state(hero.state).value.display, "{Player}");
            cache.expand(hero.state);

            let children = cache.state(hero.state).children.clone();
            let rendered: Vec<(String, String)> = children
                .iter()
                .map(|child| (child.name.clone(), cache.state(child.state).value.display.clone()))
                .collect();
            assert_eq!(
                rendered,
                vec![
                    ("health".to_string(), "100".to_string()),
                    ("position".to_string(), "{Vec2}".to_string()),
                    ("element".to_string(), "Fire | Poison".to_string()),
                    ("items".to_string(), "{Inventory}".to_string()),
                ]
            );

            let items = &children[3];
            assert_eq!(cache.state(items.state).value.expand, ExpandKind::Entries);
            cache.expand(items.state);
            let entries: Vec<String> =
                cache.state(items.state).entries.iter().map(|entry| entry.display()).collect();
            assert_eq!(entries, vec!["[0] 0, 10", "[1] 1, 20"]);

            // The local handle and the global alias the same object.
            let player = cache.locals(LocalKey::new(0, LocalKind::Variable))[0].clone();
            assert!(cache.state(player.state).value.disabled);
            cache.expand(player.state);
            let via_handle = cache.state(player.state).children[0].clone();
            assert_eq!(via_handle.state, children[0].state);

            let snapshot = cache.snapshot().to_json().unwrap();
            assert!(snapshot.contains("Fire | Poison"));
            assert!(snapshot.contains("game::difficulty"));
        })
        .unwrap();

    debugger.resume();
    runtime.join().unwrap();
}

#[test]
fn test_step_out_of_function_breakpoint() {
    init::init_test_environment();
    let game = game_script();
    let (debugger, backend) = threaded_debugger();
    debugger.hook_context(&game.ctx.as_context());
    assert!(debugger.add_breakpoint("heal".parse::<Breakpoint>().unwrap()));

    let runtime = spawn_runtime(&game.ctx, |ctx| {
        ctx.line(11);
        ctx.call("heal", GAME_SECTION, 30);
        ctx.line(31);
        ctx.ret();
        ctx.line(12);
    });

    assert!(backend.wait_until_suspended(BREAK_TIMEOUT));
    let top = debugger.with_cache(|cache| cache.call_stack()[0].clone()).unwrap();
    assert_eq!((top.declaration.as_str(), top.row), ("void heal()", 30));

    debugger.step_out();
    assert!(backend.wait_until_suspended(BREAK_TIMEOUT));
    let top = debugger.with_cache(|cache| cache.call_stack()[0].clone()).unwrap();
    assert_eq!((top.declaration.as_str(), top.row), ("void update()", 12));

    debugger.resume();
    runtime.join().unwrap();
    assert_eq!(debugger.episodes(), 2);
}

#[test]
fn test_runs_to_completion_without_breakpoints() {
    init::init_test_environment();
    let game = game_script();
    let (debugger, backend) = threaded_debugger();
    debugger.hook_context(&game.ctx.as_context());
    assert!(!debugger.has_work());

    let runtime = spawn_runtime(&game.ctx, |ctx| {
        for line in 11..=20 {
            ctx.line(line);
        }
    });
    runtime.join().unwrap();

    assert!(!backend.wait_until_suspended(Duration::from_millis(50)));
    assert_eq!(debugger.episodes(), 0);
}
