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

//! Test utilities for integration tests

use std::{sync::Arc, thread, time::Duration};

use sdb_engine::test_utils::MockContext;

/// How long a driver waits for the runtime thread to reach a break.
pub const BREAK_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging for a test binary
    pub fn init_test_environment() {
        sdb_utils::logging::ensure_test_logging(None);
    }
}

/// A small game script used by most scenarios
pub mod game {
    use std::sync::Arc;

    use sdb_common::types::{LocalKind, RawAddress, TypeId};
    use sdb_engine::{
        context::{IteratedValue, PropertyInfo, Slot},
        test_utils::MockContext,
    };

    /// Section holding the entry point.
    pub const MAIN_SECTION: &str = "scripts/main.as";
    /// Section holding the game logic.
    pub const GAME_SECTION: &str = "scripts/game.as";

    /// Line of `update` where the player's health is read.
    pub const UPDATE_LINE: u32 = 12;

    /// Handles into the runtime state of the game script.
    #[derive(Debug, Clone)]
    pub struct GameScript {
        /// The runtime.
        pub ctx: Arc<MockContext>,
        /// The `Player` object.
        pub player: RawAddress,
        /// The `health` property of the player.
        pub health: RawAddress,
        /// Type id of `Player`.
        pub player_type: TypeId,
        /// Type id of `Element`.
        pub element_type: TypeId,
    }

    /// Builds the runtime suspended inside `update`, called from `main`.
    ///
    /// ```text
    /// enum Element { Fire = 1, Ice = 2, Poison = 4 }   // flags
    /// class Vec2 { float x; float y; }
    /// class Player { int health; Vec2 position; Element element; Inventory@ items; }
    /// Player hero;                  // global
    /// namespace game { int difficulty; }
    /// void update(float dt) { Player@ player = hero; int score; ... }
    /// ```
    pub fn game_script() -> GameScript {
        let ctx = MockContext::new();

        let element_type =
            ctx.define_enum("Element", &[("Fire", 1), ("Ice", 2), ("Poison", 4)], true);
        let vec2 = ctx.define_object(
            "Vec2",
            8,
            vec![
                PropertyInfo::value("x", TypeId::FLOAT, 0),
                PropertyInfo::value("y", TypeId::FLOAT, 4),
            ],
            false,
        );
        let inventory = ctx.define_object("Inventory", 8, vec![], true);
        let player_type = ctx.define_object(
            "Player",
            24,
            vec![
                PropertyInfo::value("health", TypeId::INT32, 0),
                PropertyInfo::value("position", vec2, 4),
                PropertyInfo::value("element", element_type, 12),
                PropertyInfo::reference("items", inventory, 16),
            ],
            false,
        );

        let items = ctx.alloc(&[0; 8]);
        ctx.set_iteration(
            items,
            (0..2)
                .map(|slot: i32| {
                    vec![
                        IteratedValue {
                            type_id: TypeId::INT32,
                            slot: Slot::Temporary(slot.to_le_bytes().to_vec()),
                        },
                        IteratedValue {
                            type_id: TypeId::INT32,
                            slot: Slot::Address(ctx.alloc_i32(10 * (slot + 1))),
                        },
                    ]
                })
                .collect(),
        );

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100i32.to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.0f32).to_le_bytes());
        bytes.extend_from_slice(&(1i32 | 4).to_le_bytes());
        bytes.extend_from_slice(&items.get().to_le_bytes());
        let player = ctx.alloc(&bytes);

        ctx.add_global("hero", player_type, player);
        ctx.add_namespaced_global("game", "difficulty", TypeId::INT32, ctx.alloc_i32(3));

        ctx.enter("main", MAIN_SECTION, 3);
        ctx.enter("update", GAME_SECTION, 10);
        let dt = Slot::Address(ctx.alloc(&0.25f32.to_le_bytes()));
        ctx.add_local(0, Some("dt"), LocalKind::Parameter, TypeId::FLOAT, dt);
        let handle = TypeId(player_type.0 | TypeId::OBJECT_HANDLE);
        let player_handle = Slot::Address(ctx.alloc_pointer(player));
        let score = Slot::Address(ctx.alloc_i32(0));
        ctx.add_local(0, Some("player"), LocalKind::Variable, handle, player_handle);
        ctx.add_local(0, Some("score"), LocalKind::Variable, TypeId::INT32, score);

        GameScript { ctx, player, health: player, player_type, element_type }
    }
}

/// Runs `program` against `ctx` on a separate runtime thread.
pub fn spawn_runtime<F>(ctx: &Arc<MockContext>, program: F) -> thread::JoinHandle<()>
where
    F: FnOnce(&Arc<MockContext>) + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    thread::Builder::new()
        .name("script-runtime".to_string())
        .spawn(move || program(&ctx))
        .expect("failed to spawn runtime thread")
}
