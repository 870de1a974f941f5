// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small arcade loop wired through the bus.
//!
//! Game state publishes score changes, the HUD and achievements listen,
//! stat modifiers are gathered by request, and background loaders running on
//! a tokio runtime hand their results back through the main-thread relay.

use anyhow::Result;
use beacon_core::{handlers, provides, topic, Bus, BusConfig};
use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const LEVELS: [&str; 3] = ["meadow", "caves", "castle"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stat {
    Strength,
    Speed,
}

/// The player, and the sender of every score event.
struct Player {
    name: &'static str,
    score: Cell<i32>,
}

impl Player {
    fn add_points(&self, bus: &Bus, points: i32) {
        let score = self.score.get() + points;
        self.score.set(score);
        bus.publish("score.changed", self, (score, points));
    }

    fn stat(&self, bus: &Bus, stat: Stat) -> i32 {
        let base = 10;
        base + bus
            .request_all::<i32>("stat.modifiers", self, (stat,))
            .into_iter()
            .sum::<i32>()
    }
}

struct Hud {
    shown: Cell<i32>,
}

#[handlers]
impl Hud {
    #[topic("score.changed", priority = 5)]
    fn on_score(&self, sender: &dyn Any, score: i32) {
        self.shown.set(score);
        if let Some(player) = sender.downcast_ref::<Player>() {
            log::info!("HUD: {} has {score} points", player.name);
        }
    }

    #[topic("level.loaded")]
    fn on_level(&self, _sender: &dyn Any, level: &'static str) {
        log::info!("HUD: entering {level}");
    }
}

struct Achievements {
    unlocked: Cell<bool>,
}

#[handlers]
impl Achievements {
    #[topic("score.changed")]
    fn on_score(&self, _sender: &dyn Any, score: i32) {
        if score >= 100 && !self.unlocked.replace(true) {
            log::info!("Achievement unlocked: centurion");
        }
    }
}

struct Boots {
    bonus: i32,
}

#[handlers]
impl Boots {
    #[provides("stat.modifiers", priority = 2)]
    fn modifier(&self, _requester: &dyn Any, stat: Stat) -> Option<i32> {
        (stat == Stat::Speed).then_some(self.bonus)
    }
}

#[provides("stat.modifiers")]
fn training(_requester: &dyn Any, _stat: Stat) -> i32 {
    1
}

#[topic("score.changed", priority = -1)]
fn audit(_sender: &dyn Any, score: i32, points: i32) {
    log::debug!("audit: +{points} -> {score}");
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let bus = Bus::new(BusConfig::default());
    bus.register_static_handlers();

    let hud = Rc::new(Hud {
        shown: Cell::new(0),
    });
    let achievements = Rc::new(Achievements {
        unlocked: Cell::new(false),
    });
    let boots = Rc::new(Boots { bonus: 3 });
    let _hud = bus.register_instance(&hud);
    let _achievements = bus.register_instance(&achievements);
    let boots_registration = bus.register_instance(&boots);

    // Background loaders: each finishes on a worker thread and relays the
    // announcement to the thread that owns the bus.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()?;
    for (index, level) in LEVELS.into_iter().enumerate() {
        let relay = bus.relay_handle();
        runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20 * (index as u64 + 1))).await;
            relay.enqueue(move |bus: &Bus| bus.publish("level.loaded", &(), (level,)));
        });
    }

    let player = Player {
        name: "ada",
        score: Cell::new(0),
    };
    log::info!(
        "{}: strength {}, speed {}",
        player.name,
        player.stat(&bus, Stat::Strength),
        player.stat(&bus, Stat::Speed)
    );

    let mut levels_seen = 0;
    for frame in 0..30 {
        levels_seen += bus.drain_tick();
        if frame % 3 == 0 {
            player.add_points(&bus, 15);
        }
        if levels_seen == LEVELS.len() && frame >= 10 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    // Unequipping drops the boots' modifier.
    boots_registration.release();
    log::info!("{}: speed without boots {}", player.name, player.stat(&bus, Stat::Speed));

    log::info!(
        "HUD shows {} points; {:?}",
        hud.shown.get(),
        bus.stats()
    );
    runtime.shutdown_timeout(Duration::from_millis(100));
    bus.shutdown();
    Ok(())
}
