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

use anyhow::Result;
use beacon_core::{handlers, provides, topic, Bus};
use std::any::Any;
use std::cell::RefCell;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

thread_local! {
    static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(entry: impl Into<String>) {
    CALLS.with(|calls| calls.borrow_mut().push(entry.into()));
}

fn take_calls() -> Vec<String> {
    CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
}

// --- Static handlers, collected at link time ---

#[topic("static.ping", priority = 3)]
fn loud(_sender: &dyn Any, n: u32) {
    record(format!("loud {n}"));
}

#[topic("static.ping")]
#[topic("static.echo", 7)]
fn quiet(_sender: &dyn Any, n: u32) {
    record(format!("quiet {n}"));
}

#[topic("static.bare")]
fn bare() {
    record("bare");
}

#[provides("static.version", priority = 2)]
fn version(_requester: &dyn Any) -> &'static str {
    "1.0"
}

#[provides("static.version")]
fn fallback_version(_requester: &dyn Any) -> &'static str {
    "0.0"
}

// Lifecycle names never become topic handlers, even as free functions.
#[topic("static.lifecycle")]
fn update(_sender: &dyn Any) {
    record("update");
}

struct Clock;

#[handlers]
impl Clock {
    #[topic("static.clock")]
    fn tick(_sender: &dyn Any, frame: u64) {
        record(format!("tick {frame}"));
    }
}

#[test]
fn test_static_handlers_dispatch_by_priority() -> Result<()> {
    init_logger();
    let bus = Bus::default();
    assert!(bus.register_static_handlers() >= 7);
    take_calls();

    bus.publish("static.ping", &(), (4_u32,));
    bus.publish("static.echo", &(), (5_u32,));
    bus.publish("static.clock", &(), (60_u64,));

    assert_eq!(take_calls(), vec!["loud 4", "quiet 4", "quiet 5", "tick 60"]);
    Ok(())
}

#[test]
fn test_static_providers_answer_requests() -> Result<()> {
    init_logger();
    let bus = Bus::default();
    bus.register_static_handlers();

    assert!(bus.has_provider("static.version"));
    assert_eq!(
        bus.request_all::<&'static str>("static.version", &(), ()),
        vec!["1.0", "0.0"]
    );
    Ok(())
}

#[test]
fn test_static_handler_without_sender_is_skipped_at_dispatch() -> Result<()> {
    init_logger();
    let bus = Bus::default();
    bus.register_static_handlers();
    take_calls();

    bus.publish("static.bare", &(), ());

    assert!(take_calls().is_empty());
    assert_eq!(bus.stats().invalid_receivers, 1);
    Ok(())
}

#[test]
fn test_static_scan_is_idempotent() -> Result<()> {
    init_logger();
    let bus = Bus::default();
    bus.register_static_handlers();
    assert_eq!(bus.register_static_handlers(), 0);
    assert_eq!(bus.handler_count("static.ping"), 2);
    Ok(())
}

#[test]
fn test_static_handlers_are_per_bus() -> Result<()> {
    init_logger();
    let bus = Bus::default();
    assert!(!bus.has_subscribers("static.ping"));
    bus.register_static_handlers();
    assert!(bus.has_subscribers("static.ping"));
    Ok(())
}

#[test]
fn test_static_scan_skips_reserved_lifecycle_names() -> Result<()> {
    init_logger();
    let bus = Bus::default();
    bus.register_static_handlers();
    take_calls();

    assert!(!bus.has_subscribers("static.lifecycle"));
    bus.publish("static.lifecycle", &(), ());
    assert!(take_calls().is_empty());
    Ok(())
}
