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
use beacon_core::Bus;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_worker_threads_publish_through_the_relay() -> Result<()> {
    init_logger();
    let bus = Bus::default();
    let loaded = Rc::new(RefCell::new(Vec::new()));
    let sink = loaded.clone();
    bus.subscribe("asset.loaded", 1, move |_s: &dyn Any, id: usize| {
        sink.borrow_mut().push(id);
    })?;

    let handle = bus.relay_handle();
    std::thread::scope(|scope| {
        for id in 0..4 {
            let handle = handle.clone();
            scope.spawn(move || {
                handle.enqueue(move |bus: &Bus| bus.publish("asset.loaded", &(), (id,)));
            });
        }
    });

    // Nothing runs before the owning thread drains.
    assert!(loaded.borrow().is_empty());
    assert_eq!(bus.drain_tick(), 4);

    let mut ids = loaded.borrow().clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn test_jobs_enqueued_while_draining_wait_for_next_tick() -> Result<()> {
    init_logger();
    let bus = Bus::default();
    let runs = Arc::new(AtomicUsize::new(0));

    let handle = bus.relay_handle();
    let counter = runs.clone();
    bus.relay().enqueue(move |_bus: &Bus| {
        counter.fetch_add(1, Ordering::SeqCst);
        let counter = counter.clone();
        handle.enqueue(move |_bus: &Bus| {
            counter.fetch_add(10, Ordering::SeqCst);
        });
    });

    assert_eq!(bus.drain_tick(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(bus.relay().pending(), 1);

    assert_eq!(bus.drain_tick(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 11);
    Ok(())
}
