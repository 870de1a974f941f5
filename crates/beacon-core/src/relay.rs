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

//! Cross-thread hand-off to the thread that owns the bus.
//!
//! The bus itself is single-threaded. Work produced elsewhere (background
//! loads, network completions) is queued through a [`RelayHandle`] and run by
//! the owning thread once per tick with [`MainThreadRelay::drain_tick`].

use crate::error::DispatchFault;
use crate::Bus;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// A unit of work to run on the owning thread.
pub type Job = Box<dyn FnOnce(&Bus) + Send + 'static>;

/// Producer side of the relay. Cheap to clone and usable from any thread.
#[derive(Clone)]
pub struct RelayHandle {
    sender: Sender<Job>,
}

impl RelayHandle {
    /// Queues `job` for the next tick of the owning thread.
    ///
    /// Returns `false` if the relay has been dropped, in which case the job
    /// is discarded.
    pub fn enqueue<F>(&self, job: F) -> bool
    where
        F: FnOnce(&Bus) + Send + 'static,
    {
        match self.sender.send(Box::new(job)) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("MainThreadRelay: job dropped, the relay is gone");
                false
            }
        }
    }
}

impl std::fmt::Debug for RelayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHandle")
            .field("pending", &self.sender.len())
            .finish()
    }
}

/// Consumer side of the relay, pinned to the thread that created it.
///
/// The queue is an unbounded lock-free channel. Jobs run in the order they
/// were queued.
pub struct MainThreadRelay {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    _not_send: PhantomData<Rc<()>>,
}

impl MainThreadRelay {
    /// Creates an empty relay.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            _not_send: PhantomData,
        }
    }

    /// A producer handle for other threads.
    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            sender: self.sender.clone(),
        }
    }

    /// Queues `job` from the owning thread.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce(&Bus) + Send + 'static,
    {
        // The relay owns a receiver, so sending cannot fail here.
        let _ = self.sender.send(Box::new(job));
    }

    /// Number of jobs waiting.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Runs the jobs that were queued when the call started.
    ///
    /// Jobs queued while draining, whether by a running job or by another
    /// thread, wait for the next tick. A panicking job is logged and the
    /// drain carries on. Returns the number of jobs run.
    pub fn drain_tick(&self, bus: &Bus) -> usize {
        let batch = self.receiver.len();
        let mut ran = 0;
        for _ in 0..batch {
            let job = match self.receiver.try_recv() {
                Ok(job) => job,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(bus))) {
                log::error!(
                    "MainThreadRelay: job panicked: {}",
                    DispatchFault::from_panic(payload)
                );
            }
            ran += 1;
        }
        if ran > 0 {
            log::trace!("MainThreadRelay: ran {ran} job(s), {} deferred", self.pending());
        }
        ran
    }

    /// Discards every queued job, returning how many were dropped.
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

impl Default for MainThreadRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn drains_everything_queued_before_the_tick() {
        let bus = Bus::default();
        let relay = MainThreadRelay::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            relay.enqueue(move |_| log.lock().unwrap().push(i));
        }

        assert_eq!(relay.pending(), 3);
        assert_eq!(relay.drain_tick(&bus), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(relay.pending(), 0);
    }

    #[test]
    fn jobs_queued_during_a_drain_wait_for_the_next_tick() {
        let bus = Bus::default();
        let relay = MainThreadRelay::new();
        let handle = relay.handle();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        relay.enqueue(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let counter = Arc::clone(&counter);
            handle.enqueue(move |_| {
                counter.fetch_add(10, Ordering::SeqCst);
            });
        });

        assert_eq!(relay.drain_tick(&bus), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(relay.pending(), 1);

        assert_eq!(relay.drain_tick(&bus), 1);
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn accepts_jobs_from_other_threads() {
        let bus = Bus::default();
        let relay = MainThreadRelay::new();
        let count = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let handle = relay.handle();
                let count = Arc::clone(&count);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let count = Arc::clone(&count);
                        assert!(handle.enqueue(move |_| {
                            count.fetch_add(1, Ordering::SeqCst);
                        }));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker thread panicked");
        }

        assert_eq!(relay.drain_tick(&bus), 100);
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn panicking_job_does_not_stop_the_batch() {
        let bus = Bus::default();
        let relay = MainThreadRelay::new();
        let count = Arc::new(AtomicUsize::new(0));

        relay.enqueue(|_| panic!("bad job"));
        let counter = Arc::clone(&count);
        relay.enqueue(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(relay.drain_tick(&bus), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_reports_dropped_relay() {
        let relay = MainThreadRelay::new();
        let handle = relay.handle();
        drop(relay);
        assert!(!handle.enqueue(|_| {}));
    }

    #[test]
    fn empty_tick_is_a_no_op() {
        let bus = Bus::default();
        let relay = MainThreadRelay::new();
        assert_eq!(relay.drain_tick(&bus), 0);
    }
}
