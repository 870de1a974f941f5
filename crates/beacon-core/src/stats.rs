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

//! Dispatch counters.

use crate::error::DispatchFault;
use std::cell::Cell;

/// A snapshot of the bus's dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Number of `publish` calls.
    pub publishes: u64,
    /// Number of `request` / `request_all` calls.
    pub requests: u64,
    /// Handler invocations that completed without fault.
    pub invocations: u64,
    /// Provider replies accepted into a result list.
    pub replies: u64,
    /// Handlers skipped because they take no sender.
    pub invalid_receivers: u64,
    /// Handlers skipped because a parameter could not be bound.
    pub unresolved: u64,
    /// Instance handlers skipped because their owner is gone.
    pub dead_owners: u64,
    /// Handlers that returned an error or panicked.
    pub failures: u64,
    /// Provider replies dropped for having the wrong type.
    pub unexpected_replies: u64,
}

impl DispatchStats {
    /// Total number of handler-level faults.
    pub fn faults(&self) -> u64 {
        self.invalid_receivers
            + self.unresolved
            + self.dead_owners
            + self.failures
            + self.unexpected_replies
    }

    fn count(&mut self, fault: &DispatchFault) {
        match fault {
            DispatchFault::InvalidReceiver => self.invalid_receivers += 1,
            DispatchFault::Unresolved { .. } => self.unresolved += 1,
            DispatchFault::DeadOwner { .. } => self.dead_owners += 1,
            DispatchFault::Failed(_) | DispatchFault::Panicked(_) => self.failures += 1,
            DispatchFault::UnexpectedReply { .. } => self.unexpected_replies += 1,
        }
    }
}

/// Interior-mutable counters owned by the bus.
#[derive(Debug, Default)]
pub(crate) struct StatsCell(Cell<DispatchStats>);

impl StatsCell {
    pub(crate) fn snapshot(&self) -> DispatchStats {
        self.0.get()
    }

    pub(crate) fn reset(&self) {
        self.0.set(DispatchStats::default());
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut DispatchStats)) {
        let mut stats = self.0.get();
        f(&mut stats);
        self.0.set(stats);
    }

    pub(crate) fn fault(&self, fault: &DispatchFault) {
        self.update(|stats| stats.count(fault));
    }
}
