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

//! The handler registry.
//!
//! Records are grouped per kind and key, and each group is kept sorted by
//! priority (highest first) as records are inserted. Records of equal
//! priority stay in registration order. Lookups hand out a snapshot so a
//! dispatch in progress is unaffected by registrations it triggers.

use crate::config::BusConfig;
use crate::error::RegistrationError;
use crate::handler::{Handler, HandlerKind};
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Identity of a registered owner instance.
///
/// Derived from the address of the owner's allocation, so two owners compare
/// equal only if they are the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(usize);

impl OwnerId {
    /// The identity of `owner`.
    pub fn of<T: ?Sized>(owner: &Rc<T>) -> Self {
        OwnerId(Rc::as_ptr(owner) as *const () as usize)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A non-owning link from a record to the instance it belongs to.
#[derive(Clone)]
pub(crate) struct OwnerSlot {
    id: OwnerId,
    type_name: &'static str,
    instance: Weak<dyn Any>,
}

impl OwnerSlot {
    pub(crate) fn new<T: 'static>(owner: &Rc<T>) -> Self {
        let weak: Weak<T> = Rc::downgrade(owner);
        Self {
            id: OwnerId::of(owner),
            type_name: std::any::type_name::<T>(),
            instance: weak,
        }
    }

    pub(crate) fn id(&self) -> OwnerId {
        self.id
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn upgrade(&self) -> Option<Rc<dyn Any>> {
        self.instance.upgrade()
    }
}

/// One registered handler.
pub struct HandlerRecord {
    owner: Option<OwnerSlot>,
    kind: HandlerKind,
    key: Cow<'static, str>,
    priority: i32,
    name: Cow<'static, str>,
    handler: Handler,
}

impl HandlerRecord {
    pub(crate) fn new(
        owner: Option<OwnerSlot>,
        kind: HandlerKind,
        key: impl Into<Cow<'static, str>>,
        priority: i32,
        name: impl Into<Cow<'static, str>>,
        handler: Handler,
    ) -> Self {
        Self {
            owner,
            kind,
            key: key.into(),
            priority,
            name: name.into(),
            handler,
        }
    }

    /// The owner's identity, or `None` for static and free handlers.
    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner.as_ref().map(OwnerSlot::id)
    }

    /// Topic handler or request provider.
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Topic name or request type.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Dispatch priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Identity used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The erased callable.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub(crate) fn owner(&self) -> Option<&OwnerSlot> {
        self.owner.as_ref()
    }

    /// Owner description for diagnostics.
    pub(crate) fn owner_label(&self) -> String {
        match &self.owner {
            Some(slot) => format!("{}@{}", slot.type_name(), slot.id()),
            None => "static".to_string(),
        }
    }
}

impl fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("name", &self.name)
            .field("owner", &self.owner_id())
            .finish()
    }
}

/// Checks a declaration against the registration rules.
pub(crate) fn validate(
    kind: HandlerKind,
    key: &str,
    name: &str,
    handler: &Handler,
    config: &BusConfig,
) -> Result<(), RegistrationError> {
    let owned = || name.to_string();
    if key.is_empty() {
        return Err(RegistrationError::EmptyKey { name: owned() });
    }
    if !handler.takes_sender() {
        return Err(RegistrationError::MissingSender { name: owned() });
    }
    if let Some(position) = handler.misplaced_rest() {
        return Err(RegistrationError::MisplacedRest {
            name: owned(),
            position,
        });
    }
    match kind {
        HandlerKind::Topic if config.is_reserved(name) => {
            Err(RegistrationError::ReservedName { name: owned() })
        }
        HandlerKind::Provider if handler.returns().map_or(true, |r| r.is_void()) => {
            Err(RegistrationError::VoidProvider { name: owned() })
        }
        _ => Ok(()),
    }
}

type Table = HashMap<String, Vec<Rc<HandlerRecord>>>;

/// The authoritative set of handler records.
#[derive(Default)]
pub struct Registry {
    topics: Table,
    providers: Table,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: HandlerKind) -> &Table {
        match kind {
            HandlerKind::Topic => &self.topics,
            HandlerKind::Provider => &self.providers,
        }
    }

    fn table_mut(&mut self, kind: HandlerKind) -> &mut Table {
        match kind {
            HandlerKind::Topic => &mut self.topics,
            HandlerKind::Provider => &mut self.providers,
        }
    }

    /// Inserts a record after every record of greater or equal priority.
    ///
    /// Records with an empty key are ignored.
    pub fn insert(&mut self, record: HandlerRecord) {
        if record.key.is_empty() {
            log::warn!("Registry: ignoring '{}' with an empty key", record.name);
            return;
        }
        log::debug!(
            "Registry: {} '{}' -> {} (priority={}, owner={})",
            record.kind,
            record.key,
            record.name,
            record.priority,
            record.owner_label()
        );
        let group = self
            .table_mut(record.kind)
            .entry(record.key.to_string())
            .or_default();
        let at = group.partition_point(|existing| existing.priority >= record.priority);
        group.insert(at, Rc::new(record));
    }

    /// All records for `key`, highest priority first.
    pub fn lookup(&self, kind: HandlerKind, key: &str) -> Vec<Rc<HandlerRecord>> {
        self.table(kind).get(key).cloned().unwrap_or_default()
    }

    /// Returns `true` if at least one record exists for `key`.
    pub fn contains(&self, kind: HandlerKind, key: &str) -> bool {
        self.table(kind).get(key).is_some_and(|group| !group.is_empty())
    }

    /// Number of records for `key`.
    pub fn count(&self, kind: HandlerKind, key: &str) -> usize {
        self.table(kind).get(key).map_or(0, Vec::len)
    }

    /// Every key with at least one record, sorted.
    pub fn keys(&self, kind: HandlerKind) -> Vec<String> {
        let mut keys: Vec<String> = self.table(kind).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.topics.values().chain(self.providers.values()).map(Vec::len).sum()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every record owned by `owner`.
    ///
    /// The removed records are returned rather than dropped so the caller can
    /// release them once the registry is no longer borrowed.
    pub fn remove_owner(&mut self, owner: OwnerId) -> Vec<Rc<HandlerRecord>> {
        let mut removed = Vec::new();
        for table in [&mut self.topics, &mut self.providers] {
            for group in table.values_mut() {
                let (gone, kept): (Vec<_>, Vec<_>) = group
                    .drain(..)
                    .partition(|record| record.owner_id() == Some(owner));
                *group = kept;
                removed.extend(gone);
            }
            table.retain(|_, group| !group.is_empty());
        }
        removed
    }

    /// Drops every record.
    pub fn clear(&mut self) -> Vec<Rc<HandlerRecord>> {
        self.topics
            .drain()
            .chain(self.providers.drain())
            .flat_map(|(_, group)| group)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &'static str, priority: i32, name: &'static str) -> HandlerRecord {
        HandlerRecord::new(
            None,
            HandlerKind::Topic,
            key,
            priority,
            name,
            Handler::topic(|_s: &dyn Any| {}),
        )
    }

    fn names(records: &[Rc<HandlerRecord>]) -> Vec<&str> {
        records.iter().map(|r| r.name()).collect()
    }

    #[test]
    fn lookup_orders_by_priority_then_registration() {
        let mut registry = Registry::new();
        registry.insert(record("t", 1, "low-a"));
        registry.insert(record("t", 10, "high"));
        registry.insert(record("t", 1, "low-b"));
        registry.insert(record("t", 5, "mid"));
        registry.insert(record("t", -3, "negative"));

        let found = registry.lookup(HandlerKind::Topic, "t");
        assert_eq!(names(&found), vec!["high", "mid", "low-a", "low-b", "negative"]);
    }

    #[test]
    fn kinds_do_not_mix() {
        let mut registry = Registry::new();
        registry.insert(record("shared", 1, "topic"));
        assert!(registry.contains(HandlerKind::Topic, "shared"));
        assert!(!registry.contains(HandlerKind::Provider, "shared"));
        assert!(registry.lookup(HandlerKind::Provider, "shared").is_empty());
    }

    #[test]
    fn empty_keys_are_never_stored() {
        let mut registry = Registry::new();
        registry.insert(record("", 1, "nameless"));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_owner_is_by_identity() {
        struct Widget;
        let a = Rc::new(Widget);
        let b = Rc::new(Widget);

        let mut registry = Registry::new();
        for (owner, name) in [(&a, "a"), (&b, "b")] {
            registry.insert(HandlerRecord::new(
                Some(OwnerSlot::new(owner)),
                HandlerKind::Topic,
                "t",
                1,
                name,
                Handler::topic(|_s: &dyn Any| {}),
            ));
        }
        registry.insert(record("other", 1, "static"));

        let removed = registry.remove_owner(OwnerId::of(&a));
        assert_eq!(removed.len(), 1);
        assert_eq!(names(&registry.lookup(HandlerKind::Topic, "t")), vec!["b"]);
        assert_eq!(registry.len(), 2);

        registry.remove_owner(OwnerId::of(&b));
        assert!(!registry.contains(HandlerKind::Topic, "t"));
        assert_eq!(registry.keys(HandlerKind::Topic), vec!["other".to_string()]);
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let mut registry = Registry::new();
        registry.insert(record("t", 1, "first"));
        let snapshot = registry.lookup(HandlerKind::Topic, "t");
        registry.insert(record("t", 9, "late"));
        assert_eq!(names(&snapshot), vec!["first"]);
        assert_eq!(registry.count(HandlerKind::Topic, "t"), 2);
    }

    #[test]
    fn validation_rules() {
        let config = BusConfig::default();
        let ok = Handler::topic(|_s: &dyn Any, _n: i32| {});
        assert!(validate(HandlerKind::Topic, "t", "X::on_t", &ok, &config).is_ok());

        assert!(matches!(
            validate(HandlerKind::Topic, "", "X::on_t", &ok, &config),
            Err(RegistrationError::EmptyKey { .. })
        ));
        assert!(matches!(
            validate(HandlerKind::Topic, "t", "X::update", &ok, &config),
            Err(RegistrationError::ReservedName { .. })
        ));

        let no_sender = Handler::topic(|| {});
        assert!(matches!(
            validate(HandlerKind::Topic, "t", "X::f", &no_sender, &config),
            Err(RegistrationError::MissingSender { .. })
        ));

        let void = Handler::provider(|_r: &dyn Any| {});
        assert!(matches!(
            validate(HandlerKind::Provider, "r", "X::f", &void, &config),
            Err(RegistrationError::VoidProvider { .. })
        ));

        let provider_named_update = Handler::provider(|_r: &dyn Any| 1_u8);
        assert!(validate(HandlerKind::Provider, "r", "X::update", &provider_named_update, &config).is_ok());
    }
}
