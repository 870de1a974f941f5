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

//! The topic and request dispatchers.
//!
//! [`Bus`] owns the [`Registry`], the declared type relations, the dispatch
//! counters and the [`MainThreadRelay`]. It is built once by the application,
//! passed to whatever needs to publish or subscribe, and lives on a single
//! thread. Both dispatch flavors share one algorithm: snapshot the records for
//! the key (already in priority order), then for each record check its shape,
//! bind the payload to its parameters and invoke it inside a failure boundary.

use crate::config::BusConfig;
use crate::declare::{Handlers, StaticHandler};
use crate::error::{DispatchFault, RegistrationError};
use crate::handler::{HandlerKind, IntoProvider, IntoTopicHandler};
use crate::payload::{Arg, IntoPayload, Payload};
use crate::registry::{self, HandlerRecord, OwnerId, OwnerSlot, Registry};
use crate::relations::TypeRelations;
use crate::relay::{MainThreadRelay, RelayHandle};
use crate::resolve;
use crate::stats::{DispatchStats, StatsCell};
use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// The in-process topic and request bus.
///
/// All methods take `&self`, so handlers may publish, request, register or
/// unregister while a dispatch is running. A dispatch always works on the
/// record list as it was when the call started; changes apply to later calls.
pub struct Bus {
    config: BusConfig,
    registry: Rc<RefCell<Registry>>,
    relations: RefCell<Rc<TypeRelations>>,
    stats: StatsCell,
    statics_loaded: Cell<bool>,
    relay: MainThreadRelay,
}

impl Bus {
    /// Creates an empty bus.
    pub fn new(config: BusConfig) -> Self {
        log::info!("Bus initialized.");
        Self {
            config,
            registry: Rc::new(RefCell::new(Registry::new())),
            relations: RefCell::new(Rc::new(TypeRelations::new())),
            stats: StatsCell::default(),
            statics_loaded: Cell::new(false),
            relay: MainThreadRelay::new(),
        }
    }

    /// The configuration this bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    // --- Registration ---

    /// Registers every handler collected at link time with `#[topic]` or
    /// `#[provides]` (or submitted by hand as a [`StaticHandler`]).
    ///
    /// Meant to run once at startup. Later calls register nothing. Entries with
    /// an empty key, topic handlers named after a reserved lifecycle method and
    /// providers returning nothing are logged and skipped. Returns the number of
    /// records added.
    pub fn register_static_handlers(&self) -> usize {
        if self.statics_loaded.replace(true) {
            log::warn!("Bus: static handlers were already registered, ignoring");
            return 0;
        }

        let mut registry = self.registry.borrow_mut();
        let mut added = 0;
        for entry in inventory::iter::<StaticHandler> {
            let handler = (entry.build)();
            if entry.key.is_empty() {
                log::warn!("Bus: skipping static handler '{}': empty key", entry.name);
                continue;
            }
            if entry.kind == HandlerKind::Topic && self.config.is_reserved(entry.name) {
                log::warn!(
                    "Bus: skipping static handler '{}': reserved lifecycle name",
                    entry.name
                );
                continue;
            }
            let void = handler.returns().map_or(true, |r| r.is_void());
            if entry.kind == HandlerKind::Provider && void {
                log::warn!(
                    "Bus: skipping static provider '{}': it must return a value",
                    entry.name
                );
                continue;
            }
            registry.insert(HandlerRecord::new(
                None,
                entry.kind,
                entry.key,
                entry.priority,
                entry.name,
                handler,
            ));
            added += 1;
        }
        log::info!("Bus: registered {added} static handler(s)");
        added
    }

    /// Registers the handlers declared by `owner`'s type.
    ///
    /// Declarations that break the registration rules are logged and skipped;
    /// the valid ones still register. Registering the same owner twice adds its
    /// handlers twice. The bus keeps only a weak reference to `owner`.
    ///
    /// ## Arguments
    /// * `owner` - The instance whose [`Handlers`] declarations are registered.
    ///
    /// ## Returns
    /// A [`Registration`] guard that unregisters the owner when dropped.
    pub fn register_instance<T: Handlers>(&self, owner: &Rc<T>) -> Registration {
        let mut decl = crate::declare::Declarations::<T>::new();
        T::declare(&mut decl);

        let slot = OwnerSlot::new(owner);
        let mut registry = self.registry.borrow_mut();
        let mut added = 0;
        for entry in decl.into_entries() {
            let checked = registry::validate(
                entry.kind,
                &entry.key,
                &entry.name,
                &entry.handler,
                &self.config,
            );
            if let Err(err) = checked {
                log::warn!("Bus: skipping declaration of {}: {err}", type_name::<T>());
                continue;
            }
            registry.insert(HandlerRecord::new(
                Some(slot.clone()),
                entry.kind,
                entry.key,
                entry.priority,
                entry.name,
                entry.handler,
            ));
            added += 1;
        }
        log::debug!(
            "Bus: registered {added} handler(s) for {}@{}",
            type_name::<T>(),
            slot.id()
        );

        Registration {
            registry: Some(Rc::downgrade(&self.registry)),
            owner: slot.id(),
            owner_type: type_name::<T>(),
        }
    }

    /// Removes every record belonging to `owner`, by identity.
    ///
    /// Returns the number of records removed.
    pub fn unregister_instance<T: ?Sized>(&self, owner: &Rc<T>) -> usize {
        self.unregister_owner(OwnerId::of(owner))
    }

    /// Removes every record registered for the owner identified by `owner`.
    ///
    /// This works after the owner itself is gone, which is how records kept
    /// by [`Registration::detach`] are cleaned up once their owner is dropped.
    ///
    /// ## Arguments
    /// * `owner` - The identity returned by [`Registration::owner`] or
    ///   [`Registration::detach`].
    ///
    /// ## Returns
    /// The number of records removed.
    pub fn unregister_owner(&self, owner: OwnerId) -> usize {
        unregister(&self.registry, owner)
    }

    /// Registers a free function or closure as a handler for `topic`.
    ///
    /// The handler has no owner and stays registered for the life of the bus.
    pub fn subscribe<M, F>(
        &self,
        topic: impl Into<Cow<'static, str>>,
        priority: i32,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        F: IntoTopicHandler<M>,
    {
        self.register_free(
            HandlerKind::Topic,
            topic.into(),
            priority,
            type_name::<F>(),
            handler.into_handler(),
        )
    }

    /// Registers a free function or closure as a provider for `request_type`.
    pub fn provide<M, F>(
        &self,
        request_type: impl Into<Cow<'static, str>>,
        priority: i32,
        provider: F,
    ) -> Result<(), RegistrationError>
    where
        F: IntoProvider<M>,
    {
        self.register_free(
            HandlerKind::Provider,
            request_type.into(),
            priority,
            type_name::<F>(),
            provider.into_handler(),
        )
    }

    fn register_free(
        &self,
        kind: HandlerKind,
        key: Cow<'static, str>,
        priority: i32,
        name: &'static str,
        handler: crate::Handler,
    ) -> Result<(), RegistrationError> {
        registry::validate(kind, &key, name, &handler, &self.config)?;
        self.registry
            .borrow_mut()
            .insert(HandlerRecord::new(None, kind, key, priority, name, handler));
        Ok(())
    }

    /// Declares that a `Sub` payload element or reply may stand in for a `Super`.
    ///
    /// ```rust
    /// use beacon_core::Bus;
    /// use std::any::Any;
    /// use std::rc::Rc;
    ///
    /// trait Creature { fn hp(&self) -> u32; }
    /// struct Goblin;
    /// impl Creature for Goblin { fn hp(&self) -> u32 { 7 } }
    ///
    /// let bus = Bus::default();
    /// bus.declare_assignable::<Rc<Goblin>, Rc<dyn Creature>, _>(|g| g.clone() as Rc<dyn Creature>);
    /// bus.provide("creature.spawn", 1, |_r: &dyn Any| Rc::new(Goblin)).unwrap();
    ///
    /// let spawned = bus.request::<Rc<dyn Creature>>("creature.spawn", &(), ());
    /// assert_eq!(spawned.map(|c| c.hp()), Some(7));
    /// ```
    pub fn declare_assignable<Sub, Super, F>(&self, convert: F)
    where
        Sub: 'static,
        Super: 'static,
        F: Fn(&Sub) -> Super + 'static,
    {
        let mut relations = self.relations.borrow_mut();
        Rc::make_mut(&mut relations).declare::<Sub, Super, F>(convert);
    }

    // --- Dispatch ---

    /// Publishes `payload` on `topic`.
    ///
    /// Every handler registered for the topic is attempted, highest priority
    /// first. Handlers that cannot be bound, fail or panic are logged and
    /// skipped; nothing is reported back to the caller.
    ///
    /// ## Arguments
    /// * `topic` - The topic name.
    /// * `sender` - The origin of the event, handed to every handler as-is.
    /// * `payload` - Extra values bound to handler parameters by type, usually a
    ///   tuple such as `(score,)` or `()`.
    pub fn publish(&self, topic: &str, sender: &dyn Any, payload: impl IntoPayload) {
        let payload = payload.into_payload();
        self.stats.update(|s| s.publishes += 1);

        let records = self.registry.borrow().lookup(HandlerKind::Topic, topic);
        if records.is_empty() {
            log::trace!("Bus: no handler for topic '{topic}'");
            return;
        }

        let relations = Rc::clone(&*self.relations.borrow());
        for record in &records {
            match self.invoke(record, sender, &payload, &relations) {
                Ok(_) => self.stats.update(|s| s.invocations += 1),
                Err(fault) => self.report(record, &payload, fault),
            }
        }
    }

    /// Asks every provider of `request_type` and collects the replies of type `T`,
    /// highest priority first.
    ///
    /// A reply is kept if it is a `T`, a `Some(T)`, or a value with a declared
    /// relation to `T`. A `None::<T>` reply is skipped silently. Providers
    /// returning `anyhow::Result<T>` (or `anyhow::Result<Option<T>>`) are
    /// unwrapped; their `Err` is logged as an invocation failure. Replies of any
    /// other type, including `Option<U>` for another `U`, are logged as
    /// unexpected and dropped.
    ///
    /// ## Arguments
    /// * `request_type` - The request key providers registered for.
    /// * `requester` - The asking object, handed to every provider as-is.
    /// * `args` - Extra values bound to provider parameters by type.
    ///
    /// ## Returns
    /// The accepted replies, highest provider priority first. Empty when no
    /// provider is registered or none answered.
    pub fn request_all<T: 'static>(
        &self,
        request_type: &str,
        requester: &dyn Any,
        args: impl IntoPayload,
    ) -> Vec<T> {
        let payload = args.into_payload();
        self.stats.update(|s| s.requests += 1);

        let records = self.registry.borrow().lookup(HandlerKind::Provider, request_type);
        if records.is_empty() {
            log::trace!("Bus: no provider for request '{request_type}'");
            return Vec::new();
        }

        let relations = Rc::clone(&*self.relations.borrow());
        let mut results = Vec::with_capacity(records.len());
        for record in &records {
            let reply = match self.invoke(record, requester, &payload, &relations) {
                Ok(Some(reply)) => reply,
                Ok(None) => {
                    self.stats.update(|s| s.invocations += 1);
                    continue;
                }
                Err(fault) => {
                    self.report(record, &payload, fault);
                    continue;
                }
            };
            let accepted = accept::<T>(reply, &relations);
            if !matches!(accepted, Accepted::Failed(_)) {
                self.stats.update(|s| s.invocations += 1);
            }
            match accepted {
                Accepted::Value(value) => {
                    self.stats.update(|s| s.replies += 1);
                    results.push(value);
                }
                Accepted::Absent => {}
                Accepted::Failed(err) => {
                    self.report(record, &payload, DispatchFault::Failed(err));
                }
                Accepted::Mismatch(found) => {
                    let fault = DispatchFault::UnexpectedReply {
                        expected: type_name::<T>(),
                        found,
                    };
                    self.report(record, &payload, fault);
                }
            }
        }
        results
    }

    /// The first reply of [`request_all`](Self::request_all), or `None` if no
    /// provider answered with a `T`.
    pub fn request<T: 'static>(
        &self,
        request_type: &str,
        requester: &dyn Any,
        args: impl IntoPayload,
    ) -> Option<T> {
        self.request_all(request_type, requester, args).into_iter().next()
    }

    fn invoke(
        &self,
        record: &HandlerRecord,
        sender: &dyn Any,
        payload: &Payload,
        relations: &TypeRelations,
    ) -> Result<Option<Arg>, DispatchFault> {
        let handler = record.handler();
        if !handler.takes_sender() {
            return Err(DispatchFault::InvalidReceiver);
        }

        let owner = match record.owner() {
            Some(slot) => Some(slot.upgrade().ok_or(DispatchFault::DeadOwner {
                owner: slot.type_name(),
            })?),
            None => None,
        };

        let args = resolve::bind(handler.params(), payload, relations)?;

        if self.config.trace_dispatch {
            log::trace!(
                "Bus: {} '{}' -> {} ({} arg(s))",
                record.kind(),
                record.key(),
                record.name(),
                args.len()
            );
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.invoke(owner.as_deref(), sender, &args)
        }));
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(DispatchFault::Failed(err)),
            Err(panic_payload) => Err(DispatchFault::from_panic(panic_payload)),
        }
    }

    fn report(&self, record: &HandlerRecord, payload: &Payload, fault: DispatchFault) {
        self.stats.fault(&fault);
        match &fault {
            DispatchFault::Failed(_) | DispatchFault::Panicked(_) => log::error!(
                "Bus: {} '{}' handler {} (owner {}, {} arg(s)) failed: {fault}",
                record.kind(),
                record.key(),
                record.name(),
                record.owner_label(),
                payload.len()
            ),
            _ => log::warn!(
                "Bus: {} '{}' skipped {}: {fault}",
                record.kind(),
                record.key(),
                record.name()
            ),
        }
    }

    // --- Introspection ---

    /// Returns `true` if at least one provider answers `request_type`.
    pub fn has_provider(&self, request_type: &str) -> bool {
        self.registry.borrow().contains(HandlerKind::Provider, request_type)
    }

    /// Returns `true` if at least one handler listens on `topic`.
    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.registry.borrow().contains(HandlerKind::Topic, topic)
    }

    /// Number of handlers listening on `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.registry.borrow().count(HandlerKind::Topic, topic)
    }

    /// Number of providers answering `request_type`.
    pub fn provider_count(&self, request_type: &str) -> usize {
        self.registry.borrow().count(HandlerKind::Provider, request_type)
    }

    /// Every topic with at least one handler, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.registry.borrow().keys(HandlerKind::Topic)
    }

    /// A snapshot of the dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.stats.snapshot()
    }

    /// Resets the dispatch counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    // --- Main-thread relay ---

    /// The relay owned by this bus.
    pub fn relay(&self) -> &MainThreadRelay {
        &self.relay
    }

    /// A handle other threads can use to queue work for this bus.
    pub fn relay_handle(&self) -> RelayHandle {
        self.relay.handle()
    }

    /// Runs the relay jobs queued before this call. See
    /// [`MainThreadRelay::drain_tick`].
    pub fn drain_tick(&self) -> usize {
        self.relay.drain_tick(self)
    }

    /// Tears the bus down: drops queued relay jobs and every record.
    ///
    /// Outstanding [`Registration`] guards become no-ops.
    pub fn shutdown(self) {
        let discarded = self.relay.clear();
        let records = self.registry.borrow_mut().clear();
        log::info!(
            "Bus shut down ({} record(s) dropped, {discarded} relay job(s) discarded).",
            records.len()
        );
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

enum Accepted<T> {
    Value(T),
    Absent,
    Failed(anyhow::Error),
    Mismatch(&'static str),
}

fn accept<T: 'static>(reply: Arg, relations: &TypeRelations) -> Accepted<T> {
    if reply.is::<anyhow::Result<T>>() {
        return match take::<anyhow::Result<T>>(reply) {
            Some(Ok(value)) => Accepted::Value(value),
            Some(Err(err)) => Accepted::Failed(err),
            None => Accepted::Mismatch(type_name::<anyhow::Result<T>>()),
        };
    }
    if reply.is::<anyhow::Result<Option<T>>>() {
        return match take::<anyhow::Result<Option<T>>>(reply) {
            Some(Ok(Some(value))) => Accepted::Value(value),
            Some(Ok(None)) => Accepted::Absent,
            Some(Err(err)) => Accepted::Failed(err),
            None => Accepted::Mismatch(type_name::<anyhow::Result<Option<T>>>()),
        };
    }
    if reply.is::<T>() {
        return take(reply).map_or(Accepted::Mismatch(type_name::<T>()), Accepted::Value);
    }
    if reply.is::<Option<T>>() {
        return match take::<Option<T>>(reply) {
            Some(Some(value)) => Accepted::Value(value),
            _ => Accepted::Absent,
        };
    }
    match relations.convert(&reply, TypeId::of::<T>()) {
        Some(converted) => {
            take(converted).map_or(Accepted::Mismatch(reply.type_name()), Accepted::Value)
        }
        None => Accepted::Mismatch(reply.type_name()),
    }
}

fn take<T: 'static>(arg: Arg) -> Option<T> {
    arg.into_inner::<T>()
}

fn unregister(registry: &RefCell<Registry>, owner: OwnerId) -> usize {
    let removed = match registry.try_borrow_mut() {
        Ok(mut registry) => registry.remove_owner(owner),
        Err(_) => {
            log::error!("Bus: cannot unregister {owner} while the registry is being modified");
            return 0;
        }
    };
    let count = removed.len();
    if count > 0 {
        log::debug!("Bus: unregistered {count} handler(s) of owner {owner}");
    }
    // Records are released here, after the borrow: a handler closure may own
    // a guard whose drop touches the registry again.
    drop(removed);
    count
}

/// Keeps an owner's handlers registered.
///
/// Dropping the guard removes every record of the owner, as
/// [`Bus::unregister_instance`] does. The guard holds neither the bus nor the
/// owner alive.
#[must_use = "dropping the registration unregisters the owner immediately"]
pub struct Registration {
    registry: Option<Weak<RefCell<Registry>>>,
    owner: OwnerId,
    owner_type: &'static str,
}

impl Registration {
    /// The identity of the registered owner.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Lets the records outlive the guard.
    ///
    /// They then stay registered until [`Bus::unregister_instance`] is called.
    pub fn detach(mut self) -> OwnerId {
        self.registry = None;
        self.owner
    }

    /// Unregisters now, returning the number of records removed.
    pub fn release(mut self) -> usize {
        self.remove()
    }

    fn remove(&mut self) -> usize {
        match self.registry.take().and_then(|weak| weak.upgrade()) {
            Some(registry) => unregister(&registry, self.owner),
            None => 0,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.is_some() {
            let removed = self.remove();
            log::trace!("Registration of {} dropped ({removed} record(s))", self.owner_type);
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("owner", &self.owner)
            .field("owner_type", &self.owner_type)
            .finish()
    }
}
