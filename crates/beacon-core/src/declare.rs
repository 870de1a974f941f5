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

//! The declaration layer: how handlers announce themselves to the bus.
//!
//! Free functions are collected at link time through [`inventory`] as
//! [`StaticHandler`] entries (normally produced by `#[topic]` and
//! `#[provides]`). Types whose instances handle topics implement
//! [`Handlers`] (normally through `#[handlers]`) and list their methods in a
//! [`Declarations`] table when an instance registers.

use crate::handler::{Handler, HandlerKind, IntoProviderMethod, IntoTopicMethod};
use std::any::type_name;
use std::borrow::Cow;
use std::marker::PhantomData;

/// Priority used when a declaration does not name one.
pub const DEFAULT_PRIORITY: i32 = 1;

/// A free-function handler collected at link time.
///
/// Entries are gathered with `inventory::collect!` and registered by
/// [`Bus::register_static_handlers`](crate::Bus::register_static_handlers).
pub struct StaticHandler {
    /// Topic handler or request provider.
    pub kind: HandlerKind,
    /// Topic name or request type.
    pub key: &'static str,
    /// Dispatch priority, higher first.
    pub priority: i32,
    /// Identity used in diagnostics, usually `module::function`.
    pub name: &'static str,
    /// Builds the erased handler.
    pub build: fn() -> Handler,
}

inventory::collect!(StaticHandler);

/// One handler declared by a [`Handlers`] type.
pub struct Declaration {
    pub(crate) kind: HandlerKind,
    pub(crate) key: Cow<'static, str>,
    pub(crate) priority: i32,
    pub(crate) name: Cow<'static, str>,
    pub(crate) handler: Handler,
}

impl Declaration {
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
}

/// The handler table of one [`Handlers`] type.
pub struct Declarations<T> {
    entries: Vec<Declaration>,
    _owner: PhantomData<fn(&T)>,
}

impl<T: 'static> Declarations<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            _owner: PhantomData,
        }
    }

    /// Declares `method` as a handler for `topic`.
    ///
    /// The handler identity is the method's type name.
    pub fn topic<M>(
        &mut self,
        topic: impl Into<Cow<'static, str>>,
        priority: i32,
        method: impl IntoTopicMethod<T, M>,
    ) -> &mut Self {
        let name = type_name_of(&method);
        self.topic_as(name, topic, priority, method)
    }

    /// Declares `method` as a handler for `topic` under an explicit identity.
    pub fn topic_as<M>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        topic: impl Into<Cow<'static, str>>,
        priority: i32,
        method: impl IntoTopicMethod<T, M>,
    ) -> &mut Self {
        self.entries.push(Declaration {
            kind: HandlerKind::Topic,
            key: topic.into(),
            priority,
            name: name.into(),
            handler: method.into_handler(),
        });
        self
    }

    /// Declares `method` as a provider for `request_type`.
    pub fn provides<M>(
        &mut self,
        request_type: impl Into<Cow<'static, str>>,
        priority: i32,
        method: impl IntoProviderMethod<T, M>,
    ) -> &mut Self {
        let name = type_name_of(&method);
        self.provides_as(name, request_type, priority, method)
    }

    /// Declares `method` as a provider for `request_type` under an explicit identity.
    pub fn provides_as<M>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        request_type: impl Into<Cow<'static, str>>,
        priority: i32,
        method: impl IntoProviderMethod<T, M>,
    ) -> &mut Self {
        self.entries.push(Declaration {
            kind: HandlerKind::Provider,
            key: request_type.into(),
            priority,
            name: name.into(),
            handler: method.into_handler(),
        });
        self
    }

    /// Number of declarations so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the declarations.
    pub fn iter(&self) -> std::slice::Iter<'_, Declaration> {
        self.entries.iter()
    }

    pub(crate) fn into_entries(self) -> Vec<Declaration> {
        self.entries
    }
}

/// A type whose instances carry topic handlers or request providers.
///
/// Usually derived with `#[handlers]` on the inherent `impl` block:
///
/// ```rust
/// use beacon_core::{handlers, Bus};
/// use std::any::Any;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// #[derive(Default)]
/// struct Scoreboard {
///     total: Cell<i64>,
/// }
///
/// #[handlers]
/// impl Scoreboard {
///     #[topic("score.changed", priority = 5)]
///     fn on_score(&self, _sender: &dyn Any, delta: i64) {
///         self.total.set(self.total.get() + delta);
///     }
///
///     #[provides("score.total")]
///     fn total(&self, _requester: &dyn Any) -> i64 {
///         self.total.get()
///     }
/// }
///
/// let bus = Bus::default();
/// let board = Rc::new(Scoreboard::default());
/// let _registration = bus.register_instance(&board);
///
/// bus.publish("score.changed", &(), (3_i64,));
/// assert_eq!(bus.request::<i64>("score.total", &(), ()), Some(3));
/// ```
pub trait Handlers: Sized + 'static {
    /// Fills `decl` with this type's handlers.
    fn declare(decl: &mut Declarations<Self>);
}

fn type_name_of<F>(_: &F) -> &'static str {
    type_name::<F>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    struct Panel;

    impl Panel {
        fn on_resize(&self, _sender: &dyn Any, _width: u32) {}
        fn layout(&self, _requester: &dyn Any) -> Vec<u32> {
            vec![1, 2]
        }
    }

    impl Handlers for Panel {
        fn declare(decl: &mut Declarations<Self>) {
            decl.topic("window.resized", 3, Self::on_resize)
                .provides_as("Panel::layout", "panel.layout", DEFAULT_PRIORITY, Self::layout);
        }
    }

    #[test]
    fn declarations_capture_kind_key_and_priority() {
        let mut decl = Declarations::<Panel>::new();
        Panel::declare(&mut decl);
        assert_eq!(decl.len(), 2);

        let entries = decl.into_entries();
        assert_eq!(entries[0].kind(), HandlerKind::Topic);
        assert_eq!(entries[0].key(), "window.resized");
        assert_eq!(entries[0].priority(), 3);
        assert!(entries[0].name().ends_with("on_resize"));

        assert_eq!(entries[1].kind(), HandlerKind::Provider);
        assert_eq!(entries[1].name(), "Panel::layout");
        assert_eq!(entries[1].priority(), DEFAULT_PRIORITY);
        assert!(entries[1].handler.returns().is_some());
    }
}
