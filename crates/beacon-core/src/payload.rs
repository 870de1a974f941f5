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

//! Type-erased values carried alongside a dispatch.
//!
//! A [`Payload`] is the ordered list of extra objects a publisher or requester
//! hands to the bus. Each element is an [`Arg`]: a shared, immutable value that
//! remembers its concrete type so the resolver can bind it to a handler
//! parameter by type.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

/// A single type-erased payload element.
///
/// Cloning an `Arg` only bumps a reference count; the wrapped value is never
/// copied until a handler parameter takes it by value.
#[derive(Clone)]
pub struct Arg {
    value: Rc<dyn Any>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Arg {
    /// Wraps a value.
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            value: Rc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The [`TypeId`] of the wrapped value's concrete type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The name of the wrapped value's concrete type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the wrapped value is exactly a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrows the wrapped value as a `T`, if that is its concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Borrows the wrapped value as `dyn Any`.
    pub fn as_any(&self) -> &dyn Any {
        &*self.value
    }

    /// Takes the wrapped value out as a `T`.
    ///
    /// Returns `None` if the value is not a `T` or if other clones of this
    /// `Arg` still share it.
    pub fn into_inner<T: 'static>(self) -> Option<T> {
        let value = self.value.downcast::<T>().ok()?;
        Rc::try_unwrap(value).ok()
    }

    /// Clones the wrapped value out as a `T`.
    pub(crate) fn extract<T: Clone + 'static>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Arg").field(&self.type_name).finish()
    }
}

/// The ordered list of objects passed with a publish or request call.
#[derive(Clone, Default, Debug)]
pub struct Payload {
    args: Vec<Arg>,
}

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value.
    pub fn push<T: 'static>(&mut self, value: T) {
        self.args.push(Arg::new(value));
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with<T: 'static>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` if the payload carries nothing.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arg> {
        self.args.iter()
    }

    /// The element at `index`, regardless of its type.
    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    /// Borrows the first element whose concrete type is `T`.
    pub fn find<T: 'static>(&self) -> Option<&T> {
        self.args.iter().find_map(|arg| arg.downcast_ref::<T>())
    }

    /// The type names of all elements, for diagnostics.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.args.iter().map(Arg::type_name).collect()
    }

    pub(crate) fn as_slice(&self) -> &[Arg] {
        &self.args
    }
}

impl From<Vec<Arg>> for Payload {
    fn from(args: Vec<Arg>) -> Self {
        Self { args }
    }
}

impl FromIterator<Arg> for Payload {
    fn from_iter<I: IntoIterator<Item = Arg>>(iter: I) -> Self {
        Self {
            args: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Payload {
    type Item = &'a Arg;
    type IntoIter = std::slice::Iter<'a, Arg>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

/// The catch-all parameter.
///
/// A handler whose last parameter is `Rest` receives the complete payload of
/// the dispatch, unfiltered and in order, no matter which elements the other
/// parameters were bound to.
#[derive(Clone, Default, Debug)]
pub struct Rest(pub Payload);

impl Rest {
    /// The payload carried by this catch-all.
    pub fn payload(&self) -> &Payload {
        &self.0
    }

    /// Unwraps the payload.
    pub fn into_inner(self) -> Payload {
        self.0
    }
}

impl std::ops::Deref for Rest {
    type Target = Payload;

    fn deref(&self) -> &Payload {
        &self.0
    }
}

/// Conversion into a [`Payload`].
///
/// Implemented for `()`, tuples of up to eight `'static` values, `Vec<Arg>`
/// and `Payload` itself, so call sites can write
/// `bus.publish("score.changed", &state, (42,))`.
pub trait IntoPayload {
    /// Performs the conversion.
    fn into_payload(self) -> Payload;
}

impl IntoPayload for Payload {
    fn into_payload(self) -> Payload {
        self
    }
}

impl IntoPayload for Vec<Arg> {
    fn into_payload(self) -> Payload {
        Payload::from(self)
    }
}

impl IntoPayload for () {
    fn into_payload(self) -> Payload {
        Payload::new()
    }
}

macro_rules! impl_into_payload_for_tuple {
    ($($ty:ident),+) => {
        impl<$($ty: 'static),+> IntoPayload for ($($ty,)+) {
            #[allow(non_snake_case)]
            fn into_payload(self) -> Payload {
                let ($($ty,)+) = self;
                Payload::from(vec![$(Arg::new($ty)),+])
            }
        }
    };
}

impl_into_payload_for_tuple!(A1);
impl_into_payload_for_tuple!(A1, A2);
impl_into_payload_for_tuple!(A1, A2, A3);
impl_into_payload_for_tuple!(A1, A2, A3, A4);
impl_into_payload_for_tuple!(A1, A2, A3, A4, A5);
impl_into_payload_for_tuple!(A1, A2, A3, A4, A5, A6);
impl_into_payload_for_tuple!(A1, A2, A3, A4, A5, A6, A7);
impl_into_payload_for_tuple!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Builds a [`Payload`] from a list of values of any `'static` type.
///
/// ```rust
/// let payload = beacon_core::payload![42_i32, String::from("hello")];
/// assert_eq!(payload.len(), 2);
/// ```
#[macro_export]
macro_rules! payload {
    () => { $crate::Payload::new() };
    ($($value:expr),+ $(,)?) => {
        $crate::Payload::from(::std::vec![$($crate::Arg::new($value)),+])
    };
}
