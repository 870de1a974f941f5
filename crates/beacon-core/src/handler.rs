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

//! Type-erased handler callables.
//!
//! Every topic handler and request provider, whether it is a free function,
//! a closure or a method, ends up as a [`Handler`]: the declared parameter
//! list plus a thunk that receives the already-bound arguments. The
//! `Into*` traits below perform that erasure for callables of up to eight
//! payload parameters after the sender.

use crate::payload::{Arg, Rest};
use anyhow::anyhow;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::rc::Rc;

/// Which dispatcher a handler answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Fire-and-forget topic handler.
    Topic,
    /// Request provider returning a value.
    Provider,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Topic => f.write_str("topic"),
            HandlerKind::Provider => f.write_str("request"),
        }
    }
}

/// A declared payload parameter (the sender is not included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// The declared type.
    pub type_id: TypeId,
    /// Name of the declared type, for diagnostics.
    pub type_name: &'static str,
    /// `true` if this is the [`Rest`] catch-all.
    pub rest: bool,
}

impl ParamSpec {
    /// Describes a parameter of type `T`.
    pub fn of<T: 'static>() -> Self {
        let type_id = TypeId::of::<T>();
        Self {
            type_id,
            type_name: type_name::<T>(),
            rest: type_id == TypeId::of::<Rest>(),
        }
    }
}

/// The declared return type of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnSpec {
    /// The declared type.
    pub type_id: TypeId,
    /// Name of the declared type, for diagnostics.
    pub type_name: &'static str,
}

impl ReturnSpec {
    /// Describes a return type `R`.
    pub fn of<R: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            type_name: type_name::<R>(),
        }
    }

    /// Returns `true` for `()` and for `anyhow::Result<()>`, which carries no
    /// reply either.
    pub fn is_void(&self) -> bool {
        self.type_id == TypeId::of::<()>() || self.type_id == TypeId::of::<anyhow::Result<()>>()
    }
}

type Thunk = dyn Fn(Option<&dyn Any>, &dyn Any, &[Arg]) -> anyhow::Result<Option<Arg>>;

/// A type-erased topic handler or request provider.
#[derive(Clone)]
pub struct Handler {
    takes_sender: bool,
    params: Vec<ParamSpec>,
    returns: Option<ReturnSpec>,
    thunk: Rc<Thunk>,
}

impl Handler {
    /// Erases a free topic handler.
    pub fn topic<M>(handler: impl IntoTopicHandler<M>) -> Self {
        handler.into_handler()
    }

    /// Erases a free request provider.
    pub fn provider<M>(provider: impl IntoProvider<M>) -> Self {
        provider.into_handler()
    }

    fn new<F>(
        takes_sender: bool,
        params: Vec<ParamSpec>,
        returns: Option<ReturnSpec>,
        thunk: F,
    ) -> Self
    where
        F: Fn(Option<&dyn Any>, &dyn Any, &[Arg]) -> anyhow::Result<Option<Arg>> + 'static,
    {
        Self {
            takes_sender,
            params,
            returns,
            thunk: Rc::new(thunk),
        }
    }

    /// Whether the first parameter receives the sender / requester.
    pub fn takes_sender(&self) -> bool {
        self.takes_sender
    }

    /// The declared payload parameters, sender excluded.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// The declared return type, for providers.
    pub fn returns(&self) -> Option<ReturnSpec> {
        self.returns
    }

    /// Position of the first catch-all parameter that is not the last one.
    pub fn misplaced_rest(&self) -> Option<usize> {
        let last = self.params.len().checked_sub(1)?;
        self.params[..last].iter().position(|p| p.rest)
    }

    /// Calls the handler with arguments already bound to [`params`](Self::params).
    pub(crate) fn invoke(
        &self,
        owner: Option<&dyn Any>,
        sender: &dyn Any,
        args: &[Arg],
    ) -> anyhow::Result<Option<Arg>> {
        (self.thunk)(owner, sender, args)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("takes_sender", &self.takes_sender)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// What a topic handler may return.
///
/// `()` always succeeds. An `Err` is treated exactly like a panic: it is
/// logged at the dispatch boundary and never reaches the publisher.
pub trait TopicOutput {
    /// Normalises the output.
    fn into_outcome(self) -> anyhow::Result<()>;
}

impl TopicOutput for () {
    fn into_outcome(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E: Into<anyhow::Error>> TopicOutput for Result<(), E> {
    fn into_outcome(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// Conversion of a free function or closure into a topic [`Handler`].
///
/// Implemented for `Fn()` and `Fn(&dyn Any, A1, .., An)` with up to eight
/// `Clone + 'static` parameters. `Marker` only disambiguates the arities.
pub trait IntoTopicHandler<Marker>: 'static {
    /// Performs the erasure.
    fn into_handler(self) -> Handler;
}

/// Conversion of a method on `T` into a topic [`Handler`].
pub trait IntoTopicMethod<T, Marker>: 'static {
    /// Performs the erasure.
    fn into_handler(self) -> Handler;
}

/// Conversion of a free function or closure into a request provider.
pub trait IntoProvider<Marker>: 'static {
    /// Performs the erasure.
    fn into_handler(self) -> Handler;
}

/// Conversion of a method on `T` into a request provider.
pub trait IntoProviderMethod<T, Marker>: 'static {
    /// Performs the erasure.
    fn into_handler(self) -> Handler;
}

fn take<A: Clone + 'static>(args: &[Arg], index: usize) -> anyhow::Result<A> {
    args.get(index)
        .and_then(Arg::extract::<A>)
        .ok_or_else(|| anyhow!("argument #{index} is not a {}", type_name::<A>()))
}

fn owner_ref<T: 'static>(owner: Option<&dyn Any>) -> anyhow::Result<&T> {
    owner
        .and_then(|o| o.downcast_ref::<T>())
        .ok_or_else(|| anyhow!("handler owner is not a {}", type_name::<T>()))
}

impl<F, O> IntoTopicHandler<fn() -> O> for F
where
    F: Fn() -> O + 'static,
    O: TopicOutput,
{
    fn into_handler(self) -> Handler {
        Handler::new(false, Vec::new(), None, move |_, _, _| {
            (self)().into_outcome().map(|()| None)
        })
    }
}

impl<T, F, O> IntoTopicMethod<T, fn(&T) -> O> for F
where
    T: 'static,
    F: Fn(&T) -> O + 'static,
    O: TopicOutput,
{
    fn into_handler(self) -> Handler {
        Handler::new(false, Vec::new(), None, move |owner, _, _| {
            let this = owner_ref::<T>(owner)?;
            (self)(this).into_outcome().map(|()| None)
        })
    }
}

impl<F, R> IntoProvider<fn() -> R> for F
where
    F: Fn() -> R + 'static,
    R: 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(false, Vec::new(), Some(ReturnSpec::of::<R>()), move |_, _, _| {
            Ok(Some(Arg::new((self)())))
        })
    }
}

impl<T, F, R> IntoProviderMethod<T, fn(&T) -> R> for F
where
    T: 'static,
    F: Fn(&T) -> R + 'static,
    R: 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(false, Vec::new(), Some(ReturnSpec::of::<R>()), move |owner, _, _| {
            let this = owner_ref::<T>(owner)?;
            Ok(Some(Arg::new((self)(this))))
        })
    }
}

macro_rules! impl_handler_traits {
    ($($ty:ident $idx:tt),*) => {
        impl<F, O, $($ty),*> IntoTopicHandler<fn(&dyn Any, $($ty),*) -> O> for F
        where
            F: Fn(&dyn Any, $($ty),*) -> O + 'static,
            O: TopicOutput,
            $($ty: Clone + 'static,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn into_handler(self) -> Handler {
                let params = vec![$(ParamSpec::of::<$ty>()),*];
                Handler::new(true, params, None, move |_, sender, args| {
                    $(let $ty = take::<$ty>(args, $idx)?;)*
                    (self)(sender, $($ty),*).into_outcome().map(|()| None)
                })
            }
        }

        impl<T, F, O, $($ty),*> IntoTopicMethod<T, fn(&T, &dyn Any, $($ty),*) -> O> for F
        where
            T: 'static,
            F: Fn(&T, &dyn Any, $($ty),*) -> O + 'static,
            O: TopicOutput,
            $($ty: Clone + 'static,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn into_handler(self) -> Handler {
                let params = vec![$(ParamSpec::of::<$ty>()),*];
                Handler::new(true, params, None, move |owner, sender, args| {
                    let this = owner_ref::<T>(owner)?;
                    $(let $ty = take::<$ty>(args, $idx)?;)*
                    (self)(this, sender, $($ty),*).into_outcome().map(|()| None)
                })
            }
        }

        impl<F, R, $($ty),*> IntoProvider<fn(&dyn Any, $($ty),*) -> R> for F
        where
            F: Fn(&dyn Any, $($ty),*) -> R + 'static,
            R: 'static,
            $($ty: Clone + 'static,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn into_handler(self) -> Handler {
                let params = vec![$(ParamSpec::of::<$ty>()),*];
                Handler::new(true, params, Some(ReturnSpec::of::<R>()), move |_, requester, args| {
                    $(let $ty = take::<$ty>(args, $idx)?;)*
                    Ok(Some(Arg::new((self)(requester, $($ty),*))))
                })
            }
        }

        impl<T, F, R, $($ty),*> IntoProviderMethod<T, fn(&T, &dyn Any, $($ty),*) -> R> for F
        where
            T: 'static,
            F: Fn(&T, &dyn Any, $($ty),*) -> R + 'static,
            R: 'static,
            $($ty: Clone + 'static,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn into_handler(self) -> Handler {
                let params = vec![$(ParamSpec::of::<$ty>()),*];
                Handler::new(true, params, Some(ReturnSpec::of::<R>()), move |owner, requester, args| {
                    let this = owner_ref::<T>(owner)?;
                    $(let $ty = take::<$ty>(args, $idx)?;)*
                    Ok(Some(Arg::new((self)(this, requester, $($ty),*))))
                })
            }
        }
    };
}

impl_handler_traits!();
impl_handler_traits!(A1 0);
impl_handler_traits!(A1 0, A2 1);
impl_handler_traits!(A1 0, A2 1, A3 2);
impl_handler_traits!(A1 0, A2 1, A3 2, A4 3);
impl_handler_traits!(A1 0, A2 1, A3 2, A4 3, A5 4);
impl_handler_traits!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5);
impl_handler_traits!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6);
impl_handler_traits!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6, A8 7);
