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

//! # Beacon Core
//!
//! An in-process event and request bus. Producers of state changes publish on
//! a named topic; consumers declare handlers for that topic and a priority.
//! Queries work the same way: providers answer a named request type and the
//! requester collects their typed replies.
//!
//! - [`Bus::publish`] multicasts a fire-and-forget event, highest priority first.
//! - [`Bus::request_all`] / [`Bus::request`] collect provider replies.
//! - [`Bus::register_instance`] wires an object's handlers for as long as the
//!   returned [`Registration`] lives; `#[topic]` / `#[provides]` free functions
//!   are picked up by [`Bus::register_static_handlers`].
//! - [`MainThreadRelay`] lets other threads queue work for the bus's thread.
//!
//! Payload elements are bound to handler parameters by type. A handler that
//! fails, panics or cannot be bound is logged and skipped; the publisher never
//! observes it.

#![warn(missing_docs)]

extern crate self as beacon_core;

pub mod bus;
pub mod config;
pub mod declare;
pub mod error;
pub mod handler;
pub mod payload;
pub mod registry;
pub mod relations;
pub mod relay;
mod resolve;
pub mod stats;

pub use beacon_macros::{handlers, provides, topic};
#[doc(hidden)]
pub use inventory;

pub use bus::{Bus, Registration};
pub use config::BusConfig;
pub use declare::{Declaration, Declarations, Handlers, StaticHandler, DEFAULT_PRIORITY};
pub use error::{DispatchFault, RegistrationError};
pub use handler::{
    Handler, HandlerKind, IntoProvider, IntoProviderMethod, IntoTopicHandler, IntoTopicMethod,
    ParamSpec, ReturnSpec, TopicOutput,
};
pub use payload::{Arg, IntoPayload, Payload, Rest};
pub use registry::{HandlerRecord, OwnerId};
pub use relations::TypeRelations;
pub use relay::{Job, MainThreadRelay, RelayHandle};
pub use stats::DispatchStats;
