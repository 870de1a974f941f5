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

//! Error types for handler registration and dispatch.
//!
//! None of these ever reach a publisher: dispatch faults are logged and
//! counted, and registration errors only surface from the explicit
//! [`Bus::subscribe`](crate::Bus::subscribe) / [`Bus::provide`](crate::Bus::provide)
//! calls.

use thiserror::Error;

/// A handler declaration that cannot be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The topic or request type is the empty string.
    #[error("handler '{name}' declares an empty key")]
    EmptyKey {
        /// Identity of the rejected handler.
        name: String,
    },
    /// The handler does not accept the sender / requester as its first parameter.
    #[error("handler '{name}' must accept the sender as its first parameter")]
    MissingSender {
        /// Identity of the rejected handler.
        name: String,
    },
    /// The method name is a reserved lifecycle callback.
    #[error("'{name}' is a reserved lifecycle method and cannot handle topics")]
    ReservedName {
        /// Identity of the rejected handler.
        name: String,
    },
    /// A catch-all parameter appears before the last position.
    #[error("handler '{name}' declares a catch-all parameter at position {position}, only the last parameter may be one")]
    MisplacedRest {
        /// Identity of the rejected handler.
        name: String,
        /// Position of the offending parameter, sender excluded.
        position: usize,
    },
    /// A request provider that returns no value.
    #[error("provider '{name}' must return a value")]
    VoidProvider {
        /// Identity of the rejected handler.
        name: String,
    },
}

/// Why a single handler invocation did not produce a result.
///
/// Faults are local to one handler: the dispatcher logs them, counts them in
/// [`DispatchStats`](crate::DispatchStats) and moves on to the next handler.
#[derive(Debug, Error)]
pub enum DispatchFault {
    /// The handler accepts no parameters at all.
    #[error("invalid receiver: handler takes no sender parameter")]
    InvalidReceiver,
    /// No payload element could be bound to a declared parameter.
    #[error("unresolved parameter #{position} of type {type_name}")]
    Unresolved {
        /// Position of the parameter, sender excluded.
        position: usize,
        /// Declared type of the parameter.
        type_name: &'static str,
    },
    /// The owner of an instance handler was dropped without unregistering.
    #[error("owner {owner} was dropped without unregistering")]
    DeadOwner {
        /// Type name of the dropped owner.
        owner: &'static str,
    },
    /// The handler returned an error.
    #[error("handler failed: {0:#}")]
    Failed(anyhow::Error),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// A provider answered with a value of another type than the one requested.
    #[error("provider returned unexpected type {found}, expected {expected}")]
    UnexpectedReply {
        /// The requested type.
        expected: &'static str,
        /// The type actually returned.
        found: &'static str,
    },
}

impl DispatchFault {
    /// Builds a [`DispatchFault::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        DispatchFault::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_messages_name_the_handler() {
        let err = RegistrationError::MisplacedRest {
            name: "Hud::on_score".into(),
            position: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("Hud::on_score"));
        assert!(msg.contains("position 0"));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let fault = DispatchFault::from_panic(Box::new("boom"));
        assert_eq!(fault.to_string(), "handler panicked: boom");

        let fault = DispatchFault::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(fault.to_string(), "handler panicked: owned boom");

        let fault = DispatchFault::from_panic(Box::new(5_u32));
        assert!(fault.to_string().contains("non-string"));
    }
}
