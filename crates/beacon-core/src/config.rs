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

//! Configuration for the [`Bus`](crate::Bus).

use serde::Deserialize;

/// Lifecycle callback names that can never handle a topic.
pub const DEFAULT_RESERVED_NAMES: &[&str] = &[
    "awake",
    "start",
    "update",
    "fixed_update",
    "late_update",
    "on_enable",
    "on_disable",
    "on_destroy",
];

/// Configuration for the topic and request bus.
///
/// Every field has a default, so a partial document deserializes:
///
/// ```rust
/// let config: beacon_core::BusConfig =
///     serde_json::from_str(r#"{ "trace_dispatch": true }"#).unwrap();
/// assert!(config.trace_dispatch);
/// assert!(config.is_reserved("update"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Method names rejected as topic handlers at registration time.
    /// The comparison uses the last path segment of the handler name.
    pub reserved_names: Vec<String>,
    /// Emit a `trace` record for every handler invocation.
    pub trace_dispatch: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            reserved_names: DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
            trace_dispatch: false,
        }
    }
}

impl BusConfig {
    /// Adds a reserved method name.
    #[must_use]
    pub fn with_reserved_name(mut self, name: impl Into<String>) -> Self {
        self.reserved_names.push(name.into());
        self
    }

    /// Enables or disables per-invocation trace records.
    #[must_use]
    pub fn with_trace_dispatch(mut self, enabled: bool) -> Self {
        self.trace_dispatch = enabled;
        self
    }

    /// Returns `true` if `handler_name` ends in a reserved method name.
    pub fn is_reserved(&self, handler_name: &str) -> bool {
        let method = handler_name.rsplit("::").next().unwrap_or(handler_name);
        self.reserved_names.iter().any(|reserved| reserved == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reserve_lifecycle_callbacks() {
        let config = BusConfig::default();
        assert!(config.is_reserved("on_destroy"));
        assert!(config.is_reserved("game::Player::update"));
        assert!(!config.is_reserved("game::Player::on_score"));
        assert!(!config.trace_dispatch);
    }

    #[test]
    fn builder_extends_reserved_names() {
        let config = BusConfig::default()
            .with_reserved_name("reset")
            .with_trace_dispatch(true);
        assert!(config.is_reserved("Hud::reset"));
        assert!(config.trace_dispatch);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: BusConfig = serde_json::from_str(r#"{ "reserved_names": ["tick"] }"#).unwrap();
        assert!(config.is_reserved("tick"));
        assert!(!config.is_reserved("update"));
        assert!(!config.trace_dispatch);

        let empty: BusConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, BusConfig::default());
    }
}
