//! State machine runtime.
//!
//! A [`StateMachine`] executes a [`MachineConfig`] and broadcasts each
//! transition on its [`EventBus`]. Every successful transition publishes the
//! same [`TransitionEvent`] twice: under `"transition"` and under the name of
//! the target state. [`StateMachine::reset`] publishes under `"reset"`.

use crate::definition::{builtin_machine, MachineConfig};
use crate::error::CoreError;
use crate::events::{EventBus, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Bus event published for every transition.
pub const TRANSITION: &str = "transition";

/// Bus event published on reset.
pub const RESET: &str = "reset";

/// Broadcast payload describing one state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub from: String,
    pub to: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl TransitionEvent {
    fn now(from: &str, to: &str, event: &str, payload: Value) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            event: event.to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A running instance of a machine configuration.
///
/// Instances are owned by the caller; nothing tracks live instances.
#[derive(Debug)]
pub struct StateMachine {
    config: Arc<MachineConfig>,
    state: String,
    history: Vec<String>,
    bus: EventBus<TransitionEvent>,
}

impl StateMachine {
    /// Creates an instance in the initial state with its own bus.
    pub fn new(config: Arc<MachineConfig>) -> Self {
        Self::with_bus(config, EventBus::new())
    }

    /// Creates an instance that publishes on a shared bus.
    pub fn with_bus(config: Arc<MachineConfig>, bus: EventBus<TransitionEvent>) -> Self {
        let state = config.initial().to_string();
        Self {
            config,
            state,
            history: Vec::new(),
            bus,
        }
    }

    pub fn config(&self) -> &Arc<MachineConfig> {
        &self.config
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Previous states, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn bus(&self) -> &EventBus<TransitionEvent> {
        &self.bus
    }

    /// Returns true if `event` is accepted in the current state.
    pub fn can_transition(&self, event: &str) -> bool {
        self.config.get_transition(&self.state, event).is_some()
    }

    /// Events accepted in the current state.
    pub fn available_events(&self) -> Vec<&str> {
        self.config.events_from(&self.state)
    }

    /// Applies `event`.
    ///
    /// On failure the state and history are unchanged and nothing is
    /// published.
    pub fn transition(&mut self, event: &str, payload: Value) -> Result<TransitionEvent, CoreError> {
        let to = match self.config.get_transition(&self.state, event) {
            Some(to) => to.to_string(),
            None => {
                return Err(CoreError::InvalidTransition {
                    state: self.state.clone(),
                    event: event.to_string(),
                })
            }
        };

        let from = std::mem::replace(&mut self.state, to);
        let record = TransitionEvent::now(&from, &self.state, event, payload);
        self.history.push(from);

        tracing::debug!(
            "{}: {} --{}--> {}",
            self.config.name,
            record.from,
            record.event,
            record.to
        );

        self.bus.publish(TRANSITION, &record);
        self.bus.publish(&record.to, &record);
        Ok(record)
    }

    /// Returns to the initial state and clears history.
    pub fn reset(&mut self) {
        let initial = self.config.initial().to_string();
        let from = std::mem::replace(&mut self.state, initial);
        self.history.clear();

        tracing::debug!("{}: reset from {}", self.config.name, from);

        let record = TransitionEvent::now(&from, &self.state, RESET, Value::Null);
        self.bus.publish(RESET, &record);
    }

    /// Subscribes to `"transition"`, `"reset"` or a state name.
    pub fn subscribe<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(event, callback)
    }
}

/// Creates an instance of a pre-built machine (`stream`, `tool`, `approve`).
pub fn create_state_machine(kind: &str) -> Result<StateMachine, CoreError> {
    Ok(StateMachine::new(builtin_machine(kind)?))
}
