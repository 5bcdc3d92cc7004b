//! State machine configurations.
//!
//! Configurations use a nested-map form, state to event to target:
//!
//! ```json
//! {
//!   "initial": "idle",
//!   "states": ["idle", "running", "done"],
//!   "transitions": {
//!     "idle": {"start": "running"},
//!     "running": {"finish": "done"},
//!     "done": {}
//!   }
//! }
//! ```
//!
//! The pre-built `stream`, `tool` and `approve` configurations are derived
//! from their typed lifecycles in [`crate::lifecycle`].

use crate::error::CoreError;
use crate::lifecycle::{ApproveLifecycle, Label, Lifecycle, StreamLifecycle, ToolLifecycle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

/// Configuration as written by schema authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfigRaw {
    pub initial: String,
    pub states: Vec<String>,

    /// Source state -> event -> target state.
    #[serde(default)]
    pub transitions: BTreeMap<String, BTreeMap<String, String>>,
}

/// Validated machine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub name: String,
    raw: MachineConfigRaw,
    /// CRC32C of the canonical form, as 8 hex digits.
    pub checksum: String,
}

impl MachineConfig {
    /// Parses and validates a configuration from JSON.
    pub fn from_json(name: impl Into<String>, json: &serde_json::Value) -> Result<Self, CoreError> {
        let raw: MachineConfigRaw = serde_json::from_value(json.clone())?;
        Self::from_raw(name, raw)
    }

    /// Validates a raw configuration.
    ///
    /// `initial`, every source row and every target must be declared states.
    pub fn from_raw(name: impl Into<String>, raw: MachineConfigRaw) -> Result<Self, CoreError> {
        if raw.states.is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: "no states declared".to_string(),
            });
        }

        let mut states = HashSet::new();
        for state in &raw.states {
            if !states.insert(state.as_str()) {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("duplicate state '{}'", state),
                });
            }
        }

        if !states.contains(raw.initial.as_str()) {
            return Err(CoreError::InvalidDefinition {
                reason: format!("initial state '{}' not in states list", raw.initial),
            });
        }

        for (from, row) in &raw.transitions {
            if !states.contains(from.as_str()) {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("transition source '{}' not in states list", from),
                });
            }
            for (event, to) in row {
                if !states.contains(to.as_str()) {
                    return Err(CoreError::InvalidDefinition {
                        reason: format!(
                            "transition target '{}' for '{}' in '{}' not in states list",
                            to, event, from
                        ),
                    });
                }
            }
        }

        Ok(Self::seal(name.into(), raw))
    }

    /// Derives the configuration of a typed lifecycle.
    ///
    /// Cannot fail: every state and target is a value of the lifecycle's
    /// state enum.
    pub fn from_lifecycle<L: Lifecycle>() -> Self {
        let mut transitions = BTreeMap::new();
        for &state in <L::State as Label>::ALL {
            let row: BTreeMap<String, String> = <L::Event as Label>::ALL
                .iter()
                .filter_map(|&event| {
                    L::next(state, event).map(|to| (event.to_string(), to.to_string()))
                })
                .collect();
            transitions.insert(state.to_string(), row);
        }

        let raw = MachineConfigRaw {
            initial: L::INITIAL.to_string(),
            states: <L::State as Label>::ALL.iter().map(|s| s.to_string()).collect(),
            transitions,
        };
        Self::seal(L::KIND.to_string(), raw)
    }

    fn seal(name: String, raw: MachineConfigRaw) -> Self {
        let checksum = format!("{:08x}", crc32c::crc32c(canonical_form(&raw).as_bytes()));
        Self {
            name,
            raw,
            checksum,
        }
    }

    pub fn initial(&self) -> &str {
        &self.raw.initial
    }

    pub fn states(&self) -> &[String] {
        &self.raw.states
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.raw.states.iter().any(|s| s == state)
    }

    /// Looks up the target for `event` in `state`.
    pub fn get_transition(&self, state: &str, event: &str) -> Option<&str> {
        self.raw
            .transitions
            .get(state)
            .and_then(|row| row.get(event))
            .map(String::as_str)
    }

    /// Returns the events accepted in `state`, sorted.
    pub fn events_from(&self, state: &str) -> Vec<&str> {
        self.raw
            .transitions
            .get(state)
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn raw(&self) -> &MachineConfigRaw {
        &self.raw
    }

    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(&self.raw)?)
    }
}

/// Initial, declared states, then each transition. Every name is length
/// prefixed and every list is count prefixed, so names may contain any
/// character without two tables rendering alike.
fn canonical_form(raw: &MachineConfigRaw) -> String {
    let mut out = String::new();
    push_name(&mut out, &raw.initial);

    out.push_str(&format!("{}\n", raw.states.len()));
    for state in &raw.states {
        push_name(&mut out, state);
    }

    out.push_str(&format!("{}\n", raw.transitions.len()));
    for (from, row) in &raw.transitions {
        push_name(&mut out, from);
        out.push_str(&format!("{}\n", row.len()));
        for (event, to) in row {
            push_name(&mut out, event);
            push_name(&mut out, to);
        }
    }
    out
}

fn push_name(out: &mut String, name: &str) {
    out.push_str(&format!("{}:{}\n", name.len(), name));
}

/// Returns the pre-built configurations, keyed by kind.
pub fn builtin_machines() -> &'static BTreeMap<String, Arc<MachineConfig>> {
    static MACHINES: OnceLock<BTreeMap<String, Arc<MachineConfig>>> = OnceLock::new();
    MACHINES.get_or_init(|| {
        [
            MachineConfig::from_lifecycle::<StreamLifecycle>(),
            MachineConfig::from_lifecycle::<ToolLifecycle>(),
            MachineConfig::from_lifecycle::<ApproveLifecycle>(),
        ]
        .into_iter()
        .map(|config| (config.name.clone(), Arc::new(config)))
        .collect()
    })
}

/// Looks up a pre-built configuration.
pub fn builtin_machine(kind: &str) -> Result<Arc<MachineConfig>, CoreError> {
    builtin_machines()
        .get(kind)
        .cloned()
        .ok_or_else(|| CoreError::UnknownMachine {
            kind: kind.to_string(),
        })
}
