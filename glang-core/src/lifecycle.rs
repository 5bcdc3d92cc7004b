//! Typed lifecycles for the pre-built machines.
//!
//! Each lifecycle pairs closed state and event enums with a transition
//! function. The string configuration a [`StateMachine`] runs is derived from
//! that function, so the tables cannot name an undeclared state.
//! [`TypedMachine`] drives a lifecycle with enum values only.

use crate::definition::MachineConfig;
use crate::error::CoreError;
use crate::events::Subscription;
use crate::machine::{StateMachine, TransitionEvent};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A closed set of string-labelled values.
pub trait Label: Copy + Eq + fmt::Debug + fmt::Display + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == label)
    }
}

macro_rules! labels {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl Label for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// A machine kind with typed states and events.
pub trait Lifecycle {
    type State: Label;
    type Event: Label;

    /// Machine kind, e.g. `"stream"`.
    const KIND: &'static str;
    const INITIAL: Self::State;

    /// Target of `event` in `state`, if the transition exists.
    fn next(state: Self::State, event: Self::Event) -> Option<Self::State>;
}

labels! {
    /// States of a streaming response.
    pub enum StreamState {
        Idle => "idle",
        Generating => "generating",
        Paused => "paused",
        Resuming => "resuming",
        Complete => "complete",
        Error => "error",
    }
}

labels! {
    pub enum StreamEvent {
        Start => "start",
        Chunk => "chunk",
        Pause => "pause",
        Resume => "resume",
        Complete => "complete",
        Error => "error",
        Retry => "retry",
        Cancel => "cancel",
    }
}

pub struct StreamLifecycle;

impl Lifecycle for StreamLifecycle {
    type State = StreamState;
    type Event = StreamEvent;

    const KIND: &'static str = "stream";
    const INITIAL: StreamState = StreamState::Idle;

    fn next(state: StreamState, event: StreamEvent) -> Option<StreamState> {
        use StreamEvent as E;
        use StreamState as S;

        Some(match (state, event) {
            (S::Idle, E::Start) => S::Generating,
            (S::Generating, E::Chunk) => S::Generating,
            (S::Generating, E::Pause) => S::Paused,
            (S::Generating, E::Complete) => S::Complete,
            (S::Generating, E::Error) => S::Error,
            (S::Paused, E::Resume) => S::Resuming,
            (S::Paused, E::Cancel) => S::Idle,
            (S::Resuming, E::Resume) => S::Generating,
            (S::Resuming, E::Error) => S::Error,
            (S::Complete, E::Start) => S::Generating,
            (S::Error, E::Retry) => S::Generating,
            (S::Error, E::Cancel) => S::Idle,
            _ => return None,
        })
    }
}

labels! {
    /// States of a tool invocation.
    pub enum ToolState {
        Pending => "pending",
        Running => "running",
        Complete => "complete",
        Skipped => "skipped",
        Error => "error",
        Retry => "retry",
        Cancelled => "cancelled",
    }
}

labels! {
    pub enum ToolEvent {
        Start => "start",
        Skip => "skip",
        Cancel => "cancel",
        Complete => "complete",
        Error => "error",
        Retry => "retry",
    }
}

pub struct ToolLifecycle;

impl Lifecycle for ToolLifecycle {
    type State = ToolState;
    type Event = ToolEvent;

    const KIND: &'static str = "tool";
    const INITIAL: ToolState = ToolState::Pending;

    fn next(state: ToolState, event: ToolEvent) -> Option<ToolState> {
        use ToolEvent as E;
        use ToolState as S;

        Some(match (state, event) {
            (S::Pending, E::Start) => S::Running,
            (S::Pending, E::Skip) => S::Skipped,
            (S::Pending, E::Cancel) => S::Cancelled,
            (S::Running, E::Complete) => S::Complete,
            (S::Running, E::Error) => S::Error,
            (S::Running, E::Cancel) => S::Cancelled,
            (S::Error, E::Retry) => S::Retry,
            (S::Error, E::Cancel) => S::Cancelled,
            (S::Retry, E::Retry) => S::Running,
            (S::Retry, E::Cancel) => S::Cancelled,
            (S::Complete, E::Start) => S::Running,
            _ => return None,
        })
    }
}

labels! {
    /// States of an approval request.
    pub enum ApproveState {
        Pending => "pending",
        Showing => "showing",
        Approved => "approved",
        Denied => "denied",
        Expired => "expired",
        Executing => "executing",
        Complete => "complete",
    }
}

labels! {
    pub enum ApproveEvent {
        Show => "show",
        Approve => "approve",
        Deny => "deny",
        Expire => "expire",
        Execute => "execute",
        Complete => "complete",
    }
}

pub struct ApproveLifecycle;

impl Lifecycle for ApproveLifecycle {
    type State = ApproveState;
    type Event = ApproveEvent;

    const KIND: &'static str = "approve";
    const INITIAL: ApproveState = ApproveState::Pending;

    fn next(state: ApproveState, event: ApproveEvent) -> Option<ApproveState> {
        use ApproveEvent as E;
        use ApproveState as S;

        Some(match (state, event) {
            (S::Pending, E::Show) => S::Showing,
            (S::Pending, E::Expire) => S::Expired,
            (S::Showing, E::Approve) => S::Approved,
            (S::Showing, E::Deny) => S::Denied,
            (S::Showing, E::Expire) => S::Expired,
            (S::Approved, E::Execute) => S::Executing,
            (S::Executing, E::Complete) => S::Complete,
            _ => return None,
        })
    }
}

/// A state machine driven by typed events.
pub struct TypedMachine<L: Lifecycle> {
    inner: StateMachine,
    _lifecycle: PhantomData<L>,
}

impl<L: Lifecycle> fmt::Debug for TypedMachine<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedMachine")
            .field("kind", &L::KIND)
            .field("state", &self.inner.state())
            .finish()
    }
}

impl<L: Lifecycle> Default for TypedMachine<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Lifecycle> TypedMachine<L> {
    pub fn new() -> Self {
        Self::from_machine(StateMachine::new(Arc::new(MachineConfig::from_lifecycle::<L>())))
    }

    fn from_machine(inner: StateMachine) -> Self {
        Self {
            inner,
            _lifecycle: PhantomData,
        }
    }

    pub fn state(&self) -> L::State {
        // The config is derived from L, so every label parses.
        L::State::from_label(self.inner.state()).unwrap_or(L::INITIAL)
    }

    pub fn history(&self) -> Vec<L::State> {
        self.inner
            .history()
            .iter()
            .filter_map(|s| L::State::from_label(s))
            .collect()
    }

    pub fn can_transition(&self, event: L::Event) -> bool {
        L::next(self.state(), event).is_some()
    }

    /// Fires `event` and returns the new state.
    pub fn transition(&mut self, event: L::Event, payload: Value) -> Result<L::State, CoreError> {
        self.inner.transition(event.as_str(), payload)?;
        Ok(self.state())
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn subscribe<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.inner.subscribe(event, callback)
    }

    /// The underlying string-keyed machine.
    pub fn as_machine(&self) -> &StateMachine {
        &self.inner
    }

    pub fn into_machine(self) -> StateMachine {
        self.inner
    }
}
