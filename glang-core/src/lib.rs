//! # glang-core
//!
//! Interpretation engine for G-Lang, a markup language describing AI agent
//! interactions (streaming text, tool calls, reasoning, approvals).
//!
//! This crate provides:
//! - Tokenizer and stack-based tree builder
//! - Schema-driven validation against built-in and extension primitives
//! - The parser façade combining the three
//! - A configuration-driven state machine runtime with typed lifecycles
//! - An in-process event bus

pub mod ast;
pub mod definition;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod machine;
pub mod parser;
pub mod primitive;
pub mod registry;
pub mod token;
pub mod validator;

pub use ast::{BuildError, Node, StructureIssue, TreeBuilder, DEFAULT_MAX_DEPTH};
pub use definition::{builtin_machine, builtin_machines, MachineConfig, MachineConfigRaw};
pub use error::{CoreError, Diagnostic};
pub use events::{EventBus, Subscription};
pub use lifecycle::{
    ApproveEvent, ApproveLifecycle, ApproveState, Label, Lifecycle, StreamEvent, StreamLifecycle,
    StreamState, ToolEvent, ToolLifecycle, ToolState, TypedMachine,
};
pub use machine::{create_state_machine, StateMachine, TransitionEvent};
pub use parser::{ParseResult, Parser, ParserOptions};
pub use primitive::{builtin_primitive, builtin_primitives, AttributeSpec, PrimitiveSchema, ValueType};
pub use registry::{Extension, ExtensionRegistry, Middleware, RenderContext, SchemaSource};
pub use token::{tokenize, Token, TokenKind};
pub use validator::{ValidationResult, Validator};
