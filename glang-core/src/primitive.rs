//! Primitive schema types and the built-in primitive table.
//!
//! A primitive is a named element kind (`tool`, `stream`, ...) with a flat
//! attribute table, a set of lifecycle states and the events it may emit.
//! Schemas are plain serde types so extension manifests can be written in
//! YAML or JSON:
//!
//! ```yaml
//! kind: chart
//! attributes:
//!   type: { type: string, required: true }
//!   animated: { type: boolean, required: false, default: false }
//! states: [loading, ready]
//! events:
//!   - name: chart.render
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Boolean,
    Number,
    Object,
    Array,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::Object => "object",
            ValueType::Array => "array",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema entry for a single attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    #[serde(rename = "type")]
    pub value_type: ValueType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AttributeSpec {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn required(value_type: ValueType) -> Self {
        Self {
            required: true,
            ..Self::new(value_type)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns true if the attribute literal matches the declared type.
    ///
    /// Only `boolean` and `number` are checked; every other type accepts any
    /// literal.
    pub fn accepts(&self, literal: &str) -> bool {
        match self.value_type {
            ValueType::Boolean => matches!(literal, "true" | "false"),
            ValueType::Number => literal
                .trim()
                .parse::<f64>()
                .map(|n| n.is_finite())
                .unwrap_or(false),
            ValueType::String | ValueType::Object | ValueType::Array => true,
        }
    }
}

/// An event a primitive may emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Payload field name -> type name, as declared by the schema author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<BTreeMap<String, String>>,
}

impl EventSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            payload: None,
        }
    }
}

/// Schema for one primitive kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveSchema {
    /// Element kind. May be left empty in manifests, where the map key names it.
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSpec>,

    #[serde(default)]
    pub states: Vec<String>,

    #[serde(default)]
    pub events: Vec<EventSpec>,
}

impl PrimitiveSchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: BTreeMap::new(),
            states: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attributes.insert(name.into(), spec);
        self
    }

    pub fn states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(EventSpec::new).collect();
        self
    }

    /// Returns the attribute spec for `name`, if declared.
    pub fn attribute_spec(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.get(name)
    }

    /// Returns the names of all required attributes.
    pub fn required_attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }

    /// Returns the declared defaults, keyed by attribute name.
    pub fn default_attributes(&self) -> BTreeMap<&str, &Value> {
        self.attributes
            .iter()
            .filter_map(|(name, spec)| spec.default.as_ref().map(|d| (name.as_str(), d)))
            .collect()
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }

    pub fn declares_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e.name == event)
    }
}

/// Returns the process-wide table of built-in primitives.
pub fn builtin_primitives() -> &'static BTreeMap<String, Arc<PrimitiveSchema>> {
    static BUILTINS: OnceLock<BTreeMap<String, Arc<PrimitiveSchema>>> = OnceLock::new();
    BUILTINS.get_or_init(|| {
        builtin_schemas()
            .into_iter()
            .map(|schema| (schema.kind.clone(), Arc::new(schema)))
            .collect()
    })
}

/// Looks up a built-in primitive.
pub fn builtin_primitive(kind: &str) -> Option<&'static Arc<PrimitiveSchema>> {
    builtin_primitives().get(kind)
}

fn builtin_schemas() -> Vec<PrimitiveSchema> {
    use crate::primitive::ValueType::String as Str;
    use crate::primitive::ValueType::{Boolean, Number, Object};

    vec![
        PrimitiveSchema::new("message")
            .attribute("role", AttributeSpec::new(Str).with_default(json!("assistant")))
            .attribute("stream", AttributeSpec::new(Boolean).with_default(json!(false)))
            .attribute("id", AttributeSpec::new(Str))
            .states(["idle", "streaming", "complete"])
            .events(["message.send", "message.receive"]),
        PrimitiveSchema::new("stream")
            .attribute("speed", AttributeSpec::new(Str).with_default(json!("normal")))
            .attribute("cursor", AttributeSpec::new(Boolean).with_default(json!(true)))
            .attribute("markdown", AttributeSpec::new(Boolean).with_default(json!(false)))
            .states(["idle", "generating", "complete", "paused", "error"])
            .events([
                "stream.start",
                "stream.chunk",
                "stream.complete",
                "stream.pause",
                "stream.error",
            ]),
        PrimitiveSchema::new("think")
            .attribute(
                "model",
                AttributeSpec::new(Str).with_default(json!("chain-of-thought")),
            )
            .attribute("visible", AttributeSpec::new(Boolean).with_default(json!(false)))
            .attribute("depth", AttributeSpec::new(Str).with_default(json!("medium")))
            .states(["hidden", "visible"])
            .events(["think.reveal", "think.hide"]),
        PrimitiveSchema::new("tool")
            .attribute("name", AttributeSpec::required(Str))
            .attribute("args", AttributeSpec::new(Object).with_default(json!({})))
            .attribute("status", AttributeSpec::new(Str).with_default(json!("pending")))
            .attribute("mode", AttributeSpec::new(Str).with_default(json!("automatic")))
            .states(["pending", "running", "complete", "error", "cancelled"])
            .events(["tool.start", "tool.progress", "tool.complete", "tool.error"]),
        PrimitiveSchema::new("artifact")
            .attribute("type", AttributeSpec::required(Str))
            .attribute("language", AttributeSpec::new(Str))
            .attribute("title", AttributeSpec::new(Str))
            .attribute("copyable", AttributeSpec::new(Boolean).with_default(json!(false)))
            .attribute(
                "downloadable",
                AttributeSpec::new(Boolean).with_default(json!(false)),
            )
            .states(["loading", "ready", "error"])
            .events(["artifact.load", "artifact.ready", "artifact.error"]),
        PrimitiveSchema::new("approve")
            .attribute("type", AttributeSpec::required(Str))
            .attribute("action", AttributeSpec::required(Str))
            .attribute("warning", AttributeSpec::new(Str))
            .attribute("timeout", AttributeSpec::new(Number))
            .states(["pending", "showing", "approved", "denied", "expired"])
            .events([
                "approve.request",
                "approve.show",
                "approve.approve",
                "approve.deny",
            ]),
        PrimitiveSchema::new("context")
            .attribute("type", AttributeSpec::required(Str))
            .attribute("id", AttributeSpec::required(Str))
            .attribute("name", AttributeSpec::new(Str))
            .attribute("removable", AttributeSpec::new(Boolean).with_default(json!(true)))
            .states(["attached", "loading", "ready", "error"])
            .events(["context.attach", "context.load", "context.remove"]),
        PrimitiveSchema::new("error")
            .attribute("code", AttributeSpec::required(Str))
            .attribute("message", AttributeSpec::required(Str))
            .attribute(
                "recoverable",
                AttributeSpec::new(Boolean).with_default(json!(false)),
            )
            .states(["visible", "acknowledged", "dismissed"])
            .events(["error.occur", "error.retry", "error.dismiss"]),
        PrimitiveSchema::new("input")
            .attribute("type", AttributeSpec::required(Str))
            .attribute("placeholder", AttributeSpec::new(Str))
            .attribute("multiline", AttributeSpec::new(Boolean).with_default(json!(false)))
            .attribute("maxlength", AttributeSpec::new(Number))
            .states(["empty", "typing", "filled", "submitting", "submitted"])
            .events(["input.focus", "input.change", "input.submit"]),
        PrimitiveSchema::new("branch")
            .attribute("id", AttributeSpec::required(Str))
            .attribute("label", AttributeSpec::new(Str))
            .attribute("active", AttributeSpec::new(Boolean).with_default(json!(false)))
            .attribute("mergeable", AttributeSpec::new(Boolean).with_default(json!(false)))
            .states(["created", "expanded", "collapsed", "active", "merged"])
            .events([
                "branch.create",
                "branch.expand",
                "branch.activate",
                "branch.merge",
            ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let builtins = builtin_primitives();
        assert_eq!(builtins.len(), 10);
        for (kind, schema) in builtins {
            assert_eq!(kind, &schema.kind);
            assert!(!schema.states.is_empty());
        }
    }

    #[test]
    fn test_tool_schema() {
        let tool = builtin_primitive("tool").unwrap();
        assert_eq!(tool.required_attributes().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(tool.attribute_spec("args").unwrap().value_type, ValueType::Object);
        assert_eq!(tool.default_attributes()["status"], &json!("pending"));
        assert!(tool.has_state("cancelled"));
        assert!(tool.declares_event("tool.progress"));
        assert!(!tool.declares_event("tool.pause"));
    }

    #[test]
    fn test_attribute_type_check() {
        let boolean = AttributeSpec::new(ValueType::Boolean);
        assert!(boolean.accepts("true"));
        assert!(boolean.accepts("false"));
        assert!(!boolean.accepts("yes"));
        assert!(!boolean.accepts("True"));
        assert!(!boolean.accepts(""));

        let number = AttributeSpec::new(ValueType::Number);
        assert!(number.accepts("30"));
        assert!(number.accepts("-1.5"));
        assert!(!number.accepts("soon"));
        assert!(!number.accepts("NaN"));
        assert!(!number.accepts("inf"));

        let object = AttributeSpec::new(ValueType::Object);
        assert!(object.accepts("not json at all"));
    }

    #[test]
    fn test_schema_from_yaml() {
        let yaml = r#"
kind: chart
attributes:
  type: { type: string, required: true }
  animated: { type: boolean, default: false }
states: [loading, ready]
events:
  - name: chart.render
    description: Rendered a frame
    payload: { frame: number, label: string }
  - name: chart.click
"#;
        let schema: PrimitiveSchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.kind, "chart");
        assert!(schema.attributes["type"].required);
        assert!(!schema.attributes["animated"].required);
        assert_eq!(schema.attributes["animated"].default, Some(json!(false)));
        assert_eq!(schema.events[0].name, "chart.render");

        let payload = schema.events[0].payload.as_ref().unwrap();
        assert_eq!(payload["frame"], "number");
        assert_eq!(payload["label"], "string");
        assert!(schema.events[1].payload.is_none());

        let json = serde_json::to_value(&schema.events).unwrap();
        assert_eq!(json[0]["payload"]["frame"], "number");
        assert!(json[1].get("payload").is_none());
    }
}
