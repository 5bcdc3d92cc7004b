//! Extension registry and the active primitive table.
//!
//! Each element kind resolves through a small stack of schema sources. The
//! built-in table sits at the bottom; ad-hoc registrations and extension
//! schemas are pushed on top in registration order, and the top entry wins.
//! Unregistering an extension removes its entries wherever they sit, so the
//! next entry down becomes visible again.

use crate::ast::Node;
use crate::error::CoreError;
use crate::primitive::{builtin_primitive, builtin_primitives, PrimitiveSchema};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inputs a render middleware sees.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub tree: &'a Node,
    /// Adapter name, e.g. `"terminal"` or `"dom"`.
    pub adapter: &'a str,
    pub platform: &'a str,
    pub options: &'a Value,
}

pub type MiddlewareHandler = Arc<dyn Fn(&RenderContext<'_>) + Send + Sync>;

/// A render hook contributed by an extension.
#[derive(Clone)]
pub struct Middleware {
    pub name: String,
    /// Higher runs first.
    pub priority: i32,
    pub handler: MiddlewareHandler,
}

impl Middleware {
    pub fn new<F>(name: impl Into<String>, priority: i32, handler: F) -> Self
    where
        F: Fn(&RenderContext<'_>) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// A named bundle of primitives, middleware and theme values.
///
/// Manifests (YAML or JSON) carry everything except middleware, which can
/// only be attached in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub primitives: BTreeMap<String, PrimitiveSchema>,

    #[serde(skip)]
    pub middleware: Vec<Middleware>,

    #[serde(default)]
    pub theme: BTreeMap<String, String>,
}

impl Extension {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Adds a primitive keyed by its schema kind.
    pub fn with_primitive(mut self, schema: PrimitiveSchema) -> Self {
        self.primitives.insert(schema.kind.clone(), schema);
        self
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_theme(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.theme.insert(key.into(), value.into());
        self
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() || self.version.trim().is_empty() {
            return Err(CoreError::InvalidExtension {
                reason: "extension must have a name and a version".to_string(),
            });
        }
        for (key, schema) in &self.primitives {
            if !schema.kind.is_empty() && schema.kind != *key {
                return Err(CoreError::InvalidExtension {
                    reason: format!(
                        "primitive '{}' declares kind '{}'",
                        key, schema.kind
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Where the visible schema for a kind comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Builtin,
    /// Registered directly through [`ExtensionRegistry::register_primitive`].
    AdHoc,
    Extension(String),
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSource::Builtin => f.write_str("builtin"),
            SchemaSource::AdHoc => f.write_str("ad-hoc"),
            SchemaSource::Extension(name) => write!(f, "extension '{}'", name),
        }
    }
}

struct Layer {
    source: SchemaSource,
    schema: Arc<PrimitiveSchema>,
}

#[derive(Default)]
struct RegistryState {
    extensions: BTreeMap<String, Arc<Extension>>,
    /// Extension names in registration order.
    order: Vec<String>,
    /// Kind -> overlay stack, top last. Built-ins are not stored here.
    overlays: HashMap<String, Vec<Layer>>,
}

impl RegistryState {
    fn push_layer(&mut self, kind: &str, source: SchemaSource, mut schema: PrimitiveSchema) {
        if builtin_primitive(kind).is_some() {
            warn!("{} overrides built-in primitive '{}'", source, kind);
        }
        schema.kind = kind.to_string();
        self.overlays.entry(kind.to_string()).or_default().push(Layer {
            source,
            schema: Arc::new(schema),
        });
    }

    fn ordered_extensions(&self) -> impl Iterator<Item = &Arc<Extension>> {
        self.order.iter().filter_map(|name| self.extensions.get(name))
    }
}

/// Registry of extensions and the merged primitive table.
///
/// Shared as `Arc<ExtensionRegistry>` between validators, parsers and
/// callers; all methods take `&self`.
#[derive(Default)]
pub struct ExtensionRegistry {
    state: RwLock<RegistryState>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &state.order)
            .field("overlaid", &state.overlays.len())
            .finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extension and overlays its primitives.
    pub fn register(&self, extension: Extension) -> Result<(), CoreError> {
        extension.check()?;

        let mut state = self.state.write();
        if state.extensions.contains_key(&extension.name) {
            return Err(CoreError::ExtensionExists {
                name: extension.name,
            });
        }

        let source = SchemaSource::Extension(extension.name.clone());
        for (kind, schema) in &extension.primitives {
            state.push_layer(kind, source.clone(), schema.clone());
        }

        info!(
            "registered extension {} v{} ({} primitives, {} middleware)",
            extension.name,
            extension.version,
            extension.primitives.len(),
            extension.middleware.len()
        );

        state.order.push(extension.name.clone());
        state
            .extensions
            .insert(extension.name.clone(), Arc::new(extension));
        Ok(())
    }

    /// Removes an extension and its primitive overlays.
    ///
    /// Returns the removed extension, or `None` if no such name is registered.
    pub fn unregister(&self, name: &str) -> Option<Arc<Extension>> {
        let mut state = self.state.write();
        let removed = state.extensions.remove(name)?;
        state.order.retain(|n| n != name);

        let owner = SchemaSource::Extension(name.to_string());
        state.overlays.retain(|_, stack| {
            stack.retain(|layer| layer.source != owner);
            !stack.is_empty()
        });

        info!("unregistered extension {}", name);
        Some(removed)
    }

    /// Pushes a single schema on top of the stack for `kind`.
    pub fn register_primitive(&self, kind: &str, schema: PrimitiveSchema) {
        debug!("registering primitive '{}'", kind);
        self.state
            .write()
            .push_layer(kind, SchemaSource::AdHoc, schema);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Extension>> {
        self.state.read().extensions.get(name).cloned()
    }

    /// Returns all registered extensions, sorted by name.
    pub fn get_all(&self) -> Vec<Arc<Extension>> {
        self.state.read().extensions.values().cloned().collect()
    }

    /// Returns the visible schema for `kind`.
    pub fn get_primitive(&self, kind: &str) -> Option<Arc<PrimitiveSchema>> {
        let state = self.state.read();
        match state.overlays.get(kind).and_then(|stack| stack.last()) {
            Some(layer) => Some(Arc::clone(&layer.schema)),
            None => builtin_primitive(kind).cloned(),
        }
    }

    pub fn has_primitive(&self, kind: &str) -> bool {
        self.get_primitive(kind).is_some()
    }

    /// Returns where the visible schema for `kind` comes from.
    pub fn source_of(&self, kind: &str) -> Option<SchemaSource> {
        let state = self.state.read();
        match state.overlays.get(kind).and_then(|stack| stack.last()) {
            Some(layer) => Some(layer.source.clone()),
            None => builtin_primitive(kind).map(|_| SchemaSource::Builtin),
        }
    }

    /// Returns the merged view of every visible primitive.
    pub fn get_all_primitives(&self) -> BTreeMap<String, Arc<PrimitiveSchema>> {
        let mut merged = builtin_primitives().clone();
        let state = self.state.read();
        for (kind, stack) in &state.overlays {
            if let Some(layer) = stack.last() {
                merged.insert(kind.clone(), Arc::clone(&layer.schema));
            }
        }
        merged
    }

    /// Drops every extension and ad-hoc schema. Built-ins remain.
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = RegistryState::default();
        info!("cleared extension registry");
    }

    /// Returns all middleware, highest priority first.
    ///
    /// Equal priorities keep registration order.
    pub fn middleware(&self) -> Vec<Middleware> {
        let state = self.state.read();
        let mut all: Vec<Middleware> = state
            .ordered_extensions()
            .flat_map(|ext| ext.middleware.iter().cloned())
            .collect();
        all.sort_by_key(|m| std::cmp::Reverse(m.priority));
        all
    }

    /// Invokes every middleware handler in priority order.
    pub fn run_middleware(&self, ctx: &RenderContext<'_>) {
        // Handlers run without the lock held; they may query the registry.
        for middleware in self.middleware() {
            debug!("running middleware {}", middleware.name);
            (middleware.handler)(ctx);
        }
    }

    /// Returns the merged theme. Later registrations win on key conflicts.
    pub fn theme(&self) -> BTreeMap<String, String> {
        let state = self.state.read();
        let mut theme = BTreeMap::new();
        for ext in state.ordered_extensions() {
            for (key, value) in &ext.theme {
                theme.insert(key.clone(), value.clone());
            }
        }
        theme
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{AttributeSpec, ValueType};
    use parking_lot::Mutex;
    use serde_json::json;

    fn chart() -> PrimitiveSchema {
        PrimitiveSchema::new("chart")
            .attribute("type", AttributeSpec::required(ValueType::String))
            .states(["loading", "ready"])
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ExtensionRegistry::new();
        assert!(!registry.has_primitive("chart"));

        registry
            .register(Extension::new("charts", "1.0.0").with_primitive(chart()))
            .unwrap();

        assert!(registry.has_primitive("chart"));
        assert!(registry.has_primitive("tool"));
        assert_eq!(registry.get("charts").unwrap().version, "1.0.0");
        assert_eq!(
            registry.source_of("chart"),
            Some(SchemaSource::Extension("charts".to_string()))
        );
        assert_eq!(registry.source_of("tool"), Some(SchemaSource::Builtin));
        assert_eq!(registry.get_all_primitives().len(), 11);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = ExtensionRegistry::new();
        registry
            .register(Extension::new("charts", "1.0.0").with_primitive(chart()))
            .unwrap();

        let err = registry
            .register(Extension::new("charts", "2.0.0"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ExtensionExists { ref name } if name == "charts"));

        // First registration is untouched.
        assert_eq!(registry.get("charts").unwrap().version, "1.0.0");
        assert!(registry.has_primitive("chart"));
    }

    #[test]
    fn test_invalid_extensions() {
        let registry = ExtensionRegistry::new();

        let err = registry.register(Extension::new("", "1.0")).unwrap_err();
        assert_eq!(err.error_code(), "BAD_EXTENSION");

        let err = registry.register(Extension::new("x", " ")).unwrap_err();
        assert_eq!(err.error_code(), "BAD_EXTENSION");

        let mut ext = Extension::new("bad", "1.0");
        ext.primitives.insert("graph".to_string(), chart());
        assert!(registry.register(ext).is_err());

        assert!(registry.get_all().is_empty());
    }

    #[test]
    fn test_shadow_and_restore_builtin() {
        let registry = ExtensionRegistry::new();
        let builtin = registry.get_primitive("tool").unwrap();
        assert!(builtin.attribute_spec("name").unwrap().required);

        let relaxed = PrimitiveSchema::new("tool")
            .attribute("name", AttributeSpec::new(ValueType::String));
        registry
            .register(Extension::new("relaxed-tools", "0.1").with_primitive(relaxed))
            .unwrap();
        assert!(!registry
            .get_primitive("tool")
            .unwrap()
            .attribute_spec("name")
            .unwrap()
            .required);

        let removed = registry.unregister("relaxed-tools").unwrap();
        assert_eq!(removed.name, "relaxed-tools");
        assert_eq!(registry.get_primitive("tool").unwrap(), builtin);
        assert_eq!(registry.source_of("tool"), Some(SchemaSource::Builtin));
    }

    #[test]
    fn test_unregister_from_middle_of_stack() {
        let registry = ExtensionRegistry::new();
        let v1 = chart().attribute("v1", AttributeSpec::new(ValueType::String));
        let v2 = chart().attribute("v2", AttributeSpec::new(ValueType::String));

        registry
            .register(Extension::new("a", "1").with_primitive(v1))
            .unwrap();
        registry
            .register(Extension::new("b", "1").with_primitive(v2))
            .unwrap();
        assert!(registry.get_primitive("chart").unwrap().attributes.contains_key("v2"));

        // Removing the lower entry leaves the top visible.
        registry.unregister("a").unwrap();
        assert!(registry.get_primitive("chart").unwrap().attributes.contains_key("v2"));

        registry.unregister("b").unwrap();
        assert!(!registry.has_primitive("chart"));
    }

    #[test]
    fn test_unregister_unknown() {
        let registry = ExtensionRegistry::new();
        assert!(registry.unregister("missing").is_none());
    }

    #[test]
    fn test_ad_hoc_last_wins() {
        let registry = ExtensionRegistry::new();
        registry.register_primitive("note", PrimitiveSchema::new("note").states(["a"]));
        registry.register_primitive("note", PrimitiveSchema::new("ignored").states(["b"]));

        let note = registry.get_primitive("note").unwrap();
        assert_eq!(note.kind, "note");
        assert!(note.has_state("b"));
        assert_eq!(registry.source_of("note"), Some(SchemaSource::AdHoc));
    }

    #[test]
    fn test_get_all_sorted() {
        let registry = ExtensionRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Extension::new(name, "1")).unwrap();
        }
        let names: Vec<_> = registry.get_all().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    fn recorder(
        calls: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
        priority: i32,
    ) -> Middleware {
        let calls = calls.clone();
        Middleware::new(label, priority, move |_| calls.lock().push(label))
    }

    #[test]
    fn test_middleware_priority_order() {
        let registry = ExtensionRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(
                Extension::new("first", "1")
                    .with_middleware(recorder(&calls, "low", 1))
                    .with_middleware(recorder(&calls, "tie-a", 5)),
            )
            .unwrap();
        registry
            .register(
                Extension::new("second", "1")
                    .with_middleware(recorder(&calls, "high", 10))
                    .with_middleware(recorder(&calls, "tie-b", 5)),
            )
            .unwrap();

        let names: Vec<_> = registry.middleware().iter().map(|m| m.name.clone()).collect();
        assert_eq!(names, vec!["high", "tie-a", "tie-b", "low"]);

        let tree = Node::document();
        let options = json!({});
        registry.run_middleware(&RenderContext {
            tree: &tree,
            adapter: "terminal",
            platform: "linux",
            options: &options,
        });

        assert_eq!(*calls.lock(), vec!["high", "tie-a", "tie-b", "low"]);
    }

    #[test]
    fn test_theme_merge() {
        let registry = ExtensionRegistry::new();
        registry
            .register(
                Extension::new("base", "1")
                    .with_theme("accent", "blue")
                    .with_theme("border", "round"),
            )
            .unwrap();
        registry
            .register(Extension::new("dark", "1").with_theme("accent", "magenta"))
            .unwrap();

        let theme = registry.theme();
        assert_eq!(theme["accent"], "magenta");
        assert_eq!(theme["border"], "round");
    }

    #[test]
    fn test_clear() {
        let registry = ExtensionRegistry::new();
        registry
            .register(Extension::new("charts", "1").with_primitive(chart()))
            .unwrap();
        registry.register_primitive("note", PrimitiveSchema::new("note"));

        registry.clear();
        assert!(registry.get_all().is_empty());
        assert!(!registry.has_primitive("chart"));
        assert!(!registry.has_primitive("note"));
        assert!(registry.has_primitive("message"));
    }

    #[test]
    fn test_manifest_from_yaml() {
        let yaml = r#"
name: charts
version: 1.2.0
primitives:
  chart:
    attributes:
      type: { type: string, required: true }
    states: [loading, ready]
theme:
  accent: cyan
"#;
        let ext: Extension = serde_yaml::from_str(yaml).unwrap();
        assert!(ext.middleware.is_empty());

        let registry = ExtensionRegistry::new();
        registry.register(ext).unwrap();
        let chart = registry.get_primitive("chart").unwrap();
        assert_eq!(chart.kind, "chart");
        assert!(chart.attribute_spec("type").unwrap().required);
    }
}
