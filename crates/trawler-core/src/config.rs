//! Declarative pipeline configuration.
//!
//! A pipeline is described by a YAML tree with five recognized top-level
//! keys — `collectionreader`, `annotators`, `consumers`, `orderer`, and
//! `history` — and any number of additional subtrees, which are treated as
//! global parameter namespaces and flattened to dotted keys:
//!
//! ```yaml
//! shape:
//!   color: red
//!   size: large
//!
//! collectionreader:
//!   class: text_dir
//!   input: /data/input
//!
//! annotators:
//!   - sentence
//!   - class: regex
//!     pattern: '\bC/S [A-Z]+\b'
//!     tag: Callsign
//!
//! consumers:
//!   - class: jsonl
//!     output: /data/out.jsonl
//!     shape.color: green
//! ```
//!
//! Every component sees the merged parameter map: the flattened globals
//! (here `shape.color`, `shape.size`) overlaid by its own local keys, with
//! local values winning on conflict. Class names are resolved against the
//! component registry: verbatim first, then under the default namespace for
//! the component's role.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_yaml::Value;

use crate::error::{AssemblyError, Result};
use crate::registry::{ComponentRegistry, Defaults};

/// Merged parameter key under which every component can see the name of the
/// pipeline it belongs to.
pub const PIPELINE_NAME_KEY: &str = "pipeline.name";

const CLASS_KEY: &str = "class";
const READER_KEY: &str = "collectionreader";
const ANNOTATORS_KEY: &str = "annotators";
const CONSUMERS_KEY: &str = "consumers";
const ORDERER_KEY: &str = "orderer";
const HISTORY_KEY: &str = "history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Reader,
    Annotator,
    Consumer,
    Orderer,
    History,
    Resource,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "collection reader",
            Self::Annotator => "annotator",
            Self::Consumer => "consumer",
            Self::Orderer => "orderer",
            Self::History => "history sink",
            Self::Resource => "resource",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single configuration value: a scalar or a list of scalars.
///
/// Implements `Eq` and `Hash` (floats compare by bit pattern) so parameter
/// maps can take part in resource deduplication keys.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Flattened, dotted-key parameter map. `BTreeMap` keeps iteration
/// deterministic, which keeps assembly reproducible.
pub type Params = BTreeMap<String, ParamValue>;

/// A named pipeline description: the raw configuration tree as given by the
/// caller. Immutable once passed to assembly; the assembled pipeline keeps
/// it for provenance.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub name: String,
    pub tree: Value,
}

impl PipelineSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, tree: Value) -> Self {
        Self {
            name: name.into(),
            tree,
        }
    }

    pub fn from_yaml(name: impl Into<String>, yaml: &str) -> Result<Self> {
        let tree: Value = serde_yaml::from_str(yaml)?;
        Ok(Self::new(name, tree))
    }
}

/// One resolved component: canonical class identity plus merged parameters.
/// `declared` and `position` preserve the original form for diagnostics.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    pub role: Role,
    pub class: String,
    pub declared: String,
    pub position: usize,
    pub params: Params,
}

/// An annotator or consumer entry that failed resolution and was skipped.
#[derive(Debug)]
pub struct DroppedComponent {
    pub role: Role,
    pub declared: String,
    pub position: usize,
    pub error: AssemblyError,
}

/// Output of configuration resolution: everything the assembler needs.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub reader: ComponentSpec,
    pub annotators: Vec<ComponentSpec>,
    pub consumers: Vec<ComponentSpec>,
    /// Declared orderer class, if any. Resolution and fallback are handled
    /// at assembly time.
    pub orderer: Option<String>,
    pub history: ComponentSpec,
    pub globals: Params,
    pub dropped: Vec<DroppedComponent>,
}

/// Turns a raw configuration tree into normalized component specs.
pub struct ConfigResolver<'a> {
    registry: &'a ComponentRegistry,
    defaults: &'a Defaults,
}

impl<'a> ConfigResolver<'a> {
    #[must_use]
    pub fn new(registry: &'a ComponentRegistry, defaults: &'a Defaults) -> Self {
        Self { registry, defaults }
    }

    pub fn resolve(&self, spec: &PipelineSpec) -> Result<ResolvedConfig> {
        let Value::Mapping(tree) = &spec.tree else {
            return Err(AssemblyError::InvalidConfig(
                "pipeline configuration must be a mapping".into(),
            ));
        };

        let mut globals = Params::new();
        let mut reader_entry = None;
        let mut annotator_entries: &[Value] = &[];
        let mut consumer_entries: &[Value] = &[];
        let mut orderer = None;
        let mut history_entry = None;

        for (key, value) in tree {
            let Some(key) = key.as_str() else {
                return Err(AssemblyError::InvalidConfig(format!(
                    "non-string top-level key: {key:?}"
                )));
            };

            match key {
                READER_KEY => reader_entry = Some(value),
                ANNOTATORS_KEY => annotator_entries = entry_list(key, value)?,
                CONSUMERS_KEY => consumer_entries = entry_list(key, value)?,
                ORDERER_KEY => orderer = entry_class_name(value),
                HISTORY_KEY => history_entry = Some(value),
                _ => flatten_into(&mut globals, key.to_string(), value)?,
            }
        }

        globals.insert(
            PIPELINE_NAME_KEY.to_string(),
            ParamValue::Str(spec.name.clone()),
        );

        let reader_entry = reader_entry
            .ok_or_else(|| AssemblyError::MissingParameter(READER_KEY.to_string()))?;
        let reader = self.resolve_entry(Role::Reader, reader_entry, 0, &globals)?;

        let mut dropped = Vec::new();
        let annotators =
            self.resolve_entries(Role::Annotator, annotator_entries, &globals, &mut dropped);
        let consumers =
            self.resolve_entries(Role::Consumer, consumer_entries, &globals, &mut dropped);

        let history = self.resolve_history(history_entry, &globals)?;

        Ok(ResolvedConfig {
            reader,
            annotators,
            consumers,
            orderer,
            history,
            globals,
            dropped,
        })
    }

    /// Resolve a list of annotator/consumer entries. A failure drops that
    /// entry and continues with the rest.
    fn resolve_entries(
        &self,
        role: Role,
        entries: &[Value],
        globals: &Params,
        dropped: &mut Vec<DroppedComponent>,
    ) -> Vec<ComponentSpec> {
        let mut specs = Vec::with_capacity(entries.len());

        for (position, entry) in entries.iter().enumerate() {
            match self.resolve_entry(role, entry, position, globals) {
                Ok(spec) => specs.push(spec),
                Err(error) => {
                    let declared = entry_class_name(entry).unwrap_or_else(|| "<unknown>".into());
                    tracing::error!(
                        %role,
                        class = %declared,
                        position,
                        %error,
                        "component could not be resolved and has been skipped"
                    );
                    dropped.push(DroppedComponent {
                        role,
                        declared,
                        position,
                        error,
                    });
                }
            }
        }

        specs
    }

    fn resolve_entry(
        &self,
        role: Role,
        entry: &Value,
        position: usize,
        globals: &Params,
    ) -> Result<ComponentSpec> {
        let (declared, locals) = parse_entry(entry)?;
        let class = self
            .registry
            .resolve_class(role, &declared, self.defaults)?;

        let mut params = globals.clone();
        params.extend(locals);

        Ok(ComponentSpec {
            role,
            class,
            declared,
            position,
            params,
        })
    }

    /// The history sink entry is optional, and an unresolvable declared
    /// class falls back to the default implementation with a warning.
    fn resolve_history(&self, entry: Option<&Value>, globals: &Params) -> Result<ComponentSpec> {
        if let Some(entry) = entry {
            match self.resolve_entry(Role::History, entry, 0, globals) {
                Ok(spec) => return Ok(spec),
                Err(error) => {
                    tracing::warn!(
                        %error,
                        "declared history sink unavailable, using the default"
                    );
                }
            }
        }

        let class =
            self.registry
                .resolve_class(Role::History, &self.defaults.history, self.defaults)?;
        Ok(ComponentSpec {
            role: Role::History,
            class,
            declared: self.defaults.history.clone(),
            position: 0,
            params: globals.clone(),
        })
    }
}

/// A component entry is either a bare class-name string or a mapping with a
/// `class` key plus local parameters. Returns the declared class name and
/// the flattened local parameters.
fn parse_entry(entry: &Value) -> Result<(String, Params)> {
    match entry {
        Value::String(name) => Ok((name.clone(), Params::new())),
        Value::Mapping(mapping) => {
            let mut class = None;
            let mut locals = Params::new();

            for (key, value) in mapping {
                let Some(key) = key.as_str() else {
                    return Err(AssemblyError::InvalidConfig(format!(
                        "non-string key in component entry: {key:?}"
                    )));
                };
                if key == CLASS_KEY {
                    class = value.as_str().map(ToString::to_string);
                } else {
                    flatten_into(&mut locals, key.to_string(), value)?;
                }
            }

            let class =
                class.ok_or_else(|| AssemblyError::MissingParameter(CLASS_KEY.to_string()))?;
            Ok((class, locals))
        }
        other => Err(AssemblyError::InvalidConfig(format!(
            "component entry must be a string or mapping, got {other:?}"
        ))),
    }
}

/// Extract the class name of an entry without resolving it. Used for the
/// `orderer` key and for diagnostics on dropped entries.
fn entry_class_name(entry: &Value) -> Option<String> {
    match entry {
        Value::String(name) => Some(name.clone()),
        Value::Mapping(mapping) => mapping
            .get(CLASS_KEY)
            .and_then(Value::as_str)
            .map(ToString::to_string),
        _ => None,
    }
}

fn entry_list<'v>(key: &str, value: &'v Value) -> Result<&'v [Value]> {
    match value {
        Value::Sequence(entries) => Ok(entries),
        Value::Null => Ok(&[]),
        _ => Err(AssemblyError::InvalidConfig(format!(
            "'{key}' must be a list"
        ))),
    }
}

/// Recursively flatten a subtree into dotted keys: `shape: {color: red}`
/// becomes `shape.color = red`. Scalars insert directly; lists keep their
/// scalar items; nulls are dropped.
fn flatten_into(out: &mut Params, key: String, value: &Value) -> Result<()> {
    match value {
        Value::Mapping(mapping) => {
            for (sub, item) in mapping {
                let Some(sub) = sub.as_str() else {
                    return Err(AssemblyError::InvalidConfig(format!(
                        "non-string key under '{key}': {sub:?}"
                    )));
                };
                flatten_into(out, format!("{key}.{sub}"), item)?;
            }
            Ok(())
        }
        Value::Sequence(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                let Some(scalar) = scalar_value(item) else {
                    return Err(AssemblyError::InvalidConfig(format!(
                        "list parameter '{key}' may only contain scalars"
                    )));
                };
                list.push(scalar);
            }
            out.insert(key, ParamValue::List(list));
            Ok(())
        }
        Value::Null => Ok(()),
        other => {
            let Some(scalar) = scalar_value(other) else {
                return Err(AssemblyError::InvalidConfig(format!(
                    "unsupported value for parameter '{key}'"
                )));
            };
            out.insert(key, scalar);
            Ok(())
        }
    }
}

fn scalar_value(value: &Value) -> Option<ParamValue> {
    match value {
        Value::Bool(b) => Some(ParamValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(ParamValue::Int)
            .or_else(|| n.as_f64().map(ParamValue::Float)),
        Value::String(s) => Some(ParamValue::Str(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;

    fn resolver_fixtures() -> (ComponentRegistry, Defaults) {
        (ComponentRegistry::with_builtins(), Defaults::default())
    }

    fn resolve(yaml: &str) -> Result<ResolvedConfig> {
        let (registry, defaults) = resolver_fixtures();
        let spec = PipelineSpec::from_yaml("test", yaml)?;
        ConfigResolver::new(&registry, &defaults).resolve(&spec)
    }

    #[test]
    fn flattens_nested_globals_to_dotted_keys() {
        let config = resolve(
            r"
shape:
  color: red
  size: large
collectionreader: memory
",
        )
        .unwrap();

        assert_eq!(
            config.globals.get("shape.color"),
            Some(&ParamValue::Str("red".into()))
        );
        assert_eq!(
            config.globals.get("shape.size"),
            Some(&ParamValue::Str("large".into()))
        );
    }

    #[test]
    fn pipeline_name_is_injected_into_globals() {
        let config = resolve("collectionreader: memory").unwrap();

        assert_eq!(
            config.globals.get(PIPELINE_NAME_KEY),
            Some(&ParamValue::Str("test".into()))
        );
        assert_eq!(
            config.reader.params.get(PIPELINE_NAME_KEY),
            Some(&ParamValue::Str("test".into()))
        );
    }

    #[test]
    fn local_parameters_override_globals() {
        let config = resolve(
            r"
x:
  y: 5
collectionreader: memory
annotators:
  - class: sentence
    x.y: 9
  - sentence
",
        )
        .unwrap();

        assert_eq!(
            config.annotators[0].params.get("x.y"),
            Some(&ParamValue::Int(9))
        );
        assert_eq!(
            config.annotators[1].params.get("x.y"),
            Some(&ParamValue::Int(5))
        );
    }

    #[test]
    fn missing_reader_is_fatal() {
        let err = resolve("annotators:\n  - sentence\n").unwrap_err();
        assert!(matches!(err, AssemblyError::MissingParameter(ref key) if key == "collectionreader"));
    }

    #[test]
    fn unresolvable_reader_is_fatal() {
        let err = resolve("collectionreader: NoSuchReader").unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::UnresolvableComponent {
                role: Role::Reader,
                ..
            }
        ));
    }

    #[test]
    fn unresolvable_annotator_is_dropped_not_fatal() {
        let config = resolve(
            r"
collectionreader: memory
annotators:
  - sentence
  - NoSuchClass
  - sentence
",
        )
        .unwrap();

        assert_eq!(config.annotators.len(), 2);
        assert_eq!(config.dropped.len(), 1);
        assert_eq!(config.dropped[0].declared, "NoSuchClass");
        assert_eq!(config.dropped[0].position, 1);
    }

    #[test]
    fn shorthand_resolves_under_default_namespace() {
        let config = resolve("collectionreader: memory").unwrap();
        assert_eq!(config.reader.class, "trawler.readers.memory");
        assert_eq!(config.reader.declared, "memory");
    }

    #[test]
    fn entry_without_class_key_is_dropped() {
        let config = resolve(
            r"
collectionreader: memory
annotators:
  - pattern: abc
",
        )
        .unwrap();

        assert!(config.annotators.is_empty());
        assert_eq!(config.dropped.len(), 1);
    }

    #[test]
    fn orderer_class_is_extracted_without_resolution() {
        let config = resolve(
            r"
orderer: NoSuchOrderer
collectionreader: memory
",
        )
        .unwrap();
        assert_eq!(config.orderer.as_deref(), Some("NoSuchOrderer"));
    }

    #[test]
    fn history_defaults_to_logging_sink() {
        let config = resolve("collectionreader: memory").unwrap();
        assert_eq!(config.history.class, "trawler.history.logging");
    }

    #[test]
    fn declared_history_with_params_is_used() {
        let config = resolve(
            r"
history:
  class: memory
collectionreader: memory
",
        )
        .unwrap();
        assert_eq!(config.history.class, "trawler.history.memory");
    }

    #[test]
    fn merge_is_total_for_unshadowed_globals() {
        let config = resolve(
            r"
shape:
  color: red
  size: large
collectionreader: memory
consumers:
  - class: logging
    shape.color: green
",
        )
        .unwrap();

        let consumer = &config.consumers[0];
        assert_eq!(
            consumer.params.get("shape.color"),
            Some(&ParamValue::Str("green".into()))
        );
        assert_eq!(
            consumer.params.get("shape.size"),
            Some(&ParamValue::Str("large".into()))
        );
    }
}
