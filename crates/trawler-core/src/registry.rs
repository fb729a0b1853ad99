//! Explicit component registration.
//!
//! Every pluggable piece of a pipeline — readers, annotators, consumers,
//! orderers, history sinks, shared resources — is constructed through a
//! factory looked up by string identity in a [`ComponentRegistry`]. Callers
//! extend the system by registering additional factories before assembly;
//! there is no runtime class scanning.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Params, Role};
use crate::error::{AssemblyError, Result, StageError};
use crate::history::HistorySink;
use crate::pipeline::orderer::Orderer;
use crate::pipeline::{Annotator, Capability, Consumer, Reader};
use crate::resource::{ResourceKey, ResourceSet, SharedResource};

pub trait ReaderFactory: Send + Sync {
    /// Resource keys this component needs, derived from its merged
    /// parameters. Declared up front so the registry never inspects the
    /// constructed component.
    fn resource_deps(&self, _params: &Params) -> Vec<ResourceKey> {
        Vec::new()
    }

    fn create(
        &self,
        params: &Params,
        resources: &ResourceSet,
    ) -> std::result::Result<Box<dyn Reader>, StageError>;
}

pub trait AnnotatorFactory: Send + Sync {
    /// Capability contract for a stage built with these parameters. Used by
    /// the orderer before any stage or resource is constructed.
    fn capability(&self, params: &Params) -> Capability;

    fn resource_deps(&self, _params: &Params) -> Vec<ResourceKey> {
        Vec::new()
    }

    fn create(
        &self,
        params: &Params,
        resources: &ResourceSet,
    ) -> std::result::Result<Box<dyn Annotator>, StageError>;
}

pub trait ConsumerFactory: Send + Sync {
    fn resource_deps(&self, _params: &Params) -> Vec<ResourceKey> {
        Vec::new()
    }

    fn create(
        &self,
        params: &Params,
        resources: &ResourceSet,
    ) -> std::result::Result<Box<dyn Consumer>, StageError>;
}

pub trait OrdererFactory: Send + Sync {
    fn create(&self) -> Box<dyn Orderer>;
}

pub trait HistoryFactory: Send + Sync {
    fn create(&self, params: &Params) -> std::result::Result<Arc<dyn HistorySink>, StageError>;
}

pub trait ResourceFactory: Send + Sync {
    /// Keys of resources this resource itself needs. Resolved recursively
    /// through the same deduplication table before `create` is called.
    fn depends_on(&self, _params: &Params) -> Vec<ResourceKey> {
        Vec::new()
    }

    fn create(
        &self,
        params: &Params,
        deps: &ResourceSet,
    ) -> std::result::Result<Arc<dyn SharedResource>, StageError>;
}

/// Per-role default namespaces and default implementations, passed into the
/// assembler at build time. Pipelines with different defaults can coexist.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub reader_namespace: String,
    pub annotator_namespace: String,
    pub consumer_namespace: String,
    pub orderer_namespace: String,
    pub history_namespace: String,
    pub resource_namespace: String,
    /// Orderer used when the configuration names none.
    pub orderer: String,
    /// History sink used when the configuration names none.
    pub history: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            reader_namespace: "trawler.readers".into(),
            annotator_namespace: "trawler.annotators".into(),
            consumer_namespace: "trawler.consumers".into(),
            orderer_namespace: "trawler.orderers".into(),
            history_namespace: "trawler.history".into(),
            resource_namespace: "trawler.resources".into(),
            orderer: "trawler.orderers.capability".into(),
            history: "trawler.history.logging".into(),
        }
    }
}

impl Defaults {
    #[must_use]
    pub fn namespace_for(&self, role: Role) -> &str {
        match role {
            Role::Reader => &self.reader_namespace,
            Role::Annotator => &self.annotator_namespace,
            Role::Consumer => &self.consumer_namespace,
            Role::Orderer => &self.orderer_namespace,
            Role::History => &self.history_namespace,
            Role::Resource => &self.resource_namespace,
        }
    }
}

/// String identity → factory maps, one per role.
#[derive(Default)]
pub struct ComponentRegistry {
    readers: HashMap<String, Arc<dyn ReaderFactory>>,
    annotators: HashMap<String, Arc<dyn AnnotatorFactory>>,
    consumers: HashMap<String, Arc<dyn ConsumerFactory>>,
    orderers: HashMap<String, Arc<dyn OrdererFactory>>,
    histories: HashMap<String, Arc<dyn HistoryFactory>>,
    resources: HashMap<String, Arc<dyn ResourceFactory>>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_reader(
        &mut self,
        id: impl Into<String>,
        factory: impl ReaderFactory + 'static,
    ) {
        self.readers.insert(id.into(), Arc::new(factory));
    }

    pub fn register_annotator(
        &mut self,
        id: impl Into<String>,
        factory: impl AnnotatorFactory + 'static,
    ) {
        self.annotators.insert(id.into(), Arc::new(factory));
    }

    pub fn register_consumer(
        &mut self,
        id: impl Into<String>,
        factory: impl ConsumerFactory + 'static,
    ) {
        self.consumers.insert(id.into(), Arc::new(factory));
    }

    pub fn register_orderer(
        &mut self,
        id: impl Into<String>,
        factory: impl OrdererFactory + 'static,
    ) {
        self.orderers.insert(id.into(), Arc::new(factory));
    }

    pub fn register_history(
        &mut self,
        id: impl Into<String>,
        factory: impl HistoryFactory + 'static,
    ) {
        self.histories.insert(id.into(), Arc::new(factory));
    }

    pub fn register_resource(
        &mut self,
        id: impl Into<String>,
        factory: impl ResourceFactory + 'static,
    ) {
        self.resources.insert(id.into(), Arc::new(factory));
    }

    /// Resolve a declared name to its canonical registered identity: the
    /// name verbatim first, then under the role's default namespace.
    pub fn resolve_class(&self, role: Role, name: &str, defaults: &Defaults) -> Result<String> {
        let registered = |id: &str| -> bool {
            match role {
                Role::Reader => self.readers.contains_key(id),
                Role::Annotator => self.annotators.contains_key(id),
                Role::Consumer => self.consumers.contains_key(id),
                Role::Orderer => self.orderers.contains_key(id),
                Role::History => self.histories.contains_key(id),
                Role::Resource => self.resources.contains_key(id),
            }
        };

        if registered(name) {
            return Ok(name.to_string());
        }

        let namespaced = format!("{}.{name}", defaults.namespace_for(role));
        if registered(&namespaced) {
            return Ok(namespaced);
        }

        Err(AssemblyError::UnresolvableComponent {
            role,
            name: name.to_string(),
        })
    }

    pub fn reader_factory(&self, canonical: &str) -> Result<Arc<dyn ReaderFactory>> {
        self.readers
            .get(canonical)
            .cloned()
            .ok_or_else(|| unresolvable(Role::Reader, canonical))
    }

    pub fn annotator_factory(&self, canonical: &str) -> Result<Arc<dyn AnnotatorFactory>> {
        self.annotators
            .get(canonical)
            .cloned()
            .ok_or_else(|| unresolvable(Role::Annotator, canonical))
    }

    pub fn consumer_factory(&self, canonical: &str) -> Result<Arc<dyn ConsumerFactory>> {
        self.consumers
            .get(canonical)
            .cloned()
            .ok_or_else(|| unresolvable(Role::Consumer, canonical))
    }

    pub fn history_factory(&self, canonical: &str) -> Result<Arc<dyn HistoryFactory>> {
        self.histories
            .get(canonical)
            .cloned()
            .ok_or_else(|| unresolvable(Role::History, canonical))
    }

    /// Resolve and fetch an orderer factory in one step; the assembler's
    /// fallback chain wants resolution failures as values, not panics.
    pub fn resolve_orderer(
        &self,
        name: &str,
        defaults: &Defaults,
    ) -> Result<(String, Arc<dyn OrdererFactory>)> {
        let canonical = self.resolve_class(Role::Orderer, name, defaults)?;
        let factory = self
            .orderers
            .get(&canonical)
            .cloned()
            .ok_or_else(|| unresolvable(Role::Orderer, &canonical))?;
        Ok((canonical, factory))
    }

    /// Resolve and fetch a resource factory, returning the canonical
    /// identity used for deduplication.
    pub fn resolve_resource(
        &self,
        name: &str,
        defaults: &Defaults,
    ) -> Result<(String, Arc<dyn ResourceFactory>)> {
        let canonical = self.resolve_class(Role::Resource, name, defaults)?;
        let factory = self
            .resources
            .get(&canonical)
            .cloned()
            .ok_or_else(|| unresolvable(Role::Resource, &canonical))?;
        Ok((canonical, factory))
    }
}

fn unresolvable(role: Role, name: &str) -> AssemblyError {
    AssemblyError::UnresolvableComponent {
        role,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbatim_identity_wins_over_namespace() {
        let registry = ComponentRegistry::with_builtins();
        let defaults = Defaults::default();

        let canonical = registry
            .resolve_class(Role::Reader, "trawler.readers.memory", &defaults)
            .unwrap();
        assert_eq!(canonical, "trawler.readers.memory");
    }

    #[test]
    fn shorthand_falls_back_to_role_namespace() {
        let registry = ComponentRegistry::with_builtins();
        let defaults = Defaults::default();

        let canonical = registry
            .resolve_class(Role::Annotator, "regex", &defaults)
            .unwrap();
        assert_eq!(canonical, "trawler.annotators.regex");
    }

    #[test]
    fn unknown_name_is_unresolvable() {
        let registry = ComponentRegistry::with_builtins();
        let defaults = Defaults::default();

        let err = registry
            .resolve_class(Role::Annotator, "NoSuchClass", &defaults)
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::UnresolvableComponent {
                role: Role::Annotator,
                ref name,
            } if name == "NoSuchClass"
        ));
    }

    #[test]
    fn roles_have_separate_namespaces() {
        let registry = ComponentRegistry::with_builtins();
        let defaults = Defaults::default();

        // "memory" exists as both a reader and a history sink; each role
        // resolves within its own map.
        let reader = registry
            .resolve_class(Role::Reader, "memory", &defaults)
            .unwrap();
        let history = registry
            .resolve_class(Role::History, "memory", &defaults)
            .unwrap();
        assert_eq!(reader, "trawler.readers.memory");
        assert_eq!(history, "trawler.history.memory");
    }
}
