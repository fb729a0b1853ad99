//! Shared resource construction and deduplication.
//!
//! Components declare the resource keys they need; the registry constructs
//! each distinct key exactly once per pipeline build and hands out
//! reference-identical handles. Resources may depend on other resources;
//! dependency resolution is recursive through the same table and rejects
//! cycles.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{ParamValue, Params};
use crate::error::{AssemblyError, Result};
use crate::registry::{ComponentRegistry, Defaults};

/// Deduplication identity: resource class plus constructor parameters.
/// Two requests with an identical key resolve to the same handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub class: String,
    pub params: Params,
}

impl ResourceKey {
    #[must_use]
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            params: Params::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class)?;
        if !self.params.is_empty() {
            f.write_str(" {")?;
            for (i, (k, v)) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}

/// A shared resource owned by the registry for the pipeline's lifetime.
///
/// Implementations must be safe for concurrent use by multiple stages; the
/// registry adds no locking of its own. `release` is called exactly once at
/// pipeline teardown, in reverse construction order.
pub trait SharedResource: Send + Sync + std::fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    fn release(&self) {}
}

pub type ResourceHandle = Arc<dyn SharedResource>;

/// The handles a single component receives, keyed by the class it declared
/// them under.
#[derive(Default)]
pub struct ResourceSet {
    handles: HashMap<String, ResourceHandle>,
}

impl ResourceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &ResourceKey, handle: ResourceHandle) {
        self.handles.insert(key.class.clone(), handle);
    }

    #[must_use]
    pub fn get(&self, class: &str) -> Option<&ResourceHandle> {
        self.handles.get(class)
    }

    /// Downcast a handle to its concrete type.
    #[must_use]
    pub fn get_as<T: 'static>(&self, class: &str) -> Option<&T> {
        self.handles.get(class)?.as_any().downcast_ref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Per-pipeline resource table. `get_or_create` is idempotent: the first
/// request for a key constructs the resource, later requests return clones
/// of the same `Arc`.
pub struct ResourceRegistry {
    registry: Arc<ComponentRegistry>,
    defaults: Defaults,
    handles: HashMap<ResourceKey, ResourceHandle>,
    construction_order: Vec<ResourceKey>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>, defaults: Defaults) -> Self {
        Self {
            registry,
            defaults,
            handles: HashMap::new(),
            construction_order: Vec::new(),
        }
    }

    pub fn get_or_create(&mut self, key: &ResourceKey) -> Result<ResourceHandle> {
        let mut path = Vec::new();
        self.build(key, &mut path)
    }

    fn build(&mut self, key: &ResourceKey, path: &mut Vec<ResourceKey>) -> Result<ResourceHandle> {
        let (canonical, factory) = self.registry.resolve_resource(&key.class, &self.defaults)?;
        let key = ResourceKey {
            class: canonical,
            params: key.params.clone(),
        };

        if let Some(handle) = self.handles.get(&key) {
            return Ok(handle.clone());
        }

        if path.contains(&key) {
            let mut cycle: Vec<String> = path.iter().map(|k| k.class.clone()).collect();
            cycle.push(key.class.clone());
            return Err(AssemblyError::CyclicResourceDependency { path: cycle });
        }

        path.push(key.clone());

        let mut deps = ResourceSet::new();
        for dep in factory.depends_on(&key.params) {
            let handle = self.build(&dep, path)?;
            deps.insert(&dep, handle);
        }

        let handle = factory.create(&key.params, &deps).map_err(|source| {
            AssemblyError::ResourceConstruction {
                class: key.class.clone(),
                source,
            }
        })?;

        path.pop();
        tracing::debug!(resource = %key, "constructed shared resource");

        self.handles.insert(key.clone(), handle.clone());
        self.construction_order.push(key);
        Ok(handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every constructed handle, newest first. Idempotent; also runs
    /// on drop, so a failed assembly releases whatever it had built.
    pub fn release_all(&mut self) {
        for key in self.construction_order.drain(..).rev() {
            if let Some(handle) = self.handles.remove(&key) {
                tracing::debug!(resource = %key, "releasing shared resource");
                handle.release();
            }
        }
        self.handles.clear();
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::StageError;
    use crate::registry::ResourceFactory;

    #[derive(Debug)]
    struct Token {
        released: Arc<AtomicUsize>,
    }

    impl SharedResource for Token {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TokenFactory {
        created: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl ResourceFactory for TokenFactory {
        fn create(
            &self,
            _params: &Params,
            _deps: &ResourceSet,
        ) -> std::result::Result<Arc<dyn SharedResource>, StageError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Token {
                released: self.released.clone(),
            }))
        }
    }

    /// Depends on another resource class given by the `next` param; used to
    /// wire chains and cycles in tests.
    struct ChainFactory;

    impl ResourceFactory for ChainFactory {
        fn depends_on(&self, params: &Params) -> Vec<ResourceKey> {
            params
                .get("next")
                .and_then(ParamValue::as_str)
                .map(ResourceKey::new)
                .into_iter()
                .collect()
        }

        fn create(
            &self,
            _params: &Params,
            _deps: &ResourceSet,
        ) -> std::result::Result<Arc<dyn SharedResource>, StageError> {
            Ok(Arc::new(Unit))
        }
    }

    /// Always depends on the class named by its type parameter-ish field.
    struct NeedsFactory(&'static str);

    impl ResourceFactory for NeedsFactory {
        fn depends_on(&self, _params: &Params) -> Vec<ResourceKey> {
            vec![ResourceKey::new(self.0)]
        }

        fn create(
            &self,
            _params: &Params,
            _deps: &ResourceSet,
        ) -> std::result::Result<Arc<dyn SharedResource>, StageError> {
            Ok(Arc::new(Unit))
        }
    }

    #[derive(Debug)]
    struct Unit;

    impl SharedResource for Unit {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct FailingFactory;

    impl ResourceFactory for FailingFactory {
        fn depends_on(&self, _params: &Params) -> Vec<ResourceKey> {
            vec![ResourceKey::new("token")]
        }

        fn create(
            &self,
            _params: &Params,
            _deps: &ResourceSet,
        ) -> std::result::Result<Arc<dyn SharedResource>, StageError> {
            Err(StageError::Failed("backing store unavailable".into()))
        }
    }

    fn counters() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
    }

    fn registry_with(
        register: impl FnOnce(&mut ComponentRegistry),
    ) -> ResourceRegistry {
        let mut components = ComponentRegistry::new();
        register(&mut components);
        ResourceRegistry::new(Arc::new(components), Defaults::default())
    }

    #[test]
    fn identical_keys_share_one_handle() {
        let (created, released) = counters();
        let mut resources = registry_with(|c| {
            c.register_resource(
                "token",
                TokenFactory {
                    created: created.clone(),
                    released: released.clone(),
                },
            );
        });

        let key = ResourceKey::new("token").with_param("path", "/tmp/a");
        let first = resources.get_or_create(&key).unwrap();
        let second = resources.get_or_create(&key).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_params_construct_distinct_resources() {
        let (created, released) = counters();
        let mut resources = registry_with(|c| {
            c.register_resource(
                "token",
                TokenFactory {
                    created: created.clone(),
                    released: released.clone(),
                },
            );
        });

        let a = resources
            .get_or_create(&ResourceKey::new("token").with_param("path", "/tmp/a"))
            .unwrap();
        let b = resources
            .get_or_create(&ResourceKey::new("token").with_param("path", "/tmp/b"))
            .unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shorthand_and_canonical_keys_deduplicate() {
        let (created, released) = counters();
        let mut resources = registry_with(|c| {
            c.register_resource(
                "trawler.resources.token",
                TokenFactory {
                    created: created.clone(),
                    released: released.clone(),
                },
            );
        });

        let a = resources.get_or_create(&ResourceKey::new("token")).unwrap();
        let b = resources
            .get_or_create(&ResourceKey::new("trawler.resources.token"))
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_dependencies_are_resolved_first() {
        let mut resources = registry_with(|c| {
            c.register_resource("chain", ChainFactory);
            c.register_resource("leaf", ChainFactory);
        });

        let key = ResourceKey::new("chain").with_param("next", "leaf");
        resources.get_or_create(&key).unwrap();

        assert_eq!(resources.len(), 2);
    }

    #[test]
    fn dependency_cycle_fails_fast_naming_the_path() {
        let mut resources = registry_with(|c| {
            c.register_resource("a", NeedsFactory("b"));
            c.register_resource("b", NeedsFactory("a"));
        });

        let err = resources.get_or_create(&ResourceKey::new("a")).unwrap_err();
        let AssemblyError::CyclicResourceDependency { path } = err else {
            panic!("expected cycle error, got {err}");
        };
        assert_eq!(path, vec!["a", "b", "a"]);
        assert!(resources.is_empty());
    }

    #[test]
    fn construction_failure_releases_already_built_resources() {
        let (created, released) = counters();
        let mut resources = registry_with(|c| {
            c.register_resource("failing", FailingFactory);
            c.register_resource(
                "token",
                TokenFactory {
                    created: created.clone(),
                    released: released.clone(),
                },
            );
        });

        let err = resources
            .get_or_create(&ResourceKey::new("failing"))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::ResourceConstruction { .. }));

        // The token dependency was built before the failure.
        assert_eq!(created.load(Ordering::SeqCst), 1);
        resources.release_all();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_all_is_idempotent_and_reverse_ordered() {
        let (created, released) = counters();
        let mut resources = registry_with(|c| {
            c.register_resource(
                "token",
                TokenFactory {
                    created: created.clone(),
                    released: released.clone(),
                },
            );
        });

        resources
            .get_or_create(&ResourceKey::new("token").with_param("n", 1_i64))
            .unwrap();
        resources
            .get_or_create(&ResourceKey::new("token").with_param("n", 2_i64))
            .unwrap();

        resources.release_all();
        resources.release_all();
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn drop_releases_outstanding_handles() {
        let (created, released) = counters();
        {
            let mut resources = registry_with(|c| {
                c.register_resource(
                    "token",
                    TokenFactory {
                        created: created.clone(),
                        released: released.clone(),
                    },
                );
            });
            resources.get_or_create(&ResourceKey::new("token")).unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_resource_class_is_unresolvable() {
        let mut resources = registry_with(|_| {});
        let err = resources
            .get_or_create(&ResourceKey::new("nope"))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::UnresolvableComponent { .. }));
    }
}
