//! Pipeline assembly.
//!
//! Combines configuration resolution, capability ordering, and resource
//! construction into a ready-to-run [`Pipeline`]. Assembly is synchronous
//! and runs to completion or fails; on any fatal error every resource
//! constructed so far is released before the error is returned.

use std::sync::Arc;

use crate::config::{ComponentSpec, ConfigResolver, PipelineSpec, Role};
use crate::error::{AssemblyError, Result};
use crate::registry::{ComponentRegistry, Defaults};
use crate::resource::{ResourceKey, ResourceRegistry, ResourceSet};

use super::orderer::{DeclaredOrderer, OrderError, Orderer, StageNode};
use super::{Annotator, Capability, Consumer, Pipeline, Reader, Stage};

pub struct PipelineAssembler {
    registry: Arc<ComponentRegistry>,
    defaults: Defaults,
}

impl PipelineAssembler {
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            defaults: Defaults::default(),
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Assemble `spec` into a pipeline: resolve configuration, order the
    /// annotators by capability, construct shared resources and stages.
    pub fn assemble(&self, spec: PipelineSpec) -> Result<Pipeline> {
        tracing::info!(pipeline = %spec.name, "assembling pipeline");

        let resolved = ConfigResolver::new(&self.registry, &self.defaults).resolve(&spec)?;

        let orderer = self.create_orderer(resolved.orderer.as_deref());
        let ordered = self.order_annotators(orderer.as_ref(), resolved.annotators)?;

        // Ordering is done before this point, so an orderer failure never
        // strands a partially built resource table.
        let mut resources =
            ResourceRegistry::new(Arc::clone(&self.registry), self.defaults.clone());

        let history = {
            let factory = self.registry.history_factory(&resolved.history.class)?;
            factory
                .create(&resolved.history.params)
                .map_err(|source| AssemblyError::ComponentInit {
                    role: Role::History,
                    name: resolved.history.declared.clone(),
                    source,
                })?
        };

        let reader = self.build_reader(resolved.reader, &mut resources)?;
        let annotators = self.build_annotators(ordered, &mut resources)?;
        let consumers = self.build_consumers(resolved.consumers, &mut resources)?;

        tracing::info!(
            pipeline = %spec.name,
            annotators = annotators.len(),
            consumers = consumers.len(),
            resources = resources.len(),
            "pipeline assembled"
        );

        Ok(Pipeline {
            name: spec.name.clone(),
            spec,
            reader,
            annotators,
            consumers,
            history,
            resources,
        })
    }

    /// Instantiate the declared orderer, falling back to the default, and
    /// from there to declared order. Downgrades are logged, never fatal.
    fn create_orderer(&self, declared: Option<&str>) -> Box<dyn Orderer> {
        if let Some(name) = declared {
            match self.registry.resolve_orderer(name, &self.defaults) {
                Ok((_, factory)) => return factory.create(),
                Err(error) => {
                    tracing::warn!(
                        orderer = name,
                        %error,
                        "declared orderer unavailable, using the default"
                    );
                }
            }
        }

        match self
            .registry
            .resolve_orderer(&self.defaults.orderer, &self.defaults)
        {
            Ok((_, factory)) => factory.create(),
            Err(error) => {
                tracing::error!(
                    %error,
                    "default orderer unavailable, stages will run in declared order"
                );
                Box::new(DeclaredOrderer)
            }
        }
    }

    /// Order annotator specs by their factory-declared capabilities. A
    /// cycle aborts assembly; any other ordering failure (including an
    /// invalid permutation from a custom orderer) downgrades to declared
    /// order.
    fn order_annotators(
        &self,
        orderer: &dyn Orderer,
        specs: Vec<ComponentSpec>,
    ) -> Result<Vec<ComponentSpec>> {
        if specs.len() < 2 {
            return Ok(specs);
        }

        let mut nodes = Vec::with_capacity(specs.len());
        for spec in &specs {
            let factory = self.registry.annotator_factory(&spec.class)?;
            nodes.push(StageNode {
                name: spec.declared.clone(),
                capability: factory.capability(&spec.params),
            });
        }

        match orderer.order(&nodes) {
            Ok(permutation) => Ok(apply_permutation(specs, &permutation)),
            Err(OrderError::Cycle { stages }) => {
                Err(AssemblyError::CyclicCapabilityDependency { stages })
            }
            Err(error) => {
                tracing::warn!(%error, "orderer failed, falling back to declared order");
                Ok(specs)
            }
        }
    }

    fn build_reader(
        &self,
        spec: ComponentSpec,
        resources: &mut ResourceRegistry,
    ) -> Result<Stage<dyn Reader>> {
        let factory = self.registry.reader_factory(&spec.class)?;
        let set = resolve_deps(factory.resource_deps(&spec.params), resources)?;

        let component =
            factory
                .create(&spec.params, &set)
                .map_err(|source| AssemblyError::ComponentInit {
                    role: Role::Reader,
                    name: spec.declared.clone(),
                    source,
                })?;

        Ok(Stage::new(spec, Capability::new(), component))
    }

    fn build_annotators(
        &self,
        specs: Vec<ComponentSpec>,
        resources: &mut ResourceRegistry,
    ) -> Result<Vec<Stage<dyn Annotator>>> {
        let mut stages = Vec::with_capacity(specs.len());

        for spec in specs {
            let factory = self.registry.annotator_factory(&spec.class)?;
            let capability = factory.capability(&spec.params);
            // Resource failures abort the build; a component that fails its
            // own initialization is skipped like an unresolvable one.
            let set = resolve_deps(factory.resource_deps(&spec.params), resources)?;

            match factory.create(&spec.params, &set) {
                Ok(component) => stages.push(Stage::new(spec, capability, component)),
                Err(error) => {
                    tracing::error!(
                        class = %spec.declared,
                        position = spec.position,
                        %error,
                        "annotator could not be created and has been skipped"
                    );
                }
            }
        }

        Ok(stages)
    }

    fn build_consumers(
        &self,
        specs: Vec<ComponentSpec>,
        resources: &mut ResourceRegistry,
    ) -> Result<Vec<Stage<dyn Consumer>>> {
        let mut stages = Vec::with_capacity(specs.len());

        for spec in specs {
            let factory = self.registry.consumer_factory(&spec.class)?;
            let set = resolve_deps(factory.resource_deps(&spec.params), resources)?;

            match factory.create(&spec.params, &set) {
                Ok(component) => stages.push(Stage::new(spec, Capability::new(), component)),
                Err(error) => {
                    tracing::error!(
                        class = %spec.declared,
                        position = spec.position,
                        %error,
                        "consumer could not be created and has been skipped"
                    );
                }
            }
        }

        Ok(stages)
    }
}

fn resolve_deps(
    keys: Vec<ResourceKey>,
    resources: &mut ResourceRegistry,
) -> Result<ResourceSet> {
    let mut set = ResourceSet::new();
    for key in keys {
        let handle = resources.get_or_create(&key)?;
        set.insert(&key, handle);
    }
    Ok(set)
}

/// Reorder `specs` by the orderer's permutation. A malformed permutation
/// from a custom orderer falls back to declared order.
fn apply_permutation(specs: Vec<ComponentSpec>, permutation: &[usize]) -> Vec<ComponentSpec> {
    let valid = permutation.len() == specs.len() && {
        let mut seen = vec![false; specs.len()];
        permutation.iter().all(|&i| {
            i < specs.len() && !std::mem::replace(&mut seen[i], true)
        })
    };

    if !valid {
        tracing::warn!("orderer returned an invalid permutation, keeping declared order");
        return specs;
    }

    let mut slots: Vec<Option<ComponentSpec>> = specs.into_iter().map(Some).collect();
    permutation
        .iter()
        .filter_map(|&i| slots[i].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Params;

    fn spec(declared: &str, position: usize) -> ComponentSpec {
        ComponentSpec {
            role: Role::Annotator,
            class: format!("test.{declared}"),
            declared: declared.to_string(),
            position,
            params: Params::new(),
        }
    }

    fn declared_names(specs: &[ComponentSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.declared.as_str()).collect()
    }

    #[test]
    fn permutation_reorders_specs() {
        let specs = vec![spec("c", 0), spec("a", 1), spec("b", 2)];
        let reordered = apply_permutation(specs, &[1, 2, 0]);
        assert_eq!(declared_names(&reordered), vec!["a", "b", "c"]);
    }

    #[test]
    fn out_of_range_permutation_keeps_declared_order() {
        let specs = vec![spec("a", 0), spec("b", 1)];
        let reordered = apply_permutation(specs, &[0, 7]);
        assert_eq!(declared_names(&reordered), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_index_permutation_keeps_declared_order() {
        let specs = vec![spec("a", 0), spec("b", 1)];
        let reordered = apply_permutation(specs, &[0, 0]);
        assert_eq!(declared_names(&reordered), vec!["a", "b"]);
    }

    #[test]
    fn short_permutation_keeps_declared_order() {
        let specs = vec![spec("a", 0), spec("b", 1)];
        let reordered = apply_permutation(specs, &[0]);
        assert_eq!(declared_names(&reordered), vec!["a", "b"]);
    }
}
