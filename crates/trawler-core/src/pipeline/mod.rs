//! The assembled pipeline: component contracts, bound stages, and the
//! pipeline itself.

pub mod assembler;
pub mod executor;
pub mod orderer;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{ComponentSpec, PipelineSpec};
use crate::document::Document;
use crate::error::StageError;
use crate::history::HistorySink;
use crate::resource::ResourceRegistry;

pub use executor::{ExecutionError, PipelineExecutor, RunSummary};

/// A stage's declared contract: the annotation tags it produces and the
/// tags it requires to already be present. Tags are opaque names from the
/// same vocabulary annotations are tagged with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capability {
    produces: BTreeSet<String>,
    requires: BTreeSet<String>,
}

impl Capability {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn produce(mut self, tag: impl Into<String>) -> Self {
        self.produces.insert(tag.into());
        self
    }

    #[must_use]
    pub fn require(mut self, tag: impl Into<String>) -> Self {
        self.requires.insert(tag.into());
        self
    }

    #[must_use]
    pub fn produces(&self) -> &BTreeSet<String> {
        &self.produces
    }

    #[must_use]
    pub fn requires(&self) -> &BTreeSet<String> {
        &self.requires
    }

    /// True if any of `produced` satisfies one of this stage's
    /// requirements.
    #[must_use]
    pub fn requires_any_of(&self, produced: &BTreeSet<String>) -> bool {
        self.requires.intersection(produced).next().is_some()
    }
}

/// Source of documents for a pipeline run.
#[async_trait]
pub trait Reader: Send + Sync + std::fmt::Debug {
    /// The next document, or `None` when the collection is exhausted.
    async fn next_document(&mut self) -> Result<Option<Document>, StageError>;
}

/// A processing stage that enriches the shared document state.
#[async_trait]
pub trait Annotator: Send + Sync + std::fmt::Debug {
    async fn annotate(&self, document: &mut Document) -> Result<(), StageError>;
}

/// A terminal sink observing the final document state. Consumers never
/// produce capabilities and are never reordered.
#[async_trait]
pub trait Consumer: Send + Sync + std::fmt::Debug {
    async fn consume(&self, document: &Document) -> Result<(), StageError>;
}

/// A runtime-bound component: resolved spec, capability contract, and a
/// correlation id that ties log lines and history events back to this
/// stage.
pub struct Stage<C: ?Sized> {
    pub(crate) id: Uuid,
    pub(crate) spec: ComponentSpec,
    pub(crate) capability: Capability,
    pub(crate) component: Box<C>,
}

impl<C: ?Sized> Stage<C> {
    pub(crate) fn new(spec: ComponentSpec, capability: Capability, component: Box<C>) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            capability,
            component,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.spec.class
    }

    #[must_use]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }
}

/// A fully assembled pipeline, ready to execute.
///
/// Annotator order is a valid topological order of the capability graph;
/// consumer order is exactly the declared configuration order. Dropping the
/// pipeline releases every shared resource constructed for it.
pub struct Pipeline {
    pub(crate) name: String,
    pub(crate) spec: PipelineSpec,
    pub(crate) reader: Stage<dyn Reader>,
    pub(crate) annotators: Vec<Stage<dyn Annotator>>,
    pub(crate) consumers: Vec<Stage<dyn Consumer>>,
    pub(crate) history: Arc<dyn HistorySink>,
    pub(crate) resources: ResourceRegistry,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("annotators", &self.annotators.len())
            .field("consumers", &self.consumers.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The original declarative spec, kept for provenance.
    #[must_use]
    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    #[must_use]
    pub fn reader(&self) -> &Stage<dyn Reader> {
        &self.reader
    }

    #[must_use]
    pub fn annotators(&self) -> &[Stage<dyn Annotator>] {
        &self.annotators
    }

    #[must_use]
    pub fn consumers(&self) -> &[Stage<dyn Consumer>] {
        &self.consumers
    }

    /// Annotator classes in execution order. Convenience for diagnostics
    /// and tests.
    #[must_use]
    pub fn annotator_order(&self) -> Vec<&str> {
        self.annotators.iter().map(Stage::class).collect()
    }

    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Run every document from the reader through the pipeline.
    pub async fn run(&mut self) -> Result<RunSummary, ExecutionError> {
        PipelineExecutor::new(self).run().await
    }
}
