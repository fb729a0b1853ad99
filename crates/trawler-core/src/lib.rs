pub mod components;
pub mod config;
pub mod document;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod registry;
pub mod resource;

pub use config::{
    ComponentSpec, ConfigResolver, DroppedComponent, ParamValue, Params, PipelineSpec,
    ResolvedConfig, Role, PIPELINE_NAME_KEY,
};
pub use document::{Annotation, AnnotationId, Document};
pub use error::{AssemblyError, Result, StageError};
pub use history::{
    HistorySink, InMemoryHistory, LoggingHistory, StageEvent, StageOutcome,
};
pub use pipeline::assembler::PipelineAssembler;
pub use pipeline::orderer::{
    CapabilityOrderer, DeclaredOrderer, OrderError, Orderer, StageNode,
};
pub use pipeline::{
    Annotator, Capability, Consumer, ExecutionError, Pipeline, PipelineExecutor, Reader,
    RunSummary, Stage,
};
pub use registry::{
    AnnotatorFactory, ComponentRegistry, ConsumerFactory, Defaults, HistoryFactory,
    OrdererFactory, ReaderFactory, ResourceFactory,
};
pub use resource::{
    ResourceHandle, ResourceKey, ResourceRegistry, ResourceSet, SharedResource,
};
