use thiserror::Error;

use crate::config::Role;

/// Fatal problems found while assembling a pipeline from its configuration.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Missing required configuration key: {0}")]
    MissingParameter(String),

    #[error("No {role} registered as '{name}'")]
    UnresolvableComponent { role: Role, name: String },

    #[error("Failed to construct resource '{class}': {source}")]
    ResourceConstruction {
        class: String,
        #[source]
        source: StageError,
    },

    #[error("Cyclic resource dependency: {}", .path.join(" -> "))]
    CyclicResourceDependency { path: Vec<String> },

    #[error("Cyclic capability dependency between stages: {}", .stages.join(", "))]
    CyclicCapabilityDependency { stages: Vec<String> },

    #[error("{role} '{name}' failed to initialize: {source}")]
    ComponentInit {
        role: Role,
        name: String,
        #[source]
        source: StageError,
    },

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Could not parse pipeline configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Runtime failure raised by an individual component.
///
/// The executor recovers from these per stage; the assembler treats them as
/// fatal only for the reader, the history sink, and shared resources.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid parameter '{0}': {1}")]
    InvalidParameter(String, String),

    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
