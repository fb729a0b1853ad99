//! Built-in components, registered under the default namespaces.
//!
//! These are deliberately small: the engine treats annotation algorithms as
//! opaque stages, and anything beyond the basics belongs in caller-provided
//! factories registered before assembly.

pub mod annotators;
pub mod consumers;
pub mod readers;
pub mod resources;

pub use annotators::{
    KeywordAnnotator, RegexAnnotator, SentenceAnnotator, SENTENCE_TAG,
};
pub use consumers::{JsonLinesConsumer, LoggingConsumer};
pub use readers::{MemoryReader, TextDirectoryReader};
pub use resources::Gazetteer;

use crate::history::{InMemoryHistoryFactory, LoggingHistoryFactory};
use crate::pipeline::orderer::{CapabilityOrdererFactory, DeclaredOrdererFactory};
use crate::registry::ComponentRegistry;

impl ComponentRegistry {
    /// A registry with every built-in component registered. The usual
    /// starting point; callers add their own factories on top.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_reader("trawler.readers.memory", readers::MemoryReaderFactory);
        registry.register_reader(
            "trawler.readers.text_dir",
            readers::TextDirectoryReaderFactory,
        );

        registry.register_annotator(
            "trawler.annotators.sentence",
            annotators::SentenceAnnotatorFactory,
        );
        registry.register_annotator(
            "trawler.annotators.regex",
            annotators::RegexAnnotatorFactory,
        );
        registry.register_annotator(
            "trawler.annotators.keyword",
            annotators::KeywordAnnotatorFactory,
        );

        registry.register_consumer(
            "trawler.consumers.jsonl",
            consumers::JsonLinesConsumerFactory,
        );
        registry.register_consumer(
            "trawler.consumers.logging",
            consumers::LoggingConsumerFactory,
        );

        registry.register_orderer("trawler.orderers.capability", CapabilityOrdererFactory);
        registry.register_orderer("trawler.orderers.declared", DeclaredOrdererFactory);

        registry.register_history("trawler.history.logging", LoggingHistoryFactory);
        registry.register_history("trawler.history.memory", InMemoryHistoryFactory);

        registry.register_resource("trawler.resources.gazetteer", resources::GazetteerFactory);

        registry
    }
}
