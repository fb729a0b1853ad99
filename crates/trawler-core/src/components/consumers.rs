use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::{ParamValue, Params};
use crate::document::Document;
use crate::error::StageError;
use crate::pipeline::Consumer;
use crate::registry::ConsumerFactory;
use crate::resource::ResourceSet;

/// Appends each finished document as one JSON line to a file.
#[derive(Debug)]
pub struct JsonLinesConsumer {
    path: PathBuf,
}

#[async_trait]
impl Consumer for JsonLinesConsumer {
    async fn consume(&self, document: &Document) -> Result<(), StageError> {
        let mut line = serde_json::to_string(document)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

pub struct JsonLinesConsumerFactory;

impl ConsumerFactory for JsonLinesConsumerFactory {
    fn create(
        &self,
        params: &Params,
        _resources: &ResourceSet,
    ) -> Result<Box<dyn Consumer>, StageError> {
        let output = params
            .get("output")
            .and_then(ParamValue::as_str)
            .ok_or_else(|| {
                StageError::InvalidParameter("output".into(), "an output path is required".into())
            })?;

        Ok(Box::new(JsonLinesConsumer {
            path: PathBuf::from(output),
        }))
    }
}

/// Logs a per-tag summary of the final annotation state.
#[derive(Debug)]
pub struct LoggingConsumer;

#[async_trait]
impl Consumer for LoggingConsumer {
    async fn consume(&self, document: &Document) -> Result<(), StageError> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for annotation in document.annotations() {
            *counts.entry(annotation.tag.as_str()).or_default() += 1;
        }

        let summary = counts
            .iter()
            .map(|(tag, n)| format!("{tag}={n}"))
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(
            document = %document.id,
            annotations = document.annotation_count(),
            %summary,
            "document processed"
        );
        Ok(())
    }
}

pub struct LoggingConsumerFactory;

impl ConsumerFactory for LoggingConsumerFactory {
    fn create(
        &self,
        _params: &Params,
        _resources: &ResourceSet,
    ) -> Result<Box<dyn Consumer>, StageError> {
        Ok(Box::new(LoggingConsumer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn jsonl_consumer_appends_one_line_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let consumer = JsonLinesConsumer { path: path.clone() };

        let mut doc = Document::new("doc1", "Alice met Bob.");
        doc.annotate("Person", 0, 5);
        consumer.consume(&doc).await.unwrap();
        consumer.consume(&Document::new("doc2", "Second.")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], "doc1");
        assert_eq!(first["annotations"][0]["tag"], "Person");
    }

    #[test]
    fn jsonl_factory_requires_output_parameter() {
        let err = JsonLinesConsumerFactory
            .create(&Params::new(), &ResourceSet::new())
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidParameter(ref key, _) if key == "output"));
    }

    #[tokio::test]
    async fn logging_consumer_accepts_any_document() {
        let doc = Document::new("doc1", "text");
        LoggingConsumer.consume(&doc).await.unwrap();
    }
}
