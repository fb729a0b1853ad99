use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::{ParamValue, Params};
use crate::document::Document;
use crate::error::StageError;
use crate::pipeline::Reader;
use crate::registry::ReaderFactory;
use crate::resource::ResourceSet;

/// Serves documents given up front. Configured with a `documents` list of
/// text bodies; mostly useful for tests and demos.
#[derive(Debug)]
pub struct MemoryReader {
    documents: VecDeque<Document>,
}

impl MemoryReader {
    #[must_use]
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into(),
        }
    }
}

#[async_trait]
impl Reader for MemoryReader {
    async fn next_document(&mut self) -> Result<Option<Document>, StageError> {
        Ok(self.documents.pop_front())
    }
}

pub struct MemoryReaderFactory;

impl ReaderFactory for MemoryReaderFactory {
    fn create(
        &self,
        params: &Params,
        _resources: &ResourceSet,
    ) -> Result<Box<dyn Reader>, StageError> {
        let documents = match params.get("documents") {
            Some(ParamValue::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let text = item.as_str().ok_or_else(|| {
                        StageError::InvalidParameter(
                            "documents".into(),
                            "entries must be strings".into(),
                        )
                    })?;
                    Ok(Document::new(format!("memory:{i}"), text))
                })
                .collect::<Result<Vec<_>, StageError>>()?,
            Some(_) => {
                return Err(StageError::InvalidParameter(
                    "documents".into(),
                    "must be a list".into(),
                ))
            }
            None => Vec::new(),
        };

        Ok(Box::new(MemoryReader::new(documents)))
    }
}

/// Reads every `.txt` file under a directory, in path order so runs are
/// reproducible.
#[derive(Debug)]
pub struct TextDirectoryReader {
    entries: Vec<PathBuf>,
    position: usize,
}

impl TextDirectoryReader {
    pub fn new(dir: &Path) -> Result<Self, StageError> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext == "txt")
            })
            .collect();
        entries.sort();

        Ok(Self {
            entries,
            position: 0,
        })
    }
}

#[async_trait]
impl Reader for TextDirectoryReader {
    async fn next_document(&mut self) -> Result<Option<Document>, StageError> {
        let Some(path) = self.entries.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;

        let text = tokio::fs::read_to_string(path).await?;
        Ok(Some(Document::new(path.to_string_lossy(), text)))
    }
}

pub struct TextDirectoryReaderFactory;

impl ReaderFactory for TextDirectoryReaderFactory {
    fn create(
        &self,
        params: &Params,
        _resources: &ResourceSet,
    ) -> Result<Box<dyn Reader>, StageError> {
        let input = params
            .get("input")
            .and_then(ParamValue::as_str)
            .ok_or_else(|| {
                StageError::InvalidParameter("input".into(), "input directory is required".into())
            })?;

        Ok(Box::new(TextDirectoryReader::new(Path::new(input))?))
    }
}
