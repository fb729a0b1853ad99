use async_trait::async_trait;
use regex::Regex;

use crate::config::{ParamValue, Params};
use crate::document::Document;
use crate::error::StageError;
use crate::pipeline::{Annotator, Capability};
use crate::registry::AnnotatorFactory;
use crate::resource::{ResourceHandle, ResourceKey, ResourceSet};

use super::resources::Gazetteer;

pub const SENTENCE_TAG: &str = "Sentence";
const GAZETTEER_CLASS: &str = "trawler.resources.gazetteer";

/// Splits text into `Sentence` annotations on terminal punctuation.
#[derive(Debug)]
pub struct SentenceAnnotator;

fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if start.is_none() && !c.is_whitespace() {
            start = Some(i);
        }
        if matches!(c, '.' | '!' | '?') {
            if let Some(s) = start.take() {
                spans.push((s, i + c.len_utf8()));
            }
        }
    }

    // Trailing text without a terminator still counts as a sentence.
    if let Some(s) = start {
        let end = text.trim_end().len();
        if end > s {
            spans.push((s, end));
        }
    }

    spans
}

#[async_trait]
impl Annotator for SentenceAnnotator {
    async fn annotate(&self, document: &mut Document) -> Result<(), StageError> {
        let spans = sentence_spans(&document.text);
        for (begin, end) in spans {
            document.annotate(SENTENCE_TAG, begin, end);
        }
        Ok(())
    }
}

pub struct SentenceAnnotatorFactory;

impl AnnotatorFactory for SentenceAnnotatorFactory {
    fn capability(&self, _params: &Params) -> Capability {
        Capability::new().produce(SENTENCE_TAG)
    }

    fn create(
        &self,
        _params: &Params,
        _resources: &ResourceSet,
    ) -> Result<Box<dyn Annotator>, StageError> {
        Ok(Box::new(SentenceAnnotator))
    }
}

/// Annotates every match of a configured pattern with a configured tag.
#[derive(Debug)]
pub struct RegexAnnotator {
    pattern: Regex,
    tag: String,
    confidence: f64,
}

#[async_trait]
impl Annotator for RegexAnnotator {
    async fn annotate(&self, document: &mut Document) -> Result<(), StageError> {
        let matches: Vec<(usize, usize, String)> = self
            .pattern
            .find_iter(&document.text)
            .map(|m| (m.start(), m.end(), m.as_str().to_string()))
            .collect();

        for (begin, end, value) in matches {
            let id = document.annotate(&self.tag, begin, end);
            if let Some(annotation) = document.annotation_mut(id) {
                annotation.value = Some(value);
                annotation.confidence = self.confidence;
            }
        }
        Ok(())
    }
}

fn produced_tag(params: &Params, default: &str) -> String {
    params
        .get("tag")
        .and_then(ParamValue::as_str)
        .unwrap_or(default)
        .to_string()
}

pub struct RegexAnnotatorFactory;

impl AnnotatorFactory for RegexAnnotatorFactory {
    fn capability(&self, params: &Params) -> Capability {
        Capability::new().produce(produced_tag(params, "Match"))
    }

    fn create(
        &self,
        params: &Params,
        _resources: &ResourceSet,
    ) -> Result<Box<dyn Annotator>, StageError> {
        let pattern = params
            .get("pattern")
            .and_then(ParamValue::as_str)
            .ok_or_else(|| {
                StageError::InvalidParameter("pattern".into(), "a regex pattern is required".into())
            })?;
        let pattern = Regex::new(pattern)
            .map_err(|e| StageError::InvalidParameter("pattern".into(), e.to_string()))?;

        let confidence = params
            .get("confidence")
            .and_then(ParamValue::as_f64)
            .unwrap_or(1.0);

        Ok(Box::new(RegexAnnotator {
            pattern,
            tag: produced_tag(params, "Match"),
            confidence,
        }))
    }
}

/// Marks gazetteer terms found inside sentences. Requires `Sentence`
/// annotations to be present; with none, it annotates nothing.
#[derive(Debug)]
pub struct KeywordAnnotator {
    gazetteer: ResourceHandle,
    words: Regex,
    tag: String,
}

#[async_trait]
impl Annotator for KeywordAnnotator {
    async fn annotate(&self, document: &mut Document) -> Result<(), StageError> {
        let Some(gazetteer) = self.gazetteer.as_any().downcast_ref::<Gazetteer>() else {
            return Err(StageError::Failed(
                "gazetteer resource has the wrong type".into(),
            ));
        };

        let sentences: Vec<(usize, usize)> = document
            .annotations_with_tag(SENTENCE_TAG)
            .map(|a| (a.begin, a.end))
            .collect();

        let mut found = Vec::new();
        for (begin, end) in sentences {
            let Some(sentence) = document.text.get(begin..end) else {
                continue;
            };
            for word in self.words.find_iter(sentence) {
                if gazetteer.contains(word.as_str()) {
                    found.push((begin + word.start(), begin + word.end()));
                }
            }
        }

        for (begin, end) in found {
            document.annotate(&self.tag, begin, end);
        }
        Ok(())
    }
}

fn gazetteer_key(params: &Params) -> ResourceKey {
    let mut key = ResourceKey::new(GAZETTEER_CLASS);
    if let Some(path) = params.get("gazetteer.path") {
        key = key.with_param("path", path.clone());
    }
    if let Some(terms) = params.get("gazetteer.terms") {
        key = key.with_param("terms", terms.clone());
    }
    key
}

pub struct KeywordAnnotatorFactory;

impl AnnotatorFactory for KeywordAnnotatorFactory {
    fn capability(&self, params: &Params) -> Capability {
        Capability::new()
            .require(SENTENCE_TAG)
            .produce(produced_tag(params, "Keyword"))
    }

    fn resource_deps(&self, params: &Params) -> Vec<ResourceKey> {
        vec![gazetteer_key(params)]
    }

    fn create(
        &self,
        params: &Params,
        resources: &ResourceSet,
    ) -> Result<Box<dyn Annotator>, StageError> {
        let gazetteer = resources
            .get(GAZETTEER_CLASS)
            .ok_or_else(|| StageError::Failed("gazetteer resource not provided".into()))?
            .clone();
        if gazetteer.as_any().downcast_ref::<Gazetteer>().is_none() {
            return Err(StageError::Failed(
                "gazetteer resource has the wrong type".into(),
            ));
        }

        let words = Regex::new(r"\w+")
            .map_err(|e| StageError::InvalidParameter("pattern".into(), e.to_string()))?;

        Ok(Box::new(KeywordAnnotator {
            gazetteer,
            words,
            tag: produced_tag(params, "Keyword"),
        }))
    }
}
