use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Index into a document's annotation arena.
///
/// Ids are stable for the lifetime of the document. Cross-annotation links
/// (for example a mention pointing at its coreference target) are stored as
/// an id and resolved through [`Document::annotation`], never as an owning
/// pointer between annotations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AnnotationId(u32);

impl AnnotationId {
    #[must_use]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// Opaque type tag, e.g. `"Person"` or `"Sentence"`. The same vocabulary
    /// capability contracts are declared in.
    pub tag: String,
    pub begin: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referent: Option<AnnotationId>,
}

/// A document flowing through the pipeline: source identity, text, and an
/// append-only arena of annotations accumulated by the stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
            annotations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Append an annotation covering `begin..end` and return its id.
    pub fn annotate(&mut self, tag: impl Into<String>, begin: usize, end: usize) -> AnnotationId {
        let id = AnnotationId(u32::try_from(self.annotations.len()).unwrap_or(u32::MAX));
        self.annotations.push(Annotation {
            id,
            tag: tag.into(),
            begin,
            end,
            value: None,
            confidence: 1.0,
            referent: None,
        });
        id
    }

    #[must_use]
    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.get(id.index())
    }

    pub fn annotation_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.get_mut(id.index())
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn annotations_with_tag<'a>(
        &'a self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a Annotation> {
        self.annotations.iter().filter(move |a| a.tag == tag)
    }

    #[must_use]
    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// The text slice an annotation covers, if its span is in bounds.
    #[must_use]
    pub fn covered_text(&self, annotation: &Annotation) -> Option<&str> {
        self.text.get(annotation.begin..annotation.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_assigns_sequential_ids() {
        let mut doc = Document::new("doc1", "Alice met Bob.");
        let a = doc.annotate("Person", 0, 5);
        let b = doc.annotate("Person", 10, 13);

        assert_ne!(a, b);
        assert_eq!(doc.annotation_count(), 2);
        assert_eq!(doc.annotation(a).unwrap().tag, "Person");
    }

    #[test]
    fn covered_text_returns_span() {
        let mut doc = Document::new("doc1", "Alice met Bob.");
        let a = doc.annotate("Person", 0, 5);

        let ann = doc.annotation(a).unwrap();
        assert_eq!(doc.covered_text(ann), Some("Alice"));
    }

    #[test]
    fn covered_text_out_of_bounds_is_none() {
        let mut doc = Document::new("doc1", "short");
        let a = doc.annotate("Person", 0, 100);

        let ann = doc.annotation(a).unwrap();
        assert_eq!(doc.covered_text(ann), None);
    }

    #[test]
    fn referent_resolves_through_arena() {
        let mut doc = Document::new("doc1", "Alice met her friend.");
        let target = doc.annotate("Person", 0, 5);
        let mention = doc.annotate("Pronoun", 10, 13);

        doc.annotation_mut(mention).unwrap().referent = Some(target);

        let resolved = doc
            .annotation(mention)
            .and_then(|m| m.referent)
            .and_then(|id| doc.annotation(id))
            .unwrap();
        assert_eq!(doc.covered_text(resolved), Some("Alice"));
    }

    #[test]
    fn annotations_with_tag_filters() {
        let mut doc = Document::new("doc1", "Alice met Bob.");
        doc.annotate("Person", 0, 5);
        doc.annotate("Sentence", 0, 14);
        doc.annotate("Person", 10, 13);

        assert_eq!(doc.annotations_with_tag("Person").count(), 2);
        assert_eq!(doc.annotations_with_tag("Sentence").count(), 1);
        assert_eq!(doc.annotations_with_tag("Location").count(), 0);
    }
}
