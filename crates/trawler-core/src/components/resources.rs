use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{ParamValue, Params};
use crate::error::StageError;
use crate::registry::ResourceFactory;
use crate::resource::{ResourceSet, SharedResource};

/// A shared term list, loaded once per pipeline and read by any number of
/// stages concurrently. Matching is case-insensitive.
#[derive(Debug)]
pub struct Gazetteer {
    terms: HashSet<String>,
}

impl Gazetteer {
    #[must_use]
    pub fn from_terms(terms: impl IntoIterator<Item = String>) -> Self {
        Self {
            terms: terms.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains(&term.to_lowercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl SharedResource for Gazetteer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn release(&self) {
        tracing::debug!(terms = self.terms.len(), "gazetteer released");
    }
}

/// Builds a [`Gazetteer`] from an inline `terms` value (a list or a single
/// string) or a `path` to a newline-delimited term file (`#` lines are
/// comments).
pub struct GazetteerFactory;

impl ResourceFactory for GazetteerFactory {
    fn create(
        &self,
        params: &Params,
        _deps: &ResourceSet,
    ) -> Result<Arc<dyn SharedResource>, StageError> {
        match params.get("terms") {
            Some(ParamValue::List(items)) => {
                let terms = items
                    .iter()
                    .filter_map(|item| item.as_str().map(ToString::to_string))
                    .collect::<Vec<_>>();
                return Ok(Arc::new(Gazetteer::from_terms(terms)));
            }
            Some(ParamValue::Str(term)) => {
                return Ok(Arc::new(Gazetteer::from_terms(vec![term.clone()])));
            }
            _ => {}
        }

        if let Some(path) = params.get("path").and_then(ParamValue::as_str) {
            let contents = std::fs::read_to_string(path)?;
            let terms = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            return Ok(Arc::new(Gazetteer::from_terms(terms)));
        }

        Err(StageError::InvalidParameter(
            "terms".into(),
            "either 'terms' or 'path' must be given".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_case_insensitive() {
        let gazetteer = Gazetteer::from_terms(vec!["London".to_string()]);
        assert!(gazetteer.contains("london"));
        assert!(gazetteer.contains("LONDON"));
        assert!(!gazetteer.contains("Paris"));
    }

    #[test]
    fn loads_terms_from_file_skipping_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.txt");
        std::fs::write(&path, "# cities\nLondon\n\nParis\n").unwrap();

        let mut params = Params::new();
        params.insert(
            "path".into(),
            ParamValue::Str(path.to_string_lossy().into_owned()),
        );

        let handle = GazetteerFactory.create(&params, &ResourceSet::new()).unwrap();
        let gazetteer: &Gazetteer = handle.as_any().downcast_ref().unwrap();
        assert_eq!(gazetteer.len(), 2);
        assert!(gazetteer.contains("paris"));
    }

    #[test]
    fn missing_source_is_an_error() {
        let err = GazetteerFactory
            .create(&Params::new(), &ResourceSet::new())
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidParameter(..)));
    }
}
