//! Static category and tag vocabularies.
//!
//! Loaded once at startup from JSON string arrays and shared read-only.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::info;

use crate::error::{Result, WhatnextError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    categories: BTreeSet<String>,
    tags: BTreeSet<String>,
}

impl Vocabulary {
    pub fn new<C, T, S1, S2>(categories: C, tags: T) -> Self
    where
        C: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn load(categories_path: impl AsRef<Path>, tags_path: impl AsRef<Path>) -> Result<Self> {
        let categories = read_string_list(categories_path.as_ref())?;
        let tags = read_string_list(tags_path.as_ref())?;
        info!(
            categories = categories.len(),
            tags = tags.len(),
            "Loaded category and tag vocabularies"
        );
        Ok(Self::new(categories, tags))
    }

    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn is_category(&self, candidate: &str) -> bool {
        self.categories.contains(candidate)
    }

    pub fn is_tag(&self, candidate: &str) -> bool {
        self.tags.contains(candidate)
    }
}

fn read_string_list(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| WhatnextError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| {
        WhatnextError::Config(format!(
            "{} must be a JSON array of strings: {}",
            path.display(),
            e
        ))
    })
}
