//! Document store trait: the retrieval side of the pipeline.
//!
//! A store returns candidate documents for a query. Scores are validated
//! once, here at the boundary: anything the store hands over carries a
//! finite score in [0, 1], defaulting to 0.5 when the backend has none.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Score assigned to documents the backend did not score.
pub const DEFAULT_RELEVANCE: f32 = 0.5;

/// Where a document came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source name (usually the file name)
    #[serde(default, alias = "filename")]
    pub source: String,

    /// Page or other locator; `None` when unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

/// A retrieved document. Transient: lives for one query's context assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,

    #[serde(default)]
    pub metadata: DocumentMetadata,

    #[serde(default = "default_relevance", deserialize_with = "deserialize_score")]
    relevance_score: f32,
}

fn default_relevance() -> f32 {
    DEFAULT_RELEVANCE
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<f32>::deserialize(deserializer)?;
    Ok(normalize_score(raw))
}

/// Clamp a backend score into [0, 1]; missing or non-finite scores get the default.
pub fn normalize_score(raw: Option<f32>) -> f32 {
    match raw {
        Some(s) if s.is_finite() => s.clamp(0.0, 1.0),
        _ => DEFAULT_RELEVANCE,
    }
}

impl Document {
    /// An unscored document.
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                source: source.into(),
                page: None,
            },
            relevance_score: DEFAULT_RELEVANCE,
        }
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.metadata.page = Some(page.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.relevance_score = normalize_score(Some(score));
        self
    }

    pub fn relevance_score(&self) -> f32 {
        self.relevance_score
    }
}

/// A source citation attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub page: String,
}

/// The document store contract.
///
/// "No results" is an empty vector, never an error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The backend name (e.g., "keyword_corpus").
    fn name(&self) -> &str;

    /// Retrieve candidate documents for a query, best first.
    async fn retrieve(&self, query: &str) -> std::result::Result<Vec<Document>, StoreError>;

    /// Whether the store is ready to serve queries.
    fn is_available(&self) -> bool {
        true
    }

    /// Attempt to bring the store back (reload index, reconnect).
    async fn reinitialize(&self) -> std::result::Result<(), StoreError> {
        Ok(())
    }
}
