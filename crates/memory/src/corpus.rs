//! Keyword corpus — a file-backed document store.
//!
//! The corpus is a JSONL file, one document per line:
//!
//! ```json
//! {"content": "...", "source": "lakshmir_bhandar.pdf", "page": "2"}
//! ```
//!
//! Lines exported with a nested `metadata` object are accepted too.
//!
//! Retrieval scores each document by the fraction of distinct query terms
//! it contains and returns the best `top_k` with a non-zero score.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use smartseva_core::document::{Document, DocumentMetadata, DocumentStore};
use smartseva_core::error::StoreError;
use tracing::{debug, info, warn};

/// Terms shorter than this are ignored on both sides.
const MIN_TERM_LEN: usize = 2;

#[derive(Debug, Deserialize)]
struct CorpusLine {
    content: String,
    #[serde(default, alias = "filename")]
    source: Option<String>,
    #[serde(default)]
    page: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<DocumentMetadata>,
}

impl CorpusLine {
    fn into_document(self) -> Document {
        let mut metadata = self.metadata.unwrap_or_default();
        if let Some(source) = self.source {
            metadata.source = source;
        }
        match self.page {
            Some(serde_json::Value::String(p)) => metadata.page = Some(p),
            Some(serde_json::Value::Number(n)) => metadata.page = Some(n.to_string()),
            _ => {}
        }
        let mut doc = Document::new(self.content, metadata.source);
        doc.metadata.page = metadata.page;
        doc
    }
}

pub struct KeywordCorpus {
    path: PathBuf,
    top_k: usize,
    documents: RwLock<Option<Vec<Document>>>,
}

impl KeywordCorpus {
    /// Open the corpus at `path`. A missing or empty file leaves the
    /// store unavailable until [`DocumentStore::reinitialize`] succeeds.
    pub fn new(path: PathBuf, top_k: usize) -> Self {
        let documents = match Self::load(&path) {
            Ok(docs) => Some(docs),
            Err(e) => {
                warn!(error = %e, "Document corpus not loaded");
                None
            }
        };
        Self {
            path,
            top_k: top_k.max(1),
            documents: RwLock::new(documents),
        }
    }

    /// Build a corpus directly from documents (no backing file).
    pub fn from_documents(documents: Vec<Document>, top_k: usize) -> Self {
        Self {
            path: PathBuf::new(),
            top_k: top_k.max(1),
            documents: RwLock::new(Some(documents)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(path: &Path) -> Result<Vec<Document>, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| StoreError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let documents: Vec<Document> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<CorpusLine>(line) {
                Ok(entry) if !entry.content.trim().is_empty() => Some(entry.into_document()),
                Ok(_) => None,
                Err(e) => {
                    warn!(line = n + 1, error = %e, "Skipping corrupted corpus entry");
                    None
                }
            })
            .collect();

        if documents.is_empty() {
            return Err(StoreError::LoadFailed {
                path: path.display().to_string(),
                reason: "no documents".into(),
            });
        }
        info!(path = %path.display(), count = documents.len(), "Document corpus loaded");
        Ok(documents)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl DocumentStore for KeywordCorpus {
    fn name(&self) -> &str {
        "keyword_corpus"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, StoreError> {
        let guard = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let documents = guard
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("corpus not loaded".into()))?;

        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Document> = documents
            .iter()
            .filter_map(|doc| {
                let doc_terms = terms(&doc.content);
                let hits = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
                (hits > 0).then(|| {
                    doc.clone()
                        .with_score(hits as f32 / query_terms.len() as f32)
                })
            })
            .collect();

        scored.sort_by(|a, b| b.relevance_score().total_cmp(&a.relevance_score()));
        scored.truncate(self.top_k);
        debug!(query_terms = query_terms.len(), hits = scored.len(), "Corpus search");
        Ok(scored)
    }

    fn is_available(&self) -> bool {
        !self.is_empty()
    }

    async fn reinitialize(&self) -> Result<(), StoreError> {
        if self.path.as_os_str().is_empty() {
            return if self.is_available() {
                Ok(())
            } else {
                Err(StoreError::Unavailable("corpus has no backing file".into()))
            };
        }
        let documents = Self::load(&self.path)?;
        *self.documents.write().unwrap_or_else(PoisonError::into_inner) = Some(documents);
        Ok(())
    }
}
