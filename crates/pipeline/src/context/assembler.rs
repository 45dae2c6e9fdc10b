//! Context assembly: turns retrieved documents into the prompt's context block.
//!
//! # Algorithm
//!
//! 1. No documents → fixed "no information" text, score 0.0
//! 2. Stable sort by relevance score, descending (ties keep retrieval order)
//! 3. Drop documents scoring below the relevance threshold
//! 4. Keep at most `max_documents`
//! 5. Format each as `Source <rank> (from <source>):\n<content>`, joined by a blank line
//! 6. Aggregate score is the mean of the retained scores
//!
//! # Determinism
//!
//! Identical inputs always produce identical outputs. Scores were validated
//! at the store boundary (finite, in [0, 1]), so assembly has no failure
//! path; the degraded context exists for faults *before* assembly.

use serde::{Deserialize, Serialize};
use smartseva_core::document::{Citation, Document};
use tracing::debug;

/// Context text when the store returned nothing.
pub const NO_DOCUMENTS_TEXT: &str = "No specific service information found for this query. \
Please try rephrasing your question or contact a government helpline number.";

/// Context text when every document fell below the threshold.
pub const LOW_RELEVANCE_TEXT: &str = "No highly relevant BSK service information found.";

/// Context text when retrieval itself faulted.
pub const DEGRADED_TEXT: &str = "Error retrieving information. Please try again.";

/// Page shown for documents without a locator.
const UNKNOWN_PAGE: &str = "Unknown";

/// Assembly limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyConfig {
    /// Documents scoring below this are dropped.
    pub relevance_threshold: f32,
    /// Upper bound on documents in the context.
    pub max_documents: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.3,
            max_documents: 5,
        }
    }
}

/// How the context was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextQuality {
    /// At least one document passed the threshold.
    Grounded,
    /// The store returned no documents.
    NoDocuments,
    /// Documents were returned but all scored below the threshold.
    LowRelevance,
    /// Retrieval faulted or timed out; generation proceeds without context.
    Degraded,
}

/// The assembled context for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub citations: Vec<Citation>,
    pub relevance_score: f32,
    pub quality: ContextQuality,
    /// Documents handed to the assembler
    pub documents_considered: usize,
}

impl AssembledContext {
    fn fallback(text: &str, quality: ContextQuality, considered: usize) -> Self {
        Self {
            text: text.to_string(),
            citations: Vec::new(),
            relevance_score: 0.0,
            quality,
            documents_considered: considered,
        }
    }

    /// The context used when retrieval faulted.
    pub fn degraded() -> Self {
        Self::fallback(DEGRADED_TEXT, ContextQuality::Degraded, 0)
    }

    pub fn is_grounded(&self) -> bool {
        self.quality == ContextQuality::Grounded
    }
}

/// The context assembler. Stateless; create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: AssemblyConfig,
}

impl ContextAssembler {
    pub fn new(config: AssemblyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> AssemblyConfig {
        self.config
    }

    /// Rank, filter, cap, and format `documents`.
    pub fn assemble(&self, mut documents: Vec<Document>, query: &str) -> AssembledContext {
        let considered = documents.len();
        if documents.is_empty() {
            debug!(query_len = query.len(), "No documents retrieved");
            return AssembledContext::fallback(NO_DOCUMENTS_TEXT, ContextQuality::NoDocuments, 0);
        }

        // `sort_by` is stable
        documents.sort_by(|a, b| b.relevance_score().total_cmp(&a.relevance_score()));

        let selected: Vec<Document> = documents
            .into_iter()
            .filter(|d| d.relevance_score() >= self.config.relevance_threshold)
            .take(self.config.max_documents)
            .collect();

        if selected.is_empty() {
            debug!(considered, threshold = self.config.relevance_threshold, "All documents below threshold");
            return AssembledContext::fallback(
                LOW_RELEVANCE_TEXT,
                ContextQuality::LowRelevance,
                considered,
            );
        }

        let mut parts = Vec::with_capacity(selected.len());
        let mut citations = Vec::with_capacity(selected.len());
        let mut total = 0.0_f32;

        for (i, doc) in selected.iter().enumerate() {
            let rank = i + 1;
            let source = if doc.metadata.source.trim().is_empty() {
                format!("Document {rank}")
            } else {
                doc.metadata.source.clone()
            };
            parts.push(format!("Source {rank} (from {source}):\n{}", doc.content));
            citations.push(Citation {
                source,
                page: doc
                    .metadata
                    .page
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_PAGE.to_string()),
            });
            total += doc.relevance_score();
        }

        let relevance_score = total / selected.len() as f32;
        debug!(considered, used = selected.len(), relevance_score, "Context assembled");

        AssembledContext {
            text: parts.join("\n\n"),
            citations,
            relevance_score,
            quality: ContextQuality::Grounded,
            documents_considered: considered,
        }
    }
}
