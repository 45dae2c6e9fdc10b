//! Query orchestration — one question in, a stream of answer fragments out.
//!
//! # Flow
//!
//! 1. **Validate**: reject blank or over-long questions (the only step
//!    that short-circuits before any side effect)
//! 2. **Ensure chain**: the document store and completion chain must be
//!    up; one reinitialization is attempted, then "unavailable" is surfaced
//! 3. **Retrieve and assemble**: resolve the session, fetch documents under
//!    a timeout, assemble context, read the session's history. A retrieval
//!    fault degrades the context instead of failing the query
//! 4. **Generate**: stream fragments to the caller under a wall-clock
//!    deadline; a timeout keeps everything streamed so far
//! 5. **Commit**: write the (question, answer) pair to the session's buffer
//!
//! Generation faults are classified and answered with a fixed apology
//! fragment; the raw fault only reaches the logs.
//!
//! The session id is resolved once per query and every memory operation
//! after that uses it explicitly, so a focus change made elsewhere while
//! an answer streams cannot redirect the commit.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use smartseva_config::AppConfig;
use smartseva_core::document::{Citation, DocumentStore};
use smartseva_core::error::{GenerationFailure, MemoryError, ProviderError, ValidationError};
use smartseva_core::message::SessionId;
use smartseva_core::provider::{Provider, ProviderRequest};
use smartseva_memory::SessionRegistry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, trace, warn};

use crate::context::{AssembledContext, AssemblyConfig, ContextAssembler, ContextQuality};
use crate::prompt::{PromptSections, SYSTEM_PROMPT};

/// Fragment sent when the chain cannot be brought up.
pub const UNAVAILABLE_MESSAGE: &str =
    "RAG system is currently unavailable. Please ensure documents are loaded and try again.";

/// Fragments buffered between the pipeline task and the caller.
const FRAGMENT_BUFFER: usize = 64;

/// Pipeline limits and generation parameters.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Wall-clock ceiling for one query, measured from its start
    pub streaming_timeout: Duration,
    /// Ceiling for one document store call
    pub retrieval_timeout: Duration,
    /// Longest accepted question, in characters
    pub max_query_length: usize,
    pub assembly: AssemblyConfig,
    pub system_prompt: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini-2024-07-18".into(),
            temperature: 0.3,
            max_tokens: Some(1024),
            streaming_timeout: Duration::from_secs(60),
            retrieval_timeout: Duration::from_secs(30),
            max_query_length: 2000,
            assembly: AssemblyConfig::default(),
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());

        Self {
            model,
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            streaming_timeout: config.pipeline.streaming_timeout(),
            retrieval_timeout: config.pipeline.retrieval_timeout(),
            max_query_length: config.pipeline.max_query_length,
            assembly: AssemblyConfig {
                relevance_threshold: config.retrieval.relevance_threshold,
                max_documents: config.retrieval.max_context_documents,
            },
            system_prompt: config
                .identity
                .system_prompt_override
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
        }
    }
}

/// Check and normalize a question.
///
/// Length is measured in characters on the raw input; the accepted
/// question is trimmed.
pub fn validate_query(query: &str, max_length: usize) -> Result<String, ValidationError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let length = query.chars().count();
    if length > max_length {
        return Err(ValidationError::TooLong {
            length,
            max: max_length,
        });
    }
    Ok(trimmed.to_string())
}

/// What became of the generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum CommitStatus {
    /// The pair was written to the session's buffer.
    Committed,
    /// The answer was blank; nothing written.
    SkippedEmpty,
    /// No session was supplied or focused.
    NoSession,
    /// The write failed; the streamed answer stands.
    Failed(String),
    /// Generation failed, so there was nothing to commit.
    NotAttempted,
}

impl From<MemoryError> for CommitStatus {
    fn from(err: MemoryError) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Everything observable about one answered query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub session: Option<SessionId>,
    pub context_quality: ContextQuality,
    pub relevance_score: f32,
    pub citations: Vec<Citation>,
    /// Concatenation of the forwarded fragments
    pub response: String,
    pub fragments: usize,
    pub timed_out: bool,
    pub commit: CommitStatus,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// How a query ended.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// Bad input; one validation fragment was sent.
    Rejected(ValidationError),
    /// The chain could not be initialized; one unavailability fragment was sent.
    Unavailable,
    /// An answer was streamed (possibly cut short by the deadline).
    Completed(QueryReport),
    /// Generation faulted; any partial output was followed by an apology fragment.
    Failed {
        failure: GenerationFailure,
        report: QueryReport,
    },
}

impl QueryOutcome {
    pub fn report(&self) -> Option<&QueryReport> {
        match self {
            Self::Completed(report) | Self::Failed { report, .. } => Some(report),
            Self::Rejected(_) | Self::Unavailable => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// A running query: its fragment stream and its eventual outcome.
pub struct QueryHandle {
    pub fragments: mpsc::Receiver<String>,
    pub outcome: JoinHandle<QueryOutcome>,
}

impl QueryHandle {
    /// The fragments as a `Stream`, plus the outcome to await once it ends.
    pub fn into_stream(self) -> (ReceiverStream<String>, JoinHandle<QueryOutcome>) {
        (ReceiverStream::new(self.fragments), self.outcome)
    }
}

/// Read-only health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub chain_available: bool,
    pub store_available: bool,
    pub active_session_focused: bool,
    pub active_session_count: usize,
    pub store: String,
    pub provider: String,
    pub model: String,
    pub relevance_threshold: f32,
    pub max_context_documents: usize,
}

/// The initialized retrieval + generation pair.
struct RagChain {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
}

impl RagChain {
    fn request(&self, context: &str, history: &[smartseva_memory::Exchange], question: &str) -> ProviderRequest {
        let sections = PromptSections {
            system: &self.system_prompt,
            context,
            history,
            question,
        };
        ProviderRequest {
            model: self.model.clone(),
            messages: sections.to_messages(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }
}

#[derive(Debug, Default)]
struct Generation {
    response: String,
    fragments: usize,
    timed_out: bool,
    error: Option<ProviderError>,
}

/// The query pipeline.
pub struct QueryPipeline {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn Provider>,
    memory: Arc<SessionRegistry>,
    settings: PipelineSettings,
    assembler: ContextAssembler,
    chain: RwLock<Option<Arc<RagChain>>>,
}

impl QueryPipeline {
    /// Create a pipeline. The chain is built now if the store is ready,
    /// otherwise on first use.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn Provider>,
        memory: Arc<SessionRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        let pipeline = Self {
            assembler: ContextAssembler::new(settings.assembly),
            store,
            provider,
            memory,
            settings,
            chain: RwLock::new(None),
        };
        let chain = pipeline.build_chain();
        if chain.is_some() {
            info!(store = pipeline.store.name(), provider = pipeline.provider.name(), "Query chain initialized");
        }
        *pipeline.chain.write().unwrap_or_else(PoisonError::into_inner) = chain;
        pipeline
    }

    pub fn memory(&self) -> &Arc<SessionRegistry> {
        &self.memory
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn build_chain(&self) -> Option<Arc<RagChain>> {
        if !self.store.is_available() {
            warn!(store = self.store.name(), "Document store unavailable; chain not built");
            return None;
        }
        Some(Arc::new(RagChain {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            system_prompt: self.settings.system_prompt.clone(),
        }))
    }

    fn current_chain(&self) -> Option<Arc<RagChain>> {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reinitialize the document store and rebuild the chain.
    pub async fn reinitialize(&self) -> bool {
        info!("Reinitializing query pipeline");
        let chain = match self.store.reinitialize().await {
            Ok(()) => self.build_chain(),
            Err(e) => {
                error!(error = %e, "Failed to reinitialize document store");
                None
            }
        };
        let success = chain.is_some();
        *self.chain.write().unwrap_or_else(PoisonError::into_inner) = chain;
        info!(success, "Pipeline reinitialization finished");
        success
    }

    async fn ensure_chain(&self) -> Option<Arc<RagChain>> {
        if let Some(chain) = self.current_chain() {
            if self.store.is_available() {
                return Some(chain);
            }
        }
        info!("Chain not available; attempting to recreate");
        if self.reinitialize().await {
            self.current_chain()
        } else {
            None
        }
    }

    /// Health snapshot. No side effects.
    pub fn get_status(&self) -> PipelineStatus {
        PipelineStatus {
            chain_available: self.current_chain().is_some(),
            store_available: self.store.is_available(),
            active_session_focused: self.memory.focused().is_some(),
            active_session_count: self.memory.session_count(),
            store: self.store.name().to_string(),
            provider: self.provider.name().to_string(),
            model: self.settings.model.clone(),
            relevance_threshold: self.settings.assembly.relevance_threshold,
            max_context_documents: self.settings.assembly.max_documents,
        }
    }

    /// Start answering `query` on a background task.
    ///
    /// Fragments arrive on the handle's receiver as they are generated; the
    /// channel closes when the query is finished.
    pub fn process_query(
        self: &Arc<Self>,
        query: impl Into<String>,
        session_id: Option<String>,
    ) -> QueryHandle {
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let pipeline = Arc::clone(self);
        let query = query.into();
        let outcome =
            tokio::spawn(async move { pipeline.run(&query, session_id.as_deref(), &tx).await });
        QueryHandle {
            fragments: rx,
            outcome,
        }
    }

    /// Answer `query`, sending fragments to `tx`.
    pub async fn run(
        &self,
        query: &str,
        session_id: Option<&str>,
        tx: &mpsc::Sender<String>,
    ) -> QueryOutcome {
        let started = Instant::now();
        let deadline = started + self.settings.streaming_timeout;
        info!(query_len = query.len(), session = ?session_id, "Processing query");

        // ── Validate ──
        let question = match validate_query(query, self.settings.max_query_length) {
            Ok(q) => q,
            Err(e) => {
                warn!(reason = %e, "Query rejected");
                let _ = tx.send(e.user_message()).await;
                return QueryOutcome::Rejected(e);
            }
        };

        // ── Ensure chain ──
        let Some(chain) = self.ensure_chain().await else {
            error!("Query chain unavailable after reinitialization");
            let _ = tx.send(UNAVAILABLE_MESSAGE.to_string()).await;
            return QueryOutcome::Unavailable;
        };

        // ── Retrieve and assemble ──
        let session = self.resolve_session(session_id);
        let context = self.retrieve_and_assemble(&chain, &question).await;
        let history = session
            .as_ref()
            .map(|id| self.memory.history(id))
            .unwrap_or_default();
        debug!(
            quality = ?context.quality,
            relevance = context.relevance_score,
            history_pairs = history.len(),
            "Generation input composed"
        );
        let request = chain.request(&context.text, &history, &question);

        // ── Generate ──
        let generation = self.generate(&chain, request, tx, deadline).await;

        let mut report = QueryReport {
            session,
            context_quality: context.quality,
            relevance_score: context.relevance_score,
            citations: context.citations,
            response: generation.response,
            fragments: generation.fragments,
            timed_out: generation.timed_out,
            commit: CommitStatus::NotAttempted,
            elapsed: Duration::ZERO,
        };

        if let Some(err) = generation.error {
            let failure = GenerationFailure::classify(&err);
            report.elapsed = started.elapsed();
            error!(
                error = %err,
                class = %failure,
                elapsed_ms = report.elapsed.as_millis() as u64,
                fragments = report.fragments,
                "Error processing query"
            );
            let _ = tx.send(failure.user_message().to_string()).await;
            return QueryOutcome::Failed { failure, report };
        }

        // ── Commit ──
        report.commit = self.commit(report.session.as_ref(), &question, &report.response);
        report.elapsed = started.elapsed();
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            fragments = report.fragments,
            timed_out = report.timed_out,
            "Query processed"
        );
        QueryOutcome::Completed(report)
    }

    /// Focus the supplied session, or fall back to whatever is focused.
    fn resolve_session(&self, session_id: Option<&str>) -> Option<SessionId> {
        match session_id {
            Some(raw) => match self.memory.focus(raw) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "Failed to focus session; continuing with current context");
                    self.memory.focused()
                }
            },
            None => self.memory.focused(),
        }
    }

    async fn retrieve_and_assemble(&self, chain: &RagChain, question: &str) -> AssembledContext {
        let limit = self.settings.retrieval_timeout;
        match timeout(limit, chain.store.retrieve(question)).await {
            Ok(Ok(documents)) => self.assembler.assemble(documents, question),
            Ok(Err(e)) => {
                warn!(error = %e, "Retrieval failed; continuing with degraded context");
                AssembledContext::degraded()
            }
            Err(_) => {
                warn!(timeout_secs = limit.as_secs(), "Retrieval timed out; continuing with degraded context");
                AssembledContext::degraded()
            }
        }
    }

    async fn generate(
        &self,
        chain: &RagChain,
        request: ProviderRequest,
        tx: &mpsc::Sender<String>,
        deadline: Instant,
    ) -> Generation {
        let mut generation = Generation::default();

        let mut chunks = match timeout_at(deadline, chain.provider.stream(request)).await {
            Ok(Ok(rx)) => rx,
            Ok(Err(e)) => {
                generation.error = Some(e);
                return generation;
            }
            Err(_) => {
                generation.timed_out = true;
                generation.error = Some(ProviderError::Timeout(
                    "no response before the streaming deadline".into(),
                ));
                return generation;
            }
        };

        loop {
            match timeout_at(deadline, chunks.recv()).await {
                Ok(Some(Ok(chunk))) => {
                    let done = chunk.done;
                    if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                        if tx.send(text.clone()).await.is_err() {
                            debug!("Caller dropped the fragment stream");
                            break;
                        }
                        trace!(len = text.len(), "Fragment forwarded");
                        generation.response.push_str(&text);
                        generation.fragments += 1;
                    }
                    if done {
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    generation.error = Some(e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(fragments = generation.fragments, "Query processing timeout reached");
                    generation.timed_out = true;
                    if generation.fragments == 0 {
                        generation.error = Some(ProviderError::Timeout(
                            "no output before the streaming deadline".into(),
                        ));
                    }
                    break;
                }
            }
        }
        generation
    }

    fn commit(&self, session: Option<&SessionId>, question: &str, response: &str) -> CommitStatus {
        if response.trim().is_empty() {
            warn!("Empty response generated, not saving to memory");
            return CommitStatus::SkippedEmpty;
        }
        let Some(id) = session else {
            warn!("No session to save the exchange to");
            return CommitStatus::NoSession;
        };
        match self.memory.commit_to(id, question, response) {
            Ok(()) => {
                info!(session = %id, "Exchange saved to session memory");
                CommitStatus::Committed
            }
            Err(e) => {
                warn!(session = %id, error = %e, "Failed to save exchange to session memory");
                e.into()
            }
        }
    }
}
