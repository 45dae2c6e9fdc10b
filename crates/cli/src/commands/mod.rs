pub mod ask;
pub mod chat;
pub mod onboard;
pub mod sessions;
pub mod status;

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use smartseva_config::AppConfig;
use smartseva_core::message::{Role, SessionId};
use smartseva_core::session::SessionStore;
use smartseva_memory::{FileSessionStore, KeywordCorpus, SessionRegistry};
use smartseva_pipeline::{PipelineSettings, QueryOutcome, QueryPipeline};
use tokio_stream::StreamExt;
use tracing::{info, warn};

pub type CmdResult<T = ()> = Result<T, Box<dyn Error>>;

pub fn load_config() -> CmdResult<AppConfig> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// Everything a command needs to answer questions against the session log.
pub struct Runtime {
    pub config: AppConfig,
    pub pipeline: Arc<QueryPipeline>,
    pub store: FileSessionStore,
}

impl Runtime {
    pub fn load() -> CmdResult<Self> {
        Self::from_config(load_config()?)
    }

    pub fn from_config(config: AppConfig) -> CmdResult<Self> {
        let router = smartseva_providers::build_from_config(&config);
        let provider = router.default().ok_or_else(|| {
            format!(
                "Provider '{}' is not configured. Run `smartseva onboard` and set an API key.",
                config.default_provider
            )
        })?;

        let corpus = Arc::new(KeywordCorpus::new(
            config.retrieval.corpus_path(),
            config.retrieval.top_k,
        ));
        let memory = Arc::new(SessionRegistry::new(config.memory.window_size));
        let pipeline = Arc::new(QueryPipeline::new(
            corpus,
            provider,
            memory,
            PipelineSettings::from_config(&config),
        ));
        let store = FileSessionStore::new(config.storage.chat_history_path());

        Ok(Self {
            config,
            pipeline,
            store,
        })
    }

    /// Resume `requested` from the session log, or start a new session.
    ///
    /// A resumed session's memory is rebuilt from its transcript.
    pub async fn open_session(&self, requested: Option<&str>) -> CmdResult<SessionId> {
        let memory = self.pipeline.memory();
        let custom = requested.map(SessionId::parse).transpose()?;

        if let Some(id) = &custom {
            if self.store.get(id).await?.is_some() {
                let transcript = self.store.messages(id).await?;
                let report = memory.rehydrate(id.as_str(), &transcript)?;
                if report.is_partial_failure() {
                    warn!(session = %id, messages = report.transcript_len, "Stored history could not be restored");
                }
                return Ok(id.clone());
            }
        }

        let id = self.store.create_session(custom).await?;
        memory.focus(id.as_str())?;
        info!(session = %id, "Started session");
        Ok(id)
    }

    /// Stream one answer to stdout and record the exchange in the session log.
    pub async fn answer(&self, session: &SessionId, question: &str) -> CmdResult<QueryOutcome> {
        let handle = self
            .pipeline
            .process_query(question, Some(session.to_string()));
        let (mut fragments, outcome) = handle.into_stream();

        let mut stdout = std::io::stdout();
        while let Some(fragment) = fragments.next().await {
            print!("{fragment}");
            stdout.flush()?;
        }
        println!();

        let outcome = outcome.await?;
        if let QueryOutcome::Completed(report) = &outcome {
            if !report.response.trim().is_empty() {
                self.persist(session, question, &report.response).await?;
            }
        }
        Ok(outcome)
    }

    async fn persist(&self, session: &SessionId, question: &str, answer: &str) -> CmdResult {
        let first = self
            .store
            .get(session)
            .await?
            .is_none_or(|record| record.messages.is_empty());

        self.store
            .append_message(session, Role::User, question.trim())
            .await?;
        self.store
            .append_message(session, Role::Assistant, answer)
            .await?;
        if first {
            self.store.update_title(session, question).await?;
        }
        Ok(())
    }
}
