//! End-to-end integration tests for the SmartSeva assistant.
//!
//! These tests drive the full path a question takes: corpus retrieval,
//! context assembly, per-session memory, streamed generation, and the
//! persisted session log, including recovery of memory after a restart.

use std::sync::{Arc, Mutex};

use smartseva_core::document::Document;
use smartseva_core::error::ProviderError;
use smartseva_core::message::{Message, Role, SessionId};
use smartseva_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use smartseva_core::session::SessionStore;
use smartseva_memory::{FileSessionStore, KeywordCorpus, SessionRegistry};
use smartseva_pipeline::{
    CommitStatus, ContextQuality, PipelineSettings, QueryOutcome, QueryPipeline,
    UNAVAILABLE_MESSAGE,
};
use tempfile::TempDir;
use tokio_stream::StreamExt;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A provider that answers with scripted responses in sequence, repeating
/// the last one, and records every request.
struct ScriptedProvider {
    responses: Vec<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: responses.iter().map(|r| r.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, n: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len().min(self.responses.len() - 1);
        requests.push(request);
        Ok(ProviderResponse {
            content: self.responses[index].clone(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock".into(),
        })
    }
}

fn corpus() -> KeywordCorpus {
    KeywordCorpus::from_documents(
        vec![
            Document::new(
                "Old age pension is available for citizens above 60 years of age",
                "pension.pdf",
            )
            .with_page("2"),
            Document::new(
                "Ration card applications are accepted at the BSK counter",
                "ration.pdf",
            ),
        ],
        4,
    )
}

fn pipeline(
    store: impl smartseva_core::document::DocumentStore + 'static,
    provider: Arc<ScriptedProvider>,
    window: usize,
) -> Arc<QueryPipeline> {
    Arc::new(QueryPipeline::new(
        Arc::new(store),
        provider,
        Arc::new(SessionRegistry::new(window)),
        PipelineSettings::default(),
    ))
}

/// One turn of the calling layer: stream the answer, then append the
/// exchange to the session log.
async fn turn(
    pipeline: &Arc<QueryPipeline>,
    log: &FileSessionStore,
    session: &SessionId,
    question: &str,
) -> (String, QueryOutcome) {
    let (fragments, outcome) = pipeline
        .process_query(question, Some(session.to_string()))
        .into_stream();
    let streamed: Vec<String> = fragments.collect().await;
    let outcome = outcome.await.unwrap();

    if let QueryOutcome::Completed(report) = &outcome {
        let first = log.messages(session).await.unwrap().is_empty();
        log.append_message(session, Role::User, question).await.unwrap();
        log.append_message(session, Role::Assistant, &report.response)
            .await
            .unwrap();
        if first {
            log.update_title(session, question).await.unwrap();
        }
    }
    (streamed.concat(), outcome)
}

// ── E2E: Grounded answers ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_grounded_answer_cites_corpus() {
    let dir = TempDir::new().unwrap();
    let log = FileSessionStore::new(dir.path().join("chat_history.json"));
    let provider = Arc::new(ScriptedProvider::new(&["Citizens above 60 are eligible."]));
    let pipeline = pipeline(corpus(), provider.clone(), 6);

    let session = log.create_session(None).await.unwrap();
    let (answer, outcome) = turn(
        &pipeline,
        &log,
        &session,
        "Who is eligible for the old age pension?",
    )
    .await;

    assert_eq!(answer, "Citizens above 60 are eligible.");
    let QueryOutcome::Completed(report) = outcome else {
        panic!("expected a completed query");
    };
    assert_eq!(report.context_quality, ContextQuality::Grounded);
    assert_eq!(report.commit, CommitStatus::Committed);
    assert_eq!(report.citations.len(), 1);
    assert_eq!(report.citations[0].source, "pension.pdf");
    assert_eq!(report.citations[0].page, "2");

    // system, context, question
    let request = provider.request(0);
    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.messages[0].role, Role::System);
    assert!(request.messages[1].content.contains("Source 1 (from pension.pdf):"));
    assert!(!request.messages[1].content.contains("ration.pdf"));
    assert_eq!(
        request.messages[2].content,
        "Current question: Who is eligible for the old age pension?"
    );

    let record = log.get(&session).await.unwrap().unwrap();
    assert_eq!(record.message_count, 2);
    assert_eq!(record.title, "Who is eligible for the old...");
}

#[tokio::test]
async fn e2e_unmatched_question_uses_fallback_context() {
    let dir = TempDir::new().unwrap();
    let log = FileSessionStore::new(dir.path().join("chat_history.json"));
    let provider = Arc::new(ScriptedProvider::new(&["That is not in the knowledge base."]));
    let pipeline = pipeline(corpus(), provider.clone(), 6);

    let session = log.create_session(None).await.unwrap();
    let (_, outcome) = turn(&pipeline, &log, &session, "quantum chromodynamics").await;

    let report = outcome.report().unwrap();
    assert_eq!(report.context_quality, ContextQuality::NoDocuments);
    assert!(report.citations.is_empty());
    assert!(provider.request(0).messages[1]
        .content
        .contains("No specific service information found"));
}

// ── E2E: Session memory ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_follow_up_sees_earlier_exchange() {
    let dir = TempDir::new().unwrap();
    let log = FileSessionStore::new(dir.path().join("chat_history.json"));
    let provider = Arc::new(ScriptedProvider::new(&["Above 60.", "Aadhaar and age proof."]));
    let pipeline = pipeline(corpus(), provider.clone(), 6);

    let session = log.create_session(None).await.unwrap();
    turn(&pipeline, &log, &session, "Old age pension eligibility?").await;
    turn(&pipeline, &log, &session, "Which documents do I need for it?").await;

    let request = provider.request(1);
    assert_eq!(request.messages.len(), 5);
    assert_eq!(request.messages[2], Message::user("Old age pension eligibility?"));
    assert_eq!(request.messages[3], Message::assistant("Above 60."));
    assert_eq!(pipeline.memory().history(&session).len(), 2);
}

#[tokio::test]
async fn e2e_sessions_do_not_share_history() {
    let dir = TempDir::new().unwrap();
    let log = FileSessionStore::new(dir.path().join("chat_history.json"));
    let provider = Arc::new(ScriptedProvider::new(&["answer"]));
    let pipeline = pipeline(corpus(), provider.clone(), 6);

    let alice = log.create_session(None).await.unwrap();
    let bob = log.create_session(None).await.unwrap();
    assert_ne!(alice, bob);

    turn(&pipeline, &log, &alice, "My ration card number is 1234").await;
    turn(&pipeline, &log, &bob, "What is my ration card number?").await;

    let bob_request = provider.request(1);
    assert_eq!(bob_request.messages.len(), 3);
    assert!(bob_request
        .messages
        .iter()
        .all(|m| !m.content.contains("1234")));

    assert_eq!(pipeline.memory().history(&alice).len(), 1);
    assert_eq!(pipeline.memory().history(&bob).len(), 1);
}

#[tokio::test]
async fn e2e_concurrent_sessions_commit_to_their_own_buffers() {
    let provider = Arc::new(ScriptedProvider::new(&["answer"]));
    let pipeline = pipeline(corpus(), provider.clone(), 6);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                let (fragments, outcome) = pipeline
                    .process_query(format!("pension question {i}"), Some(format!("user-{i}")))
                    .into_stream();
                let _: Vec<String> = fragments.collect().await;
                outcome.await.unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_completed());
    }

    assert_eq!(pipeline.memory().session_count(), 8);
    for i in 0..8 {
        let id = SessionId::parse(&format!("user-{i}")).unwrap();
        let history = pipeline.memory().history(&id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].input, format!("pension question {i}"));
    }
}

// ── E2E: Restart recovery ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_memory_rehydrates_after_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chat_history.json");

    let session = {
        let log = FileSessionStore::new(path.clone());
        let provider = Arc::new(ScriptedProvider::new(&["a1", "a2", "a3"]));
        let pipeline = pipeline(corpus(), provider, 2);
        let session = log.create_session(None).await.unwrap();
        for q in ["pension q1", "pension q2", "pension q3"] {
            turn(&pipeline, &log, &session, q).await;
        }
        session
    };

    // New process: empty registry, log reopened from disk
    let log = FileSessionStore::new(path);
    let provider = Arc::new(ScriptedProvider::new(&["a4"]));
    let pipeline = pipeline(corpus(), provider.clone(), 2);
    assert!(pipeline.memory().history(&session).is_empty());

    let transcript = log.messages(&session).await.unwrap();
    assert_eq!(transcript.len(), 6);
    let report = pipeline
        .memory()
        .rehydrate(session.as_str(), &transcript)
        .unwrap();
    assert_eq!(report.valid_pairs, 3);
    assert_eq!(report.loaded, 2);
    assert_eq!(report.beyond_window, 1);
    assert_eq!(pipeline.memory().focused(), Some(session.clone()));

    turn(&pipeline, &log, &session, "pension q4").await;

    // Only the last two exchanges fit the window
    let request = provider.request(0);
    assert_eq!(request.messages.len(), 7);
    assert_eq!(request.messages[2], Message::user("pension q2"));
    assert_eq!(request.messages[5], Message::assistant("a3"));
    assert_eq!(log.messages(&session).await.unwrap().len(), 8);
}

#[tokio::test]
async fn e2e_rehydration_skips_malformed_history() {
    let dir = TempDir::new().unwrap();
    let log = FileSessionStore::new(dir.path().join("chat_history.json"));
    let session = log.create_session(None).await.unwrap();
    log.append_message(&session, Role::User, "pension q1").await.unwrap();
    log.append_message(&session, Role::User, "pension q1 again").await.unwrap();
    log.append_message(&session, Role::User, "pension q2").await.unwrap();
    log.append_message(&session, Role::Assistant, "a2").await.unwrap();

    let provider = Arc::new(ScriptedProvider::new(&["a3"]));
    let pipeline = pipeline(corpus(), provider.clone(), 6);
    let transcript = log.messages(&session).await.unwrap();
    let report = pipeline
        .memory()
        .rehydrate(session.as_str(), &transcript)
        .unwrap();

    assert_eq!(report.malformed, 2);
    assert_eq!(report.loaded, 1);
    assert_eq!(
        pipeline.memory().history(&session)[0].input,
        "pension q2"
    );
}

// ── E2E: Degraded paths ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_missing_corpus_recovers_once_file_appears() {
    let dir = TempDir::new().unwrap();
    let corpus_path = dir.path().join("corpus.jsonl");
    let log = FileSessionStore::new(dir.path().join("chat_history.json"));
    let provider = Arc::new(ScriptedProvider::new(&["Above 60."]));
    let pipeline = pipeline(KeywordCorpus::new(corpus_path.clone(), 4), provider.clone(), 6);
    assert!(!pipeline.get_status().chain_available);

    let session = log.create_session(None).await.unwrap();
    let (answer, outcome) = turn(&pipeline, &log, &session, "pension eligibility").await;
    assert_eq!(answer, UNAVAILABLE_MESSAGE);
    assert!(matches!(outcome, QueryOutcome::Unavailable));
    assert_eq!(provider.calls(), 0);
    assert!(log.messages(&session).await.unwrap().is_empty());

    std::fs::write(
        &corpus_path,
        "{\"content\":\"Old age pension eligibility starts at 60\",\"source\":\"pension.pdf\"}\n",
    )
    .unwrap();

    let (answer, outcome) = turn(&pipeline, &log, &session, "pension eligibility").await;
    assert_eq!(answer, "Above 60.");
    assert!(outcome.is_completed());
    assert!(pipeline.get_status().chain_available);
}

#[tokio::test]
async fn e2e_rejected_question_never_reaches_provider() {
    let dir = TempDir::new().unwrap();
    let log = FileSessionStore::new(dir.path().join("chat_history.json"));
    let provider = Arc::new(ScriptedProvider::new(&["unused"]));
    let pipeline = pipeline(corpus(), provider.clone(), 6);
    let session = log.create_session(None).await.unwrap();

    let (answer, outcome) = turn(&pipeline, &log, &session, "   ").await;
    assert_eq!(answer, "Invalid query: Empty query");
    assert!(matches!(outcome, QueryOutcome::Rejected(_)));
    assert_eq!(provider.calls(), 0);
    assert!(pipeline.memory().history(&session).is_empty());
}
