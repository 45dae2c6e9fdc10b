//! Shared test doubles for pipeline tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use smartseva_core::document::{Document, DocumentStore};
use smartseva_core::error::{ProviderError, StoreError};
use smartseva_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk,
};
use tokio::sync::mpsc;

/// How a scripted stream ends after its fragments.
#[derive(Clone)]
enum Ending {
    Close,
    Fail(ProviderError),
    Hang,
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// A provider that streams a fixed list of fragments.
///
/// Records every request it receives.
pub struct ScriptedProvider {
    fragments: Vec<String>,
    ending: Ending,
    open_error: Option<ProviderError>,
    on_stream: Option<Hook>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ending: Ending::Close,
            open_error: None,
            on_stream: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose `stream` call itself fails.
    pub fn failing_on_open(err: ProviderError) -> Self {
        let mut provider = Self::new(Vec::<String>::new());
        provider.open_error = Some(err);
        provider
    }

    /// Fail after the fragments instead of closing.
    pub fn then_fail(mut self, err: ProviderError) -> Self {
        self.ending = Ending::Fail(err);
        self
    }

    /// Never close after the fragments.
    pub fn then_hang(mut self) -> Self {
        self.ending = Ending::Hang;
        self
    }

    /// Run `hook` each time a stream is opened.
    pub fn on_stream(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stream = Some(Box::new(hook));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            content: self.fragments.concat(),
            usage: None,
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(hook) = &self.on_stream {
            hook();
        }
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::channel(16);
        let fragments = self.fragments.clone();
        let ending = self.ending.clone();
        tokio::spawn(async move {
            for fragment in fragments {
                if tx.send(Ok(StreamChunk::text(fragment))).await.is_err() {
                    return;
                }
            }
            match ending {
                Ending::Close => {
                    let _ = tx.send(Ok(StreamChunk::done())).await;
                }
                Ending::Fail(err) => {
                    let _ = tx.send(Err(err)).await;
                }
                Ending::Hang => {
                    std::future::pending::<()>().await;
                    drop(tx);
                }
            }
        });
        Ok(rx)
    }
}

/// A document store serving a fixed list of documents.
pub struct StaticStore {
    documents: Vec<Document>,
    available: AtomicBool,
    recovers: bool,
    fail: bool,
    hang: bool,
    retrieve_calls: AtomicUsize,
    reinitialize_calls: AtomicUsize,
}

impl StaticStore {
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            available: AtomicBool::new(true),
            recovers: true,
            fail: false,
            hang: false,
            retrieve_calls: AtomicUsize::new(0),
            reinitialize_calls: AtomicUsize::new(0),
        }
    }

    /// Every retrieval fails.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Every retrieval hangs forever.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Start unavailable; `recovers` decides whether reinitialization works.
    pub fn unavailable(mut self, recovers: bool) -> Self {
        self.available = AtomicBool::new(false);
        self.recovers = recovers;
        self
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn reinitialize_calls(&self) -> usize {
        self.reinitialize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for StaticStore {
    fn name(&self) -> &str {
        "static"
    }

    async fn retrieve(&self, _query: &str) -> Result<Vec<Document>, StoreError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(StoreError::QueryFailed("index corrupted".into()));
        }
        Ok(self.documents.clone())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn reinitialize(&self) -> Result<(), StoreError> {
        self.reinitialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.recovers {
            self.available.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(StoreError::Unavailable("no documents loaded".into()))
        }
    }
}

/// Drain a fragment receiver.
pub async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
    let mut fragments = Vec::new();
    while let Some(fragment) = rx.recv().await {
        fragments.push(fragment);
    }
    fragments
}
