//! # SmartSeva Core
//!
//! Domain types, traits, and error definitions for the SmartSeva
//! government-services assistant. This crate has **no framework
//! dependencies**: it defines the domain model the other crates build on.
//!
//! ## Collaborators as traits
//!
//! The three external collaborators of the query pipeline are traits here:
//! - [`DocumentStore`]: `retrieve(query) -> ranked documents`
//! - [`Provider`]: the streaming text completion service
//! - [`SessionStore`]: the append-only, role-tagged chat log
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted stubs without touching the pipeline.

pub mod document;
pub mod error;
pub mod message;
pub mod provider;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use document::{Citation, Document, DocumentMetadata, DocumentStore};
pub use error::{GenerationFailure, MemoryError, ProviderError, StoreError, ValidationError};
pub use message::{Message, Role, SessionId, TranscriptMessage};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use session::{SessionRecord, SessionStore, SessionSummary};
