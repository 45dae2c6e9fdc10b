//! Session memory and persistence for SmartSeva.
//!
//! - [`SessionRegistry`]: per-session bounded conversation buffers
//! - [`FileSessionStore`] / [`InMemorySessionStore`]: the persisted chat log
//! - [`KeywordCorpus`]: a JSONL-backed document store

pub mod buffer;
pub mod corpus;
pub mod file_store;
pub mod in_memory;
pub mod registry;

pub use buffer::{ConversationBuffer, Exchange};
pub use corpus::KeywordCorpus;
pub use file_store::FileSessionStore;
pub use in_memory::{InMemorySessionStore, SessionMap};
pub use registry::{BufferSummary, RehydrationReport, SessionRegistry};
