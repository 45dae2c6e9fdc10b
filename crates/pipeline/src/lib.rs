//! The SmartSeva query pipeline.
//!
//! A question flows through five steps:
//!
//! 1. **Validate** the question
//! 2. **Ensure** the retrieval + generation chain is up
//! 3. **Retrieve and assemble** ranked document context plus session history
//! 4. **Generate**, streaming fragments to the caller under a deadline
//! 5. **Commit** the exchange to the session's memory
//!
//! Faults past step 2 degrade the answer rather than abort it.

pub mod context;
pub mod orchestrator;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{AssembledContext, AssemblyConfig, ContextAssembler, ContextQuality};
pub use orchestrator::{
    CommitStatus, PipelineSettings, PipelineStatus, QueryHandle, QueryOutcome, QueryPipeline,
    QueryReport, UNAVAILABLE_MESSAGE, validate_query,
};
pub use prompt::{PromptSections, SYSTEM_PROMPT};
