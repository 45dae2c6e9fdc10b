//! Context assembly: ranked, filtered, size-bounded prompt context.
//!
//! | Step | Rule |
//! |------|------|
//! | Rank | Relevance score, descending, stable |
//! | Filter | Drop scores below the threshold (default 0.3) |
//! | Cap | At most `max_documents` (default 5) |
//! | Score | Mean of retained scores |

pub mod assembler;

pub use assembler::{AssembledContext, AssemblyConfig, ContextAssembler, ContextQuality};
