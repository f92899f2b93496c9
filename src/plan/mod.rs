//! Plan parsing: task extraction and prompt alignment.
//!
//! ```text
//! plan text ──> TaskExtractor::extract() ──> Vec<TaskRecord>
//!                                                 │
//! prompt text ──> PromptAligner::align() <────────┘
//!                        │
//!                        v
//!                 PromptAssignment (title -> fragment)
//! ```

pub mod align;
pub mod extract;
pub mod types;

pub use align::{AlignmentMode, PromptAligner, PromptAssignment};
pub use extract::TaskExtractor;
pub use types::{ExtractionStrategy, StrategyOutcome, TaskRecord, UNASSIGNED};
