//! # Rulebook Engine
//!
//! Turns a question into a bounded, cited prompt. The deterministic path runs
//! analysis, routing, scoring, budget assembly, and prompt rendering against a
//! loaded pack; the legacy vector path swaps the first three stages for a
//! nearest-neighbor lookup over the pack's embedding blobs.

pub mod analyzer;
pub mod context;
pub mod engine;
pub mod normalize;
pub mod prompt;
pub mod router;
pub mod scorer;
pub mod vector_path;

#[cfg(test)]
mod test_helpers;

pub use context::{AssemblyInput, BudgetAssembler, TokenBudget};
pub use engine::{AskOptions, AskResult, Engine};
pub use prompt::{BuiltPrompt, PromptBuilder};
pub use router::QueryRouter;
