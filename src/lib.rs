//! promptpatch - validated, patch-based prompt refinement
//!
//! Repairs an instruction prompt so an LLM extraction task passes more of a
//! labeled dataset. The prompt is treated as a patchable artifact: each
//! failing example gets a bounded number of refinement attempts, and every
//! proposed edit must pass validation before it is committed.
//!
//! # Architecture
//!
//! ```text
//! Evaluator → Scorer → Refiner → Merger → Validator → commit / retry / flag
//!     ↓          ↓        ↓         ↓          ↓              ↓
//!  fresh     registry  patch    block     full/batched/   callbacks
//!  request    lookup   JSON     edits     sample/single   (history, tracing)
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use promptpatch::{AgentModel, Agent, Example, PromptOptimizer, Signature, TracingCallback};
//!
//! # fn main() -> promptpatch::Result<()> {
//! let signature = Signature::new("AmountExtractor")
//!     .input("file", "Invoice text")
//!     .output("amount", "Amount excluding taxes");
//! let prompt = "### TASK\nExtract the amount excluding taxes.\n### EXAMPLES\n### HEURISTICS";
//!
//! let mut optimizer = PromptOptimizer::builder(signature, prompt)
//!     .model(Arc::new(AgentModel::new(Agent::Claude)))
//!     .validator("sample")
//!     .build()?;
//!
//! let dataset = vec![
//!     Example::from_pairs([("file", "Subtotaal 80,00 Totaal 96,80"), ("amount", "80.00")])
//!         .with_inputs(["file"]),
//! ];
//! let result = optimizer.optimize(&dataset, "numeric", &mut [&mut TracingCallback])?;
//! println!("{}", result.final_prompt);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod optimizer;
pub mod refiner;
pub mod registry;
pub mod state;
pub mod strategies;
pub mod types;

// Re-export core types
pub use types::{Example, FieldSpec, Fields, PatchOperation, Prediction, PromptPatch, Signature};

pub use config::{Config, MergeErrorPolicy, StrategySettings};
pub use error::{OptimizerError, Result};
pub use evaluator::Evaluator;
pub use model::{
    Agent, AgentModel, FnModel, InvocationError, LanguageModel, ModelRequest, ModelResponse,
};
pub use optimizer::{OptimizationResult, OptimizerBuilder, PromptOptimizer, ScorerChoice};
pub use refiner::{Refiner, RefinementRequest, RefinerOutput};
pub use registry::{MergerContext, Registry};
pub use state::{Event, RunState};

// Re-export strategy families
pub use callback::{Callback, HistoryCallback, HistoryEntry, TracingCallback};
pub use strategies::merger::{BlockBasedMerger, MergerStrategy, ModelMerger, WholePromptMerger};
pub use strategies::register_builtins;
pub use strategies::scoring::ScorerOptions;
pub use strategies::validation::{ValidationContext, ValidationOutcome, ValidationStrategy};
