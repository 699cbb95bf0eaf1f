//! Merger strategies: apply a [`PromptPatch`] to prompt text.
//!
//! A merger never mutates its input. It either returns a new candidate prompt
//! or fails (for example when the target block does not exist).

mod block_based;
mod model_merge;
mod whole_prompt;

pub use block_based::{block_headers, BlockBasedMerger};
pub use model_merge::{ModelMerger, MERGER_INSTRUCTIONS};
pub use whole_prompt::WholePromptMerger;

use crate::error::Result;
use crate::types::PromptPatch;

/// Turns `(base_prompt, patch)` into a candidate prompt.
pub trait MergerStrategy: Send + Sync {
    /// Registry name of this strategy.
    fn name(&self) -> &'static str;

    fn merge(&self, base_prompt: &str, patch: &PromptPatch) -> Result<String>;
}
