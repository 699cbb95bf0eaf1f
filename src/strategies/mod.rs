//! Pluggable strategy families and their built-in implementations.
//!
//! Nothing is registered implicitly. Call [`register_builtins`] once at
//! startup (the optimizer builder does this for you) before resolving names.

pub mod merger;
pub mod scoring;
pub mod validation;

use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::registry::{register_merger, register_scorer, register_validator, MergerContext};
use merger::{BlockBasedMerger, MergerStrategy, ModelMerger, WholePromptMerger};
use validation::{
    BatchedValidation, FullValidation, NoValidation, SampleValidation, SingleExampleValidation,
};

static BUILTINS: OnceCell<()> = OnceCell::new();

fn block_based(_context: &MergerContext<'_>) -> Result<Box<dyn MergerStrategy>> {
    Ok(Box::new(BlockBasedMerger::new()))
}

fn whole_prompt(_context: &MergerContext<'_>) -> Result<Box<dyn MergerStrategy>> {
    Ok(Box::new(WholePromptMerger::new()))
}

fn llm_merge(context: &MergerContext<'_>) -> Result<Box<dyn MergerStrategy>> {
    Ok(Box::new(
        ModelMerger::new(context.model.clone()).with_temperature(context.config.temperature),
    ))
}

/// Install the built-in mergers, validators and scorers.
///
/// Safe to call any number of times; only the first call registers.
pub fn register_builtins() {
    BUILTINS.get_or_init(|| {
        let results = [
            register_merger("block_based", block_based),
            register_merger("whole_prompt", whole_prompt),
            register_merger("llm_merge", llm_merge),
            register_validator("full", FullValidation::from_config),
            register_validator("batched", BatchedValidation::from_config),
            register_validator("sample", SampleValidation::from_config),
            register_validator("single_example", SingleExampleValidation::from_config),
            register_validator("none", NoValidation::from_config),
            register_scorer("exact_match", scoring::exact_match),
            register_scorer("numeric", scoring::numeric),
        ];
        for err in results.into_iter().filter_map(|r| r.err()) {
            // an embedder claimed a built-in name first; theirs wins
            tracing::warn!(error = %err, "built-in strategy not registered");
        }
    });
}
