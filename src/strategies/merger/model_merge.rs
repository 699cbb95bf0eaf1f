//! Model-backed merging: the model rewrites the prompt to absorb the patch.
//!
//! Useful when prompts are free prose rather than `###` blocks, where a
//! textual splice would land in the wrong place.

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use super::MergerStrategy;
use crate::error::Result;
use crate::model::{InvocationError, LanguageModel, ModelRequest};
use crate::types::{value_to_string, FieldSpec, Fields, PromptPatch};

/// Instructions for the merge task.
pub const MERGER_INSTRUCTIONS: &str = r#"You maintain the instruction prompt of an extraction model. You are given the
current prompt (base_prompt) and one proposed edit: the block it targets, the
operation (`append` or `replace`) and the new content.

Produce the complete prompt with the edit applied.

Rules:
- Keep every instruction, heuristic and example of base_prompt that the edit
  does not explicitly replace.
- Keep block header lines (such as `### HEURISTICS`) exactly as written.
- For `append`, place the content at the end of the targeted block. For
  `replace`, substitute the body of that block.
- If the targeted block does not exist, integrate the content where it fits best.
- Do not add commentary. Return only the merged prompt."#;

/// Asks a model to merge the patch into the base prompt. One call per merge.
pub struct ModelMerger {
    model: Arc<dyn LanguageModel>,
    temperature: f64,
}

impl ModelMerger {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        ModelMerger {
            model,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn request(&self, base_prompt: &str, patch: &PromptPatch) -> ModelRequest {
        let inputs: Fields = [
            ("base_prompt", base_prompt),
            ("target_block", patch.target_block.as_str()),
            ("operation", patch.operation.as_str()),
            ("content", patch.content.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();

        ModelRequest {
            instructions: MERGER_INSTRUCTIONS.to_string(),
            inputs,
            output_fields: vec![FieldSpec::new("prompt", "The merged prompt")],
            temperature: self.temperature,
        }
    }
}

impl fmt::Debug for ModelMerger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMerger")
            .field("model", &self.model.name())
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl MergerStrategy for ModelMerger {
    fn name(&self) -> &'static str {
        "llm_merge"
    }

    fn merge(&self, base_prompt: &str, patch: &PromptPatch) -> Result<String> {
        let response = self.model.invoke(&self.request(base_prompt, patch))?;
        let merged = response
            .outputs
            .get("prompt")
            .map(value_to_string)
            .unwrap_or_default();

        let merged = merged.trim();
        if merged.is_empty() {
            let err = InvocationError::Response("merge returned an empty prompt".to_string());
            return Err(err.into());
        }
        tracing::debug!(
            before = base_prompt.len(),
            after = merged.len(),
            "model merged patch"
        );
        Ok(merged.to_string())
    }
}
