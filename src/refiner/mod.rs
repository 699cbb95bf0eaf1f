//! The refiner: diagnose a failing example and propose one patch.
//!
//! The refiner is itself a model task. Its instructions cast the model as a
//! prompt engineer and show two worked examples (adding a heuristic, adding an
//! example). Its outputs are the five strings of [`RefinerOutput`]; turning
//! them into a [`PromptPatch`] is a separate, fallible step so that a bad
//! `operation` can be handled as a failed attempt.

mod instructions;

pub use instructions::REFINER_INSTRUCTIONS;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{LanguageModel, ModelRequest};
use crate::types::{value_to_string, Fields, PatchOperation, PromptPatch, Signature};

/// Everything the refiner is shown about one failure.
#[derive(Debug, Clone, Copy)]
pub struct RefinementRequest<'a> {
    /// Prompt that produced the failure
    pub prompt: &'a str,
    /// Rendered example (`Inputs: {...}, Outputs: {...}`)
    pub example: &'a str,
    /// The task model's chain of thought
    pub error_reasoning: &'a str,
    pub prediction: &'a str,
    pub expected_output: &'a str,
    /// Descriptions of patches already rejected for this example
    pub history: &'a [String],
}

/// The refiner's raw answer.
///
/// Fields the model left out are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinerOutput {
    pub analysis: String,
    pub suggestion: String,
    pub target_block: String,
    pub operation: String,
    pub content: String,
}

impl RefinerOutput {
    /// Validate the proposed edit.
    ///
    /// Fails with `MalformedPatch` when `operation` is neither `append` nor
    /// `replace`. Whether the target block exists is the merger's call.
    pub fn to_patch(&self) -> Result<PromptPatch> {
        let operation: PatchOperation = self.operation.parse()?;
        Ok(PromptPatch::new(
            self.target_block.trim(),
            operation,
            self.content.clone(),
        ))
    }

    fn from_outputs(outputs: &Fields) -> Self {
        let field = |name: &str| outputs.get(name).map(value_to_string).unwrap_or_default();
        RefinerOutput {
            analysis: field("analysis"),
            suggestion: field("suggestion"),
            target_block: field("target_block"),
            operation: field("operation"),
            content: field("content"),
        }
    }
}

/// The refiner task's field layout.
pub fn refiner_signature() -> Signature {
    Signature::new("Refiner")
        .input("prompt", "The original prompt that needs to be improved.")
        .input("example", "The example that caused the prompt to fail.")
        .input("error_reasoning", "The flawed reasoning (chain of thought) from the model.")
        .input("prediction", "The incorrect final prediction from the model.")
        .input("expected_output", "The correct output that was expected.")
        .input(
            "history",
            "A list of previously attempted suggestions that have already failed for this example.",
        )
        .output(
            "analysis",
            "A step-by-step analysis of why the prompt failed for the given example. Be very \
             specific and reference the prompt, reasoning, example, and history.",
        )
        .output(
            "suggestion",
            "A concrete suggestion for how to modify the prompt to address the root cause \
             identified in the analysis.",
        )
        .output(
            "target_block",
            "The target block to modify (e.g., '### HEURISTICS' or '### EXAMPLES').",
        )
        .output("operation", "The operation to perform: 'append' or 'replace'.")
        .output("content", "The new content for the operation.")
        .with_instructions(REFINER_INSTRUCTIONS)
}

/// Asks the model for a diagnosis and a patch. One model call per `refine`.
pub struct Refiner {
    model: Arc<dyn LanguageModel>,
    signature: Signature,
    temperature: f64,
}

impl Refiner {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Refiner {
            model,
            signature: refiner_signature(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn refine(&self, request: &RefinementRequest<'_>) -> Result<RefinerOutput> {
        let history = Value::from(request.history.to_vec()).to_string();

        let inputs: Fields = [
            ("prompt", request.prompt.to_string()),
            ("example", request.example.to_string()),
            ("error_reasoning", request.error_reasoning.to_string()),
            ("prediction", request.prediction.to_string()),
            ("expected_output", request.expected_output.to_string()),
            ("history", history),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();

        let model_request = ModelRequest {
            instructions: self.signature.instructions.clone(),
            inputs,
            output_fields: self.signature.outputs.clone(),
            temperature: self.temperature,
        };

        let response = self.model.invoke(&model_request)?;
        let output = RefinerOutput::from_outputs(&response.outputs);
        tracing::debug!(
            target_block = %output.target_block,
            operation = %output.operation,
            "refiner proposed patch"
        );
        Ok(output)
    }
}
