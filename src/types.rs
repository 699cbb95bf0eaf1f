//! Core types for prompt refinement.
//!
//! Examples, predictions and patches are plain values: they are created once
//! and then only read. The prompt itself is just a `String` owned by the
//! optimizer and replaced wholesale on acceptance.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OptimizerError;

/// Named field values. Ordered so rendered prompts are deterministic.
pub type Fields = BTreeMap<String, Value>;

/// Render a field value the way a human would write it.
///
/// Strings are emitted without JSON quotes; everything else uses its JSON
/// representation (`1234.56`, `true`, `["a"]`).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A labeled dataset record, split into input fields and gold output fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    fields: Fields,
    input_keys: BTreeSet<String>,
}

impl Example {
    /// Create an example with no declared inputs (every field is a label).
    pub fn new(fields: Fields) -> Self {
        Example {
            fields,
            input_keys: BTreeSet::new(),
        }
    }

    /// Build from `(name, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Declare which fields are inputs. The rest are gold outputs.
    pub fn with_inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_input(&self, key: &str) -> bool {
        self.input_keys.contains(key)
    }

    /// Input fields only.
    pub fn inputs(&self) -> Fields {
        self.fields
            .iter()
            .filter(|(k, _)| self.input_keys.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Gold output fields only.
    pub fn labels(&self) -> Fields {
        self.fields
            .iter()
            .filter(|(k, _)| !self.input_keys.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Compact description handed to the refiner.
    pub fn summary(&self) -> String {
        let inputs = serde_json::to_string(&self.inputs()).unwrap_or_default();
        let labels = serde_json::to_string(&self.labels()).unwrap_or_default();
        format!("Inputs: {}, Outputs: {}", inputs, labels)
    }
}

/// What the model produced for one example.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub outputs: Fields,
    /// Free-text chain of thought, when the model supplied one
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl Prediction {
    pub fn new(outputs: Fields, reasoning: Option<String>) -> Self {
        Prediction { outputs, reasoning }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key)
    }

    pub fn reasoning(&self) -> &str {
        self.reasoning.as_deref().unwrap_or("")
    }
}

/// One named field of a task signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        FieldSpec {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// The shape of an extraction task: instructions plus declared fields.
///
/// Signatures are never mutated to inject a prompt. `with_instructions`
/// returns a new value, so concurrent evaluations with different prompts
/// never observe each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub instructions: String,
    pub inputs: Vec<FieldSpec>,
    pub outputs: Vec<FieldSpec>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Signature {
            name: name.into(),
            instructions: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, name: &str, description: &str) -> Self {
        self.inputs.push(FieldSpec::new(name, description));
        self
    }

    pub fn output(mut self, name: &str, description: &str) -> Self {
        self.outputs.push(FieldSpec::new(name, description));
        self
    }

    /// Copy of this signature carrying different instructions.
    pub fn with_instructions(&self, instructions: impl Into<String>) -> Self {
        Signature {
            instructions: instructions.into(),
            ..self.clone()
        }
    }

    /// The output field scorers compare against.
    pub fn primary_output(&self) -> Option<&FieldSpec> {
        self.outputs.first()
    }
}

/// The two edits a patch can make to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    Append,
    Replace,
}

impl PatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOperation::Append => "append",
            PatchOperation::Replace => "replace",
        }
    }
}

impl FromStr for PatchOperation {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(PatchOperation::Append),
            "replace" => Ok(PatchOperation::Replace),
            _ => Err(OptimizerError::MalformedPatch {
                operation: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single atomic edit proposal targeting one block of the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPatch {
    /// Header line of the block, e.g. `### Heuristics`
    pub target_block: String,
    pub operation: PatchOperation,
    pub content: String,
}

impl PromptPatch {
    pub fn new(
        target_block: impl Into<String>,
        operation: PatchOperation,
        content: impl Into<String>,
    ) -> Self {
        PromptPatch {
            target_block: target_block.into(),
            operation,
            content: content.into(),
        }
    }

    /// One-line description used in refinement history.
    pub fn summary(&self) -> String {
        format!(
            "Operation: {}, Target: '{}', Content: '{}'",
            self.operation, self.target_block, self.content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice_example() -> Example {
        Example::from_pairs([("file", json!("invoice_01.pdf")), ("amount", json!(80.0))])
            .with_inputs(["file"])
    }

    #[test]
    fn test_example_partitions_fields() {
        let ex = invoice_example();
        assert_eq!(ex.inputs().keys().collect::<Vec<_>>(), vec!["file"]);
        assert_eq!(ex.labels().keys().collect::<Vec<_>>(), vec!["amount"]);
        assert!(ex.is_input("file"));
        assert!(!ex.is_input("amount"));
    }

    #[test]
    fn test_example_summary() {
        let summary = invoice_example().summary();
        assert_eq!(
            summary,
            r#"Inputs: {"file":"invoice_01.pdf"}, Outputs: {"amount":80.0}"#
        );
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("abc")), "abc");
        assert_eq!(value_to_string(&json!(12.5)), "12.5");
        assert_eq!(value_to_string(&json!(null)), "");
    }

    #[test]
    fn test_patch_operation_parse() {
        assert_eq!("append".parse::<PatchOperation>().unwrap(), PatchOperation::Append);
        assert_eq!(" Replace ".parse::<PatchOperation>().unwrap(), PatchOperation::Replace);

        let err = "delete".parse::<PatchOperation>().unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::MalformedPatch { ref operation } if operation == "delete"
        ));
    }

    #[test]
    fn test_with_instructions_leaves_original_untouched() {
        let base = Signature::new("Extract").input("file", "").output("amount", "");
        let derived = base.with_instructions("### Task\nExtract the amount.");

        assert!(base.instructions.is_empty());
        assert_eq!(derived.instructions, "### Task\nExtract the amount.");
        assert_eq!(derived.outputs, base.outputs);
        assert_eq!(base.primary_output().map(|f| f.name.as_str()), Some("amount"));
    }

    #[test]
    fn test_patch_summary() {
        let patch = PromptPatch::new("### Heuristics", PatchOperation::Append, "- H2");
        assert_eq!(
            patch.summary(),
            "Operation: append, Target: '### Heuristics', Content: '- H2'"
        );
    }
}
