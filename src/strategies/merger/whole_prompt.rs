use super::MergerStrategy;
use crate::error::Result;
use crate::types::{PatchOperation, PromptPatch};

/// Treats the prompt as a single block and ignores `target_block`.
///
/// `Replace` rewrites the whole prompt; `Append` adds a paragraph at the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholePromptMerger;

impl WholePromptMerger {
    pub fn new() -> Self {
        Self
    }
}

impl MergerStrategy for WholePromptMerger {
    fn name(&self) -> &'static str {
        "whole_prompt"
    }

    fn merge(&self, base_prompt: &str, patch: &PromptPatch) -> Result<String> {
        let merged = match patch.operation {
            PatchOperation::Replace => patch.content.clone(),
            PatchOperation::Append => {
                format!("{}\n\n{}", base_prompt.trim_end(), patch.content.trim())
            }
        };
        Ok(merged.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_rewrites_everything() {
        let patch = PromptPatch::new("", PatchOperation::Replace, "  New prompt.\n");
        let merged = WholePromptMerger.merge("### Task\nOld.", &patch).unwrap();
        assert_eq!(merged, "New prompt.");
    }

    #[test]
    fn test_append_adds_paragraph() {
        let patch = PromptPatch::new("### Missing", PatchOperation::Append, "Be precise.");
        let merged = WholePromptMerger.merge("### Task\nOld.\n", &patch).unwrap();
        assert_eq!(merged, "### Task\nOld.\n\nBe precise.");
    }
}
