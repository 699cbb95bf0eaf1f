//! Block-based merging.
//!
//! A prompt is a sequence of blocks, each introduced by a header line that
//! starts with `### `. A block's body runs from the end of its header line to
//! the next header (or end of text).
//!
//! Both gaps around a body survive an edit, so replacing a block with its own
//! body is a no-op.
//!
//! ```text
//! ### Heuristics        <- header (matched by patch.target_block)
//! - H1                  <- body
//!                       <- gap, kept as-is
//! ### Examples          <- next header
//! - E1
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use super::MergerStrategy;
use crate::error::{OptimizerError, Result};
use crate::types::{PatchOperation, PromptPatch};

/// Start of any block header.
static BLOCK_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^###\s").unwrap());

/// Header lines of every block, in order.
pub fn block_headers(prompt: &str) -> Vec<&str> {
    prompt
        .lines()
        .filter(|line| BLOCK_HEADER.is_match(line))
        .collect()
}

/// Appends to or replaces the body of a named block.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockBasedMerger;

impl BlockBasedMerger {
    pub fn new() -> Self {
        Self
    }

    /// Byte span `(start, end)` of the body under `header`.
    ///
    /// `start` is the end of the first line beginning with `header`; `end` is
    /// the start of the next block header after it, or the end of the text.
    fn locate(prompt: &str, header: &str) -> Result<(usize, usize)> {
        let not_found = || OptimizerError::BlockNotFound {
            block: header.to_string(),
        };
        if header.trim().is_empty() {
            return Err(not_found());
        }

        let pattern = format!(r"(?m)^{}.*$", regex::escape(header));
        let target = Regex::new(&pattern)
            .map_err(|e| OptimizerError::Configuration(format!("block pattern: {}", e)))?;
        let start = target.find(prompt).ok_or_else(not_found)?.end();

        let end = BLOCK_HEADER
            .find_at(prompt, start)
            .map(|m| m.start())
            .unwrap_or(prompt.len());

        Ok((start, end))
    }
}

impl MergerStrategy for BlockBasedMerger {
    fn name(&self) -> &'static str {
        "block_based"
    }

    fn merge(&self, base_prompt: &str, patch: &PromptPatch) -> Result<String> {
        let (start, end) = Self::locate(base_prompt, &patch.target_block)?;
        let body = &base_prompt[start..end];
        let rest = &base_prompt[end..];

        // Whitespace between the body and the next header survives the edit.
        let gap = match &body[body.trim_end().len()..] {
            g if g.contains('\n') && !rest.is_empty() => g,
            _ => "\n",
        };
        let content = patch.content.trim_end();

        let merged = match patch.operation {
            PatchOperation::Append => format!(
                "{}\n{}{}{}",
                base_prompt[..end].trim_end(),
                content,
                gap,
                rest
            ),
            PatchOperation::Replace => format!(
                "{}{}{}{}{}",
                &base_prompt[..start],
                leading_gap(body),
                content,
                gap,
                rest
            ),
        };

        Ok(merged.trim().to_string())
    }
}

/// Blank lines between a header and its body, up to the body's first line.
fn leading_gap(body: &str) -> &str {
    if body.trim().is_empty() {
        return "\n";
    }
    let whitespace = &body[..body.len() - body.trim_start().len()];
    match whitespace.rfind('\n') {
        Some(i) => &whitespace[..=i],
        None => "\n",
    }
}
