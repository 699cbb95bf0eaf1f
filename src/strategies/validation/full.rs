use super::{all_pass, EvaluateFn, ScoreFn, ValidationContext, ValidationOutcome, ValidationStrategy};
use crate::config::Config;
use crate::error::Result;
use crate::types::Example;

/// Checks the whole dataset; rejects on the first regression.
///
/// Thorough but costs up to one model call per example per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullValidation;

impl FullValidation {
    pub fn from_config(_config: &Config) -> Result<Box<dyn ValidationStrategy>> {
        Ok(Box::new(FullValidation))
    }
}

impl ValidationStrategy for FullValidation {
    fn name(&self) -> &'static str {
        "full"
    }

    fn validate(
        &self,
        candidate: &str,
        evaluate: &EvaluateFn<'_>,
        score: &ScoreFn<'_>,
        dataset: &[Example],
        _context: &ValidationContext<'_>,
    ) -> Result<ValidationOutcome> {
        if dataset.is_empty() {
            return Ok(ValidationOutcome::vacuous());
        }
        let passed = all_pass(candidate, evaluate, score, dataset)?;
        Ok(ValidationOutcome::from_bool(passed))
    }
}
