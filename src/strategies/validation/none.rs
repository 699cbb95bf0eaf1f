use super::{EvaluateFn, ScoreFn, ValidationContext, ValidationOutcome, ValidationStrategy};
use crate::config::Config;
use crate::error::Result;
use crate::types::Example;

/// Accepts every candidate without evaluating anything.
///
/// For watching what the refiner and merger produce in isolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl NoValidation {
    pub fn from_config(_config: &Config) -> Result<Box<dyn ValidationStrategy>> {
        Ok(Box::new(NoValidation))
    }
}

impl ValidationStrategy for NoValidation {
    fn name(&self) -> &'static str {
        "none"
    }

    fn validate(
        &self,
        _candidate: &str,
        _evaluate: &EvaluateFn<'_>,
        _score: &ScoreFn<'_>,
        dataset: &[Example],
        _context: &ValidationContext<'_>,
    ) -> Result<ValidationOutcome> {
        if dataset.is_empty() {
            return Ok(ValidationOutcome::vacuous());
        }
        Ok(ValidationOutcome::accepted())
    }
}
