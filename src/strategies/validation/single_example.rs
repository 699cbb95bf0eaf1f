use super::{EvaluateFn, ScoreFn, ValidationContext, ValidationOutcome, ValidationStrategy};
use crate::config::Config;
use crate::error::{OptimizerError, Result};
use crate::types::Example;

/// Accepts a candidate as soon as it fixes the example being refined.
///
/// Fastest strategy; offers no protection against regressions elsewhere.
/// Requires `context.example`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleExampleValidation;

impl SingleExampleValidation {
    pub fn from_config(_config: &Config) -> Result<Box<dyn ValidationStrategy>> {
        Ok(Box::new(SingleExampleValidation))
    }
}

impl ValidationStrategy for SingleExampleValidation {
    fn name(&self) -> &'static str {
        "single_example"
    }

    fn validate(
        &self,
        candidate: &str,
        evaluate: &EvaluateFn<'_>,
        score: &ScoreFn<'_>,
        _dataset: &[Example],
        context: &ValidationContext<'_>,
    ) -> Result<ValidationOutcome> {
        let example = context.example.ok_or(OptimizerError::MissingContext {
            strategy: "single_example",
            key: "example",
        })?;
        let prediction = evaluate(candidate, &example.inputs())?;
        Ok(ValidationOutcome::from_bool(score(example, &prediction)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_missing_example_is_an_error() {
        let calls = Cell::new(0);
        let err = SingleExampleValidation
            .validate("p", &echo_evaluator(&[], &calls), &score, &dataset(3), &Default::default())
            .unwrap_err();
        assert!(matches!(err, OptimizerError::MissingContext { key: "example", .. }));
        assert!(err.is_configuration());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_only_context_example_is_checked() {
        // every other example in the dataset would fail
        let calls = Cell::new(0);
        let data = dataset(5);
        let outcome = SingleExampleValidation
            .validate(
                "p",
                &echo_evaluator(&[0, 1, 3, 4], &calls),
                &score,
                &data,
                &ValidationContext::for_example(&data[2]),
            )
            .unwrap();
        assert!(outcome.is_valid);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_rejects_when_example_still_wrong() {
        let calls = Cell::new(0);
        let data = dataset(1);
        let outcome = SingleExampleValidation
            .validate(
                "p",
                &echo_evaluator(&[0], &calls),
                &score,
                &data,
                &ValidationContext::for_example(&data[0]),
            )
            .unwrap();
        assert!(!outcome.is_valid);
    }
}
