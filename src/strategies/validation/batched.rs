use super::{all_pass, EvaluateFn, Sampler, ScoreFn, ValidationContext, ValidationOutcome, ValidationStrategy};
use crate::config::Config;
use crate::error::{OptimizerError, Result};
use crate::types::Example;

/// Fail-fast validation over a fresh random batch per call.
///
/// Cheaper than [`super::FullValidation`] on large datasets. Regressions
/// outside the drawn batch go unnoticed.
pub struct BatchedValidation {
    batch_size: usize,
    sampler: Sampler,
}

impl BatchedValidation {
    pub fn new(batch_size: usize, seed: Option<u64>) -> Result<Self> {
        if batch_size == 0 {
            return Err(OptimizerError::Configuration(
                "batch-size must be a positive integer".to_string(),
            ));
        }
        Ok(BatchedValidation {
            batch_size,
            sampler: Sampler::new(seed),
        })
    }

    pub fn from_config(config: &Config) -> Result<Box<dyn ValidationStrategy>> {
        Ok(Box::new(Self::new(config.strategy.batch_size, config.seed)?))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl ValidationStrategy for BatchedValidation {
    fn name(&self) -> &'static str {
        "batched"
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
        let batch = self.sampler.draw(dataset, self.batch_size);
        tracing::debug!(batch = batch.len(), of = dataset.len(), "batched validation");
        let passed = all_pass(candidate, evaluate, score, batch)?;
        Ok(ValidationOutcome::from_bool(passed))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            BatchedValidation::new(0, None),
            Err(OptimizerError::Configuration(_))
        ));
    }

    #[test]
    fn test_evaluates_at_most_batch_size() {
        let calls = Cell::new(0);
        let strategy = BatchedValidation::new(3, Some(42)).unwrap();
        let outcome = strategy
            .validate("p", &echo_evaluator(&[], &calls), &score, &dataset(10), &Default::default())
            .unwrap();
        assert!(outcome.is_valid);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_small_dataset_checked_completely() {
        let calls = Cell::new(0);
        let strategy = BatchedValidation::new(10, Some(42)).unwrap();
        let outcome = strategy
            .validate(
                "p",
                &echo_evaluator(&[0, 1], &calls),
                &score,
                &dataset(2),
                &Default::default(),
            )
            .unwrap();
        assert!(!outcome.is_valid);
        // fail-fast: the first drawn example already fails
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_from_config_uses_strategy_settings() {
        let mut config = Config::default();
        config.strategy.batch_size = 4;
        let strategy = BatchedValidation::from_config(&config).unwrap();
        assert_eq!(strategy.name(), "batched");
    }
}
