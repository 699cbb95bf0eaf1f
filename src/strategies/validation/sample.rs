use super::{EvaluateFn, Sampler, ScoreFn, ValidationContext, ValidationOutcome, ValidationStrategy};
use crate::config::Config;
use crate::error::{OptimizerError, Result};
use crate::types::Example;

/// Grades a random sample and accepts when the pass rate reaches `threshold`.
///
/// Unlike the fail-fast strategies this evaluates the whole sample and
/// reports the fraction correct, so partial regressions are visible.
pub struct SampleValidation {
    sample_size: usize,
    threshold: f64,
    sampler: Sampler,
}

impl SampleValidation {
    pub fn new(sample_size: usize, threshold: f64, seed: Option<u64>) -> Result<Self> {
        if sample_size == 0 {
            return Err(OptimizerError::Configuration(
                "sample-size must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(OptimizerError::Configuration(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                threshold
            )));
        }
        Ok(SampleValidation {
            sample_size,
            threshold,
            sampler: Sampler::new(seed),
        })
    }

    pub fn from_config(config: &Config) -> Result<Box<dyn ValidationStrategy>> {
        Ok(Box::new(Self::new(
            config.strategy.sample_size,
            config.strategy.threshold,
            config.seed,
        )?))
    }
}

impl ValidationStrategy for SampleValidation {
    fn name(&self) -> &'static str {
        "sample"
    }

    fn validate(
        &self,
        candidate: &str,
        evaluate: &EvaluateFn<'_>,
        score: &ScoreFn<'_>,
        dataset: &[Example],
        _context: &ValidationContext<'_>,
    ) -> Result<ValidationOutcome> {
        let sample = self.sampler.draw(dataset, self.sample_size);
        if sample.is_empty() {
            return Ok(ValidationOutcome::vacuous());
        }

        let mut correct = 0usize;
        for example in sample.iter().copied() {
            let prediction = evaluate(candidate, &example.inputs())?;
            if score(example, &prediction) {
                correct += 1;
            }
        }

        let fraction = correct as f64 / sample.len() as f64;
        tracing::debug!(correct, sampled = sample.len(), fraction, "sample validation");
        Ok(ValidationOutcome {
            is_valid: fraction >= self.threshold,
            score: Some(fraction),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_invalid_construction() {
        assert!(SampleValidation::new(0, 1.0, None).is_err());
        assert!(SampleValidation::new(3, 1.1, None).is_err());
        assert!(SampleValidation::new(3, -0.1, None).is_err());
        assert!(SampleValidation::new(3, 0.0, None).is_ok());
    }

    #[test]
    fn test_all_correct_scores_one() {
        let calls = Cell::new(0);
        let strategy = SampleValidation::new(3, 1.0, Some(3)).unwrap();
        let outcome = strategy
            .validate("p", &echo_evaluator(&[], &calls), &score, &dataset(10), &Default::default())
            .unwrap();
        assert_eq!(outcome, ValidationOutcome { is_valid: true, score: Some(1.0) });
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_threshold_grades_partial_success() {
        // dataset smaller than the sample: all three are used, one is wrong
        let calls = Cell::new(0);
        let data = dataset(3);

        let strict = SampleValidation::new(5, 1.0, Some(3)).unwrap();
        let outcome = strict
            .validate("p", &echo_evaluator(&[2], &calls), &score, &data, &Default::default())
            .unwrap();
        assert!(!outcome.is_valid);
        assert!((outcome.score.unwrap() - 2.0 / 3.0).abs() < 1e-12);

        let lenient = SampleValidation::new(5, 0.6, Some(3)).unwrap();
        let outcome = lenient
            .validate("p", &echo_evaluator(&[2], &calls), &score, &data, &Default::default())
            .unwrap();
        assert!(outcome.is_valid);
    }

    #[test]
    fn test_empty_dataset_is_vacuous() {
        let calls = Cell::new(0);
        let strategy = SampleValidation::new(3, 1.0, None).unwrap();
        let outcome = strategy
            .validate("p", &echo_evaluator(&[], &calls), &score, &[], &Default::default())
            .unwrap();
        assert_eq!(outcome, ValidationOutcome::vacuous());
    }
}
