//! Validation strategies: decide whether a candidate prompt may be accepted.
//!
//! Variants trade cost for rigor:
//!
//! | name             | evaluates                         | accepts when         |
//! |------------------|-----------------------------------|----------------------|
//! | `full`           | every example, fail-fast          | all pass             |
//! | `batched`        | random `batch-size` sample, fail-fast | all sampled pass |
//! | `sample`         | random `sample-size` sample       | fraction ≥ threshold |
//! | `single_example` | the failing example from context  | it passes            |
//! | `none`           | nothing                           | always               |
//!
//! Every variant accepts an empty dataset vacuously with score 1.0.

mod batched;
mod full;
mod none;
mod sample;
mod single_example;

pub use batched::BatchedValidation;
pub use full::FullValidation;
pub use none::NoValidation;
pub use sample::SampleValidation;
pub use single_example::SingleExampleValidation;

use std::sync::Mutex;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Example, Fields, Prediction};

/// Runs one model evaluation of `prompt` on `inputs`.
pub type EvaluateFn<'a> = dyn Fn(&str, &Fields) -> Result<Prediction> + 'a;

/// Judges one prediction against its gold example.
pub type ScoreFn<'a> = dyn Fn(&Example, &Prediction) -> bool + 'a;

/// Extra data a strategy may need beyond the dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationContext<'a> {
    /// The example that triggered the current refinement
    pub example: Option<&'a Example>,
}

impl<'a> ValidationContext<'a> {
    pub fn for_example(example: &'a Example) -> Self {
        ValidationContext {
            example: Some(example),
        }
    }
}

/// Verdict on a candidate prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    /// Fraction correct, for strategies that grade
    pub score: Option<f64>,
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        ValidationOutcome {
            is_valid: true,
            score: None,
        }
    }

    pub fn rejected() -> Self {
        ValidationOutcome {
            is_valid: false,
            score: None,
        }
    }

    /// Accepted with score 1.0: nothing to check.
    pub fn vacuous() -> Self {
        ValidationOutcome {
            is_valid: true,
            score: Some(1.0),
        }
    }

    pub fn from_bool(is_valid: bool) -> Self {
        if is_valid {
            Self::accepted()
        } else {
            Self::rejected()
        }
    }
}

/// Gatekeeper between a merged candidate and the accepted prompt.
pub trait ValidationStrategy: Send + Sync {
    /// Registry name of this strategy.
    fn name(&self) -> &'static str;

    fn validate(
        &self,
        candidate: &str,
        evaluate: &EvaluateFn<'_>,
        score: &ScoreFn<'_>,
        dataset: &[Example],
        context: &ValidationContext<'_>,
    ) -> Result<ValidationOutcome>;
}

/// True iff every example passes; stops at the first failure.
fn all_pass<'e>(
    candidate: &str,
    evaluate: &EvaluateFn<'_>,
    score: &ScoreFn<'_>,
    examples: impl IntoIterator<Item = &'e Example>,
) -> Result<bool> {
    for (checked, example) in examples.into_iter().enumerate() {
        let prediction = evaluate(candidate, &example.inputs())?;
        if !score(example, &prediction) {
            tracing::debug!(passed = checked, "validation failed fast");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Draws examples without replacement. Seeded for reproducible runs.
struct Sampler {
    rng: Mutex<StdRng>,
}

impl Sampler {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Sampler {
            rng: Mutex::new(rng),
        }
    }

    /// Up to `n` distinct examples (all of them when the dataset is smaller).
    fn draw<'d>(&self, dataset: &'d [Example], n: usize) -> Vec<&'d Example> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        dataset.choose_multiple(&mut *rng, n).collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    /// Examples `q=i -> a=i`.
    pub fn dataset(n: usize) -> Vec<Example> {
        (0..n)
            .map(|i| Example::from_pairs([("q", json!(i)), ("a", json!(i))]).with_inputs(["q"]))
            .collect()
    }

    /// Evaluator echoing `q` as `a`, except for inputs listed in `wrong`.
    pub fn echo_evaluator<'a>(
        wrong: &'a [u64],
        calls: &'a Cell<usize>,
    ) -> impl Fn(&str, &Fields) -> Result<Prediction> + 'a {
        move |_prompt, inputs| {
            calls.set(calls.get() + 1);
            let q = inputs["q"].as_u64().unwrap_or(0);
            let a = if wrong.contains(&q) { json!(-1) } else { json!(q) };
            Ok(Prediction::new([("a".to_string(), a)].into_iter().collect(), None))
        }
    }

    pub fn score(example: &Example, prediction: &Prediction) -> bool {
        example.get("a") == prediction.get("a")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_every_strategy_accepts_empty_dataset() {
        let calls = Cell::new(0);
        let evaluate = echo_evaluator(&[], &calls);
        let lone = dataset(1).remove(0);
        let ctx = ValidationContext::for_example(&lone);

        let strategies: Vec<Box<dyn ValidationStrategy>> = vec![
            Box::new(FullValidation),
            Box::new(BatchedValidation::new(10, Some(1)).unwrap()),
            Box::new(SampleValidation::new(3, 1.0, Some(1)).unwrap()),
            Box::new(SingleExampleValidation),
            Box::new(NoValidation),
        ];
        for strategy in strategies {
            let outcome = strategy
                .validate("prompt", &evaluate, &score, &[], &ctx)
                .unwrap();
            assert!(outcome.is_valid, "{} rejected an empty dataset", strategy.name());
        }
    }

    #[test]
    fn test_sampler_is_reproducible_with_seed() {
        let data = dataset(20);
        let a: Vec<_> = Sampler::new(Some(9)).draw(&data, 5).into_iter().cloned().collect();
        let b: Vec<_> = Sampler::new(Some(9)).draw(&data, 5).into_iter().cloned().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn test_sampler_caps_at_dataset_size() {
        let data = dataset(2);
        assert_eq!(Sampler::new(None).draw(&data, 10).len(), 2);
    }
}
