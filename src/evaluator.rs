//! Prompt evaluation.
//!
//! The evaluator turns `(prompt, inputs)` into exactly one model call. The
//! prompt travels inside a request built for that call alone
//! (`Signature::with_instructions`), so any number of threads may evaluate
//! different prompts through the same evaluator at once.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{OptimizerError, Result};
use crate::model::{LanguageModel, ModelRequest};
use crate::types::{Example, Fields, Prediction, Signature};

/// Stateless adapter from prompts to predictions.
pub struct Evaluator {
    model: Arc<dyn LanguageModel>,
    signature: Signature,
    temperature: f64,
    calls: AtomicUsize,
}

impl Evaluator {
    pub fn new(model: Arc<dyn LanguageModel>, signature: Signature) -> Self {
        Evaluator {
            model,
            signature,
            temperature: 0.0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Model calls made through this evaluator so far.
    pub fn evaluations(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Run the task once with `prompt` as its instructions.
    ///
    /// Model errors are returned unchanged; nothing is retried here.
    pub fn evaluate(&self, prompt: &str, inputs: &Fields) -> Result<Prediction> {
        let signature = self.signature.with_instructions(prompt);
        let request = ModelRequest {
            instructions: signature.instructions,
            inputs: inputs.clone(),
            output_fields: signature.outputs,
            temperature: self.temperature,
        };

        self.calls.fetch_add(1, Ordering::Relaxed);
        let response = self.model.invoke(&request)?;
        tracing::debug!(
            model = self.model.name(),
            outputs = response.outputs.len(),
            "evaluated"
        );
        Ok(Prediction::new(response.outputs, response.reasoning))
    }

    /// Score every example under a fixed prompt on a pool of `workers` threads.
    ///
    /// Results line up with `dataset` regardless of completion order. If any
    /// call fails, an error is returned instead.
    pub fn evaluate_all<S>(
        &self,
        prompt: &str,
        dataset: &[Example],
        score: S,
        workers: usize,
    ) -> Result<Vec<bool>>
    where
        S: Fn(&Example, &Prediction) -> bool + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .map_err(|e| OptimizerError::ThreadPool(e.to_string()))?;

        pool.install(|| {
            dataset
                .par_iter()
                .map(|example| -> Result<bool> {
                    let prediction = self.evaluate(prompt, &example.inputs())?;
                    Ok(score(example, &prediction))
                })
                .collect()
        })
    }

    /// Fraction of `dataset` scored correct under `prompt`. Empty → 1.0.
    pub fn accuracy<S>(
        &self,
        prompt: &str,
        dataset: &[Example],
        score: S,
        workers: usize,
    ) -> Result<f64>
    where
        S: Fn(&Example, &Prediction) -> bool + Sync,
    {
        if dataset.is_empty() {
            return Ok(1.0);
        }
        let results = self.evaluate_all(prompt, dataset, score, workers)?;
        let correct = results.iter().filter(|&&ok| ok).count();
        Ok(correct as f64 / results.len() as f64)
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("model", &self.model.name())
            .field("signature", &self.signature.name)
            .field("temperature", &self.temperature)
            .field("calls", &self.evaluations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FnModel, InvocationError, ModelResponse};
    use serde_json::json;
    use std::time::Duration;

    fn signature() -> Signature {
        Signature::new("Echo").input("q", "question").output("a", "answer")
    }

    /// Answers with the instructions' length plus the input, after a delay
    /// that varies by input so completion order differs from input order.
    fn echo_model() -> Arc<dyn LanguageModel> {
        Arc::new(FnModel::new(|req: &ModelRequest| {
            let q = req.inputs["q"].as_u64().unwrap_or(0);
            std::thread::sleep(Duration::from_millis((10 - q % 10) * 2));
            Ok(ModelResponse::from_pairs([
                ("a", json!(q)),
                ("prompt", json!(req.instructions.clone())),
            ]))
        }))
    }

    fn dataset(n: u64) -> Vec<Example> {
        (0..n)
            .map(|i| Example::from_pairs([("q", json!(i)), ("a", json!(i))]).with_inputs(["q"]))
            .collect()
    }

    fn correct(example: &Example, prediction: &Prediction) -> bool {
        example.get("a") == prediction.get("a")
    }

    #[test]
    fn test_evaluate_threads_prompt_through_request() {
        let evaluator = Evaluator::new(echo_model(), signature());
        let inputs: Fields = [("q".to_string(), json!(1))].into_iter().collect();

        let p1 = evaluator.evaluate("prompt one", &inputs).unwrap();
        let p2 = evaluator.evaluate("prompt two", &inputs).unwrap();

        assert_eq!(p1.get("prompt"), Some(&json!("prompt one")));
        assert_eq!(p2.get("prompt"), Some(&json!("prompt two")));
        assert!(evaluator.signature().instructions.is_empty());
        assert_eq!(evaluator.evaluations(), 2);
    }

    #[test]
    fn test_concurrent_prompts_do_not_interfere() {
        let evaluator = Evaluator::new(echo_model(), signature());
        let inputs: Fields = [("q".to_string(), json!(3))].into_iter().collect();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let evaluator = &evaluator;
                    let inputs = &inputs;
                    s.spawn(move || {
                        let prompt = format!("prompt {}", i);
                        let pred = evaluator.evaluate(&prompt, inputs).unwrap();
                        assert_eq!(pred.get("prompt"), Some(&json!(prompt)));
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        });
        assert_eq!(evaluator.evaluations(), 8);
    }

    #[test]
    fn test_evaluate_all_preserves_order() {
        let evaluator = Evaluator::new(echo_model(), signature());
        let data = dataset(12);

        // only odd answers count as correct
        let odd_only = |ex: &Example, pred: &Prediction| {
            correct(ex, pred) && ex.get("q").and_then(|v| v.as_u64()).unwrap_or(0) % 2 == 1
        };
        let results = evaluator.evaluate_all("p", &data, odd_only, 4).unwrap();

        let expected: Vec<bool> = (0..12).map(|i| i % 2 == 1).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_accuracy() {
        let evaluator = Evaluator::new(echo_model(), signature());
        assert_eq!(evaluator.accuracy("p", &dataset(4), correct, 2).unwrap(), 1.0);
        assert_eq!(evaluator.accuracy("p", &[], correct, 2).unwrap(), 1.0);
        assert_eq!(evaluator.evaluations(), 4);
    }

    #[test]
    fn test_model_error_propagates() {
        let failing: Arc<dyn LanguageModel> =
            Arc::new(FnModel::new(|_: &ModelRequest| Err(InvocationError::other("rate limited"))));
        let evaluator = Evaluator::new(failing, signature());

        let err = evaluator.evaluate("p", &Fields::new()).unwrap_err();
        assert!(matches!(err, OptimizerError::Invocation(_)));
        assert_eq!(err.to_string(), "rate limited");

        assert!(evaluator.accuracy("p", &dataset(3), correct, 2).is_err());
    }
}
