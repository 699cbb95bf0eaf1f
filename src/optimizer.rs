//! The refinement loop.
//!
//! ```text
//! for each example, in dataset order:
//!     EVALUATE with the accepted prompt
//!       pass ─────────────────────────────────────────────► next example
//!       fail ─► up to max_refine_iters attempts:
//!                 REFINE ─► patch ─► MERGE ─► candidate ─► VALIDATE
//!                   valid   ─► commit candidate ───────────► next example
//!                   invalid ─► remember patch in history, try again
//!               budget exhausted ─► FLAG example ──────────► next example
//! ```
//!
//! With `merge_forward` the loop is evaluate-first instead: a validated
//! candidate becomes a per-example working prompt, the example is evaluated
//! again, and the working prompt is committed only once the example passes.
//! `merge_success` fires once, at that commit. A stack that never fixes the
//! example is discarded with a single `merge_failure`.
//!
//! Malformed patches and (under [`MergeErrorPolicy::Retry`]) patches naming a
//! missing block count as rejected attempts. Configuration errors, model
//! errors and callback errors abort the run.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::callback::{notify_all, Callback};
use crate::config::{Config, MergeErrorPolicy};
use crate::error::{OptimizerError, Result};
use crate::evaluator::Evaluator;
use crate::model::LanguageModel;
use crate::refiner::{RefinementRequest, Refiner};
use crate::registry::{self, MergerContext};
use crate::state::{Event, RunState};
use crate::strategies::merger::MergerStrategy;
use crate::strategies::scoring::ScorerOptions;
use crate::strategies::validation::{ValidationContext, ValidationStrategy};
use crate::strategies::register_builtins;
use crate::types::{value_to_string, Example, Fields, Prediction, Signature};

/// A resolved scorer, shareable with evaluation workers.
pub type ScoreHandle = Arc<dyn Fn(&Example, &Prediction) -> bool + Send + Sync>;

/// How `optimize` should judge predictions.
#[derive(Clone)]
pub enum ScorerChoice {
    /// Look up a registered scorer
    Named(String),
    Custom(ScoreHandle),
}

impl ScorerChoice {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Example, &Prediction) -> bool + Send + Sync + 'static,
    {
        ScorerChoice::Custom(Arc::new(f))
    }
}

impl From<&str> for ScorerChoice {
    fn from(name: &str) -> Self {
        ScorerChoice::Named(name.to_string())
    }
}

impl From<String> for ScorerChoice {
    fn from(name: String) -> Self {
        ScorerChoice::Named(name)
    }
}

impl fmt::Debug for ScorerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerChoice::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ScorerChoice::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub final_prompt: String,
    /// Indices of examples no accepted patch fixed
    pub flagged: Vec<usize>,
    /// Whole-dataset accuracy of `final_prompt`, when computed
    pub accuracy: Option<f64>,
    pub total_evaluations: usize,
    pub accepted_patches: usize,
}

/// Builder for [`PromptOptimizer`].
pub struct OptimizerBuilder {
    signature: Signature,
    prompt: String,
    model: Option<Arc<dyn LanguageModel>>,
    refiner_model: Option<Arc<dyn LanguageModel>>,
    merger: String,
    validator: String,
    config: Config,
}

impl OptimizerBuilder {
    /// Model used to run the task (and to refine, unless overridden).
    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Separate model for the refiner.
    pub fn refiner_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.refiner_model = Some(model);
        self
    }

    /// Registered merger name (default `block_based`).
    pub fn merger(mut self, name: impl Into<String>) -> Self {
        self.merger = name.into();
        self
    }

    /// Registered validator name (default `full`).
    pub fn validator(mut self, name: impl Into<String>) -> Self {
        self.validator = name.into();
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Resolve strategies and validate settings.
    pub fn build(self) -> Result<PromptOptimizer> {
        register_builtins();
        self.config.validate()?;

        let model = self.model.ok_or_else(|| {
            OptimizerError::Configuration("no language model configured".to_string())
        })?;
        let scored_field = self
            .signature
            .primary_output()
            .map(|f| f.name.clone())
            .ok_or_else(|| {
                OptimizerError::Configuration(format!(
                    "signature '{}' declares no output field",
                    self.signature.name
                ))
            })?;

        let refiner_model = self.refiner_model.unwrap_or_else(|| model.clone());
        let merger = registry::merger(&self.merger)?(&MergerContext {
            config: &self.config,
            model: &refiner_model,
        })?;
        let validator = registry::validator(&self.validator)?(&self.config)?;
        tracing::debug!(
            merger = merger.name(),
            validator = validator.name(),
            "optimizer configured\n{}",
            self.config.display_summary()
        );

        let evaluator =
            Evaluator::new(model, self.signature).with_temperature(self.config.temperature);
        let refiner = Refiner::new(refiner_model).with_temperature(self.config.temperature);

        Ok(PromptOptimizer {
            evaluator,
            refiner,
            merger,
            validator,
            prompt: self.prompt,
            scored_field,
            config: self.config,
        })
    }
}

/// Iteratively patches a prompt until it passes more of a labeled dataset.
pub struct PromptOptimizer {
    evaluator: Evaluator,
    refiner: Refiner,
    merger: Box<dyn MergerStrategy>,
    validator: Box<dyn ValidationStrategy>,
    /// Accepted prompt; replaced wholesale at the end of each run
    prompt: String,
    scored_field: String,
    config: Config,
}

impl PromptOptimizer {
    pub fn builder(signature: Signature, initial_prompt: impl Into<String>) -> OptimizerBuilder {
        OptimizerBuilder {
            signature,
            prompt: initial_prompt.into(),
            model: None,
            refiner_model: None,
            merger: "block_based".to_string(),
            validator: "full".to_string(),
            config: Config::default(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    fn resolve_scorer(&self, scorer: ScorerChoice) -> Result<ScoreHandle> {
        match scorer {
            ScorerChoice::Custom(f) => Ok(f),
            ScorerChoice::Named(name) => {
                let f = registry::scorer(&name)?;
                let options = ScorerOptions::new(self.scored_field.clone())
                    .with_tolerance(self.config.amount_tolerance);
                Ok(Arc::new(move |example: &Example, prediction: &Prediction| {
                    f(example, prediction, &options)
                }))
            }
        }
    }

    /// Run the refinement loop over `dataset`.
    ///
    /// Fails before any model call if `scorer` names an unregistered scorer.
    /// On success the optimizer's prompt becomes the final accepted prompt.
    pub fn optimize(
        &mut self,
        dataset: &[Example],
        scorer: impl Into<ScorerChoice>,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<OptimizationResult> {
        let score = self.resolve_scorer(scorer.into())?;
        let state = RunState::new(self.prompt.clone(), dataset.len());
        let base_evaluations = self.evaluator.evaluations();

        let state = Run {
            optimizer: &*self,
            dataset,
            score,
            callbacks,
            state,
            base_evaluations,
        }
        .execute()?;

        self.prompt = state.prompt.clone();
        Ok(OptimizationResult {
            final_prompt: state.prompt,
            flagged: state.flagged,
            accuracy: state.accuracy,
            total_evaluations: state.total_evaluations,
            accepted_patches: state.accepted_patches,
        })
    }
}

impl fmt::Debug for PromptOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptOptimizer")
            .field("merger", &self.merger.name())
            .field("validator", &self.validator.name())
            .field("scored_field", &self.scored_field)
            .field("config", &self.config)
            .finish()
    }
}

/// One call to `optimize`.
struct Run<'r, 'c> {
    optimizer: &'r PromptOptimizer,
    dataset: &'r [Example],
    score: ScoreHandle,
    callbacks: &'r mut [&'c mut dyn Callback],
    state: RunState,
    base_evaluations: usize,
}

impl Run<'_, '_> {
    fn execute(&mut self) -> Result<RunState> {
        let optimizer = self.optimizer;
        let config = &optimizer.config;
        tracing::info!(
            examples = self.dataset.len(),
            merger = optimizer.merger.name(),
            validator = optimizer.validator.name(),
            max_refine_iters = config.max_refine_iters,
            "starting prompt optimization"
        );
        self.notify(Event::RunStart)?;

        let dataset = self.dataset;
        for (idx, example) in dataset.iter().enumerate() {
            self.process_example(idx, example)?;
        }

        self.state.final_prompt = Some(self.state.prompt.clone());
        if config.compute_accuracy {
            let score = self.score.clone();
            let accuracy = optimizer.evaluator.accuracy(
                &self.state.prompt,
                dataset,
                move |example: &Example, prediction: &Prediction| score(example, prediction),
                config.parallel_workers,
            )?;
            self.state.accuracy = Some(accuracy);
        }

        self.notify(Event::RunEnd)?;
        tracing::info!(
            evaluations = self.state.total_evaluations,
            accepted = self.state.accepted_patches,
            flagged = self.state.flagged.len(),
            accuracy = self.state.accuracy.unwrap_or(f64::NAN),
            "prompt optimization finished"
        );
        Ok(self.state.clone())
    }

    fn notify(&mut self, event: Event) -> Result<()> {
        self.state.total_evaluations = self
            .optimizer
            .evaluator
            .evaluations()
            .saturating_sub(self.base_evaluations);
        notify_all(&mut *self.callbacks, event, &self.state)
    }

    fn evaluate(&self, prompt: &str, example: &Example) -> Result<Prediction> {
        self.optimizer.evaluator.evaluate(prompt, &example.inputs())
    }

    fn process_example(&mut self, idx: usize, example: &Example) -> Result<()> {
        self.state.start_example(idx, example);

        let prediction = self.evaluate(&self.state.prompt, example)?;
        if (self.score)(example, &prediction) {
            tracing::debug!(example = idx, "example passes");
            return Ok(());
        }

        tracing::debug!(example = idx, "example fails, refining");
        self.state.prediction = Some(prediction);

        if !self.refine(idx, example)? {
            self.state.flagged.push(idx);
            tracing::info!(
                example = idx,
                attempts = self.optimizer.config.max_refine_iters,
                "example flagged"
            );
        }
        Ok(())
    }

    /// Retry loop for one failing example. True once the example is fixed.
    fn refine(&mut self, idx: usize, example: &Example) -> Result<bool> {
        let max_iters = self.optimizer.config.max_refine_iters;
        let merge_forward = self.optimizer.config.merge_forward;

        let mut history: Vec<String> = Vec::new();
        let mut working = self.state.prompt.clone();
        let mut pending = 0usize;

        for attempt in 1..=max_iters {
            self.state.clear_attempt();
            self.state.refinement_attempt = Some(attempt);
            self.notify(Event::RefinementStart)?;

            let base = if merge_forward {
                working.clone()
            } else {
                self.state.prompt.clone()
            };

            let Some(candidate) = self.attempt(attempt, example, &base, &mut history)? else {
                self.notify(Event::RefinementEnd)?;
                continue;
            };

            if !merge_forward {
                self.state.prompt = candidate;
                self.state.accepted_patches += 1;
                tracing::info!(example = idx, attempt, "patch accepted");
                self.notify(Event::MergeSuccess)?;
                self.notify(Event::RefinementEnd)?;
                return Ok(true);
            }

            working = candidate;
            pending += 1;

            let prediction = self.evaluate(&working, example)?;
            if (self.score)(example, &prediction) {
                self.state.prompt = working;
                self.state.accepted_patches += pending;
                tracing::info!(example = idx, attempt, patches = pending, "merged forward");
                self.notify(Event::MergeSuccess)?;
                self.notify(Event::RefinementEnd)?;
                return Ok(true);
            }

            // Kept in the working prompt, but the refiner should know it fell short.
            let description = self
                .state
                .patch
                .as_ref()
                .map(|p| p.summary())
                .unwrap_or_default();
            history.push(format!(
                "Failed Attempt {}: {} (merged, but the example still fails)",
                attempt, description
            ));
            self.state.prediction = Some(prediction);
            self.notify(Event::RefinementEnd)?;
        }

        if pending > 0 {
            tracing::warn!(example = idx, patches = pending, "discarding unmerged working prompt");
            self.state.candidate_prompt = Some(working);
            self.state.last_error = Some(format!(
                "{} stacked patch(es) discarded: example still fails",
                pending
            ));
            self.notify(Event::MergeFailure)?;
        }

        Ok(false)
    }

    /// One refine → patch → merge → validate cycle against `base`.
    ///
    /// Returns the validated candidate, or `None` after recording a rejection.
    fn attempt(
        &mut self,
        attempt: usize,
        example: &Example,
        base: &str,
        history: &mut Vec<String>,
    ) -> Result<Option<String>> {
        let optimizer = self.optimizer;
        let field = optimizer.scored_field.as_str();

        let prediction = self.state.prediction.clone().unwrap_or_default();
        let expected = example.get(field).map(value_to_string).unwrap_or_default();
        let predicted = prediction.get(field).map(value_to_string).unwrap_or_default();
        let summary = example.summary();

        let output = optimizer.refiner.refine(&RefinementRequest {
            prompt: base,
            example: &summary,
            error_reasoning: prediction.reasoning(),
            prediction: &predicted,
            expected_output: &expected,
            history: history.as_slice(),
        })?;
        self.state.analysis = Some(output.analysis.clone());

        let patch = match output.to_patch() {
            Ok(patch) => patch,
            Err(err @ OptimizerError::MalformedPatch { .. }) => {
                let description = format!(
                    "Operation: {}, Target: '{}', Content: '{}'",
                    output.operation, output.target_block, output.content
                );
                self.reject(attempt, description, Some(err.to_string()), history)?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.state.patch = Some(patch.clone());

        let candidate = match optimizer.merger.merge(base, &patch) {
            Ok(candidate) => candidate,
            Err(err @ OptimizerError::BlockNotFound { .. })
                if optimizer.config.merge_error_policy == MergeErrorPolicy::Retry =>
            {
                self.reject(attempt, patch.summary(), Some(err.to_string()), history)?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.state.candidate_prompt = Some(candidate.clone());
        self.notify(Event::ValidationStart)?;

        let score = self.score.clone();
        let evaluate =
            |prompt: &str, inputs: &Fields| optimizer.evaluator.evaluate(prompt, inputs);
        let outcome = optimizer.validator.validate(
            &candidate,
            &evaluate,
            &*score,
            self.dataset,
            &ValidationContext::for_example(example),
        )?;

        self.state.is_valid = Some(outcome.is_valid);
        self.state.validation_score = outcome.score;
        self.notify(Event::ValidationEnd)?;

        if outcome.is_valid {
            Ok(Some(candidate))
        } else {
            self.reject(attempt, patch.summary(), None, history)?;
            Ok(None)
        }
    }

    fn reject(
        &mut self,
        attempt: usize,
        description: String,
        error: Option<String>,
        history: &mut Vec<String>,
    ) -> Result<()> {
        tracing::warn!(
            example = self.state.example_id,
            attempt,
            error = error.as_deref().unwrap_or("failed validation"),
            "patch rejected"
        );
        history.push(format!("Failed Attempt {}: {}", attempt, description));
        self.state.last_error = error;
        self.notify(Event::MergeFailure)
    }
}
