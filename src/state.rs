//! Run state shared with callbacks.
//!
//! The optimizer owns the single `RunState` of a run and mutates it between
//! lifecycle notifications. Callbacks only ever see `&RunState`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Example, Prediction, PromptPatch};

/// Lifecycle points at which callbacks are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    RunStart,
    RunEnd,
    RefinementStart,
    RefinementEnd,
    ValidationStart,
    ValidationEnd,
    MergeSuccess,
    MergeFailure,
}

impl Event {
    pub const ALL: [Event; 8] = [
        Event::RunStart,
        Event::RunEnd,
        Event::RefinementStart,
        Event::RefinementEnd,
        Event::ValidationStart,
        Event::ValidationEnd,
        Event::MergeSuccess,
        Event::MergeFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::RunStart => "run_start",
            Event::RunEnd => "run_end",
            Event::RefinementStart => "refinement_start",
            Event::RefinementEnd => "refinement_end",
            Event::ValidationStart => "validation_start",
            Event::ValidationEnd => "validation_end",
            Event::MergeSuccess => "merge_success",
            Event::MergeFailure => "merge_failure",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an optimization run.
///
/// Per-example fields (`example_id` through `last_error`) are reset when the
/// optimizer moves to the next example; run-level fields accumulate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Current accepted prompt
    pub prompt: String,
    pub dataset_size: usize,
    /// Model evaluations so far, including those made during validation
    pub total_evaluations: usize,

    pub example_id: Option<usize>,
    pub example: Option<Example>,
    /// Failing prediction that triggered refinement
    pub prediction: Option<Prediction>,
    /// 1-based attempt number within the current example
    pub refinement_attempt: Option<usize>,
    pub analysis: Option<String>,
    pub patch: Option<PromptPatch>,
    pub candidate_prompt: Option<String>,
    pub is_valid: Option<bool>,
    pub validation_score: Option<f64>,
    /// Why the last attempt failed before validation (merge or patch error)
    pub last_error: Option<String>,

    /// Examples never fixed within the retry budget
    pub flagged: Vec<usize>,
    pub accepted_patches: usize,
    pub final_prompt: Option<String>,
    pub accuracy: Option<f64>,
}

impl RunState {
    pub fn new(prompt: impl Into<String>, dataset_size: usize) -> Self {
        RunState {
            prompt: prompt.into(),
            dataset_size,
            ..Default::default()
        }
    }

    /// Begin a new example, clearing everything left over from the previous one.
    pub fn start_example(&mut self, example_id: usize, example: &Example) {
        self.example_id = Some(example_id);
        self.example = Some(example.clone());
        self.prediction = None;
        self.clear_attempt();
        self.refinement_attempt = None;
    }

    /// Clear per-attempt fields before the next refinement attempt.
    pub fn clear_attempt(&mut self) {
        self.analysis = None;
        self.patch = None;
        self.candidate_prompt = None;
        self.is_valid = None;
        self.validation_score = None;
        self.last_error = None;
    }
}
