//! Error types for prompt refinement.

use thiserror::Error;

use crate::model::InvocationError;
use crate::state::Event;

/// Everything that can go wrong while configuring or running an optimizer.
///
/// Configuration and wiring errors abort a run before (or as soon as) they
/// are detected. Per-example refinement failures are not represented here
/// unless a policy escalates them; the optimizer degrades those to a flagged
/// example instead.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Invalid settings or unknown strategy name
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A name was registered twice in the same registry
    #[error("'{name}' is already registered in '{registry}'")]
    DuplicateRegistration { registry: String, name: String },

    /// A registry lookup missed
    #[error("'{name}' not found in '{registry}' registry (available: {})", available.join(", "))]
    NotFound {
        registry: String,
        name: String,
        available: Vec<String>,
    },

    /// A patch named a block the prompt does not contain
    #[error("Target block '{block}' not found in prompt")]
    BlockNotFound { block: String },

    /// The refiner proposed an operation outside append/replace
    #[error("Unrecognized patch operation '{operation}' (expected 'append' or 'replace')")]
    MalformedPatch { operation: String },

    /// A validation strategy needed context the caller did not pass
    #[error("Validation strategy '{strategy}' requires '{key}' in its context")]
    MissingContext {
        strategy: &'static str,
        key: &'static str,
    },

    /// The model capability failed; never retried here
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// A lifecycle hook failed
    #[error("Callback failed during {event}: {source}")]
    Callback {
        event: Event,
        #[source]
        source: anyhow::Error,
    },

    /// The evaluation worker pool could not be created
    #[error("Failed to create thread pool: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OptimizerError {
    /// True for errors that make the whole run invalid rather than one attempt.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OptimizerError::Configuration(_)
                | OptimizerError::DuplicateRegistration { .. }
                | OptimizerError::NotFound { .. }
                | OptimizerError::MissingContext { .. }
        )
    }
}

/// Result type for optimizer operations
pub type Result<T> = std::result::Result<T, OptimizerError>;
