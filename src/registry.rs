//! Named lookup tables for pluggable strategies.
//!
//! Three process-wide registries exist (mergers, validators, scorers), each
//! its own namespace. Registration is one-shot: a name can never be rebound or
//! removed. Built-ins are installed by [`crate::strategies::register_builtins`];
//! embedders add their own with the `register_*` functions before building an
//! optimizer.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::config::Config;
use crate::error::{OptimizerError, Result};
use crate::model::LanguageModel;
use crate::strategies::merger::MergerStrategy;
use crate::strategies::scoring::ScorerOptions;
use crate::strategies::validation::ValidationStrategy;
use crate::types::{Example, Prediction};

/// What a merger factory gets to build from.
///
/// `model` is the refiner's model, for mergers that rewrite prompts themselves.
pub struct MergerContext<'a> {
    pub config: &'a Config,
    pub model: &'a Arc<dyn LanguageModel>,
}

/// Builds a merger for one optimizer.
pub type MergerFactory = fn(&MergerContext<'_>) -> Result<Box<dyn MergerStrategy>>;

/// Builds a validator from the run configuration. Invalid settings fail here.
pub type ValidatorFactory = fn(&Config) -> Result<Box<dyn ValidationStrategy>>;

/// Pure predicate: does the prediction match the gold example?
pub type ScorerFn = fn(&Example, &Prediction, &ScorerOptions) -> bool;

/// A name → implementation table.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    name: String,
    entries: BTreeMap<String, T>,
}

impl<T: Clone> Registry<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Registry {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind `key` to `item`. Fails if `key` is already bound; the existing
    /// binding is left in place.
    pub fn register(&mut self, key: &str, item: T) -> Result<()> {
        if self.entries.contains_key(key) {
            return Err(OptimizerError::DuplicateRegistration {
                registry: self.name.clone(),
                name: key.to_string(),
            });
        }
        self.entries.insert(key.to_string(), item);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<T> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| OptimizerError::NotFound {
                registry: self.name.clone(),
                name: key.to_string(),
                available: self.names(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub static MERGERS: Lazy<RwLock<Registry<MergerFactory>>> =
    Lazy::new(|| RwLock::new(Registry::new("mergers")));

pub static VALIDATORS: Lazy<RwLock<Registry<ValidatorFactory>>> =
    Lazy::new(|| RwLock::new(Registry::new("validators")));

pub static SCORERS: Lazy<RwLock<Registry<ScorerFn>>> =
    Lazy::new(|| RwLock::new(Registry::new("scorers")));

// A panic while holding the lock cannot leave a BTreeMap half-inserted, so
// poisoned locks are safe to read through.
fn write<T: Clone>(registry: &RwLock<Registry<T>>, key: &str, item: T) -> Result<()> {
    registry
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .register(key, item)
}

fn read<T: Clone>(registry: &RwLock<Registry<T>>, key: &str) -> Result<T> {
    registry.read().unwrap_or_else(|e| e.into_inner()).get(key)
}

pub fn register_merger(name: &str, factory: MergerFactory) -> Result<()> {
    write(&MERGERS, name, factory)
}

pub fn register_validator(name: &str, factory: ValidatorFactory) -> Result<()> {
    write(&VALIDATORS, name, factory)
}

pub fn register_scorer(name: &str, scorer: ScorerFn) -> Result<()> {
    write(&SCORERS, name, scorer)
}

pub fn merger(name: &str) -> Result<MergerFactory> {
    read(&MERGERS, name)
}

pub fn validator(name: &str) -> Result<ValidatorFactory> {
    read(&VALIDATORS, name)
}

pub fn scorer(name: &str) -> Result<ScorerFn> {
    read(&SCORERS, name)
}
