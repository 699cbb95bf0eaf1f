//! Optimizer configuration from promptpatch.toml or pyproject.toml.
//!
//! Follows the ruff/black/mypy conventions:
//! - Standalone `promptpatch.toml` in the project directory
//! - `[tool.promptpatch]` section in pyproject.toml, searched upwards
//!
//! ## Example
//!
//! ```toml
//! [tool.promptpatch]
//! max-refine-iters = 3
//! parallel-workers = 4
//! amount-tolerance = 0.01
//! merge-error-policy = "abort"
//! seed = 42
//!
//! [tool.promptpatch.strategy]
//! sample-size = 5
//! threshold = 0.8
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};

/// What to do when a patch names a block the prompt does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeErrorPolicy {
    /// Count it as a rejected attempt and keep refining
    #[default]
    Retry,
    /// Fail the whole run
    Abort,
}

/// Knobs read by the validation strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StrategySettings {
    /// Examples drawn per `batched` validation
    pub batch_size: usize,
    /// Examples drawn per `sample` validation
    pub sample_size: usize,
    /// Fraction correct required by `sample` validation
    pub threshold: f64,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            sample_size: 3,
            threshold: 1.0,
        }
    }
}

/// Run configuration. Fixed for the lifetime of an optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// File this config was read from (for display)
    #[serde(skip)]
    pub source: Option<PathBuf>,

    /// Refinement attempts per failing example
    pub max_refine_iters: usize,
    pub temperature: f64,
    /// Worker pool size for whole-dataset evaluation
    pub parallel_workers: usize,
    /// Relative tolerance of the `numeric` scorer
    pub amount_tolerance: f64,
    /// Re-evaluate after each accepted patch and only commit once the
    /// example itself passes
    pub merge_forward: bool,
    pub merge_error_policy: MergeErrorPolicy,
    /// Score the final prompt on the whole dataset at run end
    pub compute_accuracy: bool,
    /// Seed for sampling validators; entropy when unset
    pub seed: Option<u64>,
    pub strategy: StrategySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            max_refine_iters: 5,
            temperature: 0.0,
            parallel_workers: 8,
            amount_tolerance: 1e-6,
            merge_forward: false,
            merge_error_policy: MergeErrorPolicy::Retry,
            compute_accuracy: true,
            seed: None,
            strategy: StrategySettings::default(),
        }
    }
}

/// Wrapper for pyproject.toml structure.
#[derive(Debug, Deserialize)]
struct PyProject {
    tool: Option<PyProjectTool>,
}

#[derive(Debug, Deserialize)]
struct PyProjectTool {
    promptpatch: Option<Config>,
}

impl Config {
    /// Load configuration for the given directory.
    ///
    /// Search order:
    /// 1. promptpatch.toml in directory
    /// 2. pyproject.toml [tool.promptpatch] in directory
    /// 3. Walk up to find a pyproject.toml with that section
    /// 4. Default config if nothing found
    ///
    /// A file that exists but does not parse or validate is an error.
    pub fn load(directory: &Path) -> Result<Self> {
        let standalone = directory.join("promptpatch.toml");
        if standalone.exists() {
            return Self::from_file(&standalone);
        }

        let mut current = Some(directory);
        while let Some(dir) = current {
            let pyproject = dir.join("pyproject.toml");
            if pyproject.exists() {
                if let Some(config) = Self::load_pyproject(&pyproject)? {
                    return Ok(config);
                }
            }
            current = dir.parent();
        }

        Ok(Self::default())
    }

    /// Read a standalone promptpatch.toml.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content).map_err(|e| in_file(path, e))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| OptimizerError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn load_pyproject(path: &Path) -> Result<Option<Self>> {
        let content = std::fs::read_to_string(path)?;
        let pyproject: PyProject = toml::from_str(&content)
            .map_err(|e| in_file(path, OptimizerError::Configuration(e.to_string())))?;

        let Some(mut config) = pyproject.tool.and_then(|t| t.promptpatch) else {
            return Ok(None);
        };
        config.validate().map_err(|e| in_file(path, e))?;
        config.source = Some(path.to_path_buf());
        Ok(Some(config))
    }

    /// Reject settings no strategy can work with.
    pub fn validate(&self) -> Result<()> {
        if self.parallel_workers == 0 {
            return Err(invalid("parallel-workers must be at least 1"));
        }
        if !(self.amount_tolerance >= 0.0) {
            return Err(invalid(format!(
                "amount-tolerance must be a non-negative number, got {}",
                self.amount_tolerance
            )));
        }
        if !self.temperature.is_finite() {
            return Err(invalid("temperature must be finite"));
        }
        self.strategy.validate()
    }

    /// Format config for verbose display.
    pub fn display_summary(&self) -> String {
        let mut lines = Vec::new();

        match self.source {
            Some(ref source) => lines.push(format!("   Config: {}", source.display())),
            None => lines.push("   Config: (defaults)".to_string()),
        }
        lines.push(format!(
            "   Refinement: {} iters, temperature {}",
            self.max_refine_iters, self.temperature
        ));
        lines.push(format!("   Workers: {}", self.parallel_workers));
        lines.push(format!(
            "   Merge: forward={}, on-error={:?}",
            self.merge_forward, self.merge_error_policy
        ));
        if let Some(seed) = self.seed {
            lines.push(format!("   Seed: {}", seed));
        }

        lines.join("\n")
    }
}

impl StrategySettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch-size must be a positive integer"));
        }
        if self.sample_size == 0 {
            return Err(invalid("sample-size must be a positive integer"));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(invalid(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> OptimizerError {
    OptimizerError::Configuration(message.into())
}

fn in_file(path: &Path, err: OptimizerError) -> OptimizerError {
    match err {
        OptimizerError::Configuration(msg) => {
            OptimizerError::Configuration(format!("{}: {}", path.display(), msg))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_refine_iters, 5);
        assert_eq!(config.parallel_workers, 8);
        assert_eq!(config.amount_tolerance, 1e-6);
        assert_eq!(config.merge_error_policy, MergeErrorPolicy::Retry);
        assert_eq!(config.strategy.batch_size, 10);
        assert_eq!(config.strategy.sample_size, 3);
        assert_eq!(config.strategy.threshold, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            max-refine-iters = 2
            merge-error-policy = "abort"

            [strategy]
            threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.max_refine_iters, 2);
        assert_eq!(config.merge_error_policy, MergeErrorPolicy::Abort);
        assert_eq!(config.strategy.threshold, 0.5);
        assert_eq!(config.strategy.sample_size, 3);
        assert_eq!(config.parallel_workers, 8);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        for bad in [
            "parallel-workers = 0",
            "amount-tolerance = -1.0",
            "[strategy]\nbatch-size = 0",
            "[strategy]\nsample-size = 0",
            "[strategy]\nthreshold = 1.5",
        ] {
            let err = Config::from_toml_str(bad).unwrap_err();
            assert!(err.is_configuration(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_load_standalone_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("promptpatch.toml"), "seed = 7\n").unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.source, Some(dir.path().join("promptpatch.toml")));
    }

    #[test]
    fn test_load_pyproject_from_parent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"invoices\"\n\n[tool.promptpatch]\nparallel-workers = 2\n",
        )
        .unwrap();
        let nested = dir.path().join("src").join("pkg");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::load(&nested).unwrap();
        assert_eq!(config.parallel_workers, 2);
    }

    #[test]
    fn test_pyproject_without_section_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pyproject.toml"), "[tool.ruff]\nline-length = 100\n")
            .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_display_summary() {
        let summary = Config::default().display_summary();
        assert!(summary.starts_with("   Config: (defaults)"));
        assert!(summary.contains("Refinement: 5 iters, temperature 0"));
        assert!(summary.contains("Merge: forward=false, on-error=Retry"));
        assert!(!summary.contains("Seed"));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("promptpatch.toml");
        std::fs::write(&path, "seed = 7\nmerge-forward = true\n").unwrap();
        let summary = Config::from_file(&path).unwrap().display_summary();
        assert!(summary.contains(&path.display().to_string()));
        assert!(summary.contains("forward=true"));
        assert!(summary.contains("Seed: 7"));
    }

    #[test]
    fn test_unparsable_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("promptpatch.toml"), "max-refine-iters = \"many\"").unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("promptpatch.toml"));
    }
}
