//! Configuration for the benchmark.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::comparator::{ComparisonOptions, DEFAULT_WORKER_TIMEOUT};
use crate::error::{BenchError, Result};
use crate::evaluator::EvaluationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// LLM configuration for the RAG judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    pub api_key: String,

    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    /// Per-request timeout for judge calls.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// True when enough is set to talk to an endpoint.
    pub fn is_configured(&self) -> bool {
        !self.api_base.is_empty() && !self.model.is_empty()
    }
}

/// HTTP embedding endpoint used by `open_ai` embedders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingApiConfig {
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for EmbeddingApiConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// How strategy comparisons are scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSettings {
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Per-strategy wall clock limit. `0` or `null` disables it.
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: Option<u64>,
    /// Extra time a timed-out worker gets to finish cleanup.
    #[serde(default = "default_cleanup_grace_secs")]
    pub cleanup_grace_secs: u64,
}

fn default_max_parallel() -> usize {
    4
}

fn default_worker_timeout_secs() -> Option<u64> {
    Some(DEFAULT_WORKER_TIMEOUT.as_secs())
}

fn default_cleanup_grace_secs() -> u64 {
    10
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            parallel: false,
            max_parallel: default_max_parallel(),
            worker_timeout_secs: default_worker_timeout_secs(),
            cleanup_grace_secs: default_cleanup_grace_secs(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingApiConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub comparison: ComparisonSettings,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file (~/.config/rag-strategy-bench/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_file_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path. Missing sections and
    /// fields keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| BenchError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LLM_API_BASE") {
            self.llm.api_base = v;
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("EMBEDDING_API_BASE") {
            self.embedding.api_base = v;
        }
        if let Some(v) = lookup("EMBEDDING_API_KEY") {
            self.embedding.api_key = v;
        }
        if let Some(v) = lookup("BENCH_TOP_K") {
            self.evaluation.top_k = parse_env("BENCH_TOP_K", &v)?;
        }
        if let Some(v) = lookup("BENCH_MAX_PARALLEL") {
            self.comparison.max_parallel = parse_env("BENCH_MAX_PARALLEL", &v)?;
        }
        if let Some(v) = lookup("BENCH_WORKER_TIMEOUT_SECS") {
            self.comparison.worker_timeout_secs = Some(parse_env("BENCH_WORKER_TIMEOUT_SECS", &v)?);
        }
        Ok(())
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-strategy-bench")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate value ranges. The LLM section is only checked when RAG
    /// metrics are requested.
    pub fn validate(&self) -> Result<()> {
        let eval = &self.evaluation;
        if eval.top_k == 0 {
            return Err(BenchError::Config("evaluation.top_k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&eval.relevance_threshold) {
            return Err(BenchError::Config(format!(
                "evaluation.relevance_threshold must be within [0, 1], got {}",
                eval.relevance_threshold
            )));
        }
        if eval.rag_min_samples > eval.rag_max_samples {
            return Err(BenchError::Config(format!(
                "evaluation.rag_min_samples ({}) exceeds rag_max_samples ({})",
                eval.rag_min_samples, eval.rag_max_samples
            )));
        }
        if self.comparison.max_parallel == 0 {
            return Err(BenchError::Config(
                "comparison.max_parallel must be at least 1".to_string(),
            ));
        }
        if eval.use_rag_metrics && !self.llm.is_configured() {
            return Err(BenchError::Config(
                "RAG metrics need an LLM. Set LLM_API_BASE and LLM_MODEL or add them to the config file."
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Options for a comparison run built from this config.
    pub fn comparison_options(&self) -> ComparisonOptions {
        ComparisonOptions {
            evaluation: self.evaluation.clone(),
            worker_timeout: self
                .comparison
                .worker_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            cleanup_grace: Duration::from_secs(self.comparison.cleanup_grace_secs),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BenchError::Config(format!("{} has an invalid value: '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert_eq!(config.evaluation.top_k, 5);
        assert_eq!(config.comparison.max_parallel, 4);
        assert_eq!(config.comparison.worker_timeout_secs, Some(600));
        assert_eq!(
            config.comparison_options().worker_timeout,
            Some(DEFAULT_WORKER_TIMEOUT)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_timeout_can_be_disabled_explicitly() {
        let config = Config::from_yaml("comparison:\n  worker_timeout_secs: null\n").unwrap();
        assert_eq!(config.comparison_options().worker_timeout, None);

        let mut config = Config::default();
        config
            .apply_env(env(&[("BENCH_WORKER_TIMEOUT_SECS", "0")]))
            .unwrap();
        assert_eq!(config.comparison_options().worker_timeout, None);

        let config = Config::from_yaml("comparison:\n  parallel: true\n").unwrap();
        assert_eq!(config.comparison.worker_timeout_secs, Some(600));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "evaluation:\n  top_k: 10\ncomparison:\n  parallel: true\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.evaluation.top_k, 10);
        assert_eq!(config.evaluation.relevance_threshold, 0.5);
        assert!(config.evaluation.cleanup_after);
        assert!(config.comparison.parallel);
        assert_eq!(config.comparison.max_parallel, 4);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_yaml("llm:\n  api_base: http://file\n  api_key: k\n  model: m\n").unwrap();
        config
            .apply_env(env(&[
                ("LLM_API_BASE", "http://env"),
                ("BENCH_TOP_K", "3"),
                ("BENCH_WORKER_TIMEOUT_SECS", "30"),
            ]))
            .unwrap();
        assert_eq!(config.llm.api_base, "http://env");
        assert_eq!(config.llm.model, "m");
        assert_eq!(config.evaluation.top_k, 3);
        assert_eq!(
            config.comparison_options().worker_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("BENCH_MAX_PARALLEL", "many")])).unwrap_err();
        assert!(err.to_string().contains("BENCH_MAX_PARALLEL"));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.evaluation.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.comparison.max_parallel = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.evaluation.rag_min_samples = 30;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.evaluation.use_rag_metrics = true;
        assert!(config.validate().is_err());
        config.llm.api_base = "http://localhost:8000".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("evaluation: [").is_err());
    }
}
