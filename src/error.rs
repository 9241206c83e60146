//! Error types for the benchmark engine.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, BenchError>;

/// A single strategy that failed inside a comparison run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StrategyFailure {
    pub strategy_name: String,
    /// Stable tag from [`BenchError::kind`] (or `panic`).
    pub error_kind: String,
    pub error_message: String,
}

impl std::fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.strategy_name, self.error_kind, self.error_message
        )
    }
}

/// Errors that can occur while loading data or evaluating strategies.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A persisted dataset is malformed.
    #[error("Malformed dataset at '{field}': {message}")]
    DatasetFormat { field: String, message: String },

    /// The dataset file does not exist.
    #[error("Dataset not found at '{0}'")]
    DatasetNotFound(PathBuf),

    /// Dataset invariants are violated.
    #[error("Dataset validation failed: {}", .violations.join("; "))]
    Validation { violations: Vec<String> },

    /// A single document could not be indexed.
    #[error("Failed to index document '{doc_id}': {reason}")]
    DocumentIndexing { doc_id: String, reason: String },

    /// A single query could not be evaluated.
    #[error("Failed to evaluate query '{query}': {reason}")]
    QueryEvaluation { query: String, reason: String },

    /// Indexing or querying produced nothing to score.
    #[error("Strategy '{strategy}' produced no usable data during {phase}")]
    NoUsableData { strategy: String, phase: String },

    /// A strategy failed during a sequential comparison.
    #[error("Strategy '{strategy}' failed: {source}")]
    StrategyEvaluation {
        strategy: String,
        #[source]
        source: Box<BenchError>,
    },

    /// Every strategy in a comparison failed.
    #[error("All {} strategies failed: {}", .failures.len(), format_failures(.failures))]
    AllStrategiesFailed { failures: Vec<StrategyFailure> },

    /// A strategy descriptor could not be encoded or decoded.
    #[error("Invalid strategy descriptor: {0}")]
    Descriptor(String),

    /// The requested collaborator kind is not available in this build.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A chunker, embedder or vector store call failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Invalid run parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// The evaluation ran past its deadline.
    #[error("Evaluation of '{strategy}' timed out after {after:?}")]
    Timeout { strategy: String, after: Duration },

    /// The evaluation was cancelled by the coordinator.
    #[error("Evaluation of '{0}' was cancelled")]
    Cancelled(String),
}

fn format_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl BenchError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a dataset format error for a field path such as `documents[2].doc_id`.
    pub fn dataset_format(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatasetFormat {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable snake_case tag describing the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
            Self::DatasetFormat { .. } => "dataset_format",
            Self::DatasetNotFound(_) => "dataset_not_found",
            Self::Validation { .. } => "validation",
            Self::DocumentIndexing { .. } => "document_indexing",
            Self::QueryEvaluation { .. } => "query_evaluation",
            Self::NoUsableData { .. } => "no_usable_data",
            Self::StrategyEvaluation { source, .. } => source.kind(),
            Self::AllStrategiesFailed { .. } => "all_strategies_failed",
            Self::Descriptor(_) => "descriptor",
            Self::Unsupported(_) => "unsupported",
            Self::Collaborator(_) => "collaborator",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Config(_) => "config",
            Self::Http(_) => "http",
            Self::LlmApi(_) => "llm_api",
            Self::LlmParse(_) => "llm_parse",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

impl From<reqwest::Error> for BenchError {
    fn from(err: reqwest::Error) -> Self {
        BenchError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Serialization(err.to_string())
    }
}
