//! Error types for the DNS metrics harness
//!
//! Every failure surfaced by a scenario run is wrapped in [`Error::Step`] so
//! the report always names the step index and kind that aborted the run.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::scenario::StepKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Step Execution Errors ===
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Step was expected to fail but succeeded")]
    ExpectationMismatch,

    #[error("Step {index} ({kind}) failed: {source}")]
    Step {
        index: usize,
        kind: StepKind,
        #[source]
        source: Box<Error>,
    },

    #[error("Scenario exceeded its deadline of {}s", .0.as_secs_f64())]
    ScenarioTimeout(Duration),

    // === Background Task Errors ===
    #[error("Background task '{0}' is already running")]
    DuplicateTask(String),

    #[error("No background task registered with id '{0}'")]
    UnknownTask(String),

    // === Metric Validation Errors ===
    #[error("No sample of '{metric}' matches labels {labels}")]
    MetricNotFound { metric: String, labels: String },

    #[error("{count} samples of '{metric}' match labels {labels}; the predicate is under-constrained")]
    AmbiguousMetric {
        metric: String,
        labels: String,
        count: usize,
    },

    #[error("Metric '{metric}': expected value {expected}, got {actual}")]
    ValueMismatch {
        metric: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to parse metrics payload at line {line}: {reason}")]
    MetricsParse { line: usize, reason: String },

    #[error("Failed to resolve owning workload of pod '{pod}': {reason}")]
    Resolution { pod: String, reason: String },

    #[error("Metric '{metric}' is attributed to {actual}, but the pod belongs to {expected}")]
    WorkloadMismatch {
        metric: String,
        expected: String,
        actual: String,
    },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Transport Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Wrap an error with the index and kind of the step that produced it
    pub fn at_step(self, index: usize, kind: StepKind) -> Self {
        Self::Step {
            index,
            kind,
            source: Box::new(self),
        }
    }

    /// Create a workload resolution error
    pub fn resolution(pod: &str, reason: impl ToString) -> Self {
        Self::Resolution {
            pod: pod.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Unwrap [`Error::Step`] layers down to the error that caused them
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Index of the failing step, if this error was raised by the executor
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Error::Step { index, .. } => Some(*index),
            _ => None,
        }
    }
}
