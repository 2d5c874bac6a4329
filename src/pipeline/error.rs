//! Pipeline error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::stage::{StageId, UnknownStageError};
use crate::utils::glob::GlobError;

/// Removing the output tree failed for a reason other than its absence.
#[derive(Debug, Error)]
#[error("failed to clean `{}`", path.display())]
pub struct CleanError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A stage that did not complete cleanly.
///
/// Covers transform errors, per-file failures, unreadable inputs and
/// unwritable outputs. Files that did transform are still written.
#[derive(Debug, Clone, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct StageError {
    pub stage: StageId,
    pub message: String,
    /// Report text produced before the failure (lint findings).
    pub notes: Vec<String>,
}

impl StageError {
    pub fn new(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            notes: Vec::new(),
        }
    }
}

/// A transform panicked.
#[derive(Debug, Error)]
#[error("transform for `{stage}` panicked: {message}")]
pub struct TransformFault {
    pub stage: StageId,
    pub message: String,
}

impl TransformFault {
    /// Build from a `spawn_blocking` panic payload.
    pub fn from_panic(stage: StageId, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self { stage, message }
    }
}

impl From<TransformFault> for StageError {
    fn from(fault: TransformFault) -> Self {
        Self::new(fault.stage, fault.to_string())
    }
}

/// Why a run failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error("{}", StageFailures(.0))]
    Stages(Vec<StageError>),

    #[error(transparent)]
    UnknownStage(#[from] UnknownStageError),

    #[error(transparent)]
    Glob(#[from] GlobError),
}

struct StageFailures<'a>(&'a [StageError]);

impl fmt::Display for StageFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.0.iter().map(|e| e.stage.as_str()).collect();
        write!(f, "{} failed: {}", crate::utils::plural_count(names.len(), "stage"), names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_from_panic_payloads() {
        let fault = TransformFault::from_panic(StageId::Sass, Box::new("boom"));
        assert_eq!(fault.message, "boom");
        let fault = TransformFault::from_panic(StageId::Sass, Box::new(String::from("owned")));
        assert_eq!(fault.message, "owned");
        let fault = TransformFault::from_panic(StageId::Sass, Box::new(42));
        assert_eq!(fault.message, "unknown panic");

        let err = StageError::from(fault);
        assert_eq!(err.stage, StageId::Sass);
        assert!(err.message.contains("panicked"));
    }

    #[test]
    fn test_stages_error_lists_names() {
        let err = PipelineError::Stages(vec![
            StageError::new(StageId::Css, "x"),
            StageError::new(StageId::Javascript, "y"),
        ]);
        assert_eq!(err.to_string(), "2 stages failed: css, javascript");
    }
}
