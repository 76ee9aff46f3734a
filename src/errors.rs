//! Typed error hierarchy for the Sitewright engine.
//!
//! Two top-level enums cover the two subsystems:
//! - `EngineError` — orchestration failures (preconditions, configuration)
//! - `ExecutorError` — failures from the step executors themselves

use crate::step::StepStatus;
use thiserror::Error;

/// Errors from the orchestration layer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Dependencies not met for step '{step}': waiting on {waiting_on:?}")]
    DependencyNotMet {
        step: String,
        waiting_on: Vec<String>,
    },

    #[error("Step '{step}' cannot run from status '{status:?}'")]
    InvalidTransition { step: String, status: StepStatus },

    #[error("Invalid edited input for step '{step}': {message}")]
    InvalidEditedInput { step: String, message: String },

    #[error("Dependency '{dependency}' of step '{step}' does not exist")]
    UnknownDependency { step: String, dependency: String },

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("No executor registered for step '{0}'")]
    MissingExecutor(String),

    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single step executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The backend returned successfully but produced nothing usable.
    /// Batch mode classifies sites that hit this differently from hard failures.
    #[error("EMPTY_SCRAPE: {0}")]
    EmptyResult(String),

    #[error("Request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend returned {status} from {endpoint}: {body}")]
    BackendStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    #[error("Missing input data '{key}' for step '{step}'")]
    MissingInput { step: String, key: String },

    #[error("{0}")]
    Failed(String),
}

impl ExecutorError {
    /// Whether this failure is the "nothing to work with" outcome rather
    /// than a hard error.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::EmptyResult(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_not_met_carries_waiting_list() {
        let err = EngineError::DependencyNotMet {
            step: "create-vector-store".to_string(),
            waiting_on: vec!["scrape-site".to_string()],
        };
        match &err {
            EngineError::DependencyNotMet { waiting_on, .. } => {
                assert_eq!(waiting_on, &["scrape-site".to_string()]);
            }
            _ => panic!("Expected DependencyNotMet"),
        }
        assert!(err.to_string().contains("scrape-site"));
    }

    #[test]
    fn empty_result_is_distinguishable() {
        let err = ExecutorError::EmptyResult("No pages found in scrape results".to_string());
        assert!(err.is_empty_result());
        assert!(err.to_string().starts_with("EMPTY_SCRAPE:"));

        let err = ExecutorError::Failed("timeout".to_string());
        assert!(!err.is_empty_result());
    }

    #[test]
    fn invalid_transition_carries_status() {
        let err = EngineError::InvalidTransition {
            step: "scrape-site".to_string(),
            status: StepStatus::InProgress,
        };
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                status: StepStatus::InProgress,
                ..
            }
        ));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        let engine_err = EngineError::AlreadyRunning;
        assert_std_error(&engine_err);
        let exec_err = ExecutorError::Failed("x".into());
        assert_std_error(&exec_err);
    }
}
