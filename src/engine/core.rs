//! Single-step execution: the only code path that moves a step through
//! its lifecycle and writes its output into the store.

use crate::contract::ContractTable;
use crate::engine::registry::{DataHandle, ExecutorRegistry, StepContext};
use crate::engine::state::EngineState;
use crate::errors::EngineError;
use crate::events::{EngineEvent, ProgressEvent, SessionAction, SessionLogEntry};
use crate::step::StepStatus;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info};
use uuid::Uuid;

/// Outcome of one step run. Executor failures are data here, not errors;
/// `Err` is reserved for precondition violations.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_id: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    /// The failure was an empty backend result rather than a hard error.
    pub empty_result: bool,
    pub duration_ms: u64,
}

/// Runs steps one at a time against the shared state.
#[derive(Clone)]
pub struct ExecutionCore {
    state: Arc<Mutex<EngineState>>,
    registry: Arc<ExecutorRegistry>,
    contracts: Arc<ContractTable>,
    /// Replacement inputs staged by pre-step edits, consumed exactly once.
    edited_inputs: Arc<StdMutex<HashMap<String, Value>>>,
    event_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl ExecutionCore {
    pub fn new(
        state: Arc<Mutex<EngineState>>,
        registry: Arc<ExecutorRegistry>,
        contracts: Arc<ContractTable>,
    ) -> Self {
        Self {
            state,
            registry,
            contracts,
            edited_inputs: Arc::new(StdMutex::new(HashMap::new())),
            event_tx: None,
        }
    }

    pub fn with_event_channel(mut self, tx: mpsc::Sender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn state(&self) -> Arc<Mutex<EngineState>> {
        self.state.clone()
    }

    pub fn contracts(&self) -> &ContractTable {
        &self.contracts
    }

    /// Stage a replacement input for the step's next run.
    pub fn set_edited_input(&self, step_id: &str, value: Value) {
        self.edited_inputs
            .lock()
            .expect("edited input lock poisoned")
            .insert(step_id.to_string(), value);
    }

    /// Drop all staged replacements (stop/cancel path).
    pub fn clear_edited_inputs(&self) {
        self.edited_inputs
            .lock()
            .expect("edited input lock poisoned")
            .clear();
    }

    fn take_edited_input(&self, step_id: &str) -> Option<Value> {
        self.edited_inputs
            .lock()
            .expect("edited input lock poisoned")
            .remove(step_id)
    }

    async fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Run one step: gate on dependencies, execute, record the outcome.
    ///
    /// The automatic runner passes `skip_dependency_check` because it gates
    /// on its own completed-set; manual runs leave it false.
    pub async fn run_step(
        &self,
        step_id: &str,
        skip_dependency_check: bool,
    ) -> Result<StepOutcome, EngineError> {
        let contract = self
            .contracts
            .get(step_id)
            .ok_or_else(|| EngineError::UnknownStep(step_id.to_string()))?
            .clone();

        // Gate, mark in-progress, and resolve the input under one lock.
        let (step_name, config, input) = {
            let mut state = self.state.lock().await;
            let step = state.require_step(step_id)?;
            let step_name = step.name.clone();

            if !matches!(step.status, StepStatus::Pending | StepStatus::Error) {
                return Err(EngineError::InvalidTransition {
                    step: step_id.to_string(),
                    status: step.status,
                });
            }

            if !skip_dependency_check && !state.dependencies_met(step_id) {
                return Err(EngineError::DependencyNotMet {
                    step: step_id.to_string(),
                    waiting_on: state.unmet_dependencies(step_id),
                });
            }

            state.transition(step_id, StepStatus::InProgress)?;

            let input = match self.take_edited_input(step_id) {
                Some(edited) => {
                    info!(step = step_id, "using edited input");
                    Some(edited)
                }
                None => {
                    let raw = contract
                        .input_key
                        .and_then(|key| state.store.get_cloned(key));
                    self.contracts.extract_input(step_id, raw)
                }
            };

            state.events.push_progress(ProgressEvent::new(
                step_id,
                &step_name,
                StepStatus::InProgress,
                format!("Running: {step_name}"),
            ));
            state.events.log_session(SessionLogEntry {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                step_id: step_id.to_string(),
                step_name: step_name.clone(),
                action: SessionAction::Started,
                message: format!("Started {step_name}"),
                duration_ms: None,
                data_ref: None,
            });

            (step_name, state.config.site.clone(), input)
        };

        self.emit(EngineEvent::StepStarted {
            step: step_id.to_string(),
        })
        .await;
        info!(step = step_id, "step started");

        let executor = self
            .registry
            .get(step_id)
            .ok_or_else(|| EngineError::MissingExecutor(step_id.to_string()))?;

        let ctx = StepContext {
            step_id: step_id.to_string(),
            config,
            input,
            data: DataHandle::new(self.state.clone()),
        };

        let started = Instant::now();
        let result = executor.run(ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        // Record the outcome.
        let outcome = {
            let mut state = self.state.lock().await;
            match result {
                Ok(output) => {
                    state.store.insert(contract.primary_output(), output.primary.clone());
                    for (key, value) in output.extra {
                        if contract.output_keys.contains(&key.as_str()) {
                            state.store.insert(&key, value);
                        } else {
                            error!(step = step_id, key, "undeclared output write dropped");
                        }
                    }

                    state.transition(step_id, StepStatus::Completed)?;
                    if let Some(s) = state.step_mut(step_id) {
                        s.result = Some(output.primary.clone());
                    }

                    state.events.push_progress(ProgressEvent::new(
                        step_id,
                        &step_name,
                        StepStatus::Completed,
                        format!("Completed: {step_name}"),
                    ));
                    state.events.log_session(SessionLogEntry {
                        id: Uuid::new_v4(),
                        timestamp: Utc::now(),
                        step_id: step_id.to_string(),
                        step_name: step_name.clone(),
                        action: SessionAction::Completed,
                        message: format!("Completed {step_name}"),
                        duration_ms: Some(duration_ms),
                        data_ref: Some(contract.primary_output().to_string()),
                    });

                    StepOutcome {
                        step_id: step_id.to_string(),
                        success: true,
                        data: Some(output.primary),
                        error: None,
                        empty_result: false,
                        duration_ms,
                    }
                }
                Err(exec_err) => {
                    let message = exec_err.to_string();
                    let empty_result = exec_err.is_empty_result();

                    state.transition(step_id, StepStatus::Error)?;
                    if let Some(s) = state.step_mut(step_id) {
                        s.error = Some(message.clone());
                        s.last_error = Some(message.clone());
                    }

                    state.events.push_progress(ProgressEvent::new(
                        step_id,
                        &step_name,
                        StepStatus::Error,
                        format!("Failed: {step_name} - {message}"),
                    ));
                    state.events.log_session(SessionLogEntry {
                        id: Uuid::new_v4(),
                        timestamp: Utc::now(),
                        step_id: step_id.to_string(),
                        step_name: step_name.clone(),
                        action: SessionAction::Failed,
                        message: message.clone(),
                        duration_ms: Some(duration_ms),
                        data_ref: None,
                    });

                    StepOutcome {
                        step_id: step_id.to_string(),
                        success: false,
                        data: None,
                        error: Some(message),
                        empty_result,
                        duration_ms,
                    }
                }
            }
        };

        if outcome.success {
            self.emit(EngineEvent::StepCompleted {
                step: step_id.to_string(),
                duration_ms,
            })
            .await;
            info!(step = step_id, duration_ms, "step completed");
        } else {
            let err = outcome.error.clone().unwrap_or_default();
            self.emit(EngineEvent::StepFailed {
                step: step_id.to_string(),
                error: err.clone(),
            })
            .await;
            error!(step = step_id, error = %err, "step failed");
        }

        Ok(outcome)
    }

    /// Mark a step skipped.
    pub async fn skip_step(&self, step_id: &str, reason: &str) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().await;
            let step_name = state.require_step(step_id)?.name.clone();
            state.transition(step_id, StepStatus::Skipped)?;
            state.events.push_progress(ProgressEvent::new(
                step_id,
                &step_name,
                StepStatus::Skipped,
                format!("Skipped: {step_name} - {reason}"),
            ));
            state.events.log_session(SessionLogEntry {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                step_id: step_id.to_string(),
                step_name,
                action: SessionAction::Skipped,
                message: reason.to_string(),
                duration_ms: None,
                data_ref: None,
            });
        }
        self.emit(EngineEvent::StepSkipped {
            step: step_id.to_string(),
            reason: reason.to_string(),
        })
        .await;
        Ok(())
    }

    /// Re-activate a skipped step.
    pub async fn enable_step(&self, step_id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let status = state.require_step(step_id)?.status;
        if status != StepStatus::Skipped {
            return Err(EngineError::InvalidTransition {
                step: step_id.to_string(),
                status,
            });
        }
        state.transition(step_id, StepStatus::Pending)
    }

    /// Reset a failed or completed step so it can run again. Its previous
    /// output stays in the store until the re-run overwrites it.
    pub async fn retry_step(&self, step_id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let status = state.require_step(step_id)?.status;
        if !matches!(status, StepStatus::Error | StepStatus::Completed) {
            return Err(EngineError::InvalidTransition {
                step: step_id.to_string(),
                status,
            });
        }
        state.transition(step_id, StepStatus::Pending)
    }
}
