//! The automatic runner: walks a fixed execution order end to end,
//! pausing at pre-step edit and post-step intervention checkpoints.
//!
//! Dependency gating during a run uses a completed-set local to the run,
//! never the shared statuses, so a slow status write can never stall or
//! reorder the walk.

use crate::engine::checkpoint::{Checkpoint, Resolution, StopSignal};
use crate::engine::core::ExecutionCore;
use crate::errors::EngineError;
use crate::events::{CheckpointKind, EngineEvent, ProgressEvent};
use crate::step::{StepStatus, execution_order_for};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Operator decision at a post-step intervention checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum InterventionSignal {
    Continue,
    /// Re-run the step that just finished.
    Retry,
    Stop,
}

/// Operator decision at a pre-step edit checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum PreStepSignal {
    /// Proceed with the step's stored input.
    Continue,
    /// Proceed with a replacement input, used for this run only.
    UseEdited(Value),
    /// Abort the whole run.
    Cancel,
}

/// Shared control surface between a run and the operator commands.
#[derive(Default)]
pub struct RunnerShared {
    pub stop: StopSignal,
    pub intervention: Checkpoint<InterventionSignal>,
    pub pre_step: Checkpoint<PreStepSignal>,
    running: AtomicBool,
}

impl RunnerShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// A step that failed during an automatic run.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub step_id: String,
    pub message: String,
    pub empty_result: bool,
}

/// Result of one automatic pass.
#[derive(Debug, Clone)]
pub struct AutoOutcome {
    /// Every step in the execution order finished or was skipped.
    pub success: bool,
    /// Steps from the order that never settled.
    pub incomplete: Vec<String>,
    pub failures: Vec<StepFailure>,
    /// The run ended because of a stop rather than running out of steps.
    pub stopped: bool,
}

pub struct AutoRunner {
    core: ExecutionCore,
    shared: Arc<RunnerShared>,
    event_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl AutoRunner {
    pub fn new(core: ExecutionCore, shared: Arc<RunnerShared>) -> Self {
        Self {
            core,
            shared,
            event_tx: None,
        }
    }

    pub fn with_event_channel(mut self, tx: mpsc::Sender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    async fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    async fn note_progress(&self, status: StepStatus, message: &str) {
        let state = self.core.state();
        let mut state = state.lock().await;
        state.events.push_progress(ProgressEvent::new(
            "yolo",
            "Automatic Run",
            status,
            message.to_string(),
        ));
    }

    /// Execute one full pass. Only one pass may be active per engine.
    pub async fn run(&self) -> Result<AutoOutcome, EngineError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let result = self.run_inner().await;
        self.shared.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self) -> Result<AutoOutcome, EngineError> {
        self.shared.stop.reset();

        // Behavior flags are captured once; mid-run config edits apply to
        // the next run.
        let (execution, order) = {
            let state = self.core.state();
            let state = state.lock().await;
            let execution = state.config.execution.clone();
            let order = execution_order_for(state.config.site.deployment_target);
            (execution, order)
        };

        self.emit(EngineEvent::RunStarted {
            total_steps: order.len(),
        })
        .await;
        self.note_progress(
            StepStatus::InProgress,
            if execution.intervention_enabled {
                "Starting automatic run with intervention (will pause after each step)"
            } else {
                "Starting automatic run"
            },
        )
        .await;
        info!(steps = order.len(), "automatic run started");

        // Seed the local completed-set with work already settled, and find
        // the first pending step to start from.
        let mut completed: HashSet<String> = HashSet::new();
        let mut start_index = 0;
        {
            let state = self.core.state();
            let state = state.lock().await;
            for id in &order {
                if let Some(step) = state.step(id)
                    && step.status.is_settled()
                {
                    completed.insert(step.id.clone());
                }
            }
            for (i, id) in order.iter().enumerate() {
                if state.step(id).is_some_and(|s| s.status == StepStatus::Pending) {
                    start_index = i;
                    break;
                }
            }
        }

        let mut failed: HashSet<String> = HashSet::new();
        let mut failures: Vec<StepFailure> = Vec::new();
        let mut stopped = false;

        let mut i = start_index;
        'order: while i < order.len() {
            if self.shared.stop.is_stopped() {
                stopped = true;
                self.note_progress(StepStatus::Skipped, "Automatic run stopped by user")
                    .await;
                break;
            }

            let step_id = order[i];

            let (exists, depends_on, skipped_deps_met) = {
                let state = self.core.state();
                let state = state.lock().await;
                match state.step(step_id) {
                    Some(step) => {
                        let deps = step.depends_on.clone();
                        // Steps outside the execution order (e.g. production
                        // provisioning during a demo run) satisfy dependents
                        // once they are skipped.
                        let met = deps.iter().all(|dep| {
                            completed.contains(dep)
                                || state
                                    .step(dep)
                                    .is_some_and(|d| d.status == StepStatus::Skipped)
                        });
                        (true, deps, met)
                    }
                    None => (false, Vec::new(), false),
                }
            };

            if !exists {
                warn!(step = step_id, "step missing from catalog, skipping");
                i += 1;
                continue;
            }

            if completed.contains(step_id) {
                i += 1;
                continue;
            }

            if !skipped_deps_met {
                if depends_on.iter().any(|dep| failed.contains(dep)) {
                    self.core.skip_step(step_id, "dependency failed").await?;
                    completed.insert(step_id.to_string());
                    i += 1;
                    continue;
                }
                // With a correct execution order this branch is unreachable.
                let waiting: Vec<&String> = depends_on
                    .iter()
                    .filter(|d| !completed.contains(*d))
                    .collect();
                warn!(step = step_id, ?waiting, "dependencies not met, skipping slot");
                i += 1;
                continue;
            }

            // Pre-step edit checkpoint, only for steps with editable input.
            if execution.pre_step_edit_enabled && self.core.contracts().is_editable(step_id) {
                // Arm before announcing so an operator reacting to the event
                // always finds the slot open.
                let rx = self.shared.pre_step.arm(step_id);
                self.emit(EngineEvent::CheckpointOpened {
                    step: step_id.to_string(),
                    kind: CheckpointKind::PreStepEdit,
                })
                .await;
                self.note_progress(
                    StepStatus::InProgress,
                    &format!("Paused: edit input for {step_id}"),
                )
                .await;

                let resolution = self.shared.pre_step.wait_armed(rx, &self.shared.stop).await;
                self.emit(EngineEvent::CheckpointResolved {
                    step: step_id.to_string(),
                    kind: CheckpointKind::PreStepEdit,
                })
                .await;

                match resolution {
                    Resolution::Stopped => {
                        stopped = true;
                        break 'order;
                    }
                    Resolution::Signal(PreStepSignal::Cancel) => {
                        self.shared.stop.trigger();
                        self.core.clear_edited_inputs();
                        self.note_progress(StepStatus::Skipped, "Run cancelled at input editing")
                            .await;
                        stopped = true;
                        break 'order;
                    }
                    Resolution::Signal(PreStepSignal::UseEdited(value)) => {
                        self.core.set_edited_input(step_id, value);
                    }
                    Resolution::Signal(PreStepSignal::Continue) => {}
                }

                if self.shared.stop.is_stopped() {
                    stopped = true;
                    break 'order;
                }
            }

            // Dependency gating already happened against the local set.
            let outcome = self.core.run_step(step_id, true).await?;

            if outcome.success {
                completed.insert(step_id.to_string());
            } else {
                failed.insert(step_id.to_string());
                failures.push(StepFailure {
                    step_id: step_id.to_string(),
                    message: outcome.error.clone().unwrap_or_default(),
                    empty_result: outcome.empty_result,
                });

                if execution.stop_on_error {
                    self.note_progress(
                        StepStatus::Error,
                        &format!("Automatic run stopped due to error in {step_id}"),
                    )
                    .await;
                    break 'order;
                }
            }

            // Post-step intervention checkpoint.
            if outcome.success && execution.intervention_enabled {
                let rx = self.shared.intervention.arm(step_id);
                self.emit(EngineEvent::CheckpointOpened {
                    step: step_id.to_string(),
                    kind: CheckpointKind::Intervention,
                })
                .await;
                self.note_progress(
                    StepStatus::InProgress,
                    &format!("Paused: review result of {step_id}"),
                )
                .await;

                let resolution = self
                    .shared
                    .intervention
                    .wait_armed(rx, &self.shared.stop)
                    .await;
                self.emit(EngineEvent::CheckpointResolved {
                    step: step_id.to_string(),
                    kind: CheckpointKind::Intervention,
                })
                .await;

                match resolution {
                    Resolution::Stopped => {
                        stopped = true;
                        break 'order;
                    }
                    Resolution::Signal(InterventionSignal::Stop) => {
                        self.shared.stop.trigger();
                        stopped = true;
                        break 'order;
                    }
                    Resolution::Signal(InterventionSignal::Retry) => {
                        // Rewind in place: same slot, no delay. The step
                        // already ran, so its dependencies held this pass.
                        self.core.retry_step(step_id).await?;
                        completed.remove(step_id);
                        info!(step = step_id, "retrying after intervention");
                        continue 'order;
                    }
                    Resolution::Signal(InterventionSignal::Continue) => {}
                }

                if self.shared.stop.is_stopped() {
                    stopped = true;
                    break 'order;
                }
            }

            if i + 1 < order.len() {
                self.shared
                    .stop
                    .sleep(Duration::from_millis(execution.step_delay_ms))
                    .await;
            }
            i += 1;
        }

        let incomplete: Vec<String> = order
            .iter()
            .filter(|id| !completed.contains(**id))
            .map(|id| id.to_string())
            .collect();
        let success = incomplete.is_empty();

        if success {
            self.note_progress(StepStatus::Completed, "Automatic run completed").await;
        }
        self.emit(EngineEvent::RunCompleted {
            success,
            incomplete: incomplete.clone(),
        })
        .await;
        info!(success, stopped, "automatic run finished");

        Ok(AutoOutcome {
            success,
            incomplete,
            failures,
            stopped,
        })
    }

    /// Request a stop: sets the flag, then unblocks any checkpoint wait.
    /// Idempotent; an executor already in flight finishes first.
    pub fn stop(&self) {
        self.shared.stop.trigger();
        self.shared.intervention.cancel();
        self.shared.pre_step.cancel();
        self.core.clear_edited_inputs();
    }
}
