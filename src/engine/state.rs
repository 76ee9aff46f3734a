//! The authoritative workflow state: steps, generated data, and events.
//!
//! One `EngineState` exists per engine, behind a single lock. Everything
//! else reads through it; status fields are mutated only here.

use crate::config::{DeploymentTarget, EngineConfig};
use crate::errors::EngineError;
use crate::events::EventLog;
use crate::step::{self, Step, StepStatus, default_catalog};
use crate::store::DataStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Aggregate progress over the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub percent: f64,
}

#[derive(Debug)]
pub struct EngineState {
    pub steps: Vec<Step>,
    pub store: DataStore,
    pub events: EventLog,
    pub config: EngineConfig,
}

impl EngineState {
    pub fn new(config: EngineConfig) -> Self {
        let target = config.site.deployment_target;
        let mut state = Self {
            steps: default_catalog(),
            store: DataStore::new(),
            events: EventLog::new(),
            config,
        };
        state.apply_deployment_target(target);
        state
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    pub fn require_step(&self, step_id: &str) -> Result<&Step, EngineError> {
        self.step(step_id)
            .ok_or_else(|| EngineError::UnknownStep(step_id.to_string()))
    }

    /// Move a step to a new status, enforcing transition legality and
    /// keeping the timestamp bookkeeping consistent.
    pub fn transition(&mut self, step_id: &str, to: StepStatus) -> Result<(), EngineError> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| EngineError::UnknownStep(step_id.to_string()))?;

        if !step.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                step: step_id.to_string(),
                status: step.status,
            });
        }

        match to {
            StepStatus::InProgress => {
                step.started_at = Some(Utc::now());
                step.completed_at = None;
                step.error = None;
            }
            StepStatus::Completed | StepStatus::Error => {
                step.completed_at = Some(Utc::now());
            }
            StepStatus::Pending => {
                // retry/enable reset: keep the old result until overwritten,
                // remember the failure
                if step.error.is_some() {
                    step.last_error = step.error.take();
                }
                step.started_at = None;
                step.completed_at = None;
            }
            StepStatus::Skipped => {}
        }

        step.status = to;
        Ok(())
    }

    /// All dependencies of the step are completed or skipped.
    pub fn dependencies_met(&self, step_id: &str) -> bool {
        match self.step(step_id) {
            Some(step) => step.depends_on.iter().all(|dep| {
                self.step(dep)
                    .is_some_and(|d| d.status.is_settled())
            }),
            None => false,
        }
    }

    /// Dependencies still blocking the step.
    pub fn unmet_dependencies(&self, step_id: &str) -> Vec<String> {
        self.step(step_id)
            .map(|step| {
                step.depends_on
                    .iter()
                    .filter(|dep| {
                        !self
                            .step(dep)
                            .is_some_and(|d| d.status.is_settled())
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A step is runnable when it is pending (or being retried after an
    /// error) and its dependencies are settled.
    pub fn can_run(&self, step_id: &str) -> bool {
        self.step(step_id).is_some_and(|s| {
            matches!(s.status, StepStatus::Pending | StepStatus::Error)
                && self.dependencies_met(step_id)
        })
    }

    /// First pending step (in catalog order) whose dependencies are met.
    pub fn next_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| {
            s.status == StepStatus::Pending && self.dependencies_met(&s.id)
        })
    }

    pub fn all_settled(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_settled())
    }

    /// First step currently in error, if any.
    pub fn first_failed(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == StepStatus::Error)
    }

    pub fn progress(&self) -> WorkflowProgress {
        let total = self.steps.len();
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        let skipped = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Skipped)
            .count();
        let failed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Error)
            .count();
        let percent = if total == 0 {
            100.0
        } else {
            ((completed + skipped) as f64 / total as f64) * 100.0
        };
        WorkflowProgress {
            total,
            completed,
            skipped,
            failed,
            percent,
        }
    }

    /// Full reset: fresh catalog, empty store, empty progress ring. The
    /// site configuration and the session log survive.
    pub fn reset(&mut self) {
        self.steps = default_catalog();
        let target = self.config.site.deployment_target;
        self.apply_deployment_target(target);
        self.store.clear();
        self.events.clear_progress();
    }

    /// Switch deployment target and flip the target-specific provisioning
    /// steps between pending and skipped. Steps that already ran keep
    /// their status.
    pub fn set_deployment_target(&mut self, target: DeploymentTarget) {
        self.config.site.deployment_target = target;
        self.apply_deployment_target(target);
    }

    fn apply_deployment_target(&mut self, target: DeploymentTarget) {
        let (activate, deactivate): (&[&str], &[&str]) = match target {
            DeploymentTarget::Demo => (
                &[step::CREATE_DEMO_REPO, step::PROVISION_CLOUDFLARE_PAGES],
                &[
                    step::CREATE_GITHUB_REPO,
                    step::PROVISION_SITE,
                    step::PREVENT_HOTLINKING,
                ],
            ),
            DeploymentTarget::Production => (
                &[
                    step::CREATE_GITHUB_REPO,
                    step::PROVISION_SITE,
                    step::PREVENT_HOTLINKING,
                ],
                &[step::CREATE_DEMO_REPO, step::PROVISION_CLOUDFLARE_PAGES],
            ),
        };

        for id in activate {
            if let Some(s) = self.step_mut(id)
                && s.status == StepStatus::Skipped
            {
                s.status = StepStatus::Pending;
            }
        }
        for id in deactivate {
            if let Some(s) = self.step_mut(id)
                && s.status == StepStatus::Pending
            {
                s.status = StepStatus::Skipped;
            }
        }
    }
}
