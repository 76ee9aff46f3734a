//! The orchestration engine: one authoritative state, a single-step
//! execution core, and the manual/automatic/batch drivers on top of it.

pub mod auto;
pub mod batch;
pub mod checkpoint;
pub mod core;
pub mod registry;
pub mod state;

pub use auto::{AutoOutcome, AutoRunner, InterventionSignal, PreStepSignal, RunnerShared};
pub use batch::{BatchOutcome, BatchRunner, FailedSite, SkippedSite};
pub use checkpoint::{Checkpoint, Resolution, StopSignal};
pub use core::{ExecutionCore, StepOutcome};
pub use registry::{DataHandle, ExecutorRegistry, StepContext, StepExecutor, StepOutput};
pub use state::{EngineState, WorkflowProgress};

use crate::config::{DeploymentTarget, EngineConfig, SiteConfig};
use crate::contract::ContractTable;
use crate::errors::EngineError;
use crate::events::{EngineEvent, SessionAction, SessionLogEntry};
use crate::graph::StepGraph;
use crate::session::{SessionStore, Snapshot};
use crate::sites::BatchSiteEntry;
use crate::step::{Step, StepStatus, default_catalog};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

/// The engine facade. All workflow mutations go through the closed set of
/// operator commands defined here.
pub struct Engine {
    state: Arc<Mutex<EngineState>>,
    core: ExecutionCore,
    shared: Arc<RunnerShared>,
    batch_stop: Arc<StopSignal>,
    contracts: Arc<ContractTable>,
    event_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl Engine {
    /// Build an engine, validating the catalog graph and the executor
    /// registry up front.
    pub fn new(config: EngineConfig, registry: ExecutorRegistry) -> Result<Self, EngineError> {
        let catalog = default_catalog();
        registry.validate(&catalog)?;
        // Duplicate ids and unknown dependencies fail construction. Steps
        // caught in a dependency cycle can never become runnable, so they
        // are parked as skipped instead of aborting the engine.
        let graph = StepGraph::build(catalog)?;
        let ordering = graph.topological_order();

        let contracts = Arc::new(ContractTable::standard());
        let mut initial = EngineState::new(config);
        for id in &ordering.excluded {
            if let Some(step) = initial.step_mut(id) {
                step.status = StepStatus::Skipped;
            }
        }
        let state = Arc::new(Mutex::new(initial));
        let core = ExecutionCore::new(state.clone(), Arc::new(registry), contracts.clone());

        Ok(Self {
            state,
            core,
            shared: Arc::new(RunnerShared::new()),
            batch_stop: Arc::new(StopSignal::new()),
            contracts,
            event_tx: None,
        })
    }

    pub fn with_event_channel(mut self, tx: mpsc::Sender<EngineEvent>) -> Self {
        self.core = self.core.clone().with_event_channel(tx.clone());
        self.event_tx = Some(tx);
        self
    }

    pub fn contracts(&self) -> &ContractTable {
        &self.contracts
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    // ----- manual control -----

    /// Run a single step, gated on its dependencies.
    pub async fn run_step(&self, step_id: &str) -> Result<StepOutcome, EngineError> {
        self.core.run_step(step_id, false).await
    }

    pub async fn skip_step(&self, step_id: &str) -> Result<(), EngineError> {
        self.core.skip_step(step_id, "skipped by operator").await
    }

    pub async fn enable_step(&self, step_id: &str) -> Result<(), EngineError> {
        self.core.enable_step(step_id).await
    }

    pub async fn retry_step(&self, step_id: &str) -> Result<(), EngineError> {
        self.core.retry_step(step_id).await
    }

    // ----- automatic mode -----

    /// Run the automatic pass to completion. Fails with `AlreadyRunning`
    /// if a pass is active.
    pub async fn start_automatic(&self) -> Result<AutoOutcome, EngineError> {
        let mut runner = AutoRunner::new(self.core.clone(), self.shared.clone());
        if let Some(tx) = &self.event_tx {
            runner = runner.with_event_channel(tx.clone());
        }
        runner.run().await
    }

    /// Request a cooperative stop of whatever is running. Idempotent.
    /// Unblocks any checkpoint wait; an in-flight step finishes first.
    pub fn stop(&self) {
        self.batch_stop.trigger();
        self.shared.stop.trigger();
        self.shared.intervention.cancel();
        self.shared.pre_step.cancel();
        self.core.clear_edited_inputs();
    }

    /// Pause is a stop that keeps staged edits; `start_automatic` resumes
    /// from the first pending step.
    pub fn pause(&self) {
        self.shared.stop.trigger();
        self.shared.intervention.cancel();
        self.shared.pre_step.cancel();
    }

    /// Step currently waiting at the intervention checkpoint.
    pub fn pending_intervention(&self) -> Option<String> {
        self.shared.intervention.pending_step()
    }

    /// Step currently waiting at the pre-step edit checkpoint.
    pub fn pending_pre_step_edit(&self) -> Option<String> {
        self.shared.pre_step.pending_step()
    }

    /// Resolve the intervention checkpoint. Returns false when no run is
    /// waiting there.
    pub fn continue_intervention(&self, signal: InterventionSignal) -> bool {
        self.shared.intervention.resolve(signal)
    }

    /// Resolve the pre-step edit checkpoint.
    ///
    /// With `use_edited`, the replacement must be present and match the
    /// shape of the current input; otherwise the checkpoint stays open and
    /// `InvalidEditedInput` is returned so the operator can fix the payload.
    pub async fn continue_pre_step_edit(
        &self,
        use_edited: bool,
        data: Option<Value>,
    ) -> Result<bool, EngineError> {
        let Some(step_id) = self.shared.pre_step.pending_step() else {
            return Ok(false);
        };

        if !use_edited {
            return Ok(self.shared.pre_step.resolve(PreStepSignal::Continue));
        }

        let value = data.ok_or_else(|| EngineError::InvalidEditedInput {
            step: step_id.clone(),
            message: "no replacement payload provided".to_string(),
        })?;
        if value.is_null() {
            return Err(EngineError::InvalidEditedInput {
                step: step_id.clone(),
                message: "replacement payload is null".to_string(),
            });
        }

        // Shape check against the live input: an array input stays an array.
        let current = {
            let state = self.state.lock().await;
            let contract = self.contracts.get(&step_id);
            contract
                .and_then(|c| c.input_key)
                .and_then(|key| state.store.get_cloned(key))
                .and_then(|raw| self.contracts.extract_input(&step_id, Some(raw)))
        };
        if let Some(current) = current
            && current.is_array() != value.is_array()
        {
            return Err(EngineError::InvalidEditedInput {
                step: step_id.clone(),
                message: "replacement payload does not match the input shape".to_string(),
            });
        }

        Ok(self.shared.pre_step.resolve(PreStepSignal::UseEdited(value)))
    }

    /// Cancel at the pre-step edit checkpoint: aborts the whole run.
    pub fn cancel_pre_step_edit(&self) -> bool {
        self.shared.pre_step.resolve(PreStepSignal::Cancel)
    }

    // ----- batch mode -----

    /// Process a roster of sites, one full pass each.
    pub async fn run_batch(&self, sites: &[BatchSiteEntry]) -> Result<BatchOutcome, EngineError> {
        let mut runner = BatchRunner::new(
            self.core.clone(),
            self.shared.clone(),
            self.batch_stop.clone(),
        );
        if let Some(tx) = &self.event_tx {
            runner = runner.with_event_channel(tx.clone());
        }
        runner.run(sites).await
    }

    // ----- configuration and state access -----

    pub async fn set_site_config(&self, site: SiteConfig) {
        let target = site.deployment_target;
        let mut state = self.state.lock().await;
        state.config.site = site;
        state.set_deployment_target(target);
    }

    pub async fn set_deployment_target(&self, target: DeploymentTarget) {
        self.state.lock().await.set_deployment_target(target);
    }

    /// Full workflow reset. Site configuration and session log survive.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.reset();
        state.events.log_session(SessionLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            step_id: "workflow".to_string(),
            step_name: "Workflow".to_string(),
            action: SessionAction::Reset,
            message: "Workflow reset".to_string(),
            duration_ms: None,
            data_ref: None,
        });
    }

    pub async fn steps(&self) -> Vec<Step> {
        self.state.lock().await.steps.clone()
    }

    pub async fn step(&self, step_id: &str) -> Option<Step> {
        self.state.lock().await.step(step_id).cloned()
    }

    pub async fn progress(&self) -> WorkflowProgress {
        self.state.lock().await.progress()
    }

    pub async fn data(&self, key: &str) -> Option<Value> {
        self.state.lock().await.store.get_cloned(key)
    }

    pub async fn data_keys(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state.store.keys().map(String::from).collect();
        keys.sort();
        keys
    }

    pub async fn site_config(&self) -> SiteConfig {
        self.state.lock().await.config.site.clone()
    }

    // ----- session persistence -----

    /// Best-effort snapshot save; failures are logged, never fatal.
    pub async fn save_session(&self, store: &dyn SessionStore) {
        let state = self.state.lock().await;
        Snapshot::capture(&state).save(store);
    }

    /// Restore a previous snapshot. A missing or corrupt snapshot leaves
    /// the engine in its clean starting state.
    pub async fn restore_session(&self, store: &dyn SessionStore) -> bool {
        match Snapshot::load(store) {
            Some(snapshot) => {
                let mut state = self.state.lock().await;
                snapshot.apply(&mut state);
                true
            }
            None => false,
        }
    }
}
