//! The executor seam: the trait each step implementation fills in, the
//! context it receives, and the registry mapping step ids to executors.
//!
//! The registry is validated against the catalog at startup so a missing
//! executor is a configuration error, never a mid-run surprise.

use crate::config::SiteConfig;
use crate::engine::state::EngineState;
use crate::errors::{EngineError, ExecutorError};
use crate::step::Step;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Live accessor into the generated-data store. Executors read through
/// this handle instead of a snapshot so they always see the latest writes.
#[derive(Clone)]
pub struct DataHandle {
    state: Arc<Mutex<EngineState>>,
}

impl DataHandle {
    pub fn new(state: Arc<Mutex<EngineState>>) -> Self {
        Self { state }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().await.store.get_cloned(key)
    }

    pub async fn get_path(&self, key: &str, path: &str) -> Option<Value> {
        self.state.lock().await.store.get_path(key, path).cloned()
    }
}

/// Everything an executor gets to work with.
#[derive(Clone)]
pub struct StepContext {
    pub step_id: String,
    pub config: SiteConfig,
    /// The step's declared contract input, with any pre-step edit already
    /// applied. None for config-only steps.
    pub input: Option<Value>,
    /// Live store access for steps that read beyond their declared input.
    pub data: DataHandle,
}

impl StepContext {
    /// The declared input, or a `MissingInput` error naming the key.
    pub fn require_input(&self, key: &str) -> Result<&Value, ExecutorError> {
        self.input.as_ref().ok_or_else(|| ExecutorError::MissingInput {
            step: self.step_id.clone(),
            key: key.to_string(),
        })
    }
}

/// Result of a successful step run.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Payload written to the step's primary output key.
    pub primary: Value,
    /// Additional writes, only honored when the contract declares them.
    pub extra: Vec<(String, Value)>,
}

impl StepOutput {
    pub fn new(primary: Value) -> Self {
        Self {
            primary,
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.push((key.to_string(), value));
        self
    }
}

/// One unit of pipeline work against the backend.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError>;
}

/// Step id -> executor.
#[derive(Default)]
pub struct ExecutorRegistry {
    map: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step_id: &str, executor: Arc<dyn StepExecutor>) {
        self.map.insert(step_id.to_string(), executor);
    }

    pub fn get(&self, step_id: &str) -> Option<Arc<dyn StepExecutor>> {
        self.map.get(step_id).cloned()
    }

    /// Ensure every catalog step has an executor.
    pub fn validate(&self, catalog: &[Step]) -> Result<(), EngineError> {
        for step in catalog {
            if !self.map.contains_key(&step.id) {
                return Err(EngineError::MissingExecutor(step.id.clone()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopExecutor;

    #[async_trait]
    impl StepExecutor for NoopExecutor {
        async fn run(&self, _ctx: StepContext) -> Result<StepOutput, ExecutorError> {
            Ok(StepOutput::new(json!({"ok": true})))
        }
    }

    #[test]
    fn validate_flags_missing_executors() {
        let mut registry = ExecutorRegistry::new();
        let catalog = crate::step::default_catalog();

        let err = registry.validate(&catalog).unwrap_err();
        assert!(matches!(err, EngineError::MissingExecutor(_)));

        for step in &catalog {
            registry.register(&step.id, Arc::new(NoopExecutor));
        }
        assert!(registry.validate(&catalog).is_ok());
    }

    #[test]
    fn output_extra_writes_accumulate() {
        let output = StepOutput::new(json!({"pages": []}))
            .with_extra("allocationSummary", json!({"matched": 10}));
        assert_eq!(output.extra.len(), 1);
        assert_eq!(output.extra[0].0, "allocationSummary");
    }
}
