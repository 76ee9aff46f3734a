//! Progress events, session log, and the engine event channel.

use crate::step::StepStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Progress events kept for display. Only the most recent are retained.
pub const PROGRESS_EVENT_CAP: usize = 100;

/// A human-readable progress update tied to a step (or a pseudo-step such
/// as "yolo" or "batch").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub step_id: String,
    pub step_name: String,
    pub status: StepStatus,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(step_id: &str, step_name: &str, status: StepStatus, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            step_id: step_id.to_string(),
            step_name: step_name.to_string(),
            status,
            message,
        }
    }
}

/// Durable audit entry. Unlike progress events, the session log is never
/// truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub step_id: String,
    pub step_name: String,
    pub action: SessionAction,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Store key holding the step's output, when it produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    Started,
    Completed,
    Failed,
    Skipped,
    Reset,
    Info,
}

/// Events emitted on the engine's mpsc channel for UIs and drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StepStarted {
        step: String,
    },
    StepCompleted {
        step: String,
        duration_ms: u64,
    },
    StepFailed {
        step: String,
        error: String,
    },
    StepSkipped {
        step: String,
        reason: String,
    },
    /// The automatic runner is waiting at a checkpoint.
    CheckpointOpened {
        step: String,
        kind: CheckpointKind,
    },
    CheckpointResolved {
        step: String,
        kind: CheckpointKind,
    },
    RunStarted {
        total_steps: usize,
    },
    RunCompleted {
        success: bool,
        incomplete: Vec<String>,
    },
    BatchSiteStarted {
        domain: String,
        index: usize,
        total: usize,
    },
    BatchSiteFinished {
        domain: String,
        success: bool,
    },
    BatchCompleted {
        succeeded: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    PreStepEdit,
    Intervention,
}

/// The engine's event memory: a capped progress ring plus the unbounded
/// session log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    progress: VecDeque<ProgressEvent>,
    session: Vec<SessionLogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_progress(&mut self, event: ProgressEvent) {
        if self.progress.len() == PROGRESS_EVENT_CAP {
            self.progress.pop_front();
        }
        self.progress.push_back(event);
    }

    pub fn log_session(&mut self, entry: SessionLogEntry) {
        self.session.push(entry);
    }

    /// Most recent first.
    pub fn recent_progress(&self) -> impl Iterator<Item = &ProgressEvent> {
        self.progress.iter().rev()
    }

    pub fn progress_len(&self) -> usize {
        self.progress.len()
    }

    pub fn session_entries(&self) -> &[SessionLogEntry] {
        &self.session
    }

    /// Drops the progress ring but keeps the session log.
    pub fn clear_progress(&mut self) {
        self.progress.clear();
    }
}
