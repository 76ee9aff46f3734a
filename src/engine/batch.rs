//! Batch mode: run the full pipeline once per roster site, strictly in
//! sequence, with a clean reset between sites.

use crate::config::SiteConfig;
use crate::engine::auto::{AutoOutcome, AutoRunner, RunnerShared};
use crate::engine::checkpoint::StopSignal;
use crate::engine::core::ExecutionCore;
use crate::errors::EngineError;
use crate::events::{EngineEvent, ProgressEvent};
use crate::sites::BatchSiteEntry;
use crate::step::StepStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// A site whose pass did not finish cleanly.
#[derive(Debug, Clone)]
pub struct FailedSite {
    pub domain: String,
    pub error: String,
}

/// A site set aside because the backend produced nothing to work with.
#[derive(Debug, Clone)]
pub struct SkippedSite {
    pub domain: String,
    pub reason: String,
}

/// Accounting for one batch run.
///
/// A site whose only failure was an empty backend result is counted in
/// `skipped` and *also* recorded in `failed`: the failure list is the
/// operator's complete retry queue, while `skipped` separates "nothing to
/// work with" from hard errors.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub total_processed: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedSite>,
    pub skipped: Vec<SkippedSite>,
}

impl BatchOutcome {
    /// Sites that failed for a reason other than an empty result.
    pub fn hard_failures(&self) -> usize {
        self.failed
            .iter()
            .filter(|f| !self.skipped.iter().any(|s| s.domain == f.domain))
            .count()
    }
}

pub struct BatchRunner {
    core: ExecutionCore,
    shared: Arc<RunnerShared>,
    stop: Arc<StopSignal>,
    event_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl BatchRunner {
    pub fn new(core: ExecutionCore, shared: Arc<RunnerShared>, stop: Arc<StopSignal>) -> Self {
        Self {
            core,
            shared,
            stop,
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

    async fn note_progress(&self, status: StepStatus, message: String) {
        let state = self.core.state();
        let mut state = state.lock().await;
        state
            .events
            .push_progress(ProgressEvent::new("batch", "Batch Mode", status, message));
    }

    /// Process every roster site in order. Stop aborts the remaining queue
    /// but keeps the accounting gathered so far.
    pub async fn run(&self, sites: &[BatchSiteEntry]) -> Result<BatchOutcome, EngineError> {
        let mut outcome = BatchOutcome::default();
        if sites.is_empty() {
            return Ok(outcome);
        }

        self.stop.reset();
        self.note_progress(
            StepStatus::InProgress,
            format!("Starting batch processing of {} sites", sites.len()),
        )
        .await;
        info!(sites = sites.len(), "batch run started");

        for (index, site) in sites.iter().enumerate() {
            if self.stop.is_stopped() {
                self.note_progress(StepStatus::Skipped, "Batch mode stopped by user".to_string())
                    .await;
                break;
            }

            self.emit(EngineEvent::BatchSiteStarted {
                domain: site.domain.clone(),
                index,
                total: sites.len(),
            })
            .await;
            self.note_progress(
                StepStatus::InProgress,
                format!(
                    "Processing site {}/{}: {}",
                    index + 1,
                    sites.len(),
                    site.domain
                ),
            )
            .await;

            let pass = self.process_site(site).await?;
            outcome.total_processed += 1;

            let site_ok = {
                let state = self.core.state();
                let state = state.lock().await;
                pass.success && state.all_settled()
            };

            if site_ok {
                outcome.succeeded.push(site.domain.clone());
                self.note_progress(StepStatus::Completed, format!("Completed: {}", site.domain))
                    .await;
            } else {
                let (error, empty_result) = describe_failure(&pass, &self.core).await;
                if empty_result {
                    outcome.skipped.push(SkippedSite {
                        domain: site.domain.clone(),
                        reason: error.clone(),
                    });
                }
                outcome.failed.push(FailedSite {
                    domain: site.domain.clone(),
                    error: error.clone(),
                });
                self.note_progress(
                    StepStatus::Error,
                    format!("Failed: {} - {}", site.domain, error),
                )
                .await;
            }

            self.emit(EngineEvent::BatchSiteFinished {
                domain: site.domain.clone(),
                success: site_ok,
            })
            .await;

            // A stop observed inside the site's run also ends the queue.
            if pass.stopped {
                self.stop.trigger();
            }

            if index + 1 < sites.len() && !self.stop.is_stopped() {
                let state = self.core.state();
                let delay_ms = state.lock().await.config.execution.site_delay_ms;
                self.stop.sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        let hard_failures = outcome.hard_failures();
        self.note_progress(
            if outcome.failed.is_empty() {
                StepStatus::Completed
            } else {
                StepStatus::Error
            },
            format!(
                "Batch complete: {} succeeded, {} failed, {} skipped",
                outcome.succeeded.len(),
                hard_failures,
                outcome.skipped.len()
            ),
        )
        .await;
        self.emit(EngineEvent::BatchCompleted {
            succeeded: outcome.succeeded.len(),
            failed: outcome.failed.len(),
        })
        .await;
        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            skipped = outcome.skipped.len(),
            "batch run finished"
        );

        Ok(outcome)
    }

    /// Configure, reset, and run one full automatic pass for a site.
    async fn process_site(&self, site: &BatchSiteEntry) -> Result<AutoOutcome, EngineError> {
        {
            let state = self.core.state();
            let mut state = state.lock().await;
            let target = state.config.site.deployment_target;
            state.config.site = SiteConfig::new(&site.domain, &site.template, &site.site_type)
                .with_scrape_domain(site.scrape_domain.clone())
                .with_deployment_target(target);
            state.reset();
        }

        AutoRunner::new(self.core.clone(), self.shared.clone())
            .run()
            .await
    }

    /// Abort the queue and whatever pass is in flight.
    pub fn stop(&self) {
        self.stop.trigger();
        self.shared.stop.trigger();
        self.shared.intervention.cancel();
        self.shared.pre_step.cancel();
        self.core.clear_edited_inputs();
    }
}

/// Pick the message and classification for a failed site pass.
async fn describe_failure(pass: &AutoOutcome, core: &ExecutionCore) -> (String, bool) {
    if let Some(failure) = pass.failures.first() {
        return (failure.message.clone(), failure.empty_result);
    }
    // No recorded failure (e.g. stopped mid-run): fall back to the state.
    let state = core.state();
    let state = state.lock().await;
    match state.first_failed() {
        Some(step) => (
            step.error
                .clone()
                .unwrap_or_else(|| "Unknown error during site processing".to_string()),
            false,
        ),
        None => ("Site processing did not finish".to_string(), false),
    }
}
