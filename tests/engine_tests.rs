//! End-to-end engine tests with stub executors: manual control, automatic
//! runs with checkpoints, and batch processing.

use async_trait::async_trait;
use serde_json::{Value, json};
use sitewright::config::{DeploymentTarget, EngineConfig, ExecutionConfig, SiteConfig};
use sitewright::engine::{
    Engine, ExecutorRegistry, InterventionSignal, StepContext, StepExecutor, StepOutput,
};
use sitewright::errors::{EngineError, ExecutorError};
use sitewright::events::{CheckpointKind, EngineEvent};
use sitewright::sites::BatchSiteEntry;
use sitewright::step::{self, StepStatus, default_catalog};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};

/// Succeeds with a fixed payload, ignoring its input.
struct Static(Value);

#[async_trait]
impl StepExecutor for Static {
    async fn run(&self, _ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        Ok(StepOutput::new(self.0.clone()))
    }
}

/// Fails with a hard error.
struct Failing(&'static str);

#[async_trait]
impl StepExecutor for Failing {
    async fn run(&self, _ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        Err(ExecutorError::Failed(self.0.to_string()))
    }
}

/// Echoes its resolved input back as the primary output.
struct EchoInput;

#[async_trait]
impl StepExecutor for EchoInput {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let input = ctx.require_input("input")?.clone();
        Ok(StepOutput::new(input))
    }
}

/// Counts invocations, then succeeds with a fixed payload.
struct Counting {
    hits: Arc<AtomicUsize>,
    payload: Value,
}

#[async_trait]
impl StepExecutor for Counting {
    async fn run(&self, _ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(StepOutput::new(self.payload.clone()))
    }
}

/// Fails the first call, succeeds afterwards.
struct FlakyOnce {
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl StepExecutor for FlakyOnce {
    async fn run(&self, _ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        if self.hits.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(ExecutorError::Failed("transient backend error".to_string()))
        } else {
            Ok(StepOutput::new(payload()))
        }
    }
}

/// Holds its step open until released, so a pause can land mid-run.
struct Gated {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl StepExecutor for Gated {
    async fn run(&self, _ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(StepOutput::new(payload()))
    }
}

/// A payload every contract's nested input path resolves against.
fn payload() -> Value {
    json!({
        "pages": [{"url": "/"}],
        "designSystem": {"colors": {}},
        "pageData": {"home": {}},
        "theme": {"logo": null},
        "status": "ok",
    })
}

fn full_registry() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    for step in default_catalog() {
        registry.register(&step.id, Arc::new(Static(payload())));
    }
    registry
}

fn engine(registry: ExecutorRegistry, execution: ExecutionConfig) -> Engine {
    let config = EngineConfig {
        site: SiteConfig::new("example.com", "stinson", "dental"),
        execution: execution.with_step_delay_ms(0).with_site_delay_ms(0),
    };
    Engine::new(config, registry).unwrap()
}

#[tokio::test]
async fn manual_run_respects_dependencies() {
    let engine = engine(full_registry(), ExecutionConfig::default());

    let err = engine.run_step(step::PROVISION_SITE).await.unwrap_err();
    match err {
        EngineError::DependencyNotMet { waiting_on, .. } => {
            assert_eq!(waiting_on, vec![step::CREATE_GITHUB_REPO.to_string()]);
        }
        other => panic!("expected DependencyNotMet, got {other:?}"),
    }

    let outcome = engine.run_step(step::CREATE_GITHUB_REPO).await.unwrap();
    assert!(outcome.success);
    let outcome = engine.run_step(step::PROVISION_SITE).await.unwrap();
    assert!(outcome.success);

    let step = engine.step(step::PROVISION_SITE).await.unwrap();
    assert_eq!(step.status, StepStatus::Completed);
    assert!(engine.data("provisionResult").await.is_some());
}

#[tokio::test]
async fn completed_steps_cannot_run_again_without_retry() {
    let engine = engine(full_registry(), ExecutionConfig::default());

    engine.run_step(step::SCRAPE_SITE).await.unwrap();
    let err = engine.run_step(step::SCRAPE_SITE).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    engine.retry_step(step::SCRAPE_SITE).await.unwrap();
    let outcome = engine.run_step(step::SCRAPE_SITE).await.unwrap();
    assert!(outcome.success);
}

#[tokio::test]
async fn skip_and_enable_round_trip() {
    let engine = engine(full_registry(), ExecutionConfig::default());

    engine.skip_step(step::SCRAPE_SITE).await.unwrap();
    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Skipped
    );

    engine.enable_step(step::SCRAPE_SITE).await.unwrap();
    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Pending
    );

    // Enabling a pending step is an invalid transition.
    let err = engine.enable_step(step::SCRAPE_SITE).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn automatic_run_settles_the_production_order() {
    let engine = engine(full_registry(), ExecutionConfig::default());

    let outcome = engine.start_automatic().await.unwrap();
    assert!(outcome.success, "incomplete: {:?}", outcome.incomplete);
    assert!(outcome.failures.is_empty());
    assert!(!outcome.stopped);

    for step in engine.steps().await {
        assert!(
            step.status.is_settled(),
            "{} ended {:?}",
            step.id,
            step.status
        );
    }
    // WordPress-only steps stay skipped in the default configuration.
    assert_eq!(
        engine.step(step::EXPORT_TO_WORDPRESS).await.unwrap().status,
        StepStatus::Skipped
    );
    assert!(engine.data("contentResult").await.is_some());
    assert_eq!(engine.progress().await.percent, 100.0);
}

#[tokio::test]
async fn stop_on_error_halts_before_downstream_steps() {
    let mut registry = full_registry();
    registry.register(step::SCRAPE_SITE, Arc::new(Failing("backend exploded")));
    let engine = engine(registry, ExecutionConfig::default());

    let outcome = engine.start_automatic().await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].step_id, step::SCRAPE_SITE);
    assert!(!outcome.failures[0].empty_result);

    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Error
    );
    // Never reached.
    assert_eq!(
        engine.step(step::CREATE_VECTOR_STORE).await.unwrap().status,
        StepStatus::Pending
    );
}

#[tokio::test]
async fn failed_dependencies_cascade_when_continuing_past_errors() {
    let mut registry = full_registry();
    registry.register(step::SCRAPE_SITE, Arc::new(Failing("backend exploded")));
    let engine = engine(
        registry,
        ExecutionConfig::default().with_stop_on_error(false),
    );

    let outcome = engine.start_automatic().await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.incomplete.contains(&step::SCRAPE_SITE.to_string()));

    // Direct dependents of the failure are skipped, not attempted.
    assert_eq!(
        engine.step(step::CREATE_VECTOR_STORE).await.unwrap().status,
        StepStatus::Skipped
    );
    // Steps that only needed the skipped dependency still ran.
    assert_eq!(
        engine.step(step::SELECT_TEMPLATE).await.unwrap().status,
        StepStatus::Completed
    );
}

#[tokio::test]
async fn automatic_run_resumes_from_first_pending_step() {
    let engine = engine(full_registry(), ExecutionConfig::default());

    engine.run_step(step::CREATE_GITHUB_REPO).await.unwrap();
    engine.run_step(step::PROVISION_SITE).await.unwrap();

    let outcome = engine.start_automatic().await.unwrap();
    assert!(outcome.success);
    // The pre-run results were not clobbered.
    assert_eq!(
        engine
            .step(step::CREATE_GITHUB_REPO)
            .await
            .unwrap()
            .status,
        StepStatus::Completed
    );
}

#[tokio::test]
async fn concurrent_automatic_runs_are_rejected() {
    let mut registry = full_registry();
    registry.register(step::CREATE_VECTOR_STORE, Arc::new(EchoInput));
    let (tx, mut rx) = mpsc::channel(64);
    let engine = Arc::new(
        engine(
            registry,
            ExecutionConfig::default().with_pre_step_edit(true),
        )
        .with_event_channel(tx),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_automatic().await })
    };

    let mut rejected = false;
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::CheckpointOpened {
                kind: CheckpointKind::PreStepEdit,
                ..
            } => {
                if !rejected {
                    let err = engine.start_automatic().await.unwrap_err();
                    assert!(matches!(err, EngineError::AlreadyRunning));
                    rejected = true;
                }
                engine.continue_pre_step_edit(false, None).await.unwrap();
            }
            EngineEvent::RunCompleted { .. } => break,
            _ => {}
        }
    }

    let outcome = run.await.unwrap().unwrap();
    assert!(rejected);
    assert!(outcome.success);
}

#[tokio::test]
async fn edited_input_is_used_once_and_validated() {
    let mut registry = full_registry();
    registry.register(step::CREATE_VECTOR_STORE, Arc::new(EchoInput));
    let (tx, mut rx) = mpsc::channel(64);
    let engine = Arc::new(
        engine(
            registry,
            ExecutionConfig::default().with_pre_step_edit(true),
        )
        .with_event_channel(tx),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_automatic().await })
    };

    let edited = json!([{"url": "/edited"}]);
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::CheckpointOpened {
                step,
                kind: CheckpointKind::PreStepEdit,
            } => {
                if step == step::CREATE_VECTOR_STORE {
                    // The stored input is an array; an object must be refused
                    // and the checkpoint must stay open.
                    let err = engine
                        .continue_pre_step_edit(true, Some(json!({"not": "an array"})))
                        .await
                        .unwrap_err();
                    assert!(matches!(err, EngineError::InvalidEditedInput { .. }));
                    assert_eq!(
                        engine.pending_pre_step_edit(),
                        Some(step::CREATE_VECTOR_STORE.to_string())
                    );

                    let resolved = engine
                        .continue_pre_step_edit(true, Some(edited.clone()))
                        .await
                        .unwrap();
                    assert!(resolved);
                } else {
                    engine.continue_pre_step_edit(false, None).await.unwrap();
                }
            }
            EngineEvent::RunCompleted { .. } => break,
            _ => {}
        }
    }

    let outcome = run.await.unwrap().unwrap();
    assert!(outcome.success);
    // The echo executor saw the replacement, not the scraped pages.
    assert_eq!(engine.data("vectorStoreResult").await.unwrap(), edited);

    // The replacement was consumed; a later run reads the stored input.
    engine.retry_step(step::CREATE_VECTOR_STORE).await.unwrap();
    engine.run_step(step::CREATE_VECTOR_STORE).await.unwrap();
    assert_eq!(
        engine.data("vectorStoreResult").await.unwrap(),
        json!([{"url": "/"}])
    );
}

#[tokio::test]
async fn cancelling_a_pre_step_edit_ends_the_run() {
    let (tx, mut rx) = mpsc::channel(64);
    let engine = Arc::new(
        engine(
            full_registry(),
            ExecutionConfig::default().with_pre_step_edit(true),
        )
        .with_event_channel(tx),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_automatic().await })
    };

    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::CheckpointOpened {
                step,
                kind: CheckpointKind::PreStepEdit,
            } => {
                assert_eq!(step, step::CREATE_VECTOR_STORE);
                assert!(engine.cancel_pre_step_edit());
            }
            EngineEvent::RunCompleted { .. } => break,
            _ => {}
        }
    }

    let outcome = run.await.unwrap().unwrap();
    assert!(outcome.stopped);
    assert!(!outcome.success);
    // The step under edit never ran; upstream work is kept.
    assert_eq!(
        engine.step(step::CREATE_VECTOR_STORE).await.unwrap().status,
        StepStatus::Pending
    );
    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Completed
    );
}

#[tokio::test]
async fn stop_unblocks_a_run_parked_at_a_checkpoint() {
    let (tx, mut rx) = mpsc::channel(64);
    let engine = Arc::new(
        engine(
            full_registry(),
            ExecutionConfig::default().with_intervention(true),
        )
        .with_event_channel(tx),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_automatic().await })
    };

    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::CheckpointOpened {
                kind: CheckpointKind::Intervention,
                ..
            } => {
                assert!(engine.pending_intervention().is_some());
                engine.stop();
            }
            EngineEvent::RunCompleted { .. } => break,
            _ => {}
        }
    }

    let outcome = run.await.unwrap().unwrap();
    assert!(outcome.stopped);
    assert!(!outcome.success);
    assert!(engine.pending_intervention().is_none());
}

#[tokio::test]
async fn pause_ends_the_pass_and_a_fresh_run_resumes() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let mut registry = full_registry();
    registry.register(
        step::SCRAPE_SITE,
        Arc::new(Gated {
            entered: entered.clone(),
            release: release.clone(),
        }),
    );
    let engine = Arc::new(engine(registry, ExecutionConfig::default()));

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_automatic().await })
    };

    entered.notified().await;
    engine.pause();
    release.notify_one();

    let outcome = run.await.unwrap().unwrap();
    assert!(outcome.stopped);
    assert!(!outcome.success);
    // The in-flight step finished before the pause took effect.
    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Completed
    );
    assert_eq!(
        engine.step(step::CREATE_VECTOR_STORE).await.unwrap().status,
        StepStatus::Pending
    );

    // A fresh pass picks up from the first pending step.
    let outcome = engine.start_automatic().await.unwrap();
    assert!(outcome.success, "incomplete: {:?}", outcome.incomplete);
}

#[tokio::test]
async fn errored_step_reruns_without_an_explicit_retry() {
    let mut registry = full_registry();
    registry.register(
        step::SCRAPE_SITE,
        Arc::new(FlakyOnce {
            hits: Arc::new(AtomicUsize::new(0)),
        }),
    );
    let engine = engine(registry, ExecutionConfig::default());

    let outcome = engine.run_step(step::SCRAPE_SITE).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Error
    );

    // error -> in_progress is a legal transition; no retry_step needed.
    let outcome = engine.run_step(step::SCRAPE_SITE).await.unwrap();
    assert!(outcome.success);
    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Completed
    );
}

#[tokio::test]
async fn intervention_retry_reruns_the_step_in_place() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut registry = full_registry();
    registry.register(
        step::SELECT_TEMPLATE,
        Arc::new(Counting {
            hits: hits.clone(),
            payload: payload(),
        }),
    );
    let (tx, mut rx) = mpsc::channel(64);
    let engine = Arc::new(
        engine(
            registry,
            ExecutionConfig::default().with_intervention(true),
        )
        .with_event_channel(tx),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_automatic().await })
    };

    let mut retried = false;
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::CheckpointOpened {
                step,
                kind: CheckpointKind::Intervention,
            } => {
                let signal = if step == step::SELECT_TEMPLATE && !retried {
                    retried = true;
                    InterventionSignal::Retry
                } else {
                    InterventionSignal::Continue
                };
                assert!(engine.continue_intervention(signal));
            }
            EngineEvent::RunCompleted { .. } => break,
            _ => {}
        }
    }

    let outcome = run.await.unwrap().unwrap();
    assert!(outcome.success);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn intervention_stop_ends_the_run() {
    let (tx, mut rx) = mpsc::channel(64);
    let engine = Arc::new(
        engine(
            full_registry(),
            ExecutionConfig::default().with_intervention(true),
        )
        .with_event_channel(tx),
    );

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_automatic().await })
    };

    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::CheckpointOpened {
                kind: CheckpointKind::Intervention,
                ..
            } => {
                engine.continue_intervention(InterventionSignal::Stop);
            }
            EngineEvent::RunCompleted { .. } => break,
            _ => {}
        }
    }

    let outcome = run.await.unwrap().unwrap();
    assert!(outcome.stopped);
    assert!(!outcome.success);
    // The first step finished before the stop; nothing after it ran.
    assert_eq!(
        engine
            .step(step::CREATE_GITHUB_REPO)
            .await
            .unwrap()
            .status,
        StepStatus::Completed
    );
    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Pending
    );
}

#[tokio::test]
async fn undeclared_extra_outputs_are_dropped() {
    struct Rogue;

    #[async_trait]
    impl StepExecutor for Rogue {
        async fn run(&self, _ctx: StepContext) -> Result<StepOutput, ExecutorError> {
            Ok(StepOutput::new(json!({"pages": []})).with_extra("rogueKey", json!(1)))
        }
    }

    let mut registry = full_registry();
    registry.register(step::CREATE_GITHUB_REPO, Arc::new(Rogue));
    let engine = engine(registry, ExecutionConfig::default());

    engine.run_step(step::CREATE_GITHUB_REPO).await.unwrap();
    assert!(engine.data("githubRepoResult").await.is_some());
    assert!(engine.data("rogueKey").await.is_none());
}

#[tokio::test]
async fn demo_target_switches_provisioning_steps() {
    let engine = engine(full_registry(), ExecutionConfig::default());
    engine.set_deployment_target(DeploymentTarget::Demo).await;

    assert_eq!(
        engine
            .step(step::CREATE_GITHUB_REPO)
            .await
            .unwrap()
            .status,
        StepStatus::Skipped
    );
    assert_eq!(
        engine.step(step::CREATE_DEMO_REPO).await.unwrap().status,
        StepStatus::Pending
    );

    let outcome = engine.start_automatic().await.unwrap();
    assert!(outcome.success, "incomplete: {:?}", outcome.incomplete);
    assert_eq!(
        engine
            .step(step::PROVISION_CLOUDFLARE_PAGES)
            .await
            .unwrap()
            .status,
        StepStatus::Completed
    );
    assert_eq!(
        engine.step(step::PREVENT_HOTLINKING).await.unwrap().status,
        StepStatus::Skipped
    );
}

/// Scrape behavior keyed by the configured domain, for batch scenarios.
struct DomainScrape;

#[async_trait]
impl StepExecutor for DomainScrape {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        match ctx.config.domain.as_str() {
            "empty.com" => Err(ExecutorError::EmptyResult(
                "No pages found in scrape results".to_string(),
            )),
            "bad.com" => Err(ExecutorError::Failed("backend exploded".to_string())),
            _ => Ok(StepOutput::new(payload())),
        }
    }
}

#[tokio::test]
async fn batch_separates_empty_results_from_hard_failures() {
    let mut registry = full_registry();
    registry.register(step::SCRAPE_SITE, Arc::new(DomainScrape));
    let engine = engine(registry, ExecutionConfig::default());

    let sites: Vec<BatchSiteEntry> = ["good.com", "empty.com", "bad.com"]
        .iter()
        .map(|domain| BatchSiteEntry {
            domain: domain.to_string(),
            template: "stinson".to_string(),
            site_type: "dental".to_string(),
            scrape_domain: None,
        })
        .collect();

    let outcome = engine.run_batch(&sites).await.unwrap();
    assert_eq!(outcome.total_processed, 3);
    assert_eq!(outcome.succeeded, vec!["good.com".to_string()]);

    // Empty scrapes land in both lists: skipped for classification, failed
    // so the retry queue stays complete.
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].domain, "empty.com");
    assert!(outcome.skipped[0].reason.starts_with("EMPTY_SCRAPE:"));
    let failed: Vec<&str> = outcome.failed.iter().map(|f| f.domain.as_str()).collect();
    assert_eq!(failed, vec!["empty.com", "bad.com"]);
    assert_eq!(outcome.hard_failures(), 1);

    let empty_failure = &outcome.failed[0];
    assert!(empty_failure.error.starts_with("EMPTY_SCRAPE:"));
}

#[tokio::test]
async fn batch_resets_state_between_sites() {
    let mut registry = full_registry();
    registry.register(step::SCRAPE_SITE, Arc::new(DomainScrape));
    let engine = engine(registry, ExecutionConfig::default());

    let sites = vec![
        BatchSiteEntry {
            domain: "bad.com".to_string(),
            template: "stinson".to_string(),
            site_type: "dental".to_string(),
            scrape_domain: None,
        },
        BatchSiteEntry {
            domain: "good.com".to_string(),
            template: "napa".to_string(),
            site_type: "dental".to_string(),
            scrape_domain: None,
        },
    ];

    let outcome = engine.run_batch(&sites).await.unwrap();
    assert_eq!(outcome.succeeded, vec!["good.com".to_string()]);

    // The engine ends on the last site's configuration with a clean pass.
    assert_eq!(engine.site_config().await.domain, "good.com");
    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Completed
    );
}

#[tokio::test]
async fn reset_clears_steps_and_data_but_keeps_config() {
    let engine = engine(full_registry(), ExecutionConfig::default());
    engine.run_step(step::SCRAPE_SITE).await.unwrap();
    assert!(engine.data("scrapeResult").await.is_some());

    engine.reset().await;

    assert_eq!(
        engine.step(step::SCRAPE_SITE).await.unwrap().status,
        StepStatus::Pending
    );
    assert!(engine.data("scrapeResult").await.is_none());
    assert_eq!(engine.site_config().await.domain, "example.com");
}
