//! Command handlers behind the CLI.
//!
//! Manual commands restore the session snapshot, perform one operation, and
//! save the snapshot back. The automatic and batch commands additionally
//! drive the engine's checkpoints from interactive prompts.

use crate::Cli;
use anyhow::{Context, Result, bail};
use serde_json::Value;
use sitewright::config::{DeploymentTarget, EngineConfig, ExecutionConfig, SiteConfig};
use sitewright::engine::{Engine, PreStepSignal};
use sitewright::events::{CheckpointKind, EngineEvent};
use sitewright::executors::{ApiClient, default_registry};
use sitewright::session::FileSessionStore;
use sitewright::sites;
use sitewright::ui::{WorkflowUI, prompts};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task;

fn session_store(cli: &Cli) -> FileSessionStore {
    match &cli.session_dir {
        Some(dir) => FileSessionStore::new(dir.clone()),
        None => FileSessionStore::default_location(),
    }
}

fn build_engine(cli: &Cli, execution: ExecutionConfig) -> Result<Engine> {
    let registry = default_registry(ApiClient::new(cli.api_url.clone()));
    let config = EngineConfig {
        site: SiteConfig::default(),
        execution,
    };
    Engine::new(config, registry).context("Failed to initialize the workflow engine")
}

async fn restore(engine: &Engine, store: &FileSessionStore) {
    engine.restore_session(store).await;
}

/// Configure the site the engine works on.
pub async fn cmd_configure(
    cli: &Cli,
    domain: &str,
    template: &str,
    site_type: &str,
    scrape_domain: Option<String>,
    target: DeploymentTarget,
) -> Result<()> {
    let store = session_store(cli);
    let engine = build_engine(cli, ExecutionConfig::default())?;
    restore(&engine, &store).await;

    let site = SiteConfig::new(domain, template, site_type)
        .with_scrape_domain(scrape_domain)
        .with_deployment_target(target);
    engine.set_site_config(site).await;
    engine.save_session(&store).await;

    println!("Configured {domain} ({template}, {target:?})");
    Ok(())
}

/// Run one step manually, honoring its dependencies.
pub async fn cmd_run_step(cli: &Cli, step_id: &str) -> Result<()> {
    let store = session_store(cli);
    let engine = build_engine(cli, ExecutionConfig::default())?;
    restore(&engine, &store).await;

    let outcome = engine.run_step(step_id).await?;
    engine.save_session(&store).await;

    if outcome.success {
        println!("{step_id} completed in {}ms", outcome.duration_ms);
    } else {
        bail!(
            "{step_id} failed: {}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

pub async fn cmd_skip(cli: &Cli, step_id: &str) -> Result<()> {
    let store = session_store(cli);
    let engine = build_engine(cli, ExecutionConfig::default())?;
    restore(&engine, &store).await;
    engine.skip_step(step_id).await?;
    engine.save_session(&store).await;
    println!("Skipped {step_id}");
    Ok(())
}

pub async fn cmd_enable(cli: &Cli, step_id: &str) -> Result<()> {
    let store = session_store(cli);
    let engine = build_engine(cli, ExecutionConfig::default())?;
    restore(&engine, &store).await;
    engine.enable_step(step_id).await?;
    engine.save_session(&store).await;
    println!("Enabled {step_id}");
    Ok(())
}

pub async fn cmd_retry(cli: &Cli, step_id: &str) -> Result<()> {
    let store = session_store(cli);
    let engine = build_engine(cli, ExecutionConfig::default())?;
    restore(&engine, &store).await;
    engine.retry_step(step_id).await?;
    engine.save_session(&store).await;
    println!("{step_id} reset to pending; run it again when ready");
    Ok(())
}

pub async fn cmd_reset(cli: &Cli) -> Result<()> {
    let store = session_store(cli);
    let engine = build_engine(cli, ExecutionConfig::default())?;
    restore(&engine, &store).await;
    engine.reset().await;
    engine.save_session(&store).await;
    println!("Workflow reset (site configuration kept)");
    Ok(())
}

/// Print the step table with statuses and durations.
pub async fn cmd_status(cli: &Cli) -> Result<()> {
    let store = session_store(cli);
    let engine = build_engine(cli, ExecutionConfig::default())?;
    restore(&engine, &store).await;

    let site = engine.site_config().await;
    let progress = engine.progress().await;
    println!(
        "Site: {} ({}, {:?})",
        if site.domain.is_empty() { "<unconfigured>" } else { site.domain.as_str() },
        site.template,
        site.deployment_target
    );
    println!(
        "Progress: {:.0}% ({} completed, {} skipped, {} failed of {})\n",
        progress.percent, progress.completed, progress.skipped, progress.failed, progress.total
    );

    let steps = engine.steps().await;
    let ui = WorkflowUI::new(steps.len() as u64, cli.verbose);
    ui.print_step_table(&steps);
    println!(
        "\nEstimated total: ~{}s",
        sitewright::step::total_estimated_duration_secs(&steps)
    );
    Ok(())
}

/// Print a stored data key, or list the available keys.
pub async fn cmd_data(cli: &Cli, key: Option<&str>) -> Result<()> {
    let store = session_store(cli);
    let engine = build_engine(cli, ExecutionConfig::default())?;
    restore(&engine, &store).await;

    match key {
        Some(key) => match engine.data(key).await {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => bail!("No data stored under '{key}'"),
        },
        None => {
            for key in engine.data_keys().await {
                println!("{key}");
            }
        }
    }
    Ok(())
}

/// Automatic run: walk the execution order end to end, driving checkpoints
/// from interactive prompts.
pub async fn cmd_yolo(
    cli: &Cli,
    intervention: bool,
    edit_inputs: bool,
    no_stop_on_error: bool,
    target: Option<DeploymentTarget>,
) -> Result<()> {
    let store = session_store(cli);
    let execution = ExecutionConfig::default()
        .with_intervention(intervention)
        .with_pre_step_edit(edit_inputs)
        .with_stop_on_error(!no_stop_on_error);

    let (tx, mut rx) = mpsc::channel::<EngineEvent>(64);
    let engine = Arc::new(build_engine(cli, execution)?.with_event_channel(tx));
    restore(&engine, &store).await;
    if let Some(target) = target {
        engine.set_deployment_target(target).await;
    }

    let total = engine.steps().await.len() as u64;
    let ui = WorkflowUI::new(total, cli.verbose);

    // Ctrl-C requests a cooperative stop; the in-flight step finishes first.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                engine.stop();
            }
        });
    }

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_automatic().await })
    };

    // The engine keeps its sender for later runs, so the channel never
    // closes on its own; the run-completed event ends the loop.
    while let Some(event) = rx.recv().await {
        let finished = matches!(event, EngineEvent::RunCompleted { .. });
        handle_run_event(&engine, &ui, event).await?;
        if finished {
            break;
        }
    }

    let outcome = run.await.context("automatic run task panicked")??;
    engine.save_session(&store).await;
    ui.run_complete(outcome.success, &outcome.incomplete);

    for failure in &outcome.failures {
        eprintln!("  {}: {}", failure.step_id, failure.message);
    }
    if !outcome.success {
        bail!("automatic run did not finish");
    }
    Ok(())
}

/// React to one engine event during an automatic run: update the bars and
/// answer checkpoints.
async fn handle_run_event(engine: &Arc<Engine>, ui: &WorkflowUI, event: EngineEvent) -> Result<()> {
    match event {
        EngineEvent::StepStarted { step } => {
            if let Some(step) = engine.step(&step).await {
                ui.start_step(&step);
            }
        }
        EngineEvent::StepCompleted { step, duration_ms } => {
            if let Some(step) = engine.step(&step).await {
                ui.step_completed(&step, duration_ms);
            }
        }
        EngineEvent::StepFailed { step, error } => {
            if let Some(step) = engine.step(&step).await {
                ui.step_failed(&step, &error);
            }
        }
        EngineEvent::StepSkipped { step, reason } => {
            if let Some(step) = engine.step(&step).await {
                ui.step_skipped(&step, &reason);
            }
        }
        EngineEvent::CheckpointOpened { step, kind } => {
            let name = engine
                .step(&step)
                .await
                .map(|s| s.name)
                .unwrap_or_else(|| step.clone());
            match kind {
                CheckpointKind::Intervention => {
                    ui.checkpoint(&format!("Review: {name}"));
                    let signal = task::spawn_blocking(move || prompts::intervention_prompt(&name))
                        .await
                        .context("prompt task panicked")??;
                    engine.continue_intervention(signal);
                }
                CheckpointKind::PreStepEdit => {
                    ui.checkpoint(&format!("Edit input: {name}"));
                    answer_pre_step_edit(engine, &step, &name).await?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Prompt for a pre-step edit and feed the answer back. An invalid payload
/// keeps the checkpoint open and re-prompts.
async fn answer_pre_step_edit(engine: &Arc<Engine>, step_id: &str, name: &str) -> Result<()> {
    let current = current_input(engine, step_id).await;

    loop {
        let prompt_name = name.to_string();
        let prompt_input = current.clone();
        let signal = task::spawn_blocking(move || {
            prompts::pre_step_edit_prompt(&prompt_name, prompt_input.as_ref())
        })
        .await
        .context("prompt task panicked")??;

        match signal {
            PreStepSignal::Continue => {
                engine.continue_pre_step_edit(false, None).await?;
                return Ok(());
            }
            PreStepSignal::Cancel => {
                engine.cancel_pre_step_edit();
                return Ok(());
            }
            PreStepSignal::UseEdited(value) => {
                match engine.continue_pre_step_edit(true, Some(value)).await {
                    Ok(_) => return Ok(()),
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    }
}

/// The step's declared input as it stands in the store right now.
async fn current_input(engine: &Arc<Engine>, step_id: &str) -> Option<Value> {
    let contract = engine.contracts().get(step_id)?;
    let raw = engine.data(contract.input_key?).await;
    engine.contracts().extract_input(step_id, raw)
}

/// Batch mode: one full automatic pass per roster site.
pub async fn cmd_batch(cli: &Cli, roster_path: &Path, target: Option<DeploymentTarget>) -> Result<()> {
    let file = std::fs::File::open(roster_path)
        .with_context(|| format!("Failed to open roster {}", roster_path.display()))?;
    let roster = sites::parse_roster(file)?;

    for issue in &roster.warnings {
        eprintln!("warning: line {}: {}", issue.line, issue.message);
    }
    for issue in &roster.errors {
        eprintln!("error: line {}: {}", issue.line, issue.message);
    }
    if roster.is_empty() {
        bail!("Roster contains no usable sites");
    }

    let store = session_store(cli);
    let engine = Arc::new(build_engine(cli, ExecutionConfig::default())?);
    restore(&engine, &store).await;
    if let Some(target) = target {
        engine.set_deployment_target(target).await;
    }

    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                engine.stop();
            }
        });
    }

    println!("Processing {} site(s)...", roster.sites.len());
    let outcome = engine.run_batch(&roster.sites).await?;
    engine.save_session(&store).await;

    println!(
        "\nBatch complete: {} succeeded, {} failed, {} skipped (empty scrape)",
        outcome.succeeded.len(),
        outcome.hard_failures(),
        outcome.skipped.len()
    );
    for site in &outcome.failed {
        println!("  {}: {}", site.domain, site.error);
    }
    if !outcome.failed.is_empty() {
        bail!("{} site(s) need attention", outcome.failed.len());
    }
    Ok(())
}
