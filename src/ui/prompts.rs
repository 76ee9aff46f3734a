//! Interactive checkpoint prompts. These block on stdin and must run on a
//! blocking thread, never inside the runner's async loop.

use crate::engine::{InterventionSignal, PreStepSignal};
use anyhow::{Context, Result};
use dialoguer::{Editor, Select, theme::ColorfulTheme};
use serde_json::Value;

/// Post-step intervention prompt: review the result, then decide.
pub fn intervention_prompt(step_name: &str) -> Result<InterventionSignal> {
    let options = &[
        "Continue to the next step",
        "Retry this step",
        "Stop the run",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("'{step_name}' finished. Proceed?"))
        .items(options)
        .default(0)
        .interact()?;

    Ok(match selection {
        0 => InterventionSignal::Continue,
        1 => InterventionSignal::Retry,
        _ => InterventionSignal::Stop,
    })
}

/// Pre-step edit prompt: optionally replace the step's input before it runs.
/// Editing opens `$EDITOR` on the pretty-printed current input.
pub fn pre_step_edit_prompt(step_name: &str, current_input: Option<&Value>) -> Result<PreStepSignal> {
    let options = &[
        "Run with the current input",
        "Edit the input first",
        "Cancel the run",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("About to run '{step_name}'"))
        .items(options)
        .default(0)
        .interact()?;

    match selection {
        0 => Ok(PreStepSignal::Continue),
        1 => {
            let seed = match current_input {
                Some(value) => serde_json::to_string_pretty(value)?,
                None => "{}".to_string(),
            };
            match Editor::new().edit(&seed)? {
                Some(edited) => {
                    let value: Value = serde_json::from_str(&edited)
                        .context("edited input is not valid JSON")?;
                    Ok(PreStepSignal::UseEdited(value))
                }
                // Editor closed without saving: keep the stored input.
                None => Ok(PreStepSignal::Continue),
            }
        }
        _ => Ok(PreStepSignal::Cancel),
    }
}
