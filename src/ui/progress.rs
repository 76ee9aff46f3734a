use crate::step::{Step, StepStatus};
use crate::ui::icons::{CHECK, CLOCK, CROSS, PAUSE, RUNNING, SKIP, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for workflow runs, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Run bar — tracks how many steps of the execution order have settled
/// - Step bar — spinner with the currently running step and live status
///
/// All methods coordinate output via `indicatif`'s `MultiProgress` internally.
pub struct WorkflowUI {
    multi: MultiProgress,
    run_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
}

impl WorkflowUI {
    /// Create the UI and add both progress bars to the multiplex renderer.
    /// Call once before the run starts.
    pub fn new(total_steps: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let run_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let run_bar = multi.add(ProgressBar::new(total_steps));
        run_bar.set_style(run_style);
        run_bar.set_prefix("Steps");

        let step_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(step_style);
        step_bar.set_prefix(" Step");

        Self {
            multi,
            run_bar,
            step_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the
    /// rich UI fails, so checkpoint and failure messages are never lost.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Start the step spinner for the step about to execute.
    pub fn start_step(&self, step: &Step) {
        self.step_bar.set_message(format!(
            "{} {} {}",
            RUNNING,
            style(&step.name).cyan(),
            style(format!("(~{}s)", step.estimated_duration_secs)).dim()
        ));
        self.step_bar.enable_steady_tick(Duration::from_millis(100));
    }

    /// Advance the run bar after a step settles.
    pub fn step_completed(&self, step: &Step, duration_ms: u64) {
        self.run_bar.inc(1);
        self.step_bar.set_message(String::new());
        self.print_line(format!(
            "{} {} {}",
            CHECK,
            style(&step.name).green(),
            style(format!("({}ms)", duration_ms)).dim()
        ));
    }

    pub fn step_failed(&self, step: &Step, error: &str) {
        self.step_bar.set_message(String::new());
        self.print_line(format!(
            "{} {}: {}",
            CROSS,
            style(&step.name).red().bold(),
            error
        ));
    }

    pub fn step_skipped(&self, step: &Step, reason: &str) {
        self.run_bar.inc(1);
        self.print_line(format!(
            "{} {} {}",
            SKIP,
            style(&step.name).dim(),
            style(format!("({})", reason)).dim()
        ));
    }

    /// Announce a checkpoint pause; the prompt itself runs outside the bars.
    pub fn checkpoint(&self, message: &str) {
        self.step_bar.set_message(format!(
            "{} {}",
            PAUSE,
            style(message).yellow()
        ));
        if self.verbose {
            self.print_line(format!("  {} {}", PAUSE, style(message).yellow()));
        }
    }

    /// Finish both bars at the end of a run.
    pub fn run_complete(&self, success: bool, incomplete: &[String]) {
        self.step_bar.finish_and_clear();
        if success {
            self.run_bar.finish_with_message("done");
            self.print_line(format!(
                "\n{} Workflow {}!\n",
                SPARKLE,
                style("complete").green().bold()
            ));
        } else {
            self.run_bar.abandon_with_message("stopped");
            self.print_line(format!(
                "\n{} Workflow stopped, {} step(s) unfinished: {}\n",
                CROSS,
                style(incomplete.len()).red().bold(),
                incomplete.join(", ")
            ));
        }
    }

    /// Print the status table shown by `list` and `status`.
    ///
    /// Printed with plain `println!` rather than through the bars: this is
    /// static output, and `MultiProgress::println` silently discards text
    /// when the draw target is hidden (non-TTY).
    pub fn print_step_table(&self, steps: &[Step]) {
        for step in steps {
            let marker = match step.status {
                StepStatus::Completed => format!("{}", style("●").green()),
                StepStatus::InProgress => format!("{}", style("●").cyan()),
                StepStatus::Error => format!("{}", style("●").red()),
                StepStatus::Skipped => format!("{}", style("○").dim()),
                StepStatus::Pending => format!("{}", style("○").yellow()),
            };
            let duration = step
                .actual_duration_secs()
                .map(|secs| format!(" {} {}s", CLOCK, secs))
                .unwrap_or_default();
            let mut line = format!(
                "  {} {:<28} {:?}{}",
                marker,
                step.id,
                step.status,
                duration
            );
            if let Some(error) = &step.error {
                line.push_str(&format!("  {}", style(error).red()));
            }
            println!("{line}");
        }
    }
}
