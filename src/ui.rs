//! Terminal rendering of engine events — progress bar and colored output.
//!
//! Uses `indicatif` for the updating progress indicator and `console` for
//! styling. [`ConsoleEvents`] is the callback adapter wired into the
//! engine; it decouples the engine's event shapes from what the user sees.

use std::path::PathBuf;
use std::sync::Arc;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::{ConversionEvents, ConversionOutcome, LogLine, OutcomeSlot};
use crate::resources::ResourceManager;
use crate::state_machine::{JobState, JobSummary};

/// Renders engine callbacks on the terminal and records the terminal
/// report for the controller.
pub struct ConsoleEvents {
    pb: ProgressBar,
    green: Style,
    red: Style,
    resources: Arc<ResourceManager>,
    outcome: Arc<OutcomeSlot>,
}

impl ConsoleEvents {
    pub fn new(resources: Arc<ResourceManager>, outcome: Arc<OutcomeSlot>) -> Self {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{bar:30.cyan} {pos:>3}% {msg}")
                .expect("invalid template"),
        );

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            resources,
            outcome,
        }
    }

    /// Print the structured job summary (shown with `--verbose`).
    pub fn print_summary(&self, summary: &JobSummary) {
        let style = match summary.terminal_state {
            JobState::FinishedOk => &self.green,
            _ => &self.red,
        };
        println!();
        println!("{}", style.apply_to("─── Job Summary ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(summary).unwrap_or_default()
        );
    }
}

impl ConversionEvents for ConsoleEvents {
    fn on_log(&self, line: LogLine) {
        // Only the primary text, rendered line by line above the bar.
        // Nothing here may panic or propagate.
        for text in line.text().lines() {
            self.pb.println(text);
        }
    }

    fn on_progress(&self, percent: u8, etr: Option<String>) {
        self.pb.set_position(u64::from(percent.min(100)));
        if let Some(etr) = etr {
            self.pb.set_message(etr);
        }
    }

    fn on_finished(&self, message: String, output_path: Option<PathBuf>) {
        // Resources go first: sleep inhibition and the temp artifact are
        // released before control returns to the controller.
        self.resources.release_all();
        self.pb.finish_and_clear();

        let outcome = ConversionOutcome {
            message,
            output_path,
        };
        if outcome.succeeded() {
            println!("{} Done!", self.green.apply_to("✓"));
            if !outcome.message.is_empty() {
                println!("{}", outcome.message);
            }
        }
        // Failure is not printed here: the controller surfaces it as the
        // single diagnostic line on the error path.
        self.outcome.record(outcome);
    }
}
