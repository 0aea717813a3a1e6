//! Terminal output — spinner and colored status lines.
//!
//! Uses `indicatif` for the run spinner and `console` for styling.
//! [`RunProgress`] tracks a pipeline run visually; the free functions are
//! for one-off warnings and notices from stage handlers.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::scheduler::RunSummary;
use crate::store::{Job, JobStatus, Stage};

/// Yellow one-line warning on stderr.
pub fn warn(msg: &str) {
    eprintln!("  {} {msg}", Style::new().yellow().apply_to("!"));
}

/// Dim informational line on stderr.
pub fn info(msg: &str) {
    eprintln!("  {}", Style::new().dim().apply_to(msg));
}

/// Visual progress for one pipeline run.
pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Start the spinner with the run topic.
    pub fn start(topic: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("COLLECT: {topic}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Update the spinner to the stage currently executing.
    pub fn stage(&self, stage: Stage) {
        self.pb.set_message(stage.to_string());
    }

    /// Print a retry line without disturbing the spinner.
    pub fn retry(&self, stage: Stage, attempt: u32, max: u32, reason: &str) {
        self.pb.println(format!(
            "  {} {stage} retry {attempt}/{max}: {reason}",
            self.yellow.apply_to("↻")
        ));
    }

    /// Finish the spinner and print the run summary.
    pub fn complete(&self, summary: &RunSummary) {
        self.pb.finish_and_clear();
        if summary.failed == 0 {
            println!(
                "  {} Run finished: {} jobs completed, {} retries",
                self.green.apply_to("✓"),
                summary.completed,
                summary.retried
            );
        } else {
            println!(
                "  {} Run finished with failures: {} completed, {} retried, {} failed",
                self.red.apply_to("✗"),
                summary.completed,
                summary.retried,
                summary.failed
            );
        }
    }
}

/// Print a status table for the given jobs.
pub fn print_status(jobs: &[Job]) {
    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();

    if jobs.is_empty() {
        println!("No jobs recorded.");
        return;
    }

    for job in jobs {
        let status = match job.status {
            JobStatus::Done => green.apply_to(job.status.to_string()),
            JobStatus::Failed => red.apply_to(job.status.to_string()),
            _ => yellow.apply_to(job.status.to_string()),
        };
        let error = job
            .last_error
            .as_deref()
            .map(|e| format!(" — {e}"))
            .unwrap_or_default();
        println!(
            "{:<12} {:<8} attempts {}/{}  {}{error}",
            job.stage().to_string(),
            status,
            job.attempts,
            job.max_retries,
            &job.id[..8.min(job.id.len())],
        );
    }
}
