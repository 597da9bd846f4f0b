//! Terminal progress bar.

use fileup_upload::{ProgressSnapshot, ProgressSurface};
use indicatif::{ProgressBar, ProgressStyle};

/// Bar resolution: tenths of a percent.
const BAR_LEN: u64 = 1000;

/// Draws session progress on stderr. Hidden when stderr is not a terminal.
pub struct TerminalSurface {
    bar: ProgressBar,
}

impl TerminalSurface {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.green} {prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        let bar = ProgressBar::new(BAR_LEN);
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSurface for TerminalSurface {
    fn begin(&mut self, title: &str) {
        self.bar.reset();
        self.bar.set_prefix(title.to_string());
    }

    fn update(&mut self, snapshot: &ProgressSnapshot) {
        let position = (snapshot.percentage * BAR_LEN as f64 / 100.0).round() as u64;
        self.bar.set_position(position.min(BAR_LEN));
        self.bar
            .set_message(format!("{}: {}", snapshot.label, snapshot.status));
    }

    fn end(&mut self) {
        self.bar.finish();
    }

    fn fail(&mut self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}
