use archiver_core::monitor::{ProgressSink, ProgressStatus};
use indicatif::{ProgressBar, ProgressStyle};

/// Redraws the monitor's status line in place.
pub struct IndicatifSink {
    bar: ProgressBar,
    width: usize,
}

impl IndicatifSink {
    pub fn new(width: usize) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{msg}") {
            bar.set_style(style);
        }
        bar.set_message("Waiting for the first sample...");
        Self { bar, width }
    }
}

impl ProgressSink for IndicatifSink {
    fn render(&mut self, status: &ProgressStatus) {
        self.bar.set_message(status.render_line(self.width));
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
