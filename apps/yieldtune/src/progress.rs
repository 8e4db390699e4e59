use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use yieldtune_training::{ProgressEvent, ProgressSink, TracingProgressSink};

/// Shows optimizer steps as a progress bar; everything else goes to the log.
#[derive(Default)]
pub struct BarProgressSink {
    bar: Mutex<Option<ProgressBar>>,
    log: TracingProgressSink,
}

impl BarProgressSink {
    fn new_bar(total: u64) -> ProgressBar {
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(total);
        bar.set_style(style);
        bar
    }
}

impl ProgressSink for BarProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        let Ok(mut slot) = self.bar.lock() else {
            self.log.on_event(event);
            return;
        };

        match event {
            ProgressEvent::Step { step, total: Some(total), loss, .. } => {
                let bar = slot.get_or_insert_with(|| Self::new_bar(total));
                bar.set_length(total);
                bar.set_position(step);
                if let Some(loss) = loss {
                    bar.set_message(format!("loss {loss:.4}"));
                }
            }
            ProgressEvent::Finished { .. } => {
                if let Some(bar) = slot.take() {
                    bar.finish_and_clear();
                }
                self.log.on_event(event);
            }
            other => match slot.as_ref() {
                Some(bar) => bar.suspend(|| self.log.on_event(other)),
                None => self.log.on_event(other),
            },
        }
    }
}
