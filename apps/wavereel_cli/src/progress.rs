use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use wavereel_render::execute::{ProgressSink, RenderProgress};

/// Terminal progress: a percentage bar when the duration is known, a
/// spinner otherwise.
#[derive(Default)]
pub struct BarSink {
    current: Mutex<Option<(ProgressBar, String)>>,
}

impl BarSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> MutexGuard<'_, Option<(ProgressBar, String)>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg:<24} [{bar:40.cyan/blue}] {pos:>3}% ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl ProgressSink for BarSink {
    fn start(&self, description: &str, determinate: bool) {
        let bar = if determinate {
            ProgressBar::new(100).with_style(bar_style())
        } else {
            ProgressBar::new_spinner().with_style(spinner_style())
        };
        bar.set_message(description.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        if let Some((old, _)) = self.current().replace((bar, description.to_string())) {
            old.finish_and_clear();
        }
    }

    fn update(&self, progress: &RenderProgress) {
        if let Some((bar, _)) = self.current().as_ref() {
            bar.set_position(progress.percent.clamp(0.0, 100.0).round() as u64);
        }
    }

    fn finish(&self, success: bool) {
        let Some((bar, description)) = self.current().take() else {
            return;
        };
        if success {
            bar.finish_and_clear();
            println!("  ✓ {description}");
        } else {
            bar.abandon_with_message(format!("✗ {description}"));
        }
    }
}
