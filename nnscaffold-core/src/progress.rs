//! Training progress bar.

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{prefix} | {percent:>3}% [{wide_bar:.cyan/blue}] {pos:>6}/{len:6} | {msg} | ETA {eta}";

/// Progress over every batch of every epoch, with the epoch counter as message.
pub struct TrainingProgress {
    bar: ProgressBar,
    nb_epoch: usize,
    batches_per_epoch: usize,
    current_epoch: usize,
}

impl TrainingProgress {
    /// Create the bar. A hidden bar still tracks progress but draws nothing.
    pub fn new(task_name: &str, nb_epoch: usize, batches_per_epoch: usize, visible: bool) -> Self {
        let total = (nb_epoch * batches_per_epoch) as u64;
        let bar = if visible {
            ProgressBar::new(total)
        } else {
            ProgressBar::hidden()
        };
        bar.set_length(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#*-"),
        );
        bar.set_prefix(task_name.to_string());
        bar.set_message(format!("epoch 0/{nb_epoch}"));

        Self {
            bar,
            nb_epoch,
            batches_per_epoch,
            current_epoch: 0,
        }
    }

    pub fn start_epoch(&mut self) {
        self.current_epoch += 1;
        self.bar
            .set_message(format!("epoch {}/{}", self.current_epoch, self.nb_epoch));
    }

    pub fn incr_batch(&self) {
        self.bar.inc(1);
    }

    pub fn current_epoch(&self) -> usize {
        self.current_epoch
    }

    /// Completed fraction of the whole task, in `[0, 1]`.
    pub fn task_progress(&self) -> f64 {
        let total = self.nb_epoch * self.batches_per_epoch;
        if total == 0 {
            return 1.0;
        }
        (self.bar.position() as f64 / total as f64).min(1.0)
    }

    /// Completed fraction of the current epoch, in `[0, 1]`.
    pub fn epoch_progress(&self) -> f64 {
        if self.batches_per_epoch == 0 || self.current_epoch == 0 {
            return 0.0;
        }
        let done_before = (self.current_epoch - 1) * self.batches_per_epoch;
        let in_epoch = (self.bar.position() as usize).saturating_sub(done_before);
        (in_epoch as f64 / self.batches_per_epoch as f64).min(1.0)
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    /// Remove the bar from the terminal, used when training stops early.
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}
