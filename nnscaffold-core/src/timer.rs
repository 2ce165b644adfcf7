//! Section timers.
//!
//! A [`SectionTimer`] logs when a section starts and how long it took when it
//! ends, and records the elapsed time in a [`Timers`] registry that is saved
//! with the run artifacts.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::Level;

/// Aggregated durations of one named section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimerStats {
    pub count: usize,
    pub total_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

impl TimerStats {
    fn add(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if self.count == 0 {
            self.min_secs = secs;
            self.max_secs = secs;
        } else {
            self.min_secs = self.min_secs.min(secs);
            self.max_secs = self.max_secs.max(secs);
        }
        self.count += 1;
        self.total_secs += secs;
    }

    pub fn mean_secs(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_secs / self.count as f64
        }
    }
}

/// Registry of recorded section durations for one run.
///
/// Runs are sequential, so the registry lives on one thread and uses a
/// `RefCell` to let nested timers record through a shared reference.
#[derive(Debug, Default)]
pub struct Timers {
    records: RefCell<BTreeMap<String, TimerStats>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a section, logged at `level`.
    pub fn section(&self, name: &str, level: Level) -> SectionTimer<'_> {
        SectionTimer::start(self, name, level)
    }

    pub fn record(&self, name: &str, elapsed: Duration) {
        self.records
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .add(elapsed);
    }

    pub fn get(&self, name: &str) -> Option<TimerStats> {
        self.records.borrow().get(name).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, TimerStats> {
        self.records.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

/// Guard timing a section until it is stopped or dropped.
pub struct SectionTimer<'a> {
    timers: &'a Timers,
    name: String,
    level: Level,
    started: Instant,
    stopped: bool,
}

impl<'a> SectionTimer<'a> {
    fn start(timers: &'a Timers, name: &str, level: Level) -> Self {
        log_at(level, &format!("Start {name}..."));
        Self {
            timers,
            name: name.to_string(),
            level,
            started: Instant::now(),
            stopped: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop the timer and return the elapsed time.
    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        self.stopped = true;
        log_at(
            self.level,
            &format!("Completed {} in {}", self.name, duration_to_str(elapsed, 2)),
        );
        self.timers.record(&self.name, elapsed);
        elapsed
    }
}

impl Drop for SectionTimer<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.finish();
        }
    }
}

fn log_at(level: Level, message: &str) {
    if level == Level::ERROR {
        tracing::error!("{message}");
    } else if level == Level::WARN {
        tracing::warn!("{message}");
    } else if level == Level::INFO {
        tracing::info!("{message}");
    } else if level == Level::DEBUG {
        tracing::debug!("{message}");
    } else {
        tracing::trace!("{message}");
    }
}

const PERIODS: [(&str, u128); 5] = [
    ("d", 1_000 * 60 * 60 * 24),
    ("h", 1_000 * 60 * 60),
    ("m", 1_000 * 60),
    ("s", 1_000),
    ("ms", 1),
];

/// Render a duration for humans, keeping the `precision` largest units
/// (`0` keeps every unit).
pub fn duration_to_str(duration: Duration, precision: usize) -> String {
    if duration.is_zero() {
        return "0ms".to_string();
    }

    let mut millis = duration.as_millis();
    if millis == 0 {
        return "<1ms".to_string();
    }

    let mut parts = Vec::new();
    for (unit, unit_millis) in PERIODS {
        if millis >= unit_millis {
            parts.push(format!("{}{unit}", millis / unit_millis));
            millis %= unit_millis;
        }
    }

    if precision > 0 {
        parts.truncate(precision);
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_str_zero_and_sub_millisecond() {
        assert_eq!(duration_to_str(Duration::ZERO, 2), "0ms");
        assert_eq!(duration_to_str(Duration::from_micros(400), 2), "<1ms");
    }

    #[test]
    fn test_duration_to_str_precision() {
        let d = Duration::from_millis(61_500);
        assert_eq!(duration_to_str(d, 2), "1m 1s");
        assert_eq!(duration_to_str(d, 1), "1m");
        assert_eq!(duration_to_str(d, 0), "1m 1s 500ms");
    }

    #[test]
    fn test_duration_to_str_skips_empty_units() {
        let d = Duration::from_secs(60 * 60 * 24 + 5);
        assert_eq!(duration_to_str(d, 0), "1d 5s");
        assert_eq!(duration_to_str(Duration::from_millis(7), 2), "7ms");
    }

    #[test]
    fn test_section_timer_records_on_drop() {
        let timers = Timers::new();
        {
            let _timer = timers.section("datasets loading", Level::DEBUG);
        }
        let stats = timers.get("datasets loading").unwrap();
        assert_eq!(stats.count, 1);
        assert!(stats.total_secs >= 0.0);
    }

    #[test]
    fn test_nested_sections_and_stop() {
        let timers = Timers::new();
        let outer = timers.section("run", Level::INFO);
        for _ in 0..3 {
            let inner = timers.section("epoch", Level::DEBUG);
            inner.stop();
        }
        let elapsed = outer.stop();

        assert_eq!(timers.get("epoch").unwrap().count, 3);
        let run = timers.get("run").unwrap();
        assert_eq!(run.count, 1);
        assert!((run.total_secs - elapsed.as_secs_f64()).abs() < 1e-9);
    }

    #[test]
    fn test_timer_stats_min_max_mean() {
        let timers = Timers::new();
        timers.record("batch", Duration::from_millis(100));
        timers.record("batch", Duration::from_millis(300));
        let stats = timers.get("batch").unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.min_secs - 0.1).abs() < 1e-9);
        assert!((stats.max_secs - 0.3).abs() < 1e-9);
        assert!((stats.mean_secs() - 0.2).abs() < 1e-9);

        timers.clear();
        assert!(timers.is_empty());
    }
}
