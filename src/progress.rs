//! Cooperative cancellation and status reporting.
//!
//! A [`CancelToken`] is created per job and handed by reference to every
//! long-running stage together with a [`StatusSink`]. Stages poll the token
//! at outer-loop granularity through [`Progress::tick`]; once it trips, no
//! further progress is emitted and the stage returns `Ok(None)`.
use log::{debug, info};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared interrupt flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Receiver of human-readable status lines and percentage updates.
///
/// `None` progress means "busy, no estimate".
pub trait StatusSink {
    fn report_status(&self, message: &str);
    fn report_progress(&self, percent: Option<f32>);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStatus;

impl StatusSink for NullStatus {
    fn report_status(&self, _message: &str) {}
    fn report_progress(&self, _percent: Option<f32>) {}
}

/// Forwards status lines to `info!` and progress to `debug!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn report_status(&self, message: &str) {
        info!("{message}");
    }

    fn report_progress(&self, percent: Option<f32>) {
        match percent {
            Some(p) => debug!("progress {p:.0}%"),
            None => debug!("progress: busy"),
        }
    }
}

static NULL_STATUS: NullStatus = NullStatus;

/// Per-job view over the cancel token and status sink.
///
/// Progress is throttled to integer-percent changes so loops over hundreds of
/// thousands of centroids do not flood the sink.
pub struct Progress<'a> {
    cancel: &'a CancelToken,
    sink: &'a dyn StatusSink,
    last_percent: Cell<Option<u8>>,
}

impl<'a> Progress<'a> {
    pub fn new(cancel: &'a CancelToken, sink: &'a dyn StatusSink) -> Self {
        Self {
            cancel,
            sink,
            last_percent: Cell::new(None),
        }
    }

    /// Progress without a sink; only the token is honoured.
    pub fn silent(cancel: &'a CancelToken) -> Self {
        Self::new(cancel, &NULL_STATUS)
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Announce a new stage and reset the percentage throttle.
    pub fn begin(&self, stage: &str) {
        self.last_percent.set(None);
        if !self.is_interrupted() {
            self.sink.report_status(stage);
        }
    }

    pub fn status(&self, message: &str) {
        if !self.is_interrupted() {
            self.sink.report_status(message);
        }
    }

    /// Report `done` of `total` and poll the interrupt flag.
    ///
    /// Returns `false` once the job has been cancelled; nothing is emitted in
    /// that case.
    pub fn tick(&self, done: usize, total: usize) -> bool {
        if self.is_interrupted() {
            return false;
        }
        let percent = if total == 0 {
            100
        } else {
            ((done.min(total) * 100) / total) as u8
        };
        if self.last_percent.get() != Some(percent) {
            self.last_percent.set(Some(percent));
            self.sink.report_progress(Some(percent as f32));
        }
        true
    }

    /// Signal work without a measurable percentage.
    pub fn busy(&self) -> bool {
        if self.is_interrupted() {
            return false;
        }
        self.sink.report_progress(None);
        true
    }
}
