//! Progress reporting and stock listeners

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::ports::CompressionListener;

/// Per-item progress sink.
///
/// Values are clamped to `0..=100` and only forwarded when they advance, so the
/// listener sees a non-decreasing sequence even when the encoder reorders frames.
pub struct ProgressReporter {
    index: usize,
    listener: Arc<dyn CompressionListener>,
    last: Option<f32>,
}

impl ProgressReporter {
    pub fn new(index: usize, listener: Arc<dyn CompressionListener>) -> Self {
        Self { index, listener, last: None }
    }

    /// Forward `percent` if it is higher than anything reported so far
    pub fn report(&mut self, percent: f32) {
        if percent.is_nan() {
            return;
        }
        let percent = percent.clamp(0.0, 100.0);
        if matches!(self.last, Some(last) if percent <= last) {
            return;
        }
        self.last = Some(percent);
        self.listener.on_progress(self.index, percent);
    }

    /// Highest value forwarded so far
    pub fn last(&self) -> Option<f32> {
        self.last
    }
}

/// Listener that ignores every event
pub struct NoOpListener;

impl CompressionListener for NoOpListener {}

/// Listener that turns lifecycle events into tracing events
pub struct TracingListener;

impl CompressionListener for TracingListener {
    fn on_start(&self, index: usize) {
        info!(index, "Compression started");
    }

    fn on_progress(&self, index: usize, percent: f32) {
        tracing::trace!(index, percent, "Compression progress");
    }

    fn on_success(&self, index: usize, size: u64, path: &Path) {
        info!(index, size, path = %path.display(), "Compression finished");
    }

    fn on_failure(&self, index: usize, message: &str) {
        warn!(index, message, "Compression failed");
    }

    fn on_cancelled(&self, index: usize) {
        info!(index, "Compression cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        values: Mutex<Vec<(usize, f32)>>,
    }

    impl CompressionListener for Recorder {
        fn on_progress(&self, index: usize, percent: f32) {
            self.values.lock().unwrap().push((index, percent));
        }
    }

    #[test]
    fn test_reporter_is_monotonic_and_clamped() {
        let recorder = Arc::new(Recorder::default());
        let mut reporter = ProgressReporter::new(3, recorder.clone());

        for value in [-5.0, 10.0, 8.0, 10.0, 55.5, f32::NAN, 140.0, 99.0] {
            reporter.report(value);
        }

        let values = recorder.values.lock().unwrap().clone();
        assert_eq!(values, vec![(3, 0.0), (3, 10.0), (3, 55.5), (3, 100.0)]);
        assert_eq!(reporter.last(), Some(100.0));
    }

    #[test]
    fn test_stock_listeners_accept_every_event() {
        let listeners: Vec<Arc<dyn CompressionListener>> = vec![Arc::new(NoOpListener), Arc::new(TracingListener)];
        for listener in listeners {
            listener.on_start(0);
            listener.on_progress(0, 50.0);
            listener.on_success(0, 10, Path::new("out.mp4"));
            listener.on_failure(1, "boom");
            listener.on_cancelled(2);
        }
    }
}
