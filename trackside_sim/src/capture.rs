//! Frame capture and test plumbing.

use trackside_core::compose::FramePresenter;
use trackside_core::frame::Frame;

/// Presenter that keeps every composed frame for later assertions.
#[derive(Debug, Default)]
pub struct CapturePresenter {
    pub frames: Vec<Frame>,
}

impl CapturePresenter {
    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FramePresenter for CapturePresenter {
    fn present(&mut self, frame: &Frame) {
        self.frames.push(frame.clone());
    }
}

/// Install a compact test logger once; later calls are no-ops.
///
/// Respects `RUST_LOG`, defaulting to `info`.
pub fn init_test_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
