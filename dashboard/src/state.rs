use std::collections::VecDeque;

use comms::rpc::{ImageBatch, TrainingMetrics};
use parking_lot::Mutex;

pub const DEFAULT_HISTORY_LEN: usize = 100;

/// A copy of everything the dashboard currently shows.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub metrics: Vec<TrainingMetrics>,
    pub images: Option<ImageBatch>,
    pub current_step: u64,
}

#[derive(Default)]
struct Inner {
    metrics: VecDeque<TrainingMetrics>,
    images: Option<ImageBatch>,
    current_step: u64,
}

/// What the stream handlers feed: the recent metrics history and the latest batch.
pub struct DashboardState {
    inner: Mutex<Inner>,
    history_len: usize,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl DashboardState {
    pub fn new(history_len: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            history_len: history_len.max(1),
        }
    }

    pub fn on_metrics(&self, metrics: &TrainingMetrics) {
        let mut inner = self.inner.lock();

        if inner.metrics.len() == self.history_len {
            inner.metrics.pop_front();
        }
        inner.metrics.push_back(metrics.clone());
        inner.current_step = metrics.step;
    }

    pub fn on_images(&self, batch: &ImageBatch) {
        self.inner.lock().images = Some(batch.clone());
    }

    pub fn current_step(&self) -> u64 {
        self.inner.lock().current_step
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();

        Snapshot {
            metrics: inner.metrics.iter().cloned().collect(),
            images: inner.images.clone(),
            current_step: inner.current_step,
        }
    }
}
