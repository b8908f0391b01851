use std::sync::Arc;

/// The scalar pair tracked for every step, tagged with the step it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub step: u64,
    pub loss: f32,
    pub accuracy: f32,
}

/// A raw image as produced by a telemetry source.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The latest batch a source worked on.
///
/// The four vectors are parallel, the `i`th entry of each describes the same sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub step: u64,
    pub images: Vec<SampleImage>,
    pub labels: Vec<String>,
    pub predictions: Vec<String>,
    pub confidences: Vec<f32>,
}

impl Batch {
    /// The amount of complete samples in the batch.
    pub fn len(&self) -> usize {
        self.images
            .len()
            .min(self.labels.len())
            .min(self.predictions.len())
            .min(self.confidences.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whatever drives training progress on the producer.
///
/// Streams only ever read from it, the control methods are the sole writers.
/// `current_step` must never decrease between two `reset` calls.
pub trait TelemetrySource: Send + Sync + 'static {
    fn current_step(&self) -> u64;

    /// The latest metrics, `step` is the step they were computed at.
    fn current_metrics(&self) -> Metrics;

    /// The latest batch, `step` is the step it was drawn at.
    fn current_batch(&self) -> Arc<Batch>;

    fn is_training(&self) -> bool;

    fn max_steps(&self) -> u64;

    /// Starts generation, or resumes it if it was paused.
    fn start(&self) -> bool;

    /// Halts generation while keeping every resource alive.
    fn pause(&self) -> bool;

    /// Tears generation down and rewinds to step zero.
    fn reset(&self) -> bool;

    /// Tears generation down for good.
    fn stop(&self) -> bool;
}
