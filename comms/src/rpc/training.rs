use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingControlRequest {
    pub client_id: String,
}

/// Answer to both `StartTraining` and `StopTraining`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingControlResponse {
    pub success: bool,
    pub message: String,
    pub is_training: bool,
    pub current_step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatusResponse {
    pub is_training: bool,
    pub current_step: u64,
    pub max_steps: u64,
    pub current_loss: f32,
    pub current_accuracy: f32,
}

/// Opens the metrics stream.
///
/// `start_step` is the consumer's resume cursor, nothing at or below it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsRequest {
    pub update_interval_ms: u64,
    pub start_step: u64,
}

/// Opens the image stream. The producer caps `batch_size` at 16.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBatchRequest {
    pub batch_size: u32,
    pub start_step: u64,
}

/// One scalar sample of the training curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub step: u64,
    pub loss: f32,
    pub accuracy: f32,
    pub timestamp_ms: u64,
}

/// An encoded image, `pixel_data` travels as raw bytes outside of the json metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub pixel_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImage {
    pub image: Image,
    pub ground_truth: String,
    pub prediction: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub step: u64,
    pub images: Vec<LabeledImage>,
    pub timestamp_ms: u64,
}

/// Rendering performance as observed by a dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub fps: f64,
    pub latency_ms: f64,
    pub frames_rendered: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAck {
    pub success: bool,
    pub message: String,
}
