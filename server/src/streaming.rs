use std::{io, sync::Arc, time::Duration};

use comms::{
    FrameSender, clock,
    msg::Msg,
    rpc::{
        DashboardMetrics, Image, ImageBatch, ImageBatchRequest, LabeledImage, MetricsRequest,
        StatusAck, TrainingControlRequest, TrainingControlResponse, TrainingMetrics,
        TrainingStatusResponse,
    },
};
use log::{debug, info};
use tokio::{io::AsyncWrite, time};

use crate::{
    config::StreamingConfig,
    source::{Batch, TelemetrySource},
};

/// The hard cap on the amount of images in a single batch.
pub const MAX_BATCH_SIZE: usize = 16;

/// The last step a single stream delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCursor {
    last: u64,
}

impl StepCursor {
    /// Creates a cursor that considers `start` and everything before it delivered.
    pub fn new(start: u64) -> Self {
        Self { last: start }
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    /// Moves the cursor to `step` if the producer got past it.
    ///
    /// # Returns
    /// Whether there is something new to emit.
    pub fn advance_to(&mut self, step: u64) -> bool {
        if step > self.last {
            self.last = step;
            true
        } else {
            false
        }
    }
}

/// The amount of images a request will get per batch.
pub fn effective_batch_size(requested: u32) -> usize {
    match requested as usize {
        0 => MAX_BATCH_SIZE,
        n => n.min(MAX_BATCH_SIZE),
    }
}

/// Serves the metric and image streams plus the training controls.
///
/// Every stream owns its cursor and polls the shared source, a slow reader
/// skips the steps it was too slow for instead of queueing them.
pub struct StreamingService<S: TelemetrySource> {
    source: Arc<S>,
    metrics_poll: Duration,
    image_poll: Duration,
}

impl<S: TelemetrySource> StreamingService<S> {
    /// Creates a new `StreamingService`.
    ///
    /// # Arguments
    /// * `source` - The telemetry source the streams follow.
    /// * `config` - The polling intervals.
    pub fn new(source: Arc<S>, config: &StreamingConfig) -> Self {
        Self {
            source,
            metrics_poll: config.metrics_poll_interval,
            image_poll: config.image_poll_interval,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Streams one metrics sample for every step change the poll observes.
    ///
    /// Only returns on a transport failure, the producer never ends a stream on
    /// its own.
    ///
    /// # Arguments
    /// * `req` - The poll interval and the consumer's resume cursor.
    /// * `tx` - The sending end of the stream's connection.
    pub async fn stream_metrics<W>(
        &self,
        req: &MetricsRequest,
        tx: &mut FrameSender<W>,
    ) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let interval = match req.update_interval_ms {
            0 => self.metrics_poll,
            ms => Duration::from_millis(ms),
        };

        let mut cursor = StepCursor::new(req.start_step);
        debug!(start_step = req.start_step, interval_ms = interval.as_millis() as u64; "metrics stream opened");

        loop {
            let metrics = self.source.current_metrics();

            if cursor.advance_to(metrics.step) {
                let msg = Msg::Metrics(TrainingMetrics {
                    step: metrics.step,
                    loss: metrics.loss,
                    accuracy: metrics.accuracy,
                    timestamp_ms: clock::now_ms(),
                });

                tx.send(&msg).await?;
            }

            time::sleep(interval).await;
        }
    }

    /// Streams the source's latest batch for every step change the poll observes.
    ///
    /// # Arguments
    /// * `req` - The requested batch size and the consumer's resume cursor.
    /// * `tx` - The sending end of the stream's connection.
    pub async fn stream_images<W>(
        &self,
        req: &ImageBatchRequest,
        tx: &mut FrameSender<W>,
    ) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let batch_size = effective_batch_size(req.batch_size);
        let mut cursor = StepCursor::new(req.start_step);
        debug!(start_step = req.start_step, batch_size = batch_size; "image stream opened");

        loop {
            let batch = self.source.current_batch();

            if cursor.advance_to(batch.step) {
                let msg = Msg::Images(image_batch(&batch, batch_size));
                tx.send(&msg).await?;
            }

            time::sleep(self.image_poll).await;
        }
    }

    pub fn start_training(&self, req: &TrainingControlRequest) -> TrainingControlResponse {
        info!(client_id = req.client_id.as_str(); "received start training request");
        let success = self.source.start();

        let message = if success {
            "Training started"
        } else {
            "Failed to start training"
        };

        self.control_response(success, message)
    }

    /// Pauses the source, generation can be resumed with `start_training`.
    pub fn stop_training(&self, req: &TrainingControlRequest) -> TrainingControlResponse {
        info!(client_id = req.client_id.as_str(); "received stop training request");
        let success = self.source.pause();

        let message = if success {
            "Training stopped"
        } else {
            "Failed to stop training"
        };

        self.control_response(success, message)
    }

    pub fn training_status(&self) -> TrainingStatusResponse {
        let metrics = self.source.current_metrics();

        TrainingStatusResponse {
            is_training: self.source.is_training(),
            current_step: metrics.step,
            max_steps: self.source.max_steps(),
            current_loss: metrics.loss,
            current_accuracy: metrics.accuracy,
        }
    }

    /// Acknowledges a dashboard's performance report, it only feeds the logs.
    pub fn dashboard_status(&self, status: &DashboardMetrics) -> StatusAck {
        info!(
            fps = status.fps, latency_ms = status.latency_ms, frames = status.frames_rendered;
            "dashboard status"
        );

        StatusAck {
            success: true,
            message: "Status received".to_string(),
        }
    }

    fn control_response(&self, success: bool, message: &str) -> TrainingControlResponse {
        TrainingControlResponse {
            success,
            message: message.to_string(),
            is_training: self.source.is_training(),
            current_step: self.source.current_step(),
        }
    }
}

fn image_batch(batch: &Batch, batch_size: usize) -> ImageBatch {
    let take = batch_size.min(batch.len());

    let images = (0..take)
        .map(|i| {
            let sample = &batch.images[i];

            LabeledImage {
                image: Image {
                    pixel_data: sample.pixels.clone(),
                    width: sample.width,
                    height: sample.height,
                    format: "RGB".to_string(),
                },
                ground_truth: batch.labels[i].clone(),
                prediction: batch.predictions[i].clone(),
                confidence: batch.confidences[i],
            }
        })
        .collect();

    ImageBatch {
        step: batch.step,
        images,
        timestamp_ms: clock::now_ms(),
    }
}
