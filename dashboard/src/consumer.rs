use std::sync::Arc;

use comms::{
    clock,
    rpc::{
        DashboardMetrics, ImageBatch, ImageBatchRequest, MetricsRequest, Request,
        TrainingControlResponse, TrainingMetrics, TrainingStatusResponse,
    },
};
use log::{error, info, warn};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    config::StreamConfig,
    connection::ConnectionManager,
    error::{ClientErr, Result},
    performance::Performance,
    rpc::{RpcClient, StreamItem},
};

pub type Connection = ConnectionManager<RpcClient>;

/// Per item bookkeeping of a stream, on top of advancing the resume cursor.
trait Observe: StreamItem {
    const NAME: &'static str;

    fn request(config: &StreamConfig, start_step: u64) -> Request;

    /// # Returns
    /// Whether a status report is due.
    fn observe(&self, perf: &mut Performance, last_arrival: &mut Option<Instant>) -> bool;
}

impl Observe for TrainingMetrics {
    const NAME: &'static str = "metrics";

    fn request(config: &StreamConfig, start_step: u64) -> Request {
        Request::StreamMetrics(MetricsRequest {
            update_interval_ms: config.metrics_interval_ms,
            start_step,
        })
    }

    fn observe(&self, perf: &mut Performance, _: &mut Option<Instant>) -> bool {
        // not corrected for clock skew between the two hosts
        let latency = clock::now_ms().saturating_sub(self.timestamp_ms);
        perf.record_latency(latency as f64);
        false
    }
}

impl Observe for ImageBatch {
    const NAME: &'static str = "images";

    fn request(config: &StreamConfig, start_step: u64) -> Request {
        Request::StreamImages(ImageBatchRequest {
            batch_size: config.image_batch_size,
            start_step,
        })
    }

    fn observe(&self, perf: &mut Performance, last_arrival: &mut Option<Instant>) -> bool {
        let now = Instant::now();

        match last_arrival.replace(now) {
            Some(prev) => perf.record_interval(now - prev),
            None => false,
        }
    }
}

/// Follows both streams of a producer, surviving connection loss.
///
/// Each stream loop reads until its transport fails, marks the connection lost,
/// runs a reconnection campaign and reopens from the shared resume cursor. A loop
/// only gives up once its campaign leaves the connection `Failed`.
pub struct StreamConsumer {
    conn: Arc<Connection>,
    config: StreamConfig,
    perf: Arc<Mutex<Performance>>,
}

impl StreamConsumer {
    /// Creates a new `StreamConsumer`.
    ///
    /// # Arguments
    /// * `conn` - The connection both streams share.
    /// * `config` - Stream parameters.
    pub fn new(conn: Arc<Connection>, config: StreamConfig) -> Self {
        let perf = Performance::new(config.fps_window, config.status_every);

        Self {
            conn,
            config,
            perf: Arc::new(Mutex::new(perf)),
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn performance(&self) -> DashboardMetrics {
        self.perf.lock().snapshot()
    }

    fn rpc(&self) -> &RpcClient {
        self.conn.api()
    }

    pub async fn start_training(&self) -> Result<TrainingControlResponse> {
        self.rpc().start_training(self.conn.client_id()).await
    }

    pub async fn stop_training(&self) -> Result<TrainingControlResponse> {
        self.rpc().stop_training(self.conn.client_id()).await
    }

    pub async fn training_status(&self) -> Result<TrainingStatusResponse> {
        self.rpc().training_status().await
    }

    /// Follows the metrics stream until `token` is cancelled.
    ///
    /// # Arguments
    /// * `on_metrics` - Invoked for every sample, in step order.
    /// * `token` - Cancelling it ends the loop cleanly.
    ///
    /// # Returns
    /// `Ok` once cancelled, `ClientErr::MaxRetriesExceeded` once reconnecting failed.
    pub async fn stream_metrics<F>(&self, on_metrics: F, token: &CancellationToken) -> Result<()>
    where
        F: FnMut(&TrainingMetrics) + Send,
    {
        self.follow::<TrainingMetrics, F>(on_metrics, token).await
    }

    /// Follows the image stream until `token` is cancelled.
    ///
    /// Every image batch feeds the FPS window, every `status_every` frames the
    /// performance is reported back to the producer without waiting for the answer.
    pub async fn stream_images<F>(&self, on_images: F, token: &CancellationToken) -> Result<()>
    where
        F: FnMut(&ImageBatch) + Send,
    {
        self.follow::<ImageBatch, F>(on_images, token).await
    }

    /// Runs both stream loops and the heartbeat until `token` is cancelled or both
    /// loops end.
    ///
    /// # Returns
    /// The first terminal error of either loop.
    pub async fn run<M, I>(&self, on_metrics: M, on_images: I, token: CancellationToken) -> Result<()>
    where
        M: FnMut(&TrainingMetrics) + Send,
        I: FnMut(&ImageBatch) + Send,
    {
        let heartbeat = token.child_token();

        let streams = async {
            let (metrics, images) = tokio::join!(
                self.stream_metrics(on_metrics, &token),
                self.stream_images(on_images, &token)
            );
            heartbeat.cancel();

            metrics.and(images)
        };

        let ((), res) = tokio::join!(
            self.conn
                .heartbeat_loop(self.config.heartbeat_interval, heartbeat.clone()),
            streams
        );

        res
    }

    async fn follow<T, F>(&self, mut on_item: F, token: &CancellationToken) -> Result<()>
    where
        T: Observe,
        F: FnMut(&T) + Send,
    {
        loop {
            let interrupted = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                e = self.read::<T, F>(&mut on_item) => e,
            };

            warn!(stream = T::NAME; "stream interrupted: {interrupted}");
            self.conn.mark_disconnected();

            let resumed = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                resumed = self.conn.reconnect() => resumed,
            };

            match resumed {
                Ok(step) => info!(stream = T::NAME, resume_step = step; "reopening stream"),
                Err(e) => {
                    error!(stream = T::NAME; "stopping stream: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// Opens a stream at the cursor and reads it until the transport fails.
    async fn read<T, F>(&self, on_item: &mut F) -> ClientErr
    where
        T: Observe,
        F: FnMut(&T) + Send,
    {
        let request = T::request(&self.config, self.conn.last_step());
        let mut sub = match self.rpc().subscribe::<T>(request).await {
            Ok(sub) => sub,
            Err(e) => return e,
        };
        let mut last_arrival = None;

        loop {
            let item = match sub.next().await {
                Ok(item) => item,
                Err(e) => return e,
            };

            self.conn.advance_cursor(item.step());
            on_item(&item);

            let due = item.observe(&mut self.perf.lock(), &mut last_arrival);
            if due {
                self.push_status();
            }
        }
    }

    fn push_status(&self) {
        let status = self.perf.lock().snapshot();
        let rpc = self.rpc().clone();

        tokio::spawn(async move {
            if let Err(e) = rpc.send_dashboard_status(status).await {
                warn!("failed to send dashboard status: {e}");
            }
        });
    }
}
