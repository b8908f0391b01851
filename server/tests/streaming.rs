use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use comms::{
    FrameReceiver,
    msg::Msg,
    rpc::{ImageBatchRequest, MetricsRequest, TrainingControlRequest},
};
use tokio::io::DuplexStream;
use training_server::{
    StreamingService, TelemetrySource,
    config::StreamingConfig,
    mock::curve,
    source::{Batch, Metrics, SampleImage},
};

/// A source whose step the test moves by hand.
struct ManualSource {
    step: AtomicU64,
    /// The step metrics and batch were last produced at, lags `step` mid update.
    produced: AtomicU64,
    training: AtomicBool,
    batch: Batch,
}

impl ManualSource {
    fn new(images: usize) -> Self {
        let mut batch = Batch::default();
        for i in 0..images {
            batch.images.push(SampleImage {
                pixels: vec![i as u8; 3],
                width: 1,
                height: 1,
            });
            batch.labels.push("cat".to_string());
            batch.predictions.push("dog".to_string());
            batch.confidences.push(0.5);
        }

        Self {
            step: AtomicU64::new(0),
            produced: AtomicU64::new(0),
            training: AtomicBool::new(false),
            batch,
        }
    }

    fn set_step(&self, step: u64) {
        self.produced.store(step, Ordering::Release);
        self.step.store(step, Ordering::Release);
    }

    /// Moves the step while the new metrics and batch are still being produced.
    fn bump_step_only(&self, step: u64) {
        self.step.store(step, Ordering::Release);
    }
}

impl TelemetrySource for ManualSource {
    fn current_step(&self) -> u64 {
        self.step.load(Ordering::Acquire)
    }

    fn current_metrics(&self) -> Metrics {
        curve(self.produced.load(Ordering::Acquire))
    }

    fn current_batch(&self) -> Arc<Batch> {
        Arc::new(Batch {
            step: self.produced.load(Ordering::Acquire),
            ..self.batch.clone()
        })
    }

    fn is_training(&self) -> bool {
        self.training.load(Ordering::Acquire)
    }

    fn max_steps(&self) -> u64 {
        100
    }

    fn start(&self) -> bool {
        self.training.store(true, Ordering::Release);
        true
    }

    fn pause(&self) -> bool {
        self.training.store(false, Ordering::Release);
        true
    }

    fn reset(&self) -> bool {
        self.set_step(0);
        true
    }

    fn stop(&self) -> bool {
        self.pause()
    }
}

type Rx = FrameReceiver<DuplexStream>;

fn service(source: &Arc<ManualSource>) -> Arc<StreamingService<ManualSource>> {
    let config = StreamingConfig {
        metrics_poll_interval: Duration::from_millis(1),
        image_poll_interval: Duration::from_millis(1),
    };

    Arc::new(StreamingService::new(Arc::clone(source), &config))
}

fn open_metrics(service: &Arc<StreamingService<ManualSource>>, start_step: u64) -> Rx {
    let (ours, theirs) = tokio::io::duplex(1 << 16);
    let (rx, _) = comms::channel(ours, tokio::io::sink());
    let (_, mut tx) = comms::channel(tokio::io::empty(), theirs);

    let service = Arc::clone(service);
    tokio::spawn(async move {
        let req = MetricsRequest {
            update_interval_ms: 1,
            start_step,
        };
        let _ = service.stream_metrics(&req, &mut tx).await;
    });

    rx
}

fn open_images(
    service: &Arc<StreamingService<ManualSource>>,
    batch_size: u32,
    start_step: u64,
) -> Rx {
    let (ours, theirs) = tokio::io::duplex(1 << 16);
    let (rx, _) = comms::channel(ours, tokio::io::sink());
    let (_, mut tx) = comms::channel(tokio::io::empty(), theirs);

    let service = Arc::clone(service);
    tokio::spawn(async move {
        let req = ImageBatchRequest {
            batch_size,
            start_step,
        };
        let _ = service.stream_images(&req, &mut tx).await;
    });

    rx
}

async fn next_metrics_step(rx: &mut Rx) -> io::Result<u64> {
    match rx.recv::<Msg>().await? {
        Msg::Metrics(metrics) => Ok(metrics.step),
        other => panic!("unexpected msg: {other:?}"),
    }
}

#[tokio::test]
async fn metrics_wait_for_the_step_to_advance() -> io::Result<()> {
    let source = Arc::new(ManualSource::new(0));
    let service = service(&source);
    let mut rx = open_metrics(&service, 0);

    let nothing = tokio::time::timeout(Duration::from_millis(30), rx.recv::<Msg>()).await;
    assert!(nothing.is_err(), "no step happened, nothing should be streamed");

    source.set_step(1);
    assert_eq!(next_metrics_step(&mut rx).await?, 1);

    Ok(())
}

#[tokio::test]
async fn metrics_skip_steps_a_slow_poll_missed() -> io::Result<()> {
    let source = Arc::new(ManualSource::new(0));
    let service = service(&source);
    let mut rx = open_metrics(&service, 0);

    source.set_step(1);
    assert_eq!(next_metrics_step(&mut rx).await?, 1);

    source.set_step(5);
    assert_eq!(next_metrics_step(&mut rx).await?, 5);

    source.set_step(6);
    let Msg::Metrics(metrics) = rx.recv::<Msg>().await? else {
        panic!("expected metrics");
    };
    assert_eq!(metrics.step, 6);
    assert!((metrics.accuracy - curve(6).accuracy).abs() < 1e-6);

    Ok(())
}

#[tokio::test]
async fn metrics_resume_after_the_cursor() -> io::Result<()> {
    let source = Arc::new(ManualSource::new(0));
    source.set_step(10);

    let service = service(&source);
    let mut rx = open_metrics(&service, 10);

    let nothing = tokio::time::timeout(Duration::from_millis(30), rx.recv::<Msg>()).await;
    assert!(nothing.is_err(), "step 10 was already delivered");

    source.set_step(11);
    assert_eq!(next_metrics_step(&mut rx).await?, 11);

    Ok(())
}

#[tokio::test]
async fn metrics_carry_the_step_they_were_computed_at() -> io::Result<()> {
    let source = Arc::new(ManualSource::new(0));
    let service = service(&source);
    let mut rx = open_metrics(&service, 0);

    source.set_step(3);
    assert_eq!(next_metrics_step(&mut rx).await?, 3);

    source.bump_step_only(4);
    let nothing = tokio::time::timeout(Duration::from_millis(30), rx.recv::<Msg>()).await;
    assert!(nothing.is_err(), "step 4 has no metrics yet");

    source.set_step(4);
    let Msg::Metrics(metrics) = rx.recv::<Msg>().await? else {
        panic!("expected metrics");
    };
    assert_eq!(metrics.step, 4);
    assert_eq!(metrics.loss, curve(4).loss);

    Ok(())
}

#[tokio::test]
async fn images_resume_after_the_cursor() -> io::Result<()> {
    let source = Arc::new(ManualSource::new(4));
    source.set_step(10);

    let service = service(&source);
    let mut rx = open_images(&service, 4, 10);

    let nothing = tokio::time::timeout(Duration::from_millis(30), rx.recv::<Msg>()).await;
    assert!(nothing.is_err(), "step 10 was already delivered");

    source.set_step(11);
    let Msg::Images(batch) = rx.recv::<Msg>().await? else {
        panic!("expected an image batch");
    };
    assert_eq!(batch.step, 11);
    assert_eq!(batch.images.len(), 4);

    Ok(())
}

#[tokio::test]
async fn image_batches_are_capped() -> io::Result<()> {
    let source = Arc::new(ManualSource::new(20));
    let service = service(&source);
    let mut rx = open_images(&service, 1000, 0);

    source.set_step(1);
    let Msg::Images(batch) = rx.recv::<Msg>().await? else {
        panic!("expected an image batch");
    };

    assert_eq!(batch.step, 1);
    assert_eq!(batch.images.len(), 16);
    assert_eq!(batch.images[3].image.pixel_data, vec![3; 3]);
    assert_eq!(batch.images[0].image.format, "RGB");

    Ok(())
}

#[tokio::test]
async fn image_batches_follow_small_requests_and_sources() -> io::Result<()> {
    let source = Arc::new(ManualSource::new(20));
    let service = service(&source);
    let mut small = open_images(&service, 4, 0);

    source.set_step(1);
    let Msg::Images(batch) = small.recv::<Msg>().await? else {
        panic!("expected an image batch");
    };
    assert_eq!(batch.images.len(), 4);

    let tiny_source = Arc::new(ManualSource::new(2));
    let tiny_service = self::service(&tiny_source);
    let mut rx = open_images(&tiny_service, 0, 0);

    tiny_source.set_step(1);
    let Msg::Images(batch) = rx.recv::<Msg>().await? else {
        panic!("expected an image batch");
    };
    assert_eq!(batch.images.len(), 2);

    Ok(())
}

#[tokio::test]
async fn controls_pass_through_to_the_source() {
    let source = Arc::new(ManualSource::new(0));
    let service = service(&source);
    let req = TrainingControlRequest {
        client_id: "c1".to_string(),
    };

    let res = service.start_training(&req);
    assert!(res.success);
    assert!(res.is_training);
    assert_eq!(res.message, "Training started");

    source.set_step(4);
    let status = service.training_status();
    assert_eq!(status.current_step, 4);
    assert_eq!(status.max_steps, 100);
    assert_eq!(status.current_loss, curve(4).loss);

    let res = service.stop_training(&req);
    assert!(res.success);
    assert!(!res.is_training);
    assert_eq!(res.current_step, 4);
}
