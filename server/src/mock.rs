//! A simulated training run, stands in for a real trainer in the binary and tests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use tokio::{runtime::Handle, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::source::{Batch, Metrics, SampleImage, TelemetrySource};

pub const CLASSES: [&str; 10] = [
    "cat", "dog", "bird", "fish", "horse", "deer", "frog", "ship", "car", "plane",
];

const INITIAL_METRICS: Metrics = Metrics {
    step: 0,
    loss: 2.3,
    accuracy: 0.1,
};

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub step_interval: Duration,
    /// How often a paused run checks whether it was resumed.
    pub idle_interval: Duration,
    pub max_steps: u64,
    pub batch_size: usize,
    /// Images are square RGB, this many pixels per side.
    pub image_side: u32,
    pub seed: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_millis(100),
            idle_interval: Duration::from_millis(500),
            max_steps: 1000,
            batch_size: 16,
            image_side: 64,
            seed: None,
        }
    }
}

/// The simulated loss and accuracy at `step`.
pub fn curve(step: u64) -> Metrics {
    let decay = (-(step as f64) / 200.0).exp();

    Metrics {
        step,
        loss: (2.3 * decay + 0.1) as f32,
        accuracy: (0.1 + 0.85 * (1.0 - decay)).min(0.95) as f32,
    }
}

#[derive(Debug)]
struct Inner {
    config: MockConfig,
    step: AtomicU64,
    training: AtomicBool,
    metrics: RwLock<Metrics>,
    batch: RwLock<Arc<Batch>>,
}

#[derive(Debug)]
struct Generator {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

/// A `TelemetrySource` producing an improving training curve with random images.
#[derive(Debug)]
pub struct MockTrainer {
    inner: Arc<Inner>,
    generator: Mutex<Option<Generator>>,
}

impl MockTrainer {
    pub fn new(config: MockConfig) -> Self {
        let inner = Inner {
            config,
            step: AtomicU64::new(0),
            training: AtomicBool::new(false),
            metrics: RwLock::new(INITIAL_METRICS),
            batch: RwLock::new(Arc::default()),
        };

        Self {
            inner: Arc::new(inner),
            generator: Mutex::new(None),
        }
    }

    fn teardown(&self) {
        self.inner.training.store(false, Ordering::Release);

        if let Some(generator) = self.generator.lock().take() {
            generator.token.cancel();
            drop(generator.handle);
        }
    }
}

impl Drop for MockTrainer {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl TelemetrySource for MockTrainer {
    fn current_step(&self) -> u64 {
        self.inner.step.load(Ordering::Acquire)
    }

    fn current_metrics(&self) -> Metrics {
        *self.inner.metrics.read()
    }

    fn current_batch(&self) -> Arc<Batch> {
        Arc::clone(&self.inner.batch.read())
    }

    fn is_training(&self) -> bool {
        self.inner.training.load(Ordering::Acquire)
    }

    fn max_steps(&self) -> u64 {
        self.inner.config.max_steps
    }

    fn start(&self) -> bool {
        if self.current_step() >= self.inner.config.max_steps {
            warn!(max_steps = self.inner.config.max_steps; "training already finished, reset it first");
            return false;
        }

        let mut generator = self.generator.lock();
        let running = generator.as_ref().is_some_and(|g| !g.handle.is_finished());

        if running {
            self.inner.training.store(true, Ordering::Release);
            info!("training resumed");
            return true;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("cannot start training outside of a tokio runtime");
            return false;
        };

        self.inner.training.store(true, Ordering::Release);
        let token = CancellationToken::new();
        let handle = runtime.spawn(generate(Arc::clone(&self.inner), token.clone()));
        *generator = Some(Generator { handle, token });

        info!("training started");
        true
    }

    fn pause(&self) -> bool {
        self.inner.training.store(false, Ordering::Release);
        info!("training paused");
        true
    }

    fn reset(&self) -> bool {
        self.teardown();
        self.inner.step.store(0, Ordering::Release);
        *self.inner.metrics.write() = INITIAL_METRICS;
        *self.inner.batch.write() = Arc::default();
        info!("training reset");
        true
    }

    fn stop(&self) -> bool {
        self.teardown();
        info!("training stopped");
        true
    }
}

/// The generation loop, one step per `step_interval` while training.
async fn generate(inner: Arc<Inner>, token: CancellationToken) {
    let mut rng = match inner.config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    while inner.step.load(Ordering::Acquire) < inner.config.max_steps {
        let training = inner.training.load(Ordering::Acquire);
        let wait = if training {
            inner.config.step_interval
        } else {
            inner.config.idle_interval
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = time::sleep(wait) => {}
        }

        // a pause may have landed during the sleep
        if !training || !inner.training.load(Ordering::Acquire) {
            continue;
        }

        let step = inner.step.load(Ordering::Acquire) + 1;
        let metrics = curve(step);
        let batch = random_batch(&mut rng, &inner.config, &metrics);

        *inner.metrics.write() = metrics;
        *inner.batch.write() = Arc::new(batch);
        inner.step.store(step, Ordering::Release);

        if step % 10 == 0 {
            debug!(step = step, loss = metrics.loss, accuracy = metrics.accuracy; "training step");
        }
    }

    inner.training.store(false, Ordering::Release);
    info!(max_steps = inner.config.max_steps; "training finished");
}

fn random_batch<R: Rng>(rng: &mut R, config: &MockConfig, metrics: &Metrics) -> Batch {
    let side = config.image_side;
    let accuracy = metrics.accuracy;
    let mut batch = Batch {
        step: metrics.step,
        ..Default::default()
    };

    for _ in 0..config.batch_size {
        let truth = rng.random_range(0..CLASSES.len());

        let (prediction, confidence) = if rng.random::<f32>() < accuracy {
            (truth, rng.random_range(0.7..0.99))
        } else {
            (rng.random_range(0..CLASSES.len()), rng.random_range(0.4..0.7))
        };

        let mut pixels = vec![0; (side * side * 3) as usize];
        rng.fill_bytes(&mut pixels);

        batch.images.push(SampleImage {
            pixels,
            width: side,
            height: side,
        });
        batch.labels.push(CLASSES[truth].to_string());
        batch.predictions.push(CLASSES[prediction].to_string());
        batch.confidences.push(confidence);
    }

    batch
}
