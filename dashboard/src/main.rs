use std::sync::Arc;

use anyhow::{Context, Result};
use comms::rpc::{ImageBatch, TrainingMetrics};
use log::info;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use dashboard::{ClientConfig, ConnectionManager, DashboardState, RpcClient, StreamConsumer};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = ClientConfig::from_env()?;
    info!(client_id = config.client_id.as_str(); "dashboard starting");

    let rpc = RpcClient::new(config.server_addr.clone());
    let conn = Arc::new(ConnectionManager::new(rpc, config.client_id, config.backoff));
    conn.connect()
        .await
        .with_context(|| format!("failed to connect to {}", config.server_addr))?;

    let consumer = StreamConsumer::new(Arc::clone(&conn), config.stream);
    let started = consumer.start_training().await?;
    info!(step = started.current_step; "{}", started.message);

    let state = Arc::new(DashboardState::new(config.history_len));
    let on_metrics = {
        let state = Arc::clone(&state);
        move |m: &TrainingMetrics| {
            state.on_metrics(m);
            info!(step = m.step, loss = m.loss, accuracy = m.accuracy; "metrics");
        }
    };
    let on_images = {
        let state = Arc::clone(&state);
        move |batch: &ImageBatch| state.on_images(batch)
    };

    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("received SIGINT");
        }
        stop.cancel();
    });

    consumer
        .run(on_metrics, on_images, token)
        .await
        .context("lost the training server")?;

    let perf = consumer.performance();
    info!(
        fps = perf.fps,
        latency_ms = perf.latency_ms,
        frames = perf.frames_rendered,
        step = state.current_step();
        "dashboard stopped"
    );

    Ok(())
}
