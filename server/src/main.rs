use std::{io, sync::Arc};

use log::info;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

use training_server::{MockConfig, MockTrainer, ServerConfig, TelemetrySource, TrainingServer};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config = ServerConfig::from_env()?;
    let trainer = Arc::new(MockTrainer::new(MockConfig::default()));
    let server = Arc::new(TrainingServer::new(&config, Arc::clone(&trainer)));

    let listener = TcpListener::bind(config.addr()).await?;
    info!("waiting for a dashboard to send the start command");

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(server.serve(listener, shutdown.clone()));

    signal::ctrl_c().await?;
    info!("received SIGINT");

    trainer.stop();
    shutdown.cancel();
    serving.await.map_err(io::Error::other)?;

    Ok(())
}
