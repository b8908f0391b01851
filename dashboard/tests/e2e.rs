use std::{sync::Arc, time::Duration};

use comms::rpc::{ImageBatch, TrainingMetrics};
use dashboard::{
    BackoffPolicy, ClientErr, ConnectionManager, ConnectionState, RpcClient, StreamConfig,
    StreamConsumer,
};
use tokio::{net::TcpListener, sync::mpsc, time};
use tokio_util::sync::CancellationToken;
use training_server::{MockConfig, MockTrainer, ServerConfig, TrainingServer};

type Server = Arc<TrainingServer<MockTrainer>>;

const PATIENCE: Duration = Duration::from_secs(10);

async fn spawn_server() -> (Server, String, CancellationToken) {
    let mock = MockConfig {
        step_interval: Duration::from_millis(2),
        idle_interval: Duration::from_millis(2),
        max_steps: 1_000_000,
        image_side: 4,
        seed: Some(7),
        ..Default::default()
    };

    let mut config = ServerConfig::default();
    config.streaming.image_poll_interval = Duration::from_millis(2);
    let server = Arc::new(TrainingServer::new(&config, Arc::new(MockTrainer::new(mock))));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let shutdown = CancellationToken::new();
    tokio::spawn(Arc::clone(&server).serve(listener, shutdown.clone()));

    (server, addr, shutdown)
}

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        unit: Duration::from_millis(1),
        ceiling: Duration::from_millis(30),
        max_retries: 5,
    }
}

fn stream_config() -> StreamConfig {
    StreamConfig {
        metrics_interval_ms: 2,
        heartbeat_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

async fn next_metrics(rx: &mut mpsc::UnboundedReceiver<TrainingMetrics>) -> TrainingMetrics {
    time::timeout(PATIENCE, rx.recv())
        .await
        .expect("no metrics in time")
        .expect("metrics loop ended")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streams_resume_after_the_connection_is_severed() {
    let (server, addr, shutdown) = spawn_server().await;

    let conn = Arc::new(ConnectionManager::new(
        RpcClient::new(addr),
        "c1",
        fast_backoff(),
    ));
    assert!(conn.connect().await.unwrap().alive);
    assert_eq!(conn.state(), ConnectionState::Connected);

    let consumer = Arc::new(StreamConsumer::new(Arc::clone(&conn), stream_config()));
    assert!(consumer.start_training().await.unwrap().is_training);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (images_tx, mut images_rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    let running = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        let token = token.clone();
        async move {
            let on_metrics = move |m: &TrainingMetrics| tx.send(m.clone()).unwrap();
            let on_images = move |batch: &ImageBatch| images_tx.send(batch.step).unwrap();
            consumer.run(on_metrics, on_images, token).await
        }
    });

    let mut received = Vec::new();
    while received.len() < 50 {
        received.push(next_metrics(&mut rx).await);
    }

    for pair in received.windows(2) {
        assert!(pair[0].step < pair[1].step);
        assert!(pair[0].accuracy <= pair[1].accuracy);
    }

    server.sever_connections();

    let resumed_at = time::timeout(PATIENCE, async {
        loop {
            match server.health().registry().get("c1") {
                Some(session) if session.last_known_step > 0 => break session.last_known_step,
                _ => time::sleep(Duration::from_millis(5)).await,
            }
        }
    })
    .await
    .expect("the client never reconnected");

    time::timeout(PATIENCE, async {
        while conn.state() != ConnectionState::Connected {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("the client never got back to connected");

    loop {
        let metrics = next_metrics(&mut rx).await;
        let prev = received.last().unwrap();
        assert!(metrics.step > prev.step, "step {} was redelivered", metrics.step);
        received.push(metrics);

        if received.last().unwrap().step > resumed_at {
            break;
        }
    }

    let mut prev_image = 0;
    loop {
        let step = time::timeout(PATIENCE, images_rx.recv())
            .await
            .expect("no image batch in time")
            .expect("image loop ended");
        assert!(step > prev_image, "image step {step} was redelivered");
        prev_image = step;

        if step > resumed_at {
            break;
        }
    }

    let status = conn.api().connection_status("c1").await.unwrap();
    assert!(status.is_connected);
    assert_eq!(status.failed_attempts, 0);
    assert!(status.connected_since_ms > 0);
    assert_eq!(status.status_message, "Connected");

    let unknown = conn.api().connection_status("nobody").await.unwrap();
    assert!(!unknown.is_connected);
    assert_eq!(unknown.status_message, "Disconnected");

    token.cancel();
    running.await.unwrap().unwrap();
    shutdown.cancel();
}

#[tokio::test]
async fn consumer_gives_up_on_a_dead_producer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let conn = Arc::new(ConnectionManager::new(
        RpcClient::new(addr),
        "c2",
        fast_backoff(),
    ));
    assert!(matches!(conn.connect().await, Err(ClientErr::Io(_))));
    assert_eq!(conn.state(), ConnectionState::Uninitialized);

    let consumer = StreamConsumer::new(Arc::clone(&conn), stream_config());
    let res = time::timeout(
        PATIENCE,
        consumer.run(|_| {}, |_| {}, CancellationToken::new()),
    )
    .await
    .expect("the consumer kept retrying");

    assert!(matches!(res, Err(ClientErr::MaxRetriesExceeded { attempts: 5 })));
    assert_eq!(conn.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn cancelling_stops_the_consumer_cleanly() {
    let (_server, addr, shutdown) = spawn_server().await;

    let conn = Arc::new(ConnectionManager::new(
        RpcClient::new(addr),
        "c3",
        fast_backoff(),
    ));
    conn.connect().await.unwrap();

    let consumer = StreamConsumer::new(Arc::clone(&conn), stream_config());
    consumer.start_training().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    let run = consumer.run(move |m| tx.send(m.clone()).unwrap(), |_| {}, token.clone());
    let stop = async {
        next_metrics(&mut rx).await;
        token.cancel();
    };

    let (res, ()) = tokio::join!(run, stop);

    assert!(res.is_ok());
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert!(conn.last_step() > 0);

    let status = consumer.training_status().await.unwrap();
    assert!(status.is_training);
    shutdown.cancel();
}
