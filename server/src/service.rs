use std::{io, sync::Arc};

use comms::{
    FrameReceiver, FrameSender,
    msg::Msg,
    rpc::{Request, Response},
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ServerConfig,
    health::HealthService,
    registry::{EvictionPolicy, SessionRegistry},
    source::TelemetrySource,
    streaming::StreamingService,
};

/// The producer's network front, one call per accepted connection.
pub struct TrainingServer<S: TelemetrySource> {
    health: HealthService,
    streaming: StreamingService<S>,
    connections: Mutex<CancellationToken>,
}

impl<S: TelemetrySource> TrainingServer<S> {
    /// Creates a new `TrainingServer`.
    ///
    /// # Arguments
    /// * `config` - The server's configuration.
    /// * `source` - The telemetry source both streams follow.
    pub fn new(config: &ServerConfig, source: Arc<S>) -> Self {
        let registry = SessionRegistry::new(EvictionPolicy::Never);

        Self {
            health: HealthService::new(registry, config.max_retries),
            streaming: StreamingService::new(source, &config.streaming),
            connections: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn health(&self) -> &HealthService {
        &self.health
    }

    pub fn streaming(&self) -> &StreamingService<S> {
        &self.streaming
    }

    /// Accepts connections until `shutdown` is cancelled.
    ///
    /// # Arguments
    /// * `listener` - A bound listener.
    /// * `shutdown` - Cancelling it stops accepting and closes every open connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!("listening at {addr}");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("failed to accept a connection: {e}");
                            continue;
                        }
                    };

                    let server = Arc::clone(&self);
                    let token = self.connection_token();

                    tokio::spawn(async move {
                        let (rx, tx) = stream.into_split();
                        let (rx, tx) = comms::channel(rx, tx);

                        if let Err(e) = server.serve_connection(rx, tx, token).await {
                            debug!("connection from {addr} ended: {e}");
                        }
                    });
                }
                _ = shutdown.cancelled() => break,
            }
        }

        info!("shutting down, closing every open connection");
        self.sever_connections();
    }

    /// Closes every open connection while the listener keeps accepting new ones.
    pub fn sever_connections(&self) {
        let mut token = self.connections.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    fn connection_token(&self) -> CancellationToken {
        self.connections.lock().clone()
    }

    /// Serves the single call carried by a connection.
    ///
    /// Unary calls are answered and the connection is closed, streams run until the
    /// peer hangs up, the transport fails or `token` is cancelled.
    ///
    /// # Arguments
    /// * `rx` - The receiving end of the connection.
    /// * `tx` - The sending end of the connection.
    /// * `token` - Cancelling it drops the connection.
    pub async fn serve_connection<R, W>(
        &self,
        mut rx: FrameReceiver<R>,
        mut tx: FrameSender<W>,
        token: CancellationToken,
    ) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let request = match rx.recv::<Msg>().await {
            Ok(Msg::Request(request)) => request,
            Ok(other) => {
                let text = format!("expected a request, got {}", other.kind());
                tx.send(&Msg::Err(text.clone())).await?;
                return Err(io::Error::new(io::ErrorKind::InvalidData, text));
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tx.send(&Msg::Err(e.to_string())).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        debug!(call = request.name(); "serving call");

        let response = match request {
            Request::Ping(req) => Response::Ping(self.health.ping(&req)),
            Request::Reconnect(req) => Response::Reconnect(self.health.reconnect(&req)),
            Request::GetConnectionStatus(req) => {
                Response::ConnectionStatus(self.health.connection_status(&req))
            }
            Request::StartTraining(req) => {
                Response::TrainingControl(self.streaming.start_training(&req))
            }
            Request::StopTraining(req) => {
                Response::TrainingControl(self.streaming.stop_training(&req))
            }
            Request::GetTrainingStatus => {
                Response::TrainingStatus(self.streaming.training_status())
            }
            Request::SendDashboardStatus(status) => {
                Response::StatusAck(self.streaming.dashboard_status(&status))
            }
            Request::StreamMetrics(req) => {
                return tokio::select! {
                    res = self.streaming.stream_metrics(&req, &mut tx) => res,
                    res = rx.closed() => res,
                    _ = token.cancelled() => Ok(()),
                };
            }
            Request::StreamImages(req) => {
                return tokio::select! {
                    res = self.streaming.stream_images(&req, &mut tx) => res,
                    res = rx.closed() => res,
                    _ = token.cancelled() => Ok(()),
                };
            }
        };

        tx.send(&Msg::Response(response)).await?;
        tx.shutdown().await
    }
}
