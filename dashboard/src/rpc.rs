use std::marker::PhantomData;

use async_trait::async_trait;
use comms::{
    FrameReceiver, FrameSender,
    msg::Msg,
    rpc::{
        ConnectionStatus, DashboardMetrics, ImageBatch, PingRequest, PingResponse,
        ReconnectRequest, ReconnectResponse, Request, Response, StatusAck, StatusRequest,
        TrainingControlRequest, TrainingControlResponse, TrainingMetrics,
        TrainingStatusResponse,
    },
};
use log::debug;
use tokio::net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};

use crate::error::{ClientErr, Result};

type NetRx = FrameReceiver<OwnedReadHalf>;
type NetTx = FrameSender<OwnedWriteHalf>;

/// The health surface a `ConnectionManager` drives.
#[async_trait]
pub trait HealthApi: Send + Sync {
    async fn ping(&self, req: PingRequest) -> Result<PingResponse>;

    async fn reconnect(&self, req: ReconnectRequest) -> Result<ReconnectResponse>;
}

/// An item one of the two streaming calls yields.
pub trait StreamItem: Sized + Send {
    /// The training step the item belongs to.
    fn step(&self) -> u64;

    fn from_msg(msg: Msg) -> Result<Self>;
}

impl StreamItem for TrainingMetrics {
    fn step(&self) -> u64 {
        self.step
    }

    fn from_msg(msg: Msg) -> Result<Self> {
        match msg {
            Msg::Metrics(metrics) => Ok(metrics),
            Msg::Err(text) => Err(ClientErr::Remote(text)),
            other => Err(ClientErr::UnexpectedResponse {
                expected: "data/metrics",
                got: other.kind(),
            }),
        }
    }
}

impl StreamItem for ImageBatch {
    fn step(&self) -> u64 {
        self.step
    }

    fn from_msg(msg: Msg) -> Result<Self> {
        match msg {
            Msg::Images(batch) => Ok(batch),
            Msg::Err(text) => Err(ClientErr::Remote(text)),
            other => Err(ClientErr::UnexpectedResponse {
                expected: "data/images",
                got: other.kind(),
            }),
        }
    }
}

/// An open streaming call.
///
/// Dropping it closes the connection, which the producer takes as cancellation.
pub struct Subscription<T: StreamItem> {
    rx: NetRx,
    // the write half must outlive the stream, dropping it half-closes the socket
    _tx: NetTx,
    _item: PhantomData<T>,
}

impl<T: StreamItem> Subscription<T> {
    /// Waits for the next item.
    ///
    /// # Returns
    /// The item, or an error when the transport fails. Streams have no end marker,
    /// so a closed connection is an error too.
    pub async fn next(&mut self) -> Result<T> {
        let msg = self.rx.recv::<Msg>().await?;
        T::from_msg(msg)
    }
}

/// A client for the producer's calls, one connection per call.
#[derive(Debug, Clone)]
pub struct RpcClient {
    addr: String,
}

impl RpcClient {
    /// Creates a new `RpcClient`, no connection is made until the first call.
    ///
    /// # Arguments
    /// * `addr` - The producer's address as `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn open(&self, request: Request) -> Result<(NetRx, NetTx)> {
        debug!(call = request.name(), addr = self.addr.as_str(); "opening call");

        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;

        let (rx, tx) = stream.into_split();
        let (rx, mut tx) = comms::channel(rx, tx);
        tx.send(&Msg::Request(request)).await?;

        Ok((rx, tx))
    }

    /// Issues a unary call and waits for its single response.
    async fn call(&self, request: Request) -> Result<Response> {
        let (mut rx, _tx) = self.open(request).await?;

        match rx.recv::<Msg>().await? {
            Msg::Response(response) => Ok(response),
            Msg::Err(text) => Err(ClientErr::Remote(text)),
            other => Err(ClientErr::UnexpectedResponse {
                expected: "response",
                got: other.kind(),
            }),
        }
    }

    /// Opens a streaming call.
    ///
    /// # Arguments
    /// * `request` - A `StreamMetrics` or `StreamImages` request carrying the resume
    ///   cursor, only steps above it arrive.
    pub async fn subscribe<T: StreamItem>(&self, request: Request) -> Result<Subscription<T>> {
        let (rx, tx) = self.open(request).await?;

        Ok(Subscription {
            rx,
            _tx: tx,
            _item: PhantomData,
        })
    }

    pub async fn connection_status(&self, client_id: &str) -> Result<ConnectionStatus> {
        let req = StatusRequest {
            client_id: client_id.to_string(),
        };

        match self.call(Request::GetConnectionStatus(req)).await? {
            Response::ConnectionStatus(status) => Ok(status),
            other => Err(mismatch("connection_status", &other)),
        }
    }

    pub async fn start_training(&self, client_id: &str) -> Result<TrainingControlResponse> {
        let req = TrainingControlRequest {
            client_id: client_id.to_string(),
        };

        match self.call(Request::StartTraining(req)).await? {
            Response::TrainingControl(res) => Ok(res),
            other => Err(mismatch("training_control", &other)),
        }
    }

    pub async fn stop_training(&self, client_id: &str) -> Result<TrainingControlResponse> {
        let req = TrainingControlRequest {
            client_id: client_id.to_string(),
        };

        match self.call(Request::StopTraining(req)).await? {
            Response::TrainingControl(res) => Ok(res),
            other => Err(mismatch("training_control", &other)),
        }
    }

    pub async fn training_status(&self) -> Result<TrainingStatusResponse> {
        match self.call(Request::GetTrainingStatus).await? {
            Response::TrainingStatus(status) => Ok(status),
            other => Err(mismatch("training_status", &other)),
        }
    }

    /// Reports the dashboard's rendering performance.
    pub async fn send_dashboard_status(&self, status: DashboardMetrics) -> Result<StatusAck> {
        match self.call(Request::SendDashboardStatus(status)).await? {
            Response::StatusAck(ack) => Ok(ack),
            other => Err(mismatch("status_ack", &other)),
        }
    }
}

#[async_trait]
impl HealthApi for RpcClient {
    async fn ping(&self, req: PingRequest) -> Result<PingResponse> {
        match self.call(Request::Ping(req)).await? {
            Response::Ping(res) => Ok(res),
            other => Err(mismatch("ping", &other)),
        }
    }

    async fn reconnect(&self, req: ReconnectRequest) -> Result<ReconnectResponse> {
        match self.call(Request::Reconnect(req)).await? {
            Response::Reconnect(res) => Ok(res),
            other => Err(mismatch("reconnect", &other)),
        }
    }
}

fn mismatch(expected: &'static str, got: &Response) -> ClientErr {
    ClientErr::UnexpectedResponse {
        expected,
        got: got.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_items_reject_other_kinds() {
        let err = TrainingMetrics::from_msg(Msg::Err("boom".into())).unwrap_err();
        assert!(matches!(err, ClientErr::Remote(text) if text == "boom"));

        let err = ImageBatch::from_msg(Msg::Metrics(TrainingMetrics {
            step: 1,
            loss: 1.0,
            accuracy: 0.5,
            timestamp_ms: 0,
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ClientErr::UnexpectedResponse {
                expected: "data/images",
                got: "data/metrics"
            }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_producer_is_an_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RpcClient::new(addr.to_string());
        let err = client.training_status().await.unwrap_err();

        assert!(matches!(err, ClientErr::Io(_)));
    }
}
