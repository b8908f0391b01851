//! The calls both halves agree on.
//!
//! Every call is a single `Request` frame on a fresh connection. Unary calls are
//! answered with a single `Response` frame, the two streaming calls with an open
//! ended sequence of `Msg::Metrics` or `Msg::Images` frames.

pub mod health;
pub mod training;

use serde::{Deserialize, Serialize};

pub use health::{
    ConnectionStatus, PingRequest, PingResponse, ReconnectRequest, ReconnectResponse,
    ReconnectStatus, StatusRequest,
};
pub use training::{
    DashboardMetrics, Image, ImageBatch, ImageBatchRequest, LabeledImage, MetricsRequest,
    StatusAck, TrainingControlRequest, TrainingControlResponse, TrainingMetrics,
    TrainingStatusResponse,
};

/// Every call a dashboard can issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Ping(PingRequest),
    Reconnect(ReconnectRequest),
    GetConnectionStatus(StatusRequest),
    StartTraining(TrainingControlRequest),
    StopTraining(TrainingControlRequest),
    GetTrainingStatus,
    StreamMetrics(MetricsRequest),
    StreamImages(ImageBatchRequest),
    SendDashboardStatus(DashboardMetrics),
}

impl Request {
    /// The call's name, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping(_) => "ping",
            Request::Reconnect(_) => "reconnect",
            Request::GetConnectionStatus(_) => "get_connection_status",
            Request::StartTraining(_) => "start_training",
            Request::StopTraining(_) => "stop_training",
            Request::GetTrainingStatus => "get_training_status",
            Request::StreamMetrics(_) => "stream_metrics",
            Request::StreamImages(_) => "stream_images",
            Request::SendDashboardStatus(_) => "send_dashboard_status",
        }
    }
}

/// The answers to every unary call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ping(PingResponse),
    Reconnect(ReconnectResponse),
    ConnectionStatus(ConnectionStatus),
    TrainingControl(TrainingControlResponse),
    TrainingStatus(TrainingStatusResponse),
    StatusAck(StatusAck),
}

impl Response {
    /// The response's name, used for logging and mismatch reports.
    pub fn name(&self) -> &'static str {
        match self {
            Response::Ping(_) => "ping",
            Response::Reconnect(_) => "reconnect",
            Response::ConnectionStatus(_) => "connection_status",
            Response::TrainingControl(_) => "training_control",
            Response::TrainingStatus(_) => "training_status",
            Response::StatusAck(_) => "status_ack",
        }
    }
}
