use serde::{Deserialize, Serialize};

/// Heartbeat sent by a dashboard, doubles as the initial handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    pub client_id: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub alive: bool,
    pub timestamp_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
}

/// One attempt of a reconnection campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectRequest {
    pub client_id: String,
    pub last_known_step: u64,
    pub attempt_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconnectStatus {
    Success,
    MaxRetriesExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectResponse {
    pub success: bool,
    pub resume_step: u64,
    pub message: String,
    pub attempts_remaining: u32,
    pub retry_after_ms: u64,
    pub status: ReconnectStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub client_id: String,
}

/// A read-only view over the producer's bookkeeping for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub failed_attempts: u32,
    pub max_allowed_attempts: u32,
    pub connected_since_ms: u64,
    pub last_failure_ms: u64,
    pub status_message: String,
}
