use comms::{
    clock,
    rpc::{
        ConnectionStatus, PingRequest, PingResponse, ReconnectRequest, ReconnectResponse,
        ReconnectStatus, StatusRequest,
    },
};
use log::{info, warn};

use crate::registry::SessionRegistry;

/// How long a resumed client is told to wait before its next attempt.
const RETRY_AFTER_MS: u64 = 1000;

/// Answers heartbeats and authorizes reconnections.
///
/// The producer never refuses a live client on its own, the only refusal is an
/// attempt number past `max_retries`.
#[derive(Debug)]
pub struct HealthService {
    registry: SessionRegistry,
    max_retries: u32,
}

impl HealthService {
    /// Creates a new `HealthService`.
    ///
    /// # Arguments
    /// * `registry` - The session table this service owns.
    /// * `max_retries` - The amount of reconnection attempts a campaign may make.
    pub fn new(registry: SessionRegistry, max_retries: u32) -> Self {
        Self {
            registry,
            max_retries,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Registers unseen clients and echoes their current retry count.
    pub fn ping(&self, req: &PingRequest) -> PingResponse {
        let now = clock::now_ms();
        let session = self.registry.touch(&req.client_id, now);

        PingResponse {
            alive: true,
            timestamp_ms: now,
            retry_count: session.retry_count,
            max_retries: self.max_retries,
        }
    }

    /// Authorizes one attempt of a reconnection campaign.
    ///
    /// The reported `last_known_step` is trusted verbatim and echoed back as the
    /// resume point, there is no check against what the source still retains.
    pub fn reconnect(&self, req: &ReconnectRequest) -> ReconnectResponse {
        let now = clock::now_ms();
        let attempt = req.attempt_number;

        if attempt > self.max_retries {
            warn!(
                client_id = req.client_id.as_str(), attempt = attempt;
                "refusing reconnection, max retries exceeded"
            );
            self.registry.record_refused(&req.client_id, attempt, now);

            return ReconnectResponse {
                success: false,
                resume_step: 0,
                message: "Max retries exceeded".to_string(),
                attempts_remaining: 0,
                retry_after_ms: 0,
                status: ReconnectStatus::MaxRetriesExceeded,
            };
        }

        info!(
            client_id = req.client_id.as_str(), attempt = attempt, step = req.last_known_step;
            "client reconnected"
        );
        self.registry
            .record_resumed(&req.client_id, req.last_known_step, now);

        ReconnectResponse {
            success: true,
            resume_step: req.last_known_step,
            message: "Reconnected successfully".to_string(),
            attempts_remaining: self.max_retries - attempt,
            retry_after_ms: RETRY_AFTER_MS,
            status: ReconnectStatus::Success,
        }
    }

    /// A side effect free read of the client's session.
    pub fn connection_status(&self, req: &StatusRequest) -> ConnectionStatus {
        match self.registry.get(&req.client_id) {
            Some(session) => ConnectionStatus {
                is_connected: true,
                failed_attempts: session.retry_count,
                max_allowed_attempts: self.max_retries,
                connected_since_ms: session.connected_since_ms,
                last_failure_ms: session.last_failure_ms,
                status_message: "Connected".to_string(),
            },
            None => ConnectionStatus {
                is_connected: false,
                failed_attempts: 0,
                max_allowed_attempts: self.max_retries,
                connected_since_ms: 0,
                last_failure_ms: 0,
                status_message: "Disconnected".to_string(),
            },
        }
    }
}
