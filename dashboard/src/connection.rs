use std::{
    fmt,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
    time::Duration,
};

use comms::{
    clock,
    rpc::{PingRequest, PingResponse, ReconnectRequest, ReconnectResponse},
};
use log::{debug, error, info, warn};
use tokio::{sync::watch, time};
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::BackoffPolicy,
    error::{ClientErr, Result},
    rpc::HealthApi,
};

/// Where a consumer stands with respect to its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connected,
    Disconnected,
    Reconnecting,
    /// Terminal, reached once a campaign runs out of attempts.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Uninitialized => "UNINITIALIZED",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Reconnecting => "RECONNECTING",
            ConnectionState::Failed => "FAILED",
        };

        f.write_str(name)
    }
}

/// The consumer's connection lifecycle.
///
/// Owns the connection state, the current campaign's retry count and the resume
/// cursor both streams share. Every method takes `&self`, so one manager can be
/// shared behind an `Arc` by the stream loops and the heartbeat.
pub struct ConnectionManager<H: HealthApi> {
    api: H,
    client_id: String,
    policy: BackoffPolicy,
    state: watch::Sender<ConnectionState>,
    retry_count: AtomicU32,
    last_step: AtomicU64,
}

impl<H: HealthApi> ConnectionManager<H> {
    /// Creates a new `ConnectionManager` in the `Uninitialized` state.
    ///
    /// # Arguments
    /// * `api` - The producer's health surface.
    /// * `client_id` - This consumer's identity, stable for the whole session.
    /// * `policy` - The reconnection backoff policy.
    pub fn new(api: H, client_id: impl Into<String>, policy: BackoffPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Uninitialized);

        Self {
            api,
            client_id: client_id.into(),
            policy,
            state,
            retry_count: AtomicU32::new(0),
            last_step: AtomicU64::new(0),
        }
    }

    pub fn api(&self) -> &H {
        &self.api
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The current campaign's attempt number, zero while connected.
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Acquire)
    }

    /// The highest step delivered on either stream.
    pub fn last_step(&self) -> u64 {
        self.last_step.load(Ordering::Acquire)
    }

    /// Moves the resume cursor forward to `step`, it never moves back.
    pub fn advance_cursor(&self, step: u64) {
        self.last_step.fetch_max(step, Ordering::AcqRel);
    }

    /// Marks the connection as lost, unless a campaign is already running or over.
    pub fn mark_disconnected(&self) {
        self.state.send_if_modified(|state| match state {
            ConnectionState::Connected | ConnectionState::Uninitialized => {
                *state = ConnectionState::Disconnected;
                true
            }
            _ => false,
        });
    }

    /// Takes a connection lost to a missed heartbeat back to `Connected`.
    fn mark_recovered(&self) {
        let recovered = self.state.send_if_modified(|state| match state {
            ConnectionState::Disconnected => {
                *state = ConnectionState::Connected;
                true
            }
            _ => false,
        });

        if recovered {
            info!(client_id = self.client_id.as_str(); "heartbeat recovered");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.state.send_replace(state);
        if prev != state {
            debug!(client_id = self.client_id.as_str(); "connection {prev} -> {state}");
        }
    }

    fn ping_request(&self) -> PingRequest {
        PingRequest {
            client_id: self.client_id.clone(),
            timestamp_ms: clock::now_ms(),
        }
    }

    /// Performs the initial handshake.
    ///
    /// # Returns
    /// The producer's ping answer. A transport failure leaves the state untouched,
    /// an answer with `alive == false` is `ClientErr::NotAlive`.
    pub async fn connect(&self) -> Result<PingResponse> {
        let res = self.api.ping(self.ping_request()).await?;

        if !res.alive {
            return Err(ClientErr::NotAlive);
        }

        self.retry_count.store(0, Ordering::Release);
        self.set_state(ConnectionState::Connected);
        info!(
            client_id = self.client_id.as_str(),
            max_retries = res.max_retries;
            "connected"
        );

        Ok(res)
    }

    /// Runs a reconnection campaign.
    ///
    /// Attempt `n` first waits `policy.wait(n)` and then asks the producer to resume
    /// from the current cursor. Refusals and transport failures both count as a
    /// spent attempt.
    ///
    /// # Returns
    /// The step to resume from, or `ClientErr::MaxRetriesExceeded` once every attempt
    /// was spent, leaving the manager in the terminal `Failed` state.
    pub async fn reconnect(&self) -> Result<u64> {
        self.set_state(ConnectionState::Reconnecting);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if !self.policy.allows(attempt) {
                let attempts = attempt - 1;
                self.set_state(ConnectionState::Failed);
                error!(
                    client_id = self.client_id.as_str(),
                    attempts = attempts;
                    "max reconnection attempts reached, giving up"
                );

                return Err(ClientErr::MaxRetriesExceeded { attempts });
            }

            self.retry_count.store(attempt, Ordering::Release);
            let wait = self.policy.wait(attempt);
            info!(
                attempt = attempt,
                max_retries = self.policy.max_retries,
                wait_ms = wait.as_millis() as u64;
                "reconnection attempt"
            );
            time::sleep(wait).await;

            match self.api.reconnect(self.reconnect_request(attempt)).await {
                Ok(res) if res.success => {
                    self.resumed(&res);
                    return Ok(self.last_step());
                }
                Ok(res) => warn!(
                    attempt = attempt,
                    attempts_remaining = res.attempts_remaining;
                    "reconnection refused: {}",
                    res.message
                ),
                Err(e) => warn!(attempt = attempt; "reconnection attempt failed: {e}"),
            }
        }
    }

    fn reconnect_request(&self, attempt: u32) -> ReconnectRequest {
        ReconnectRequest {
            client_id: self.client_id.clone(),
            last_known_step: self.last_step(),
            attempt_number: attempt,
        }
    }

    fn resumed(&self, res: &ReconnectResponse) {
        // the other stream may have delivered past the echoed step meanwhile
        self.advance_cursor(res.resume_step);
        self.retry_count.store(0, Ordering::Release);
        self.set_state(ConnectionState::Connected);
        info!(
            client_id = self.client_id.as_str(),
            resume_step = res.resume_step;
            "reconnected"
        );
    }

    /// Sends a single heartbeat.
    ///
    /// # Returns
    /// Whether the producer answered alive, transport failures count as not alive.
    pub async fn heartbeat(&self) -> bool {
        match self.api.ping(self.ping_request()).await {
            Ok(res) => res.alive,
            Err(e) => {
                debug!("heartbeat failed: {e}");
                false
            }
        }
    }

    /// Pings the producer every `every` until `token` is cancelled.
    ///
    /// A failed heartbeat marks the connection as lost, reconnecting is left to the
    /// stream loops.
    pub async fn heartbeat_loop(&self, every: Duration, token: CancellationToken) {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            if self.state() == ConnectionState::Failed {
                return;
            }

            if self.heartbeat().await {
                self.mark_recovered();
            } else {
                warn!(client_id = self.client_id.as_str(); "heartbeat failed");
                self.mark_disconnected();
            }
        }
    }
}
