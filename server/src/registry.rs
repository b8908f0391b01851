use std::collections::HashMap;

use log::debug;
use parking_lot::RwLock;

/// What the producer remembers about one dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientSession {
    pub retry_count: u32,
    pub connected_since_ms: u64,
    pub last_known_step: u64,
    pub last_failure_ms: u64,
}

/// When sessions are dropped from the registry.
///
/// `Never` keeps every session until the process exits, so the table grows with
/// every distinct client id ever seen. Long lived producers facing many short
/// lived dashboards will leak one entry per dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    #[default]
    Never,
}

/// The concurrent table of known clients, keyed by client id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, ClientSession>>,
    policy: EvictionPolicy,
}

impl SessionRegistry {
    /// Creates a new empty `SessionRegistry`.
    ///
    /// # Arguments
    /// * `policy` - How stale sessions are evicted.
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Returns the session for `client_id`, registering it first if it was unseen.
    ///
    /// # Arguments
    /// * `client_id` - The client's opaque identifier.
    /// * `now_ms` - Used as `connected_since` for new sessions.
    ///
    /// # Returns
    /// A copy of the stored session.
    pub fn touch(&self, client_id: &str, now_ms: u64) -> ClientSession {
        if let Some(session) = self.sessions.read().get(client_id) {
            return *session;
        }

        let mut sessions = self.sessions.write();
        *sessions.entry(client_id.to_string()).or_insert_with(|| {
            debug!(client_id = client_id; "registered new client");
            ClientSession {
                connected_since_ms: now_ms,
                ..Default::default()
            }
        })
    }

    pub fn get(&self, client_id: &str) -> Option<ClientSession> {
        self.sessions.read().get(client_id).copied()
    }

    /// Records a reconnection attempt the producer refused.
    pub fn record_refused(&self, client_id: &str, attempt: u32, now_ms: u64) {
        self.update(client_id, now_ms, |session| {
            session.retry_count = attempt;
            session.last_failure_ms = now_ms;
        });
    }

    /// Records a reconnection attempt the producer accepted, closing the campaign.
    pub fn record_resumed(&self, client_id: &str, last_known_step: u64, now_ms: u64) {
        self.update(client_id, now_ms, |session| {
            session.retry_count = 0;
            session.connected_since_ms = now_ms;
            session.last_known_step = last_known_step;
        });
    }

    /// Drops stale sessions according to the eviction policy.
    ///
    /// # Returns
    /// The amount of evicted sessions.
    pub fn sweep(&self) -> usize {
        match self.policy {
            EvictionPolicy::Never => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, client_id: &str, now_ms: u64, f: F)
    where
        F: FnOnce(&mut ClientSession),
    {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(client_id.to_string())
            .or_insert_with(|| ClientSession {
                connected_since_ms: now_ms,
                ..Default::default()
            });

        f(session);
    }
}
