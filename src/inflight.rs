/// Supersession of in-flight match requests.
///
/// A caller-owned registry: starting a request for a user cancels that user's
/// previous request, if one is still running. Each request gets its own
/// `CancellationToken`; nothing here is process-global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Handle for one registered request.
#[derive(Debug, Clone)]
pub struct MatchTicket {
    user_id: String,
    generation: u64,
    token: CancellationToken,
}

impl MatchTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Default)]
pub struct InFlightMatches {
    requests: Mutex<HashMap<String, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
}

impl InFlightMatches {
    pub fn new() -> Self {
        InFlightMatches::default()
    }

    /// Register a new request for `user_id`, cancelling the one it supersedes.
    pub fn begin(&self, user_id: &str) -> MatchTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, previous)) = requests.insert(user_id.to_string(), (generation, token.clone())) {
            tracing::info!(user_id, "Cancelling superseded match request");
            previous.cancel();
        }

        MatchTicket { user_id: user_id.to_string(), generation, token }
    }

    /// Unregister a finished request. A newer request for the same user is left alone.
    pub fn finish(&self, ticket: &MatchTicket) {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        if requests.get(&ticket.user_id).map(|(g, _)| *g) == Some(ticket.generation) {
            requests.remove(&ticket.user_id);
        }
    }

    /// Number of users with a request in flight.
    pub fn len(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
