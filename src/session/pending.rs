use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::oauth1::RequestToken;

/// A request token waiting for its callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    pub token: RequestToken,
    inserted_at: Instant,
}

/// Result of [`PendingExchangeStore::claim`].
#[derive(Debug, PartialEq, Eq)]
pub enum Claim {
    Claimed(PendingExchange),
    /// The stored handshake is for a different request token. It stays put.
    Mismatch,
    Missing,
}

/// In-flight handshakes keyed by temporary session id.
///
/// Every operation runs under one lock, so a lookup followed by a removal
/// can never interleave with another request's removal.
pub struct PendingExchangeStore {
    entries: Mutex<HashMap<String, PendingExchange>>,
    ttl: Duration,
    capacity: usize,
}

impl PendingExchangeStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingExchange>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `token` for `id`, replacing any earlier handshake for that id.
    pub fn put(&self, id: &str, token: RequestToken) {
        let mut entries = self.lock();
        let now = Instant::now();

        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.ttl);

        if !entries.contains_key(id) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                tracing::warn!(capacity = self.capacity, "Pending exchange store full, evicting oldest entry");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            id.to_string(),
            PendingExchange {
                token,
                inserted_at: now,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<RequestToken> {
        let mut entries = self.lock();
        let live = entries
            .get(id)
            .filter(|entry| self.is_live(entry))
            .map(|entry| entry.token.clone());
        if live.is_none() {
            entries.remove(id);
        }
        live
    }

    /// Removes and returns the entry for `id` in a single step.
    pub fn remove(&self, id: &str) -> Option<RequestToken> {
        self.lock()
            .remove(id)
            .filter(|entry| self.is_live(entry))
            .map(|entry| entry.token)
    }

    /// Takes the entry for `id` only if it was issued for `oauth_token`.
    pub fn claim(&self, id: &str, oauth_token: &str) -> Claim {
        let mut entries = self.lock();
        let state = entries
            .get(id)
            .map(|entry| (self.is_live(entry), entry.token.token == oauth_token));

        match state {
            None => Claim::Missing,
            Some((false, _)) => {
                entries.remove(id);
                Claim::Missing
            }
            Some((true, false)) => Claim::Mismatch,
            Some((true, true)) => entries.remove(id).map_or(Claim::Missing, Claim::Claimed),
        }
    }

    /// Puts a claimed entry back unless `id` has started a newer handshake
    /// meanwhile. The entry keeps its original expiry.
    pub fn restore(&self, id: &str, exchange: PendingExchange) -> bool {
        if !self.is_live(&exchange) {
            return false;
        }
        let mut entries = self.lock();
        if entries.get(id).is_some_and(|existing| self.is_live(existing)) {
            return false;
        }
        entries.insert(id.to_string(), exchange);
        true
    }

    fn is_live(&self, entry: &PendingExchange) -> bool {
        entry.inserted_at.elapsed() < self.ttl
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
