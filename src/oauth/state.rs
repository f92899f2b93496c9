//! Single-use CSRF state tokens for the authorization-code flow.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One year; longer TTLs are clamped.
const MAX_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Result of presenting a state value at callback time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCheck {
    /// Matched an outstanding state for this session; it has been consumed.
    Valid,
    /// Unknown value, already consumed, or owned by another session.
    Mismatch,
    /// Matched, but past its expiry; it has been consumed.
    Expired,
}

/// Storage for outstanding OAuth states.
///
/// `consume` must compare and delete under a single critical section so two
/// callbacks racing on the same state cannot both succeed.
pub trait StateStore: Send + Sync {
    /// Issue a fresh state bound to `session_id`, replacing any earlier one.
    fn issue(&self, session_id: &str) -> String;

    fn consume(&self, session_id: &str, state: &str) -> StateCheck;

    /// Drop expired entries, returning how many were removed.
    fn purge_expired(&self) -> usize;
}

#[derive(Debug, Clone)]
struct StateEntry {
    session_id: String,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryStateStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, StateEntry>>,
}

impl InMemoryStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(MAX_TTL_SECS);
        Self::new(Duration::seconds(secs))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, state: &str) -> bool {
        self.entries
            .lock()
            .map(|e| e.contains_key(state))
            .unwrap_or(false)
    }
}

fn generate_state() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

impl StateStore for InMemoryStateStore {
    fn issue(&self, session_id: &str) -> String {
        let state = generate_state();
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|_, e| e.session_id != session_id);
        entries.insert(
            state.clone(),
            StateEntry {
                session_id: session_id.to_string(),
                expires_at: now + self.ttl,
            },
        );
        state
    }

    fn consume(&self, session_id: &str, state: &str) -> StateCheck {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let owned_by_session = entries
            .get(state)
            .is_some_and(|e| e.session_id == session_id);
        if !owned_by_session {
            return StateCheck::Mismatch;
        }
        match entries.remove(state) {
            Some(entry) if entry.expires_at > Utc::now() => StateCheck::Valid,
            Some(_) => StateCheck::Expired,
            None => StateCheck::Mismatch,
        }
    }

    fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_issued_state_is_unguessable_and_unique() {
        let store = InMemoryStateStore::with_ttl_secs(600);
        let a = store.issue("s1");
        let b = store.issue("s2");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_consume_once() {
        let store = InMemoryStateStore::with_ttl_secs(600);
        let state = store.issue("s1");
        assert_eq!(store.consume("s1", &state), StateCheck::Valid);
        assert_eq!(store.consume("s1", &state), StateCheck::Mismatch);
        assert!(store.is_empty());
    }

    #[test]
    fn test_wrong_session_leaves_state_untouched() {
        let store = InMemoryStateStore::with_ttl_secs(600);
        let state = store.issue("victim");
        assert_eq!(store.consume("attacker", &state), StateCheck::Mismatch);
        assert!(store.contains(&state));
        assert_eq!(store.consume("victim", &state), StateCheck::Valid);
    }

    #[test]
    fn test_unknown_value_leaves_other_states_untouched() {
        let store = InMemoryStateStore::with_ttl_secs(600);
        let state = store.issue("s1");
        assert_eq!(store.consume("s1", "forged"), StateCheck::Mismatch);
        assert!(store.contains(&state));
    }

    #[test]
    fn test_reissue_replaces_previous_state_for_session() {
        let store = InMemoryStateStore::with_ttl_secs(600);
        let first = store.issue("s1");
        let second = store.issue("s1");
        assert!(!store.contains(&first));
        assert!(store.contains(&second));
    }

    #[test]
    fn test_expired_state_is_consumed_and_rejected() {
        let store = InMemoryStateStore::new(Duration::seconds(-1));
        let state = store.issue("s1");
        assert_eq!(store.consume("s1", &state), StateCheck::Expired);
        assert!(!store.contains(&state));
    }

    #[test]
    fn test_purge_expired() {
        let store = InMemoryStateStore::new(Duration::seconds(-1));
        store.issue("s1");
        store.issue("s2");
        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_consume_has_single_winner() {
        let store = Arc::new(InMemoryStateStore::with_ttl_secs(600));
        let state = store.issue("s1");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let state = state.clone();
                std::thread::spawn(move || store.consume("s1", &state))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c == StateCheck::Valid)
            .count();
        assert_eq!(wins, 1);
    }
}
