//! Open blackjack sessions.
//!
//! In-memory only: a process restart abandons open rounds and the
//! house keeps the reserved stake. At most one session per user, and
//! at most one in-flight action per session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::games::blackjack::BlackjackTable;
use crate::types::{CasinoError, UserId};

pub struct SessionRegistry {
    inner: StdMutex<HashMap<UserId, Arc<Mutex<BlackjackTable>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    /// Register a freshly dealt table. A second open while one exists
    /// is rejected, never silently replaced.
    pub fn open(&self, user: UserId, table: BlackjackTable) -> Result<(), CasinoError> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(&user) {
            return Err(CasinoError::SessionAlreadyOpen(user));
        }
        map.insert(user, Arc::new(Mutex::new(table)));
        Ok(())
    }

    /// Claim the session for one action. A concurrent holder means an
    /// action is already in flight and this one is rejected.
    pub fn claim(&self, user: UserId) -> Result<OwnedMutexGuard<BlackjackTable>, CasinoError> {
        let table = {
            let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.get(&user)
                .cloned()
                .ok_or(CasinoError::SessionNotFound(user))?
        };
        table
            .try_lock_owned()
            .map_err(|_| CasinoError::ActionInFlight)
    }

    pub fn contains(&self, user: UserId) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.contains_key(&user)
    }

    pub fn close(&self, user: UserId) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&user);
    }

    pub fn open_count(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::HouseBias;

    fn table(user: UserId) -> BlackjackTable {
        let policy = HouseBias::seeded(0.2, 1);
        BlackjackTable::deal(user, 100, 1, false, &policy).0
    }

    #[test]
    fn test_second_open_rejected() {
        let registry = SessionRegistry::new();
        registry.open(1, table(1)).unwrap();
        let err = registry.open(1, table(1)).unwrap_err();
        assert!(matches!(err, CasinoError::SessionAlreadyOpen(1)));
        assert_eq!(registry.open_count(), 1);
    }

    #[test]
    fn test_claim_missing_session() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.claim(9).unwrap_err(),
            CasinoError::SessionNotFound(9)
        ));
    }

    #[test]
    fn test_concurrent_claim_rejected() {
        let registry = SessionRegistry::new();
        registry.open(1, table(1)).unwrap();
        let guard = registry.claim(1).unwrap();
        assert!(matches!(
            registry.claim(1).unwrap_err(),
            CasinoError::ActionInFlight
        ));
        drop(guard);
        assert!(registry.claim(1).is_ok());
    }

    #[test]
    fn test_close_frees_slot() {
        let registry = SessionRegistry::new();
        registry.open(1, table(1)).unwrap();
        registry.close(1);
        registry.open(1, table(1)).unwrap();
    }
}
