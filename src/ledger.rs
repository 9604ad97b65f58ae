//! Balance ledger.
//!
//! Wraps the store with per-user serialization: every mutation of a
//! user's balance first takes that user's async mutex, so concurrent
//! requests for the same user queue instead of racing. Different users
//! proceed in parallel.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::storage::Store;
use crate::types::{CasinoError, Chips, GameKind, UserAccount, UserId};

/// Lazily-populated map of async mutexes keyed by `K`. Guards are
/// owned so they can be held across awaits without borrowing the map.
pub struct LockMap<K> {
    inner: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> LockMap<K> {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        lock.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for LockMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// All money movement goes through here.
pub struct Ledger {
    store: Arc<Store>,
    locks: LockMap<UserId>,
    starting_balance: Chips,
}

impl Ledger {
    pub fn new(store: Arc<Store>, starting_balance: Chips) -> Self {
        Self {
            store,
            locks: LockMap::new(),
            starting_balance,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Serialize all balance mutations for one user.
    pub async fn lock_user(&self, user: UserId) -> OwnedMutexGuard<()> {
        self.locks.acquire(user).await
    }

    /// Current account, creating it with the starting balance on first
    /// reference.
    pub async fn account(&self, user: UserId) -> Result<UserAccount, CasinoError> {
        self.store.ensure_user(user, self.starting_balance).await
    }

    pub async fn balance(&self, user: UserId) -> Result<Chips, CasinoError> {
        Ok(self.account(user).await?.balance)
    }

    /// Settle one game round atomically. Caller holds the user lock.
    /// `reserved` is a stake already moved to the house at round open.
    #[allow(clippy::too_many_arguments)]
    pub async fn settle_round(
        &self,
        user: UserId,
        game: GameKind,
        bet: Chips,
        payout: Chips,
        reserved: Chips,
        result: &str,
        biased: bool,
        now: DateTime<Utc>,
    ) -> Result<Chips, CasinoError> {
        let new_balance = self
            .store
            .settle_round(user, game, bet, payout, reserved, result, biased, now)
            .await?;
        debug!(user, %game, bet, payout, biased, new_balance, "Round settled");
        Ok(new_balance)
    }

    /// Zero-sum injection against the house. Caller holds the user lock.
    pub async fn transfer(&self, user: UserId, delta: Chips) -> Result<Chips, CasinoError> {
        self.account(user).await?;
        let new_balance = self.store.transfer(user, delta).await?;
        debug!(user, delta, new_balance, "Transfer applied");
        Ok(new_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    async fn ledger() -> Ledger {
        let store = Arc::new(Store::open_in_memory(100_000, 1000).await.unwrap());
        Ledger::new(store, 1000)
    }

    #[tokio::test]
    async fn test_account_created_lazily() {
        let ledger = ledger().await;
        assert_eq!(ledger.balance(7).await.unwrap(), 1000);
        // second call does not reset
        ledger.transfer(7, -100).await.unwrap();
        assert_eq!(ledger.balance(7).await.unwrap(), 900);
    }

    #[tokio::test]
    async fn test_lock_map_serializes_same_key() {
        let locks = Arc::new(LockMap::<i64>::new());
        let counter = Arc::new(StdMutex::new(0i64));
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let locks = locks.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let _guard = locks.acquire(1).await;
                    let before = *counter.lock().unwrap();
                    tokio::task::yield_now().await;
                    *counter.lock().unwrap() = before + 1;
                })
            })
            .collect();
        join_all(tasks).await;
        // without serialization the read-yield-write pattern loses updates
        assert_eq!(*counter.lock().unwrap(), 50);
    }

    #[tokio::test]
    async fn test_concurrent_transfers_conserve_total() {
        let store = Arc::new(Store::open_in_memory(100_000, 1000).await.unwrap());
        let ledger = Arc::new(Ledger::new(store.clone(), 1000));
        ledger.account(1).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    let _guard = ledger.lock_user(1).await;
                    let delta = if i % 2 == 0 { 50 } else { -50 };
                    ledger.transfer(1, delta).await.unwrap();
                })
            })
            .collect();
        join_all(tasks).await;

        assert_eq!(ledger.balance(1).await.unwrap(), 1000);
        assert_eq!(store.house_balance().await.unwrap(), 100_000);
    }
}
