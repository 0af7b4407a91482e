//! In-process per-auction-id serialization.
//!
//! This is the fast path: a same-process writer contends on a
//! [`tokio::sync::Mutex`] keyed by auction id before ever reaching the
//! store, where `SELECT ... FOR UPDATE` is the cross-process source of
//! truth. Entries are never removed; the registry holds one mutex per
//! auction id ever seen in this process, which is acceptable because it is
//! a few dozen bytes per auction.

use std::sync::Arc;

use papaya::HashMap;
use tokio::sync::Mutex;

use crate::ids::AuctionId;

#[derive(Clone, Default)]
pub struct LockRegistry {
    locks: Arc<HashMap<AuctionId, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `auction_id`, creating it if this is the
    /// first time this process has seen the id.
    pub fn get(&self, auction_id: AuctionId) -> Arc<Mutex<()>> {
        let guard = self.locks.pin();
        if let Some(existing) = guard.get(&auction_id) {
            return existing.clone();
        }
        let fresh = Arc::new(Mutex::new(()));
        guard.insert(auction_id, fresh.clone());
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_id_returns_same_mutex() {
        let registry = LockRegistry::new();
        let a = registry.get(AuctionId(uuid::Uuid::nil()));
        let _guard = a.lock().await;
        let b = registry.get(AuctionId(uuid::Uuid::nil()));
        // b is the same mutex, already locked by `_guard`; try_lock must fail.
        assert!(b.try_lock().is_err());
    }
}
