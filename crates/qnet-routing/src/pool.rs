//! Shared-resource pools
//!
//! A [`ResourcePool`] counts the entangled pairs a node holds on one
//! quantum link. Replenishment increments it, transfers consume from it.
//! Both paths go through compare-and-swap loops so `0 <= count <= cap`
//! holds under any interleaving.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use qnet_core::{NodeId, ResourceError};
use tracing::trace;

/// Replenishment cap per link
pub const RESOURCE_CAP: u32 = 4;

/// Resource counter for the link `owner -> peer`
#[derive(Debug)]
pub struct ResourcePool {
    owner: NodeId,
    peer: NodeId,
    count: AtomicU32,
    cap: u32,
}

impl ResourcePool {
    /// Create an empty pool with the default cap
    pub fn new(owner: NodeId, peer: NodeId) -> Self {
        Self::with_cap(owner, peer, RESOURCE_CAP)
    }

    pub fn with_cap(owner: NodeId, peer: NodeId, cap: u32) -> Self {
        Self {
            owner,
            peer,
            count: AtomicU32::new(0),
            cap,
        }
    }

    pub fn owner(&self) -> &NodeId {
        &self.owner
    }

    pub fn peer(&self) -> &NodeId {
        &self.peer
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.cap
    }

    /// Add one resource unless the pool is already at its cap
    pub fn try_increment(&self) -> bool {
        let added = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < self.cap).then_some(c + 1)
            })
            .is_ok();
        trace!(owner = %self.owner, peer = %self.peer, added, count = self.count(), "Pool increment");
        added
    }

    /// Take one resource if any is available
    pub fn try_consume(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .is_ok()
    }

    /// Overwrite the count, used to seed pools in scenarios
    ///
    /// A count above the cap is an invariant violation and is refused.
    pub fn set_count(&self, count: u32) -> Result<(), ResourceError> {
        if count > self.cap {
            return Err(ResourceError::CapExceeded {
                owner: self.owner.clone(),
                peer: self.peer.clone(),
                cap: self.cap,
                requested: count,
            });
        }
        self.count.store(count, Ordering::Release);
        Ok(())
    }
}

/// All pools owned by one node, keyed by peer
#[derive(Debug)]
pub struct ResourceLedger {
    owner: NodeId,
    cap: u32,
    pools: DashMap<NodeId, Arc<ResourcePool>>,
}

impl ResourceLedger {
    pub fn new(owner: NodeId) -> Self {
        Self::with_cap(owner, RESOURCE_CAP)
    }

    pub fn with_cap(owner: NodeId, cap: u32) -> Self {
        Self {
            owner,
            cap,
            pools: DashMap::new(),
        }
    }

    pub fn owner(&self) -> &NodeId {
        &self.owner
    }

    /// Get the pool for `peer`, creating an empty one if needed
    pub fn open(&self, peer: &NodeId) -> Arc<ResourcePool> {
        self.pools
            .entry(peer.clone())
            .or_insert_with(|| {
                Arc::new(ResourcePool::with_cap(self.owner.clone(), peer.clone(), self.cap))
            })
            .clone()
    }

    pub fn pool(&self, peer: &NodeId) -> Option<Arc<ResourcePool>> {
        self.pools.get(peer).map(|p| Arc::clone(p.value()))
    }

    /// Count on the link to `peer`, 0 when there is no pool
    pub fn count(&self, peer: &NodeId) -> u32 {
        self.pools.get(peer).map(|p| p.count()).unwrap_or(0)
    }

    /// Peers with a pool, sorted
    pub fn peers(&self) -> Vec<NodeId> {
        let mut peers: Vec<_> = self.pools.iter().map(|e| e.key().clone()).collect();
        peers.sort();
        peers
    }

    /// Point-in-time copy of every count
    pub fn snapshot(&self) -> BTreeMap<NodeId, u32> {
        self.pools
            .iter()
            .map(|e| (e.key().clone(), e.value().count()))
            .collect()
    }

    pub fn total(&self) -> u32 {
        self.pools.iter().map(|e| e.value().count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn pool() -> ResourcePool {
        ResourcePool::new(id("node_1"), id("B"))
    }

    #[test]
    fn test_increment_stops_at_cap() {
        let pool = pool();
        for _ in 0..RESOURCE_CAP {
            assert!(pool.try_increment());
        }
        assert!(pool.is_full());
        assert!(!pool.try_increment());
        assert_eq!(pool.count(), RESOURCE_CAP);
    }

    #[test]
    fn test_consume_never_goes_negative() {
        let pool = pool();
        assert!(!pool.try_consume());
        pool.try_increment();
        assert!(pool.try_consume());
        assert!(!pool.try_consume());
        assert_eq!(pool.count(), 0);
    }

    #[test]
    fn test_set_count_over_cap_is_refused() {
        let pool = pool();
        pool.set_count(2).unwrap();
        assert_eq!(pool.count(), 2);

        let err = pool.set_count(5).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::CapExceeded {
                cap: 4,
                requested: 5,
                ..
            }
        ));
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn test_ledger_open_is_idempotent() {
        let ledger = ResourceLedger::new(id("A"));
        let first = ledger.open(&id("node_1"));
        first.try_increment();

        let again = ledger.open(&id("node_1"));
        assert_eq!(again.count(), 1);
        assert_eq!(ledger.count(&id("node_1")), 1);
        assert_eq!(ledger.count(&id("node_2")), 0);
    }

    #[test]
    fn test_ledger_snapshot_and_total() {
        let ledger = ResourceLedger::new(id("A"));
        ledger.open(&id("node_2")).set_count(3).unwrap();
        ledger.open(&id("node_1")).set_count(1).unwrap();

        assert_eq!(ledger.peers(), vec![id("node_1"), id("node_2")]);
        assert_eq!(ledger.total(), 4);
        let snap = ledger.snapshot();
        assert_eq!(snap.get(&id("node_2")), Some(&3));
    }

    #[test]
    fn test_concurrent_increments_respect_cap() {
        let pool = Arc::new(pool());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || (0..100).filter(|_| pool.try_increment()).count())
            })
            .collect();

        let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(added, RESOURCE_CAP as usize);
        assert_eq!(pool.count(), RESOURCE_CAP);
    }

    proptest! {
        #[test]
        fn prop_count_stays_within_cap(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let pool = pool();
            for increment in ops {
                if increment {
                    pool.try_increment();
                } else {
                    pool.try_consume();
                }
                prop_assert!(pool.count() <= pool.cap());
            }
        }

        #[test]
        fn prop_concurrent_ops_stay_within_cap(
            workers in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 1..50), 1..6)
        ) {
            let pool = Arc::new(pool());
            let handles: Vec<_> = workers
                .into_iter()
                .map(|ops| {
                    let pool = Arc::clone(&pool);
                    std::thread::spawn(move || {
                        for increment in ops {
                            if increment {
                                pool.try_increment();
                            } else {
                                pool.try_consume();
                            }
                            assert!(pool.count() <= RESOURCE_CAP);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            prop_assert!(pool.count() <= RESOURCE_CAP);
        }
    }
}
