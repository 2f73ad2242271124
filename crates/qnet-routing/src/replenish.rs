//! Background resource replenishment
//!
//! Each node runs one [`Replenisher`]. On every poll tick, if the node is
//! idle, it walks the node's quantum links and tries to generate one
//! resource on every link whose pool is below the cap. The host increments
//! its pool only after the neighbour acknowledged the new resource.
//!
//! Shutdown is cooperative: the signal is observed at each tick and between
//! links, never in the middle of a generation attempt.

use std::sync::Arc;
use std::time::Duration;

use qnet_core::ResourceHost;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::pool::RESOURCE_CAP;

/// Shortest poll interval a replenisher runs with
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Replenishment parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplenishConfig {
    /// Time between idle checks
    pub poll_interval: Duration,
    /// Pools at or above this count are left alone
    pub cap: u32,
    /// Wait for the neighbour's ack before counting a resource
    pub await_ack: bool,
}

impl Default for ReplenishConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            cap: RESOURCE_CAP,
            await_ack: true,
        }
    }
}

impl ReplenishConfig {
    /// Fast polling for tests
    pub fn testing() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Set the poll interval, never below [`MIN_POLL_INTERVAL`]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Set the cap, never above [`RESOURCE_CAP`]
    pub fn with_cap(mut self, cap: u32) -> Self {
        self.cap = cap.min(RESOURCE_CAP);
        self
    }
}

/// Counters reported when the task exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplenishStats {
    /// Poll ticks observed
    pub cycles: u64,
    /// Ticks skipped because the node was busy
    pub busy_cycles: u64,
    /// Resources generated and confirmed
    pub generated: u64,
    /// Generation attempts without confirmation
    pub failed: u64,
}

impl std::ops::AddAssign for ReplenishStats {
    fn add_assign(&mut self, other: Self) {
        self.cycles += other.cycles;
        self.busy_cycles += other.busy_cycles;
        self.generated += other.generated;
        self.failed += other.failed;
    }
}

/// Idle-triggered replenishment task for one node
pub struct Replenisher {
    host: Arc<dyn ResourceHost>,
    config: ReplenishConfig,
    shutdown_rx: broadcast::Receiver<()>,
    stopping: bool,
    stats: ReplenishStats,
}

impl Replenisher {
    pub fn new(
        host: Arc<dyn ResourceHost>,
        mut config: ReplenishConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        if config.poll_interval < MIN_POLL_INTERVAL {
            warn!(
                node = %host.id(),
                requested = ?config.poll_interval,
                "Poll interval too short, using {MIN_POLL_INTERVAL:?}"
            );
            config.poll_interval = MIN_POLL_INTERVAL;
        }
        Self {
            host,
            config,
            shutdown_rx,
            stopping: false,
            stats: ReplenishStats::default(),
        }
    }

    /// Spawn the replenisher as a background task
    pub fn spawn(
        host: Arc<dyn ResourceHost>,
        config: ReplenishConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<ReplenishStats> {
        let task = Self::new(host, config, shutdown_rx);
        tokio::spawn(async move { task.run().await })
    }

    /// Run until a shutdown signal arrives
    ///
    /// [`spawn`](Self::spawn) is the usual entry point; call this directly to
    /// wrap the task in a caller-chosen span.
    pub async fn run(mut self) -> ReplenishStats {
        info!(
            node = %self.host.id(),
            interval_ms = self.config.poll_interval.as_millis() as u64,
            cap = self.config.cap,
            "Replenisher started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.stopping {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    self.stopping = true;
                }
                _ = interval.tick() => {
                    self.stats.cycles += 1;
                    self.replenish_cycle().await;
                }
            }
        }

        info!(
            node = %self.host.id(),
            cycles = self.stats.cycles,
            generated = self.stats.generated,
            failed = self.stats.failed,
            "Replenisher stopped"
        );
        self.stats
    }

    /// One pass over the node's quantum links
    #[instrument(skip(self), fields(node = %self.host.id(), cycle = self.stats.cycles))]
    async fn replenish_cycle(&mut self) {
        if !self.host.is_idle() {
            self.stats.busy_cycles += 1;
            debug!("Node busy, skipping");
            return;
        }

        for peer in self.host.quantum_peers() {
            if self.shutdown_requested() {
                debug!("Shutdown requested mid-cycle");
                return;
            }
            if !self.host.is_idle() {
                debug!("Node became busy, ending cycle");
                return;
            }

            let count = self.host.resource_count(&peer);
            if count >= self.config.cap {
                continue;
            }

            if self
                .host
                .generate_resource(&peer, self.config.await_ack)
                .await
            {
                self.stats.generated += 1;
                debug!(%peer, count = self.host.resource_count(&peer), "Resource generated");
            } else {
                self.stats.failed += 1;
                debug!(%peer, "Resource generation unconfirmed");
            }
        }
    }

    fn shutdown_requested(&mut self) -> bool {
        if !self.stopping {
            self.stopping = !matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Empty));
        }
        self.stopping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;
    use qnet_core::{Connection, NodeId};

    use crate::pool::ResourceLedger;

    /// Host whose neighbours always confirm
    struct FakeHost {
        id: NodeId,
        connections: Vec<Connection>,
        ledger: ResourceLedger,
        idle: AtomicBool,
        confirm: bool,
        attempts: AtomicU32,
    }

    impl FakeHost {
        fn new(confirm: bool) -> Self {
            let id = NodeId::new("A").unwrap();
            Self {
                connections: vec![
                    Connection::quantum(NodeId::new("node_1").unwrap()),
                    Connection::quantum(NodeId::new("node_2").unwrap()),
                    Connection::classical(NodeId::new("node_1").unwrap()),
                ],
                ledger: ResourceLedger::new(id.clone()),
                id,
                idle: AtomicBool::new(true),
                confirm,
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ResourceHost for FakeHost {
        fn id(&self) -> &NodeId {
            &self.id
        }

        fn is_idle(&self) -> bool {
            self.idle.load(Ordering::SeqCst)
        }

        fn connections(&self) -> Vec<Connection> {
            self.connections.clone()
        }

        fn resource_count(&self, peer: &NodeId) -> u32 {
            self.ledger.count(peer)
        }

        async fn generate_resource(&self, peer: &NodeId, _await_ack: bool) -> bool {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.confirm && self.ledger.open(peer).try_increment()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fills_quantum_links_to_cap() {
        let host = Arc::new(FakeHost::new(true));
        let (tx, rx) = broadcast::channel(1);
        let handle = Replenisher::spawn(host.clone(), ReplenishConfig::testing(), rx);

        tokio::time::sleep(Duration::from_secs(2)).await;
        tx.send(()).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(host.ledger.count(&NodeId::new("node_1").unwrap()), RESOURCE_CAP);
        assert_eq!(host.ledger.count(&NodeId::new("node_2").unwrap()), RESOURCE_CAP);
        assert_eq!(stats.generated, 2 * RESOURCE_CAP as u64);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_node_is_left_alone() {
        let host = Arc::new(FakeHost::new(true));
        host.idle.store(false, Ordering::SeqCst);
        let (tx, rx) = broadcast::channel(1);
        let handle = Replenisher::spawn(host.clone(), ReplenishConfig::testing(), rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(()).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(host.attempts.load(Ordering::SeqCst), 0);
        assert!(stats.busy_cycles > 0);
        assert_eq!(host.ledger.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_generation_is_not_counted() {
        let host = Arc::new(FakeHost::new(false));
        let (tx, rx) = broadcast::channel(1);
        let handle = Replenisher::spawn(host.clone(), ReplenishConfig::testing(), rx);

        tokio::time::sleep(Duration::from_millis(350)).await;
        tx.send(()).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(host.ledger.total(), 0);
        assert!(stats.failed > 0);
        assert_eq!(stats.generated, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_sender_dropped() {
        let host = Arc::new(FakeHost::new(true));
        let (tx, rx) = broadcast::channel::<()>(1);
        let handle = Replenisher::spawn(host, ReplenishConfig::testing(), rx);

        drop(tx);
        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("replenisher should stop")
            .unwrap();
        assert!(stats.cycles <= 1);
    }

    #[test]
    fn test_config_cap_is_bounded() {
        assert_eq!(ReplenishConfig::default().with_cap(10).cap, RESOURCE_CAP);
        assert_eq!(ReplenishConfig::default().with_cap(2).cap, 2);
        assert_eq!(ReplenishConfig::default().poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_poll_interval_is_raised() {
        let config = ReplenishConfig::default().with_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_config_still_runs() {
        let host = Arc::new(FakeHost::new(true));
        let config = ReplenishConfig {
            poll_interval: Duration::ZERO,
            ..ReplenishConfig::default()
        };
        let (tx, rx) = broadcast::channel(1);
        let handle = Replenisher::spawn(host.clone(), config, rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.generated, 2 * RESOURCE_CAP as u64);
        assert!(stats.cycles > 1);
    }
}
