//! Simulated network node
//!
//! A [`Node`] owns a channel endpoint, its neighbour links, one resource
//! pool per quantum link, and the replenishment task that tops those pools
//! up while the node is idle.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashSet;
use qnet_core::{
    ChannelEndpoint, ChannelError, Connection, Lane, LinkKind, Message, MessageId, MessageKind,
    NodeId, ResourceHost, SendReceipt,
};
use qnet_handshake::{HandshakeConfig, HandshakeResult, Role, SharedSecret, run_handshake};
use qnet_logging::NodeContextGuard;
use qnet_routing::{ReplenishConfig, ReplenishStats, Replenisher, ResourceLedger};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::error::{SimError, SimResult};

/// Result of one EPR generation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EprOutcome {
    pub id: MessageId,
    pub ack_received: bool,
    /// Whether the local pool counted the pair
    pub stored: bool,
}

/// A node of the simulated network
pub struct Node {
    id: NodeId,
    instance_id: Uuid,
    endpoint: ChannelEndpoint,
    links: DashSet<Connection>,
    ledger: ResourceLedger,
    /// Number of protocols currently running
    busy: AtomicUsize,
    started: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    background_tasks: Mutex<Vec<JoinHandle<ReplenishStats>>>,
}

impl Node {
    pub fn new(endpoint: ChannelEndpoint, pool_cap: u32) -> Self {
        let id = endpoint.local_id().clone();
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            ledger: ResourceLedger::with_cap(id.clone(), pool_cap),
            id,
            instance_id: Uuid::new_v4(),
            endpoint,
            links: DashSet::new(),
            busy: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            shutdown_tx,
            background_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn endpoint(&self) -> &ChannelEndpoint {
        &self.endpoint
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Instance id stamped on this node's log spans
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Add both a classical and a quantum link to `peer`
    pub fn add_connection(&self, peer: NodeId) {
        self.add_link(peer.clone(), LinkKind::Classical);
        self.add_link(peer, LinkKind::Quantum);
    }

    /// Add a single link; quantum links get a resource pool
    pub fn add_link(&self, peer: NodeId, kind: LinkKind) {
        if kind == LinkKind::Quantum {
            self.ledger.open(&peer);
        }
        debug!(node = %self.id, %peer, %kind, "Link added");
        self.links.insert(Connection { peer, kind });
    }

    pub fn has_link(&self, peer: &NodeId, kind: LinkKind) -> bool {
        self.links.contains(&Connection {
            peer: peer.clone(),
            kind,
        })
    }

    fn require_link(&self, peer: &NodeId, lane: Lane) -> SimResult<()> {
        let kind = match lane {
            Lane::Classical => LinkKind::Classical,
            Lane::Qubit | Lane::Epr => LinkKind::Quantum,
        };
        if self.has_link(peer, kind) {
            Ok(())
        } else {
            Err(ChannelError::NotConnected {
                peer: peer.clone(),
                lane,
            }
            .into())
        }
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Set the pool toward `peer` directly
    ///
    /// Fails with `CapExceeded` above the cap and `NotQuantumLink` when
    /// there is no quantum link to `peer`.
    pub fn seed_resources(&self, peer: &NodeId, count: u32) -> SimResult<()> {
        let pool = self
            .ledger
            .pool(peer)
            .ok_or_else(|| qnet_core::ResourceError::NotQuantumLink {
                owner: self.id.clone(),
                peer: peer.clone(),
            })?;
        pool.set_count(count)?;
        Ok(())
    }

    /// Use up one resource on the link to `peer`, if any is left
    pub fn consume_resource(&self, peer: &NodeId) -> bool {
        self.ledger
            .pool(peer)
            .is_some_and(|pool| pool.try_consume())
    }

    // ========================================================================
    // Protocols and idleness
    // ========================================================================

    /// Mark the node busy until the guard drops
    pub fn mark_busy(&self) -> BusyGuard<'_> {
        self.busy.fetch_add(1, Ordering::SeqCst);
        BusyGuard { busy: &self.busy }
    }

    /// Run a protocol future with the node marked busy
    pub async fn run_protocol<F: Future>(&self, protocol: F) -> F::Output {
        let _busy = self.mark_busy();
        protocol.await
    }

    /// Run one side of a Kyber768 handshake with `peer`
    pub async fn run_handshake(
        &self,
        role: Role,
        peer: &NodeId,
        config: &HandshakeConfig,
    ) -> HandshakeResult<SharedSecret> {
        self.run_protocol(run_handshake(&self.endpoint, role, peer, config))
            .await
    }

    // ========================================================================
    // Traffic
    // ========================================================================

    pub async fn send_classical(
        &self,
        receiver: &NodeId,
        payload: impl Into<Bytes>,
        await_ack: bool,
    ) -> SimResult<SendReceipt> {
        self.send_on(Lane::Classical, receiver, payload.into(), MessageKind::Data, await_ack)
            .await
    }

    pub async fn get_classical(&self, sender: &NodeId, wait: Option<Duration>) -> Option<Message> {
        self.endpoint.receive_on(Lane::Classical, sender, wait).await
    }

    /// Send a data qubit to a quantum neighbour
    pub async fn send_qubit(
        &self,
        receiver: &NodeId,
        payload: impl Into<Bytes>,
        await_ack: bool,
    ) -> SimResult<SendReceipt> {
        self.send_on(Lane::Qubit, receiver, payload.into(), MessageKind::Data, await_ack)
            .await
    }

    pub async fn get_qubit(&self, sender: &NodeId, wait: Option<Duration>) -> Option<Message> {
        self.endpoint.receive_on(Lane::Qubit, sender, wait).await
    }

    /// Send one half of an EPR pair to `receiver`
    ///
    /// The pair counts toward the local pool when the receiver confirmed it,
    /// or immediately when no ack was requested. A full pool leaves the pair
    /// uncounted. The receiver holds the half until it calls [`Node::get_epr`].
    #[instrument(skip(self), fields(node = %self.id))]
    pub async fn send_epr(&self, receiver: &NodeId, await_ack: bool) -> SimResult<EprOutcome> {
        self.share_epr(receiver, MessageKind::Data, await_ack).await
    }

    /// Generate a background pair with `receiver`
    ///
    /// Same accounting as [`Node::send_epr`], but the half is sent as a
    /// herald: the receiver acknowledges it without queueing it, so nothing
    /// builds up on its EPR lane.
    #[instrument(skip(self), fields(node = %self.id))]
    pub async fn herald_epr(&self, receiver: &NodeId, await_ack: bool) -> SimResult<EprOutcome> {
        self.share_epr(receiver, MessageKind::Herald, await_ack).await
    }

    async fn share_epr(
        &self,
        receiver: &NodeId,
        kind: MessageKind,
        await_ack: bool,
    ) -> SimResult<EprOutcome> {
        let receipt = self
            .send_on(Lane::Epr, receiver, Bytes::new(), kind, await_ack)
            .await?;

        let confirmed = receipt.ack_received || !await_ack;
        let stored = confirmed && self.ledger.open(receiver).try_increment();
        debug!(
            msg_id = %receipt.id,
            ?kind,
            ack = receipt.ack_received,
            stored,
            count = self.ledger.count(receiver),
            "EPR half sent"
        );

        Ok(EprOutcome {
            id: receipt.id,
            ack_received: receipt.ack_received,
            stored,
        })
    }

    /// Take the next EPR half sent by `sender`, counting it locally
    pub async fn get_epr(&self, sender: &NodeId, wait: Option<Duration>) -> Option<Message> {
        let half = self.endpoint.receive_on(Lane::Epr, sender, wait).await?;
        if self.has_link(sender, LinkKind::Quantum) && !self.ledger.open(sender).try_increment() {
            debug!(node = %self.id, %sender, "Pool full, EPR half not counted");
        }
        Some(half)
    }

    async fn send_on(
        &self,
        lane: Lane,
        receiver: &NodeId,
        payload: Bytes,
        kind: MessageKind,
        await_ack: bool,
    ) -> SimResult<SendReceipt> {
        self.require_link(receiver, lane)?;
        let receipt = self
            .endpoint
            .send_on(lane, receiver, payload, kind, await_ack)
            .await?;
        Ok(receipt)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the background replenisher
    pub async fn start(self: &Arc<Self>, config: ReplenishConfig) -> SimResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SimError::AlreadyStarted(self.id.clone()));
        }

        let span = {
            let _ctx = NodeContextGuard::with_instance_id(&self.id, self.instance_id);
            info_span!("node", node = %self.id)
        };
        let host: Arc<dyn ResourceHost> = self.clone();
        let task = Replenisher::new(host, config, self.shutdown_tx.subscribe());
        let handle = tokio::spawn(task.run().instrument(span));

        self.background_tasks.lock().await.push(handle);
        info!(node = %self.id, "Node started");
        Ok(())
    }

    /// Stop background tasks, keeping the endpoint open
    ///
    /// Returns the combined replenishment counters.
    pub async fn stop(&self) -> ReplenishStats {
        if !self.started.swap(false, Ordering::SeqCst) {
            return ReplenishStats::default();
        }

        let _ = self.shutdown_tx.send(());

        let mut stats = ReplenishStats::default();
        let mut tasks = self.background_tasks.lock().await;
        for task in tasks.drain(..) {
            match task.await {
                Ok(task_stats) => stats += task_stats,
                Err(e) => warn!(node = %self.id, error = %e, "Background task failed"),
            }
        }

        info!(node = %self.id, generated = stats.generated, "Node stopped");
        stats
    }

    /// Stop background tasks and close the endpoint
    ///
    /// Closing first resolves any ack the replenisher is waiting on.
    pub async fn shutdown(&self) -> ReplenishStats {
        self.endpoint.shutdown();
        self.stop().await
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceHost for Node {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn is_idle(&self) -> bool {
        self.busy.load(Ordering::SeqCst) == 0
    }

    fn connections(&self) -> Vec<Connection> {
        let mut links: Vec<Connection> = self.links.iter().map(|c| c.key().clone()).collect();
        links.sort();
        links
    }

    fn resource_count(&self, peer: &NodeId) -> u32 {
        self.ledger.count(peer)
    }

    async fn generate_resource(&self, peer: &NodeId, await_ack: bool) -> bool {
        match self.herald_epr(peer, await_ack).await {
            Ok(outcome) => outcome.stored,
            Err(e) => {
                warn!(node = %self.id, %peer, error = %e, "EPR generation failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("links", &self.links.len())
            .field("idle", &self.is_idle())
            .field("started", &self.is_started())
            .finish()
    }
}

/// Keeps a node busy while alive
pub struct BusyGuard<'a> {
    busy: &'a AtomicUsize,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{ChannelConfig, Switchboard};
    use qnet_routing::RESOURCE_CAP;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn pair(config: ChannelConfig) -> (Switchboard, Arc<Node>, Arc<Node>) {
        let board = Switchboard::new(config);
        let a = Arc::new(Node::new(board.register(id("A")).unwrap(), RESOURCE_CAP));
        let b = Arc::new(Node::new(board.register(id("B")).unwrap(), RESOURCE_CAP));
        a.add_connection(id("B"));
        b.add_connection(id("A"));
        (board, a, b)
    }

    #[test]
    fn test_add_connection_creates_both_links() {
        let (_board, a, _b) = pair(ChannelConfig::testing());
        assert_eq!(
            a.connections(),
            vec![Connection::classical(id("B")), Connection::quantum(id("B"))]
        );
        assert_eq!(a.quantum_peers(), vec![id("B")]);
        assert_eq!(a.resource_count(&id("B")), 0);
    }

    #[tokio::test]
    async fn test_idle_tracks_running_protocols() {
        let (_board, a, _b) = pair(ChannelConfig::testing());
        assert!(a.is_idle());

        let during = a.run_protocol(async { a.is_idle() }).await;
        assert!(!during);
        assert!(a.is_idle());

        let outer = a.mark_busy();
        let inner = a.mark_busy();
        drop(outer);
        assert!(!a.is_idle());
        drop(inner);
        assert!(a.is_idle());
    }

    #[tokio::test]
    async fn test_epr_counts_on_both_sides() {
        let (_board, a, b) = pair(ChannelConfig::testing());

        let outcome = a.send_epr(&id("B"), true).await.unwrap();
        assert!(outcome.ack_received);
        assert!(outcome.stored);
        assert_eq!(a.resource_count(&id("B")), 1);

        let half = b.get_epr(&id("A"), Some(Duration::from_secs(1))).await;
        assert!(half.is_some());
        assert_eq!(b.resource_count(&id("A")), 1);
    }

    #[tokio::test]
    async fn test_full_pool_does_not_count_extra_pairs() {
        let (_board, a, _b) = pair(ChannelConfig::testing());
        a.seed_resources(&id("B"), RESOURCE_CAP).unwrap();

        let outcome = a.send_epr(&id("B"), true).await.unwrap();
        assert!(outcome.ack_received);
        assert!(!outcome.stored);
        assert_eq!(a.resource_count(&id("B")), RESOURCE_CAP);
    }

    #[tokio::test]
    async fn test_seed_above_cap_is_rejected() {
        let (_board, a, _b) = pair(ChannelConfig::testing());
        let err = a.seed_resources(&id("B"), RESOURCE_CAP + 1).unwrap_err();
        assert!(matches!(err, SimError::Resource(_)));
        assert!(matches!(
            a.seed_resources(&id("Nobody"), 1),
            Err(SimError::Resource(_))
        ));
    }

    #[tokio::test]
    async fn test_lanes_require_matching_link() {
        let board = Switchboard::new(ChannelConfig::testing());
        let a = Node::new(board.register(id("A")).unwrap(), RESOURCE_CAP);
        let _b = board.register(id("B")).unwrap();
        a.add_link(id("B"), LinkKind::Classical);

        assert!(a.send_classical(&id("B"), "hi", false).await.is_ok());
        let err = a.send_qubit(&id("B"), vec![1u8], false).await.unwrap_err();
        assert!(matches!(
            err,
            SimError::Channel(ChannelError::NotConnected { lane: Lane::Qubit, .. })
        ));
        assert!(!a.generate_resource(&id("B"), true).await);
    }

    #[tokio::test]
    async fn test_qubit_and_classical_lanes_are_separate() {
        let (_board, a, b) = pair(ChannelConfig::testing());
        a.send_qubit(&id("B"), vec![1u8], false).await.unwrap();
        a.send_classical(&id("B"), "hello", false).await.unwrap();

        let classical = b.get_classical(&id("A"), None).await.unwrap();
        assert_eq!(classical.payload.as_ref(), b"hello");
        let qubit = b.get_qubit(&id("A"), None).await.unwrap();
        assert_eq!(qubit.payload.as_ref(), &[1u8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replenisher_fills_pool_and_stops() {
        let (_board, a, _b) = pair(ChannelConfig::testing());
        a.start(ReplenishConfig::testing()).await.unwrap();
        assert!(matches!(
            a.start(ReplenishConfig::testing()).await,
            Err(SimError::AlreadyStarted(_))
        ));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let stats = a.stop().await;

        assert_eq!(a.resource_count(&id("B")), RESOURCE_CAP);
        assert_eq!(stats.generated, RESOURCE_CAP as u64);
        assert!(!a.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_node_does_not_replenish() {
        let (_board, a, _b) = pair(ChannelConfig::testing());
        let busy = a.mark_busy();
        a.start(ReplenishConfig::testing()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = a.stop().await;
        drop(busy);

        assert_eq!(a.resource_count(&id("B")), 0);
        assert!(stats.busy_cycles > 0);
        assert_eq!(stats.generated, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replenishment_leaves_peer_epr_lane_empty() {
        let (_board, a, b) = pair(ChannelConfig::testing());
        a.start(ReplenishConfig::testing()).await.unwrap();

        // Keep draining the pool so the replenisher keeps generating
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(2)).await;
            while a.consume_resource(&id("B")) {}
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        let stats = a.stop().await;

        assert!(stats.generated > RESOURCE_CAP as u64);
        assert_eq!(a.resource_count(&id("B")), RESOURCE_CAP);
        assert_eq!(b.endpoint().pending(&id("A"), Lane::Epr), 0);
        assert_eq!(b.resource_count(&id("A")), 0);
    }
}
