//! In-memory message fabric connecting all endpoints of one simulation
//!
//! The [`Switchboard`] plays the role of the physical network: it owns one
//! mailbox per registered node and moves encoded frames between them,
//! applying the configured delay and loss. Delivery per (sender, receiver)
//! pair is FIFO because every such pair is served by a single courier task.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qnet_core::{ChannelConfig, MessageKind, NodeId, Switchboard};
//!
//! let board = Switchboard::new(ChannelConfig::default());
//! let alice = board.register(NodeId::new("Alice")?)?;
//! let bob = board.register(NodeId::new("Bob")?)?;
//!
//! let receipt = alice.send(bob.local_id(), b"hello".to_vec(), MessageKind::Data, true).await?;
//! let msg = bob.receive(alice.local_id(), Some(Duration::from_secs(10))).await;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::channel::{ChannelConfig, ChannelEndpoint};
use crate::error::{ChannelError, ChannelResult};
use crate::identity::NodeId;
use crate::message::{Lane, Message, MessageId};

/// Frame waiting in a courier queue: delivery instant plus encoded message
type CourierFrame = (Instant, Vec<u8>);

/// Inbound state of one node
pub(crate) struct Mailbox {
    owner: NodeId,
    /// FIFO per (sender, lane)
    queues: DashMap<(NodeId, Lane), VecDeque<Message>>,
    /// Woken whenever a message is enqueued or the mailbox closes
    arrivals: Notify,
    /// Sends from this node that are waiting for an acknowledgment
    pending_acks: DashMap<MessageId, oneshot::Sender<()>>,
    shutdown: watch::Sender<bool>,
}

impl Mailbox {
    fn new(owner: NodeId) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            owner,
            queues: DashMap::new(),
            arrivals: Notify::new(),
            pending_acks: DashMap::new(),
            shutdown,
        }
    }

    pub(crate) fn owner(&self) -> &NodeId {
        &self.owner
    }

    pub(crate) fn arrivals(&self) -> &Notify {
        &self.arrivals
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn close(&self) {
        self.shutdown.send_replace(true);
        // Dropping the senders resolves every in-flight ack wait as "not acked"
        self.pending_acks.clear();
        self.arrivals.notify_waiters();
    }

    pub(crate) fn expect_ack(&self, id: MessageId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pending_acks.insert(id, tx);
        rx
    }

    pub(crate) fn forget_ack(&self, id: &MessageId) {
        self.pending_acks.remove(id);
    }

    pub(crate) fn pop(&self, sender: &NodeId, lane: Lane) -> Option<Message> {
        self.queues
            .get_mut(&(sender.clone(), lane))
            .and_then(|mut queue| queue.pop_front())
    }

    pub(crate) fn pending(&self, sender: &NodeId, lane: Lane) -> usize {
        self.queues
            .get(&(sender.clone(), lane))
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    fn enqueue(&self, msg: Message) {
        self.queues
            .entry((msg.sender.clone(), msg.lane))
            .or_default()
            .push_back(msg);
        self.arrivals.notify_waiters();
    }

    fn resolve_ack(&self, ack: &Message) {
        let Some(correlation) = ack.correlation else {
            warn!(owner = %self.owner, "Ack without correlation id, ignoring");
            return;
        };
        match self.pending_acks.remove(&correlation) {
            Some((_, tx)) => {
                let _ = tx.send(());
            }
            None => trace!(owner = %self.owner, msg_id = %correlation, "Late or unknown ack"),
        }
    }
}

/// Shared state behind a [`Switchboard`] and all of its endpoints
pub(crate) struct Fabric {
    mailboxes: DashMap<NodeId, Arc<Mailbox>>,
    couriers: DashMap<(NodeId, NodeId), mpsc::UnboundedSender<CourierFrame>>,
    config: ChannelConfig,
}

impl Fabric {
    pub(crate) fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Hand a message to the network
    ///
    /// Returns once the frame is scheduled; delivery happens later when a
    /// delay is configured. Lost frames are dropped silently.
    pub(crate) fn dispatch(self: &Arc<Self>, msg: Message) -> ChannelResult<()> {
        let target = self
            .mailboxes
            .get(&msg.receiver)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ChannelError::UnknownPeer(msg.receiver.clone()))?;

        if self.config.loss_probability > 0.0
            && rand::random::<f64>() < self.config.loss_probability
        {
            debug!(
                from = %msg.sender,
                to = %msg.receiver,
                msg_id = %msg.id,
                kind = ?msg.kind,
                "Frame lost in transit"
            );
            return Ok(());
        }

        let frame = msg.to_wire()?;

        if self.config.delay.is_zero() {
            self.deliver(&target, &frame);
            return Ok(());
        }

        let deliver_at = Instant::now() + self.config.delay;
        let key = (msg.sender.clone(), msg.receiver.clone());
        let courier = self
            .couriers
            .entry(key)
            .or_insert_with(|| self.spawn_courier(target))
            .clone();

        courier
            .send((deliver_at, frame))
            .map_err(|_| ChannelError::Closed(msg.receiver.clone()))
    }

    /// One courier per ordered (sender, receiver) pair keeps delivery FIFO
    fn spawn_courier(self: &Arc<Self>, target: Arc<Mailbox>) -> mpsc::UnboundedSender<CourierFrame> {
        let (tx, mut rx) = mpsc::unbounded_channel::<CourierFrame>();
        let fabric: Weak<Fabric> = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some((deliver_at, frame)) = rx.recv().await {
                tokio::time::sleep_until(deliver_at).await;
                let Some(fabric) = fabric.upgrade() else {
                    break;
                };
                fabric.deliver(&target, &frame);
            }
        });

        tx
    }

    fn deliver(self: &Arc<Self>, target: &Mailbox, frame: &[u8]) {
        let msg = match Message::from_wire(frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(owner = %target.owner(), error = %e, "Dropping undecodable frame");
                return;
            }
        };

        if target.is_closed() {
            trace!(owner = %target.owner(), msg_id = %msg.id, "Receiver shut down, dropping frame");
            return;
        }

        if msg.is_ack() {
            target.resolve_ack(&msg);
            return;
        }

        let ack = msg.ack_requested.then(|| msg.ack());
        trace!(
            from = %msg.sender,
            to = %msg.receiver,
            lane = %msg.lane,
            msg_id = %msg.id,
            "Frame delivered"
        );
        if msg.is_herald() {
            trace!(owner = %target.owner(), msg_id = %msg.id, "Herald absorbed");
        } else {
            target.enqueue(msg);
        }

        if let Some(ack) = ack
            && let Err(e) = self.dispatch(ack)
        {
            debug!(owner = %target.owner(), error = %e, "Failed to send ack");
        }
    }
}

/// Registry of endpoints for one simulated network
///
/// Cloning a switchboard yields another handle to the same fabric.
#[derive(Clone)]
pub struct Switchboard {
    fabric: Arc<Fabric>,
}

impl Switchboard {
    /// Create an empty switchboard
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            fabric: Arc::new(Fabric {
                mailboxes: DashMap::new(),
                couriers: DashMap::new(),
                config,
            }),
        }
    }

    /// Register a node and get its endpoint
    pub fn register(&self, id: NodeId) -> ChannelResult<ChannelEndpoint> {
        use dashmap::mapref::entry::Entry;

        match self.fabric.mailboxes.entry(id.clone()) {
            Entry::Occupied(_) => Err(ChannelError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => {
                let mailbox = Arc::new(Mailbox::new(id.clone()));
                slot.insert(Arc::clone(&mailbox));
                debug!(node = %id, "Endpoint registered");
                Ok(ChannelEndpoint::new(mailbox, Arc::clone(&self.fabric)))
            }
        }
    }

    /// Get another handle to an already registered endpoint
    pub fn endpoint(&self, id: &NodeId) -> Option<ChannelEndpoint> {
        self.fabric
            .mailboxes
            .get(id)
            .map(|entry| ChannelEndpoint::new(Arc::clone(entry.value()), Arc::clone(&self.fabric)))
    }

    /// All registered node ids, sorted
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.fabric.mailboxes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn config(&self) -> &ChannelConfig {
        self.fabric.config()
    }

    /// Close every endpoint; in-flight waits resolve immediately
    pub fn shutdown_all(&self) {
        for entry in self.fabric.mailboxes.iter() {
            entry.value().close();
        }
        self.fabric.couriers.clear();
    }
}
