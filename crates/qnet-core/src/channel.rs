//! Per-node send/receive primitive
//!
//! Both blocking call shapes are bounded: an acknowledged send gives up after
//! [`ChannelConfig::ack_timeout`] and a waiting receive gives up after the
//! caller's window. Shutting the endpoint down resolves every in-flight wait.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::error::{ChannelError, ChannelResult};
use crate::identity::NodeId;
use crate::message::{Lane, Message, MessageId, MessageKind};
use crate::switchboard::{Fabric, Mailbox};

/// Transport parameters shared by every endpoint of a switchboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// How long an acknowledged send waits for its ack
    pub ack_timeout: Duration,
    /// Wait window used by callers that do not pick their own
    pub receive_wait: Duration,
    /// Simulated one-way link delay
    pub delay: Duration,
    /// Probability in `[0, 1]` that a frame is lost in transit
    pub loss_probability: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
            receive_wait: Duration::from_secs(10),
            delay: Duration::from_millis(100),
            loss_probability: 0.0,
        }
    }
}

impl ChannelConfig {
    /// Zero delay, no loss, short timeouts
    pub fn testing() -> Self {
        Self {
            ack_timeout: Duration::from_millis(500),
            receive_wait: Duration::from_secs(1),
            delay: Duration::ZERO,
            loss_probability: 0.0,
        }
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = wait;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the loss probability, clamped to `[0, 1]`
    pub fn with_loss_probability(mut self, probability: f64) -> Self {
        self.loss_probability = probability.clamp(0.0, 1.0);
        self
    }
}

/// Outcome of a send
///
/// A missing acknowledgment is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub id: MessageId,
    /// True only when an ack was requested and arrived in time
    pub ack_received: bool,
}

/// A node's handle onto the switchboard
#[derive(Clone)]
pub struct ChannelEndpoint {
    mailbox: Arc<Mailbox>,
    fabric: Arc<Fabric>,
}

impl ChannelEndpoint {
    pub(crate) fn new(mailbox: Arc<Mailbox>, fabric: Arc<Fabric>) -> Self {
        Self { mailbox, fabric }
    }

    /// Id of the node owning this endpoint
    pub fn local_id(&self) -> &NodeId {
        self.mailbox.owner()
    }

    pub fn config(&self) -> &ChannelConfig {
        self.fabric.config()
    }

    /// Send on the classical lane
    pub async fn send(
        &self,
        receiver: &NodeId,
        payload: impl Into<Bytes>,
        kind: MessageKind,
        await_ack: bool,
    ) -> ChannelResult<SendReceipt> {
        self.send_on(Lane::Classical, receiver, payload, kind, await_ack)
            .await
    }

    /// Send on an explicit lane
    ///
    /// With `await_ack` the call suspends until the matching ack arrives,
    /// the ack timeout elapses, or the endpoint shuts down.
    #[instrument(skip(self, payload), fields(from = %self.local_id(), to = %receiver))]
    pub async fn send_on(
        &self,
        lane: Lane,
        receiver: &NodeId,
        payload: impl Into<Bytes>,
        kind: MessageKind,
        await_ack: bool,
    ) -> ChannelResult<SendReceipt> {
        if self.mailbox.is_closed() {
            return Err(ChannelError::Closed(self.local_id().clone()));
        }

        let msg = Message::new(self.local_id().clone(), receiver.clone(), lane, kind, payload)
            .with_ack_requested(await_ack);
        let id = msg.id;

        if !await_ack {
            self.fabric.dispatch(msg)?;
            return Ok(SendReceipt {
                id,
                ack_received: false,
            });
        }

        // Register before dispatch: with zero delay the ack arrives inline
        let ack = self.mailbox.expect_ack(id);
        if let Err(e) = self.fabric.dispatch(msg) {
            self.mailbox.forget_ack(&id);
            return Err(e);
        }

        let mut shutdown = self.mailbox.subscribe_shutdown();
        let ack_received = tokio::select! {
            res = tokio::time::timeout(self.config().ack_timeout, ack) => matches!(res, Ok(Ok(()))),
            _ = shutdown.wait_for(|closed| *closed) => false,
        };

        if !ack_received {
            self.mailbox.forget_ack(&id);
            debug!(msg_id = %id, "No ack within timeout");
        }

        Ok(SendReceipt { id, ack_received })
    }

    /// Receive from `sender` on the classical lane
    pub async fn receive(&self, sender: &NodeId, wait: Option<Duration>) -> Option<Message> {
        self.receive_on(Lane::Classical, sender, wait).await
    }

    /// Receive from `sender` on an explicit lane
    ///
    /// `None` for `wait` pops the oldest pending message without
    /// suspending. Otherwise waits up to `wait`, returning `None` on expiry
    /// or shutdown.
    pub async fn receive_on(
        &self,
        lane: Lane,
        sender: &NodeId,
        wait: Option<Duration>,
    ) -> Option<Message> {
        let Some(wait) = wait else {
            return self.mailbox.pop(sender, lane);
        };

        let deadline = Instant::now() + wait;
        let mut shutdown = self.mailbox.subscribe_shutdown();

        loop {
            let notified = self.mailbox.arrivals().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(msg) = self.mailbox.pop(sender, lane) {
                return Some(msg);
            }
            if self.mailbox.is_closed() {
                return None;
            }

            tokio::select! {
                _ = &mut notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(node = %self.local_id(), from = %sender, %lane, "Receive window expired");
                    return None;
                }
                _ = shutdown.wait_for(|closed| *closed) => return None,
            }
        }
    }

    /// Number of queued messages from `sender` on `lane`
    pub fn pending(&self, sender: &NodeId, lane: Lane) -> usize {
        self.mailbox.pending(sender, lane)
    }

    /// Stop accepting traffic and wake every waiter
    pub fn shutdown(&self) {
        debug!(node = %self.local_id(), "Endpoint shutting down");
        self.mailbox.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.mailbox.is_closed()
    }
}

impl std::fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("local", self.local_id())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}
