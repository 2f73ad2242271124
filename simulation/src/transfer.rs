//! Multi-hop transfers
//!
//! A transfer forwards a payload along a route on the qubit lane. Each hop
//! is an acknowledged send followed by the next node taking the payload off
//! its lane; a confirmed hop consumes one shared resource on that link.
//!
//! Under [`RoutePolicy::WholeRoute`] the route computed at the source is
//! followed to the end. Under [`RoutePolicy::HopByHop`] the next hop is
//! recomputed from a fresh snapshot at every node, so resources used up
//! mid-flight steer the rest of the transfer.

use bytes::Bytes;
use qnet_core::{NodeId, RoutingError};
use qnet_routing::{Route, RouteComputer, RoutePolicy};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::context::NetworkContext;
use crate::error::SimResult;

/// Outcome of forwarding over one link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HopRecord {
    pub from: NodeId,
    pub to: NodeId,
    /// Weight of the link in the snapshot the hop was chosen from
    pub weight: f64,
    pub ack_received: bool,
    /// The next node took the payload off its lane within the wait window
    pub delivered: bool,
    pub resource_consumed: bool,
}

/// Outcome of a whole transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReport {
    pub source: NodeId,
    pub destination: NodeId,
    pub policy: RoutePolicy,
    /// Route computed at the source
    pub initial_route: Route,
    pub hops: Vec<HopRecord>,
    /// Payload as received by the destination
    #[serde(skip)]
    pub received: Option<Bytes>,
}

impl TransferReport {
    pub fn delivered(&self) -> bool {
        self.received.is_some()
    }

    /// Nodes actually visited, source first
    pub fn path(&self) -> Vec<NodeId> {
        let mut path = vec![self.source.clone()];
        path.extend(self.hops.iter().map(|hop| hop.to.clone()));
        path
    }

    pub fn resources_consumed(&self) -> usize {
        self.hops.iter().filter(|hop| hop.resource_consumed).count()
    }
}

/// Outcome of distributing one EPR pair along a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EprReport {
    pub route: Route,
    /// Links whose pair was confirmed, in route order
    pub confirmed_links: usize,
    /// Every link confirmed and every half taken by its receiver
    pub established: bool,
}

impl NetworkContext {
    /// Forward `payload` from `source` to `destination`
    ///
    /// "No route" at the source or at an intermediate hop comes back as
    /// [`RoutingError::NoRouteFound`]. A hop that is lost or not
    /// acknowledged ends the transfer early with `received == None`.
    #[instrument(skip(self, payload), fields(%policy, len = payload.len()))]
    pub async fn transfer(
        &self,
        source: &NodeId,
        destination: &NodeId,
        payload: Bytes,
        policy: RoutePolicy,
    ) -> SimResult<TransferReport> {
        let initial_route = self.compute_route(source, destination, policy)?;
        let mut report = TransferReport {
            source: source.clone(),
            destination: destination.clone(),
            policy,
            initial_route: initial_route.clone(),
            hops: Vec::new(),
            received: None,
        };

        let hop_limit = self.config().hop_limit;
        let mut current = source.clone();
        let mut carried = payload;

        while &current != destination {
            if report.hops.len() >= hop_limit {
                warn!(hop_limit, "Transfer exceeded hop limit");
                return Err(RoutingError::HopLimitExceeded(hop_limit).into());
            }

            let graph = self.resource_graph();
            let next = match policy {
                RoutePolicy::WholeRoute => initial_route
                    .next_after(&current)
                    .cloned()
                    .ok_or_else(|| RoutingError::BrokenLink {
                        from: current.clone(),
                        to: destination.clone(),
                    })?,
                RoutePolicy::HopByHop => {
                    RouteComputer::new(&graph).next_hop(&current, destination)?
                }
            };
            let weight = graph
                .edge(&current, &next)
                .map(|edge| edge.weight)
                .ok_or_else(|| RoutingError::BrokenLink {
                    from: current.clone(),
                    to: next.clone(),
                })?;

            let (hop, received) = self.forward_hop(&current, &next, carried, weight).await?;
            let ok = hop.ack_received && hop.delivered;
            report.hops.push(hop);

            match received {
                Some(payload) if ok => {
                    carried = payload;
                    current = next;
                }
                _ => {
                    warn!(from = %current, to = %next, "Hop failed, transfer aborted");
                    return Ok(report);
                }
            }
        }

        info!(
            path = ?report.path(),
            consumed = report.resources_consumed(),
            "Transfer delivered"
        );
        report.received = Some(carried);
        Ok(report)
    }

    async fn forward_hop(
        &self,
        from: &NodeId,
        to: &NodeId,
        payload: Bytes,
        weight: f64,
    ) -> SimResult<(HopRecord, Option<Bytes>)> {
        let sender = self.node(from)?;
        let receiver = self.node(to)?;
        let wait = self.config().channel.receive_wait;

        let receipt = sender
            .run_protocol(sender.send_qubit(to, payload, true))
            .await?;
        let received = receiver
            .run_protocol(receiver.get_qubit(from, Some(wait)))
            .await
            .map(|msg| msg.payload);

        // Resources are only used up by confirmed hops
        let resource_consumed = receipt.ack_received && sender.consume_resource(to);
        debug!(
            %from,
            %to,
            weight,
            ack = receipt.ack_received,
            delivered = received.is_some(),
            resource_consumed,
            "Hop forwarded"
        );

        let hop = HopRecord {
            from: from.clone(),
            to: to.clone(),
            weight,
            ack_received: receipt.ack_received,
            delivered: received.is_some(),
            resource_consumed,
        };
        Ok((hop, received))
    }

    /// Establish one EPR pair between `source` and `destination`
    ///
    /// Pairs are created link by link along the current best route; the
    /// end-to-end pair exists only when every link confirmed its pair.
    #[instrument(skip(self))]
    pub async fn distribute_epr(
        &self,
        source: &NodeId,
        destination: &NodeId,
    ) -> SimResult<EprReport> {
        let route = self.compute_route(source, destination, RoutePolicy::WholeRoute)?;
        let wait = self.config().channel.receive_wait;

        let mut confirmed_links = 0;
        let mut established = true;
        for (from, to) in route.segments() {
            let sender = self.node(from)?;
            let receiver = self.node(to)?;

            let outcome = sender.run_protocol(sender.send_epr(to, true)).await?;
            let half = receiver
                .run_protocol(receiver.get_epr(from, Some(wait)))
                .await;

            if outcome.ack_received && half.is_some() {
                confirmed_links += 1;
            } else {
                debug!(%from, %to, "EPR link not established");
                established = false;
                break;
            }
        }

        Ok(EprReport {
            route,
            confirmed_links,
            established,
        })
    }
}
