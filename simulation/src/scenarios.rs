//! Pre-defined scenarios
//!
//! Each scenario builds its own [`NetworkContext`], runs to completion and
//! shuts the context down, returning a plain outcome the CLI prints and the
//! tests assert on.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use qnet_core::{NodeId, ResourceHost};
use qnet_crypto::{Kem, Kyber768};
use qnet_handshake::debug_secrets_match;
use qnet_routing::{ReplenishStats, Route, RoutePolicy};
use serde::Serialize;
use tracing::info;

use crate::config::SimConfig;
use crate::context::NetworkContext;
use crate::error::SimResult;
use crate::topology;
use crate::transfer::{EprReport, TransferReport};

/// Payload of a data qubit after an X gate on |0>
pub const EXCITED_QUBIT: &[u8] = &[1];

/// Greeting sent before the gated handshake
pub const GATED_GREETING: &[u8] = b"PQC_Hello";

fn id(name: &str) -> SimResult<NodeId> {
    Ok(NodeId::new(name)?)
}

// ============================================================================
// Routing over the diamond
// ============================================================================

/// Knobs for [`run_routing_scenario`]
#[derive(Debug, Clone, Default)]
pub struct RoutingOptions {
    /// Pre-seed node_1's pool toward B with two resources
    pub seed_node1_b: bool,
    pub policy: RoutePolicy,
    /// Let the replenishers run this long before routing
    pub warmup: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingOutcome {
    pub route: Route,
    pub weight: f64,
    pub transfer: TransferReport,
    /// Pool counts per directed link after the transfer
    pub pools: BTreeMap<String, u32>,
}

/// Route a qubit from A to B over the diamond
pub async fn run_routing_scenario(
    config: SimConfig,
    options: RoutingOptions,
) -> SimResult<RoutingOutcome> {
    info!(?options, "=== Routing scenario ===");
    let context = topology::diamond()?.build(config)?;
    let (a, b) = (id("A")?, id("B")?);

    if options.seed_node1_b {
        context.node(&id("node_1")?)?.seed_resources(&b, 2)?;
    }
    if let Some(warmup) = options.warmup {
        context.start_replenishers().await?;
        tokio::time::sleep(warmup).await;
        context.stop_replenishers().await;
    }

    let route = context.compute_route(&a, &b, options.policy)?;
    let weight = context
        .resource_graph()
        .path_weight(route.hops())
        .unwrap_or(f64::INFINITY);
    let transfer = context
        .transfer(&a, &b, Bytes::from_static(EXCITED_QUBIT), options.policy)
        .await?;
    let pools = pool_counts(&context);

    context.shutdown().await;
    Ok(RoutingOutcome {
        route,
        weight,
        transfer,
        pools,
    })
}

// ============================================================================
// Data qubits over a line
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct QubitOutcome {
    pub sent: usize,
    pub delivered: usize,
    /// Measurement at the far end of every delivered qubit
    pub measurements: Vec<u8>,
}

/// Send `count` excited qubits Alice -> Bob -> Eve -> Dean and measure them
pub async fn run_qubit_scenario(config: SimConfig, count: usize) -> SimResult<QubitOutcome> {
    info!(count, "=== Qubit relay scenario ===");
    let context = topology::line(&["Alice", "Bob", "Eve", "Dean"])?.build(config)?;
    let (alice, dean) = (id("Alice")?, id("Dean")?);
    let policy = context.config().policy;

    let mut measurements = Vec::with_capacity(count);
    for _ in 0..count {
        let report = context
            .transfer(&alice, &dean, Bytes::from_static(EXCITED_QUBIT), policy)
            .await?;
        if let Some(qubit) = report.received {
            measurements.push(qubit.first().copied().unwrap_or(0));
        }
    }

    context.shutdown().await;
    info!(delivered = measurements.len(), "Qubits measured at Dean");
    Ok(QubitOutcome {
        sent: count,
        delivered: measurements.len(),
        measurements,
    })
}

// ============================================================================
// EPR pairs over a line
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EprScenarioOutcome {
    pub reports: Vec<EprReport>,
    pub pools: BTreeMap<String, u32>,
}

impl EprScenarioOutcome {
    pub fn established(&self) -> usize {
        self.reports.iter().filter(|r| r.established).count()
    }
}

/// Establish `count` EPR pairs between A and C over A - B - C
pub async fn run_epr_scenario(config: SimConfig, count: usize) -> SimResult<EprScenarioOutcome> {
    info!(count, "=== EPR distribution scenario ===");
    let context = topology::line(&["A", "B", "C"])?.build(config)?;
    let (a, c) = (id("A")?, id("C")?);

    let mut reports = Vec::with_capacity(count);
    for _ in 0..count {
        reports.push(context.distribute_epr(&a, &c).await?);
    }
    let pools = pool_counts(&context);

    context.shutdown().await;
    Ok(EprScenarioOutcome { reports, pools })
}

// ============================================================================
// Handshakes
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HandshakeOutcome {
    pub kem: &'static str,
    pub initiator_fingerprint: String,
    pub responder_fingerprint: String,
    pub secrets_match: bool,
}

/// Kyber768 handshake between Alice and Bob
pub async fn run_handshake_scenario(config: SimConfig) -> SimResult<HandshakeOutcome> {
    info!(kem = Kyber768::NAME, "=== Handshake scenario ===");
    let context = topology::pair("Alice", "Bob")?.build(config)?;

    let (initiator, responder) = context.handshake(&id("Alice")?, &id("Bob")?).await?;
    let outcome = HandshakeOutcome {
        kem: Kyber768::NAME,
        initiator_fingerprint: initiator.fingerprint(),
        responder_fingerprint: responder.fingerprint(),
        secrets_match: debug_secrets_match(&initiator, &responder),
    };

    context.shutdown().await;
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
pub struct GatedOutcome {
    pub greeting_acked: bool,
    pub greeting_received: bool,
    pub secrets_match: bool,
    pub pools: BTreeMap<String, u32>,
    #[serde(skip)]
    pub stats: ReplenishStats,
}

/// Greeting, then a handshake, then entanglement generation on the link
///
/// Replenishment only starts once both sides hold the same secret.
pub async fn run_gated_scenario(config: SimConfig, warmup: Duration) -> SimResult<GatedOutcome> {
    info!(?warmup, "=== Handshake-gated entanglement scenario ===");
    let context = topology::pair("Alice", "Bob")?.build(config)?;
    let (alice_id, bob_id) = (id("Alice")?, id("Bob")?);
    let alice = context.node(&alice_id)?;
    let bob = context.node(&bob_id)?;

    let receipt = alice
        .run_protocol(alice.send_classical(&bob_id, GATED_GREETING, true))
        .await?;
    let greeting = bob
        .run_protocol(bob.get_classical(&alice_id, Some(context.config().channel.receive_wait)))
        .await;
    let greeting_received = greeting.is_some_and(|msg| msg.payload.as_ref() == GATED_GREETING);

    let (initiator, responder) = context.handshake(&alice_id, &bob_id).await?;
    let secrets_match = debug_secrets_match(&initiator, &responder);

    let mut stats = ReplenishStats::default();
    if secrets_match {
        context.start_replenishers().await?;
        tokio::time::sleep(warmup).await;
        stats = context.stop_replenishers().await;
    }
    let pools = pool_counts(&context);
    info!(
        alice_bob = alice.resource_count(&bob_id),
        bob_alice = bob.resource_count(&alice_id),
        generated = stats.generated,
        "Gated entanglement done"
    );

    context.shutdown().await;
    Ok(GatedOutcome {
        greeting_acked: receipt.ack_received,
        greeting_received,
        secrets_match,
        pools,
        stats,
    })
}

/// Pool counts keyed "owner -> peer"
pub fn pool_counts(context: &NetworkContext) -> BTreeMap<String, u32> {
    context
        .nodes()
        .iter()
        .flat_map(|node| {
            node.ledger()
                .snapshot()
                .into_iter()
                .map(|(peer, count)| (format!("{} -> {}", node.id(), peer), count))
                .collect::<Vec<_>>()
        })
        .collect()
}
