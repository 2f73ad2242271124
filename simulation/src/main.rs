//! qnet - hybrid quantum/classical network simulation
//!
//! Runs the demo scenarios: resource-aware routing over a diamond, data
//! qubits and EPR pairs over a line, and Kyber768 handshakes.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use qnet_logging::{FileConfig, LogConfig, QnetSubscriberBuilder, RotationStrategy, WorkerGuard};

use qnet_simulation::scenarios::{self, RoutingOptions};
use qnet_simulation::{RoutePolicy, SimConfig, topology};

#[derive(Parser)]
#[command(
    name = "qnet",
    about = "Hybrid quantum/classical network simulation",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file with simulation settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSONL logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a qubit from A to B over the diamond
    Routing {
        /// Pre-seed two resources on node_1 -> B
        #[arg(long)]
        seed_n1_b: bool,

        /// Recompute the route before every hop
        #[arg(long)]
        hop_by_hop: bool,

        /// Run the replenishers this long before routing
        #[arg(long)]
        warmup_ms: Option<u64>,
    },

    /// Relay excited qubits Alice -> Bob -> Eve -> Dean
    Qubits {
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Establish EPR pairs between A and C over A - B - C
    Epr {
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },

    /// Kyber768 handshake between Alice and Bob
    Handshake,

    /// Handshake first, then entanglement generation
    Gated {
        /// How long the replenishers run after the handshake
        #[arg(long, default_value = "12000")]
        warmup_ms: u64,
    },

    /// Print a topology
    Topology {
        #[arg(short, long, value_enum, default_value = "diamond")]
        kind: TopologyKind,

        /// Node count for rings
        #[arg(short, long, default_value = "6")]
        nodes: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TopologyKind {
    Diamond,
    Line,
    Pair,
    Ring,
}

fn init_logging(cli: &Cli) -> Option<WorkerGuard> {
    let config = if cli.verbose {
        LogConfig::development()
    } else {
        LogConfig::interactive()
    };
    let mut builder = QnetSubscriberBuilder::new().with_config(config);
    if let Some(dir) = &cli.log_dir {
        builder = builder.with_file_output(FileConfig {
            directory: dir.clone(),
            rotation: RotationStrategy::Never,
            ..FileConfig::default()
        });
    }
    builder.init()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli);

    let config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };

    match cli.command {
        Commands::Routing {
            seed_n1_b,
            hop_by_hop,
            warmup_ms,
        } => {
            let options = RoutingOptions {
                seed_node1_b: seed_n1_b,
                policy: if hop_by_hop {
                    RoutePolicy::HopByHop
                } else {
                    config.policy
                },
                warmup: warmup_ms.map(Duration::from_millis),
            };
            let outcome = scenarios::run_routing_scenario(config, options).await?;
            println!("Route: {} (weight {})", outcome.route, outcome.weight);
            println!(
                "Path taken: {}",
                outcome
                    .transfer
                    .path()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
            println!(
                "Delivered: {}, resources consumed: {}",
                outcome.transfer.delivered(),
                outcome.transfer.resources_consumed()
            );
            print_pools(&outcome.pools);
        }
        Commands::Qubits { count } => {
            let outcome = scenarios::run_qubit_scenario(config, count).await?;
            println!("Sent {} qubits, {} delivered", outcome.sent, outcome.delivered);
            for (i, m) in outcome.measurements.iter().enumerate() {
                println!("  qubit {i}: measured {m}");
            }
        }
        Commands::Epr { count } => {
            let outcome = scenarios::run_epr_scenario(config, count).await?;
            println!("Established {}/{} EPR pairs", outcome.established(), count);
            print_pools(&outcome.pools);
        }
        Commands::Handshake => {
            let outcome = scenarios::run_handshake_scenario(config).await?;
            println!("KEM: {}", outcome.kem);
            println!("Alice secret: {}", outcome.initiator_fingerprint);
            println!("Bob secret:   {}", outcome.responder_fingerprint);
            println!("Secrets match: {}", outcome.secrets_match);
        }
        Commands::Gated { warmup_ms } => {
            let outcome =
                scenarios::run_gated_scenario(config, Duration::from_millis(warmup_ms)).await?;
            println!(
                "Greeting acked: {}, received: {}",
                outcome.greeting_acked, outcome.greeting_received
            );
            println!("Secrets match: {}", outcome.secrets_match);
            println!(
                "Replenisher: {} cycles, {} generated",
                outcome.stats.cycles, outcome.stats.generated
            );
            print_pools(&outcome.pools);
        }
        Commands::Topology { kind, nodes } => {
            let topology = match kind {
                TopologyKind::Diamond => topology::diamond()?,
                TopologyKind::Line => topology::line(&["Alice", "Bob", "Eve", "Dean"])?,
                TopologyKind::Pair => topology::pair("Alice", "Bob")?,
                TopologyKind::Ring => topology::ring(nodes)?,
            };
            println!("{}", topology.visualize());
        }
    }

    Ok(())
}

fn print_pools(pools: &std::collections::BTreeMap<String, u32>) {
    println!("Resource pools:");
    for (link, count) in pools {
        println!("  {link}: {count}");
    }
}
