//! CLI binary running the whole transaction pipeline in one process.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod simulator;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;
use txflow_bus::{Bus, Subscription, Topics};
use txflow_bus_memory::{MemoryBus, MemoryBusOptions};
use txflow_fanout::{EventRouter, SubscriptionRegistry};
use txflow_gateway::{Gateway, GatewayOptions};
use txflow_orchestrator::{Orchestrator, OrchestratorConfig, WeightedRandomRisk};

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bus error
    #[error(transparent)]
    Bus(#[from] txflow_bus_memory::Error),

    /// Gateway error
    #[error(transparent)]
    Gateway(#[from] txflow_gateway::Error),

    /// Orchestrator configuration error
    #[error(transparent)]
    Orchestrator(#[from] txflow_orchestrator::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Topic carrying transaction commands
    #[arg(long, default_value = "txn.commands", env = "TXFLOW_COMMAND_TOPIC")]
    command_topic: String,

    /// Topic receiving dead-letter records
    #[arg(long, default_value = "txn.dlq", env = "TXFLOW_DEAD_LETTER_TOPIC")]
    dead_letter_topic: String,

    /// Topic carrying domain events
    #[arg(long, default_value = "txn.events", env = "TXFLOW_EVENT_TOPIC")]
    event_topic: String,

    /// Probability that a transaction is classified HIGH risk
    #[arg(long, default_value_t = 0.2, env = "TXFLOW_HIGH_RISK_PROBABILITY")]
    high_risk_probability: f64,

    /// Address the WebSocket gateway listens on
    #[arg(long, default_value = "0.0.0.0:3003", env = "TXFLOW_LISTEN_ADDR")]
    listen_addr: SocketAddr,

    /// Partitions per bus topic
    #[arg(long, default_value_t = 3, env = "TXFLOW_PARTITIONS")]
    partitions: u32,

    /// Publish timeout in milliseconds
    #[arg(long, default_value_t = 5000, env = "TXFLOW_PUBLISH_TIMEOUT_MS")]
    publish_timeout_ms: u64,

    /// Publish a synthetic transaction every N milliseconds
    #[arg(long, env = "TXFLOW_SIMULATE_EVERY_MS")]
    simulate_every_ms: Option<u64>,

    /// Path of the WebSocket endpoint
    #[arg(long, default_value = "/ws", env = "TXFLOW_WS_PATH")]
    ws_path: String,
}

impl Args {
    fn topics(&self) -> Topics {
        Topics {
            commands: self.command_topic.clone(),
            events: self.event_topic.clone(),
            dead_letter: self.dead_letter_topic.clone(),
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;

        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    run(args, shutdown_token).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler failed");
    let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler failed");

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received interrupt signal");
}

async fn run(args: Args, shutdown_token: CancellationToken) -> Result<(), Error> {
    let topics = args.topics();

    let bus = MemoryBus::new(MemoryBusOptions {
        partitions: args.partitions,
        publish_timeout: Duration::from_millis(args.publish_timeout_ms),
        ..MemoryBusOptions::default()
    });
    bus.open().await?;

    let orchestrator = Orchestrator::new(
        bus.clone(),
        WeightedRandomRisk::new(args.high_risk_probability)?,
        OrchestratorConfig::from_topics(&topics),
    );
    let saga_subscription = orchestrator.start().await?;

    let registry = Arc::new(SubscriptionRegistry::new());
    let router_subscription = EventRouter::new(registry.clone())
        .start(&bus, &topics.events)
        .await?;

    let gateway = Gateway::new(
        GatewayOptions {
            listen_addr: args.listen_addr,
            path: args.ws_path.clone(),
            ..GatewayOptions::default()
        },
        registry,
    );
    gateway.start().await?;

    let task_tracker = TaskTracker::new();
    if let Some(every_ms) = args.simulate_every_ms {
        task_tracker.spawn(simulator::run(
            bus.clone(),
            topics.commands.clone(),
            Duration::from_millis(every_ms.max(1)),
            shutdown_token.clone(),
        ));
    }
    task_tracker.close();

    info!("txflow running, press Ctrl-C to stop");

    shutdown_token.cancelled().await;

    task_tracker.wait().await;
    gateway.shutdown().await;
    router_subscription.shutdown().await;
    saga_subscription.shutdown().await;
    bus.close().await?;

    info!("txflow stopped");

    Ok(())
}
