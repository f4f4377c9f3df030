//! `pq-partitiond` -- hosts one partition replica process: parses
//! configuration, wires the replica, role controller, and HTTP adapter
//! together, and serves until a shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use pq_server::config::PartitionConfig;
use pq_server::health::{LoggingSignalSink, OperationCounters};
use pq_server::network::{NetworkConfig, NetworkModule};
use pq_server::replica::PartitionReplica;
use pq_server::role::{ReplicaRole, RoleController};
use pq_server::store::memory::InMemoryStateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PartitionConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(partition_id = config.partition_id, "pq-partitiond starting");

    let partition_id = config.partition_id;
    let store = InMemoryStateStore::new(config.number_of_queues as usize);
    let network_config = NetworkConfig { host: config.host.clone(), port: config.port, ..NetworkConfig::default() };
    let config = Arc::new(config);

    let replica = Arc::new(PartitionReplica::new(partition_id, store, Arc::clone(&config), Arc::new(OperationCounters::new()))?);

    let role_controller = RoleController::new(Arc::clone(&replica), Arc::new(LoggingSignalSink));
    // A single, un-clustered process always hosts its partition's primary
    // replica; a placement service driving multi-replica failover would
    // instead call `transition` as placement decisions change.
    role_controller.transition(ReplicaRole::Primary);

    let mut network = NetworkModule::new(network_config, replica);
    let port = network.start().await?;
    info!(partition_id = config.partition_id, port, "pq-partitiond listening");

    network.serve(shutdown_signal()).await?;

    info!("pq-partitiond stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
