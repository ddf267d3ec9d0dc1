//! Worker entry point: parses CLI flags (spec §6), starts the `NodeEngine`
//! and its network source listener, then blocks until shutdown.

use nes_runtime_core::config::{ExitCode, WorkerConfig};
use nes_runtime_core::engine::{EngineConfig, NodeEngine};
use nes_runtime_core::network::{NetworkSource, SourceConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match WorkerConfig::parse(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(ExitCode::ConfigurationError as i32);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        coordinator_port = config.coordinator_port,
        rpc_port = config.rpc_port,
        data_port = config.data_port,
        number_of_slots = config.number_of_slots,
        "nes-worker starting"
    );

    let engine = NodeEngine::new(EngineConfig {
        num_buffers: config.number_of_buffers_in_global_buffer_manager as usize,
        buffer_size: config.buffer_size_in_bytes as usize,
        num_worker_threads: config.number_of_slots as usize,
        queue_capacity: config.number_of_slots as usize * 8,
    });

    let source = NetworkSource::new(SourceConfig {
        bind_addr: format!("0.0.0.0:{}", config.data_port),
        registration_grace_period: Duration::from_secs(5),
    });

    if let Err(err) = source.listen(Arc::clone(engine.partition_manager()), engine.buffer_pool().clone(), Arc::new(engine.clone())).await
    {
        tracing::error!(%err, "failed to start network source listener");
        std::process::exit(ExitCode::FatalRuntime as i32);
    }

    tracing::info!(node_id = %engine.node_id(), "nes-worker ready");
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("nes-worker shutting down");
}
