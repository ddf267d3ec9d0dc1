//! Coordinator entry point. The coordinator's REST/RPC surface and query
//! catalog are out of scope for this core (spec §1); this binary only wires
//! up logging and configuration so a worker has something to register
//! against in integration environments.

use nes_runtime_core::config::{CoordinatorConfig, ExitCode};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match CoordinatorConfig::parse(&args) {
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
        rest_port = config.rest_port,
        number_of_slots = config.number_of_slots,
        "nes-coordinator starting"
    );

    tracing::warn!("coordinator REST/RPC surface is out of scope for this build; process will idle");
    std::thread::park();
}
