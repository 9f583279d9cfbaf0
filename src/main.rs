use anyhow::Context;
use embassy_sync::signal::Signal;
use env_logger::Builder;
use log::{LevelFilter, error, info};
use std::process::ExitCode;

use crate::config::NodeConfig;
use crate::node::NodeContext;
use crate::reactor::Reactor;
use crate::session::{InboundQueue, Role, SimulatedCoordinator};
use crate::shutdown::ShutdownSignal;

mod config;
mod error;
mod event;
mod node;
mod reactor;
mod sensors;
mod session;
mod shutdown;
#[cfg(test)]
mod testing;
mod time_driver;

static SHUTDOWN: ShutdownSignal = Signal::new();

fn main() -> ExitCode {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("sensor_node"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    // Until the wakeup is armed a termination signal just ends the process.
    if let Err(e) = shutdown::install_handlers() {
        error!("Failed to install signal handlers: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting up");

    match run() {
        Ok(()) => {
            info!("Stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config_path = NodeConfig::path_from_env();
    let config = NodeConfig::load_or_default(&config_path).with_context(|| format!("loading {}", config_path.display()))?;

    let inbound_queue: &'static InboundQueue = Box::leak(Box::new(InboundQueue::new()));

    // From here on a termination signal requests an orderly shutdown.
    shutdown::arm(&SHUTDOWN).context("arming shutdown wakeup")?;

    let sensors = sensors::from_config(&config);
    let session = SimulatedCoordinator::open(
        Role::Node,
        &config.coordinator.host,
        config.coordinator.port,
        inbound_queue.sender(),
        config.simulation.clone(),
    )
    .context("opening coordinator session")?;

    let node = NodeContext::new(Box::new(session), sensors, config.poller.clone());
    let node = Reactor::new(config.poller.interval(), &SHUTDOWN, inbound_queue.receiver())
        .run(node)
        .context("running reactor")?;

    node.shutdown();
    Ok(())
}
