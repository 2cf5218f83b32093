use anyhow::Context;
use clap::Parser;
use recgate::application::{bind, Dispatcher, FaultPolicy, FAULT_EXIT_CODE};
use recgate::config::Config;
use recgate::infrastructure::logging;
use recgate::infrastructure::protocols::control::TransportManager;
use recgate::infrastructure::recorders::DefaultBackends;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// SIPREC recording gateway
#[derive(Debug, Parser)]
#[command(name = "recgate", version, about)]
struct Args {
    /// TOML configuration file; `RECGATE__*` variables override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Logging is configured from the file, so nothing can be logged before this
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("recgate: {}", e);
            std::process::exit(FAULT_EXIT_CODE);
        }
    };
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("recgate: {:#}", e);
        std::process::exit(FAULT_EXIT_CODE);
    }

    let policy = FaultPolicy::process();
    policy.install_panic_hook();
    policy.run_guarded("recgate", run(config, policy.clone())).await;
}

async fn run(config: Config, policy: FaultPolicy) -> anyhow::Result<()> {
    info!("Starting recgate v{}", env!("CARGO_PKG_VERSION"));

    let config = config.validate().context("invalid configuration")?;
    let recorder = bind(&config.recorder, &DefaultBackends, &policy)?;
    info!(
        recorder = %recorder.kind(),
        endpoint = %config.control_plane.transport.endpoint(),
        "Recorder bound, starting control plane"
    );

    let dispatcher = Arc::new(Dispatcher::for_recorder(&recorder, &policy));
    let manager = Arc::new(TransportManager::new(config.control_plane, dispatcher));

    tokio::select! {
        result = manager.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down recgate"),
    }
    Ok(())
}
