use clap::Parser;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::LOOP_HZ;
use swerve_zenoh_runtime::runtime::{self, Backend};

/// Swerve chassis runtime: teleop and base commands in, pose and health out
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Module hardware backend
    #[arg(long, value_enum, default_value_t = Backend::Sim)]
    backend: Backend,

    /// Control loop rate in Hz
    #[arg(long, default_value_t = LOOP_HZ)]
    hz: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    if let Err(e) = runtime::run(args.backend, args.hz).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
