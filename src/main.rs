use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pegasus_arm_runtime::config::{LOOP_HZ, MAX_LOOP_HZ, MCU_BAUDRATE, MCU_PORT, RuntimeConfig};
use pegasus_arm_runtime::runtime::{self, RunOptions};

/// Pegasus arm runtime: encoder telemetry in, PID motor commands out
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial port of the arm MCU
    #[arg(long, default_value = MCU_PORT)]
    port: String,

    #[arg(long, default_value_t = MCU_BAUDRATE)]
    baud: u32,

    /// JSON runtime config; the built-in Pegasus arm when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without opening the serial link
    #[arg(long)]
    dry_run: bool,

    /// Control loop rate
    #[arg(
        long,
        default_value_t = LOOP_HZ,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LOOP_HZ)
    )]
    hz: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            match RuntimeConfig::load(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Config error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => RuntimeConfig::default(),
    };

    let options = RunOptions {
        port: args.port,
        baudrate: args.baud,
        config,
        dry_run: args.dry_run,
        hz: args.hz,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
