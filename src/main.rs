use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

mod cli;

use cli::Args;
use kitchen_storage_manager::clock::SystemClock;
use kitchen_storage_manager::harness::{ExecutionHarness, HarnessConfig};
use kitchen_storage_manager::ledger::Ledger;
use kitchen_storage_manager::source::ChallengeServerSource;
use kitchen_storage_manager::storage::StorageManager;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "execution harness failed");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = HarnessConfig {
        rate: args.rate,
        pickup_min_s: args.pickup_min,
        pickup_max_s: args.pickup_max,
        rng_seed: (args.seed != 0).then_some(args.seed),
        ..HarnessConfig::default()
    };
    config.validate()?;

    let source = Arc::new(ChallengeServerSource::new(&args.endpoint, &args.auth));
    source.fetch_challenge(&args.name, args.seed)?;
    info!(test_id = %source.test_id(), "fetched challenge");

    let clock = Arc::new(SystemClock::new());
    let ledger = Arc::new(Ledger::new());
    let storage = Arc::new(StorageManager::new(clock, ledger));

    let harness = ExecutionHarness::new(storage, source.clone(), source, config);
    harness.run()?;

    info!("execution completed successfully");
    Ok(())
}
