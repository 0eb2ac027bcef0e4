//! Binary entry point: load configuration and the account population, then
//! run the keep-alive cycle loop until terminated.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use url::Url;

use sessionkeeper_rs::{
    AccountStore, AppConfig, CycleDriver, EgressPool, RunnerConfig, SolverChain, SolverConfig,
    runner,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Keep-alive automation for reward-service accounts")]
struct Args {
    /// Bulk account list: identifier----secret----egress per line.
    #[arg(long, default_value = "accounts.txt")]
    accounts: PathBuf,

    /// Durable session store.
    #[arg(long, default_value = "accounts.json")]
    store: PathBuf,

    /// Optional shared proxy pool file, one descriptor per line.
    #[arg(long)]
    proxies: Option<PathBuf>,

    /// Solver and service configuration.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Minutes to sleep between cycles.
    #[arg(long, default_value_t = 10)]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    let store = AccountStore::new(&args.store);
    let import = runner::load_accounts(&args.accounts, &store)?;
    log::info!("loaded {} accounts", import.accounts.len());

    let pool = match &args.proxies {
        Some(path) => {
            let pool = EgressPool::load(path)?;
            log::info!("loaded {} egress descriptors", pool.len());
            pool
        }
        None => EgressPool::default(),
    };

    let solvers = Arc::new(SolverChain::from_settings(
        &config.solver,
        SolverConfig::default(),
    ));

    let mut runner_config = RunnerConfig {
        cycle_interval: Duration::from_secs(args.interval * 60),
        ..RunnerConfig::default()
    };
    if let Some(service_url) = &config.service_url {
        runner_config.service.base_url = Url::parse(service_url)?;
    }

    let mut driver = CycleDriver::new(import, pool, store, solvers, runner_config);
    driver.run_forever().await;
    Ok(())
}
