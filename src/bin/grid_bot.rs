//! Grid Trading Bot Binary
//!
//! Runs the SMA-centred perp grid on Hyperliquid until Ctrl-C, then cancels
//! the grid's orders and closes the position.
//!
//! ## Setup
//!
//! 1. Create a `.env` file in the working directory (or a `gridbot.toml`):
//!    ```text
//!    TEST_RUN=True
//!    TESTNET_PRIVATE_KEY=0xYourPrivateKeyHere
//!    AGENT_PRIVATE_KEY=0xYourAgentKeyHere
//!    ACCOUNT_ADDRESS=0xYourAccount
//!    MARKET=ETH
//!    MAXIMUM_LEVERAGE=5
//!    SIZE_GRID_INTERVAL=0.005
//!    NUM_GRID_INTERVALS=10
//!    UNIT_SIZE=0.01
//!    ```
//!
//! 2. Run the bot:
//!    ```bash
//!    cargo run --bin grid_bot
//!    ```

use std::process::ExitCode;

use log::{error, info, warn};
use tokio::sync::watch;

use hyperliquid_grid_bot::{
    config::Settings,
    grid::{GridEngine, GridResult, GridRunner, HyperliquidConnector, ReconnectingExchange},
    logging::init_logging,
};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match init_logging(&settings.log_level, &settings.log_dir) {
        Ok(path) => info!("Logging to {}", path.display()),
        Err(e) => {
            eprintln!("Failed to initialise logging: {}", e);
            return ExitCode::FAILURE;
        }
    }
    match dotenv {
        Ok(path) => info!("Loaded environment from: {}", path.display()),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            // keep the sender alive so the runner is not stopped
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, winding down");
        let _ = shutdown_tx.send(true);
    });

    match run(settings, shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Grid bot stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings, shutdown: watch::Receiver<bool>) -> GridResult<()> {
    let grid_config = settings.grid_config()?;
    let runner_config = settings.runner_config()?;
    let engine = GridEngine::new(grid_config.clone(), settings.epoch()?)?;

    let wallet = settings.wallet()?;
    let account = settings.account_address(&wallet)?;
    let base_url = settings.base_url();

    info!(
        "Network: {:?}, account: {}, market: {}",
        base_url, account, grid_config.asset
    );
    info!(
        "Grid: {} lines, interval {}, unit size {}, leverage {}x",
        grid_config.num_lines(),
        grid_config.interval,
        grid_config.unit_size,
        grid_config.leverage
    );

    let connector = HyperliquidConnector::new(base_url, wallet, account);
    let exchange = ReconnectingExchange::connect(connector, settings.retry_policy()).await?;

    let stats = GridRunner::new(engine, exchange, runner_config, shutdown)
        .run()
        .await?;
    info!(
        "Final: net pnl {:.4} over {} round trips",
        stats.net_pnl(),
        stats.round_trips
    );
    Ok(())
}
