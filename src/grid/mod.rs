//! Grid Trading Module for Hyperliquid perpetuals
//!
//! A ladder of `2N + 1` limit orders is kept around an hourly SMA. Every
//! opening fill gets a closing order one gridline away, every closing fill
//! re-places the opening order, and once per epoch the ladder is rebuilt
//! around a fresh SMA while open fills are carried forward.
//!
//! # Architecture
//!
//! - [`config`] - Grid configuration, validation and price/size precision
//! - [`types`] - Core data types (OrderSide, FillDirection, GridFill, ...)
//! - [`errors`] - Grid-specific error types
//! - [`model`] - Gridline ladder
//! - [`ledger`] - Per-gridline orders, filled quantities and closing links
//! - [`reconciler`] - Fill polling and follow-up orders
//! - [`rebalancer`] - Epoch schedule, SMA centre and ladder rebuild
//! - [`engine`] - Owner of all strategy state
//! - [`executor`] - Exchange abstraction (mockable for testing)
//! - [`retry`] - Reconnecting retry wrapper around an exchange
//! - [`runner`] - Main execution loop and wind-down
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use hyperliquid_grid_bot::grid::{
//!     GridConfig, GridEngine, GridRunner, HyperliquidConnector, ReconnectingExchange,
//!     RetryPolicy, RunnerConfig,
//! };
//!
//! let config = GridConfig::new("ETH", 0.005, 10, 0.05, 5);
//! let engine = GridEngine::new(config, Duration::from_secs(3600))?;
//! let exchange = ReconnectingExchange::connect(connector, RetryPolicy::default()).await?;
//!
//! let (tx, rx) = tokio::sync::watch::channel(false);
//! let stats = GridRunner::new(engine, exchange, RunnerConfig::default(), rx).run().await?;
//! ```
//!
//! # Testing
//!
//! ```rust,ignore
//! use hyperliquid_grid_bot::grid::executor::mock::MockExchange;
//!
//! let exchange = MockExchange::new(100.0);
//! exchange.set_closes(&[100.0; 50]).await;
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod ledger;
pub mod model;
pub mod rebalancer;
pub mod reconciler;
pub mod retry;
pub mod runner;
pub mod types;

// Re-export commonly used types
pub use config::{AssetPrecision, GridConfig};
pub use engine::GridEngine;
pub use errors::{GridError, GridResult};
pub use executor::{submit_order, GridExchange, HyperliquidExchange};
pub use ledger::{LedgerMiss, OrderLedger, OrderSlot};
pub use model::Grid;
pub use rebalancer::{plan_orders, GridRebalancer, PlannedOrder, RebalanceSchedule};
pub use reconciler::{FillReconciler, ReconcileSummary};
pub use retry::{ExchangeConnector, HyperliquidConnector, ReconnectingExchange, RetryPolicy};
pub use runner::{GridRunner, RunnerConfig};
pub use types::{
    Candle, FillDirection, GridFill, GridOrderRequest, OpenOrder, OrderResult, OrderResultStatus,
    OrderSide, SessionStats,
};
