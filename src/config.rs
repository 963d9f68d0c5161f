use std::time::Duration;

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
pub use config::ConfigError;
use serde::Deserialize;

use crate::grid::{GridConfig, GridError, GridResult, RetryPolicy, RunnerConfig};
use crate::BaseUrl;

/// Optional settings file, overlaid by environment variables
pub const CONFIG_FILE: &str = "gridbot";

/// Bot settings.
///
/// Keys are the lower-cased environment variable names, so `MARKET=ETH`
/// and `market = "ETH"` in `gridbot.toml` set the same field.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Trade on testnet with `TESTNET_PRIVATE_KEY`
    #[serde(default)]
    pub test_run: bool,
    /// Mainnet signing key (an API agent key is enough)
    #[serde(default)]
    pub agent_private_key: Option<String>,
    #[serde(default)]
    pub testnet_private_key: Option<String>,
    /// Account whose orders and fills are queried, when the key is an agent's
    #[serde(default)]
    pub account_address: Option<String>,

    /// Perp coin to trade (e.g., "ETH")
    pub market: String,
    pub maximum_leverage: u32,
    /// Spacing between gridlines as a fraction of the centre
    pub size_grid_interval: f64,
    /// Gridlines on each side of the midline
    pub num_grid_intervals: usize,
    /// Coins per order
    pub unit_size: f64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_epoch_secs")]
    pub epoch_secs: u64,
    #[serde(default = "default_sma_window_hours")]
    pub sma_window_hours: u64,
    /// Fills examined per tick; defaults to `num_grid_intervals`
    #[serde(default)]
    pub fill_window: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_wind_down_attempts")]
    pub wind_down_attempts: u32,

    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_epoch_secs() -> u64 {
    3600
}

fn default_sma_window_hours() -> u64 {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_wind_down_attempts() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Settings {
    /// Load `gridbot.toml` if present, then environment variables on top
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder().add_source(File::with_name(CONFIG_FILE).required(false)))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn base_url(&self) -> BaseUrl {
        if self.test_run {
            BaseUrl::Testnet
        } else {
            BaseUrl::Mainnet
        }
    }

    /// Signing wallet for the selected network
    pub fn wallet(&self) -> GridResult<PrivateKeySigner> {
        let (name, key) = if self.test_run {
            ("TESTNET_PRIVATE_KEY", &self.testnet_private_key)
        } else {
            ("AGENT_PRIVATE_KEY", &self.agent_private_key)
        };
        let key = key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GridError::InvalidConfig(format!("{} is not set", name)))?;

        key.trim()
            .parse::<PrivateKeySigner>()
            .map_err(|_| GridError::InvalidConfig(format!("{} is not a valid private key", name)))
    }

    /// `ACCOUNT_ADDRESS` if set, otherwise the wallet's own address
    pub fn account_address(&self, wallet: &PrivateKeySigner) -> GridResult<Address> {
        match self.account_address.as_deref().map(str::trim) {
            Some(address) if !address.is_empty() => address.parse::<Address>().map_err(|e| {
                GridError::InvalidConfig(format!("ACCOUNT_ADDRESS '{}': {}", address, e))
            }),
            _ => Ok(wallet.address()),
        }
    }

    pub fn grid_config(&self) -> GridResult<GridConfig> {
        let mut config = GridConfig::new(
            self.market.trim(),
            self.size_grid_interval,
            self.num_grid_intervals,
            self.unit_size,
            self.maximum_leverage,
        );
        config.fill_window = self.fill_window;
        config.sma_window_hours = self.sma_window_hours;
        config.validate()?;
        Ok(config)
    }

    pub fn epoch(&self) -> GridResult<Duration> {
        if self.epoch_secs == 0 {
            return Err(GridError::InvalidConfig("EPOCH_SECS must be positive".into()));
        }
        Ok(Duration::from_secs(self.epoch_secs))
    }

    pub fn runner_config(&self) -> GridResult<RunnerConfig> {
        if self.poll_interval_secs == 0 {
            return Err(GridError::InvalidConfig(
                "POLL_INTERVAL_SECS must be positive".into(),
            ));
        }
        Ok(RunnerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            wind_down_attempts: self.wind_down_attempts.max(1),
            wind_down_retry_delay: Duration::from_secs(self.retry_delay_secs),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const TEST_KEY: &str = "e908f86dbb4d55ac876378565aafeabc187f6690f046459397b17d9b9a19688e";

    fn parse(toml: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_defaults_and_grid_config() {
        let settings = parse(
            r#"
            market = "ETH"
            maximum_leverage = 5
            size_grid_interval = 0.01
            num_grid_intervals = 4
            unit_size = 0.1
            "#,
        )
        .unwrap();

        assert!(!settings.test_run);
        assert_eq!(settings.base_url(), BaseUrl::Mainnet);
        assert_eq!(settings.poll_interval_secs, 15);
        assert_eq!(settings.epoch().unwrap(), Duration::from_secs(3600));
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.runner_config().unwrap().wind_down_attempts, 10);
        assert_eq!(settings.log_dir, "logs");

        let grid = settings.grid_config().unwrap();
        assert_eq!(grid.asset, "ETH");
        assert_eq!(grid.num_lines(), 9);
        assert_eq!(grid.fill_window(), 4);
        assert_eq!(grid.sma_window_hours, 50);
    }

    #[test]
    fn test_missing_required_key() {
        assert!(parse(r#"market = "ETH""#).is_err());
    }

    #[test]
    fn test_invalid_grid_rejected() {
        let settings = parse(
            r#"
            market = "ETH"
            maximum_leverage = 5
            size_grid_interval = 0.5
            num_grid_intervals = 4
            unit_size = 0.1
            "#,
        )
        .unwrap();
        assert!(matches!(
            settings.grid_config(),
            Err(GridError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_wallet_follows_network() {
        let settings = parse(&format!(
            r#"
            test_run = true
            agent_private_key = "not a key"
            testnet_private_key = "{TEST_KEY}"
            market = "ETH"
            maximum_leverage = 5
            size_grid_interval = 0.01
            num_grid_intervals = 4
            unit_size = 0.1
            "#
        ))
        .unwrap();

        assert_eq!(settings.base_url(), BaseUrl::Testnet);
        let wallet = settings.wallet().unwrap();
        assert_eq!(settings.account_address(&wallet).unwrap(), wallet.address());

        let mainnet = Settings {
            test_run: false,
            ..settings.clone()
        };
        assert!(mainnet.wallet().is_err());

        let with_account = Settings {
            account_address: Some("0x0000000000000000000000000000000000000001".into()),
            ..settings
        };
        assert_eq!(
            with_account.account_address(&wallet).unwrap(),
            Address::with_last_byte(1)
        );
    }
}
