//! Kit configuration.
//!
//! Defaults match the reference network; the binary loads overrides from `STELLAR_*`
//! environment variables (a `.env` file is honoured).

use super::types::KitError;
use crate::models::DEFAULT_BASE_RESERVE;

use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Horizon caps page sizes at this value.
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
	#[default]
	MainNet,
	TestNet,
}

impl Network {
	pub fn default_horizon_url(&self) -> &'static str {
		match self {
			Network::MainNet => "https://horizon.stellar.lobstr.co",
			Network::TestNet => "https://horizon-testnet.stellar.org",
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Network::MainNet => "MainNet",
			Network::TestNet => "TestNet",
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Network {
	type Err = KitError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"mainnet" | "main" | "public" => Ok(Network::MainNet),
			"testnet" | "test" => Ok(Network::TestNet),
			other => Err(KitError::Config(format!("unknown network `{}`", other))),
		}
	}
}

/// Delays applied between update stream reconnects.
///
/// The first reconnect after a healthy stream is immediate; consecutive failures back off
/// exponentially up to `max_delay`. Reconnecting never gives up.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
	pub initial_delay: Duration,
	pub max_delay: Duration,
	pub multiplier: f64,
}

impl Default for ReconnectConfig {
	fn default() -> Self {
		Self {
			initial_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(30),
			multiplier: 2.0,
		}
	}
}

#[derive(Debug, Clone)]
pub struct KitConfig {
	pub network: Network,
	/// Overrides the network's default Horizon URL.
	pub horizon_url: Option<String>,
	pub data_dir: PathBuf,
	/// Distinguishes stores of several wallets on the same device.
	pub wallet_id: String,
	/// Operations requested per remote page.
	pub page_size: usize,
	pub base_reserve: Decimal,
	pub reconnect: ReconnectConfig,
}

impl Default for KitConfig {
	fn default() -> Self {
		Self {
			network: Network::default(),
			horizon_url: None,
			data_dir: PathBuf::from("./data"),
			wallet_id: "default".to_string(),
			page_size: 50,
			base_reserve: DEFAULT_BASE_RESERVE,
			reconnect: ReconnectConfig::default(),
		}
	}
}

impl KitConfig {
	/// Load configuration from the environment, falling back to defaults.
	pub fn from_env() -> Result<Self, KitError> {
		dotenvy::dotenv().ok();
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Build from an arbitrary key lookup.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, KitError> {
		let mut config = Self::default();

		if let Some(network) = lookup("STELLAR_NETWORK") {
			config.network = network.parse()?;
		}
		config.horizon_url = lookup("STELLAR_HORIZON_URL");
		if let Some(data_dir) = lookup("STELLAR_DATA_DIR") {
			config.data_dir = PathBuf::from(data_dir);
		}
		if let Some(wallet_id) = lookup("STELLAR_WALLET_ID") {
			config.wallet_id = wallet_id;
		}
		if let Some(page_size) = lookup("STELLAR_PAGE_SIZE") {
			config.page_size = page_size
				.parse()
				.map_err(|_| KitError::Config(format!("invalid STELLAR_PAGE_SIZE `{}`", page_size)))?;
		}
		if let Some(base_reserve) = lookup("STELLAR_BASE_RESERVE") {
			config.base_reserve = Decimal::from_str(&base_reserve).map_err(|_| {
				KitError::Config(format!("invalid STELLAR_BASE_RESERVE `{}`", base_reserve))
			})?;
		}

		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), KitError> {
		if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
			return Err(KitError::Config(format!(
				"page size must be between 1 and {}",
				MAX_PAGE_SIZE
			)));
		}
		if self.wallet_id.is_empty() {
			return Err(KitError::Config("wallet id must not be empty".to_string()));
		}
		Ok(())
	}

	pub fn horizon_url(&self) -> &str {
		self.horizon_url
			.as_deref()
			.unwrap_or_else(|| self.network.default_horizon_url())
	}

	/// One database per wallet/network pairing.
	pub fn database_path(&self) -> PathBuf {
		self.data_dir
			.join(format!("stellar-{}-{}.sqlite", self.wallet_id, self.network))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| vars.get(key).cloned()
	}

	#[test]
	fn test_default_config() {
		let config = KitConfig::from_lookup(lookup(&[])).unwrap();

		assert_eq!(config.network, Network::MainNet);
		assert_eq!(config.horizon_url(), "https://horizon.stellar.lobstr.co");
		assert_eq!(config.page_size, 50);
		assert_eq!(config.base_reserve, DEFAULT_BASE_RESERVE);
		assert_eq!(
			config.database_path(),
			PathBuf::from("./data/stellar-default-MainNet.sqlite")
		);
	}

	#[test]
	fn test_overrides() {
		let config = KitConfig::from_lookup(lookup(&[
			("STELLAR_NETWORK", "testnet"),
			("STELLAR_WALLET_ID", "w1"),
			("STELLAR_DATA_DIR", "/tmp/kit"),
			("STELLAR_PAGE_SIZE", "200"),
		]))
		.unwrap();

		assert_eq!(config.network, Network::TestNet);
		assert_eq!(config.horizon_url(), "https://horizon-testnet.stellar.org");
		assert_eq!(config.page_size, 200);
		assert_eq!(
			config.database_path(),
			PathBuf::from("/tmp/kit/stellar-w1-TestNet.sqlite")
		);
	}

	#[test]
	fn test_rejects_invalid_values() {
		assert!(KitConfig::from_lookup(lookup(&[("STELLAR_NETWORK", "moon")])).is_err());
		assert!(KitConfig::from_lookup(lookup(&[("STELLAR_PAGE_SIZE", "0")])).is_err());
		assert!(KitConfig::from_lookup(lookup(&[("STELLAR_PAGE_SIZE", "500")])).is_err());
		assert!(KitConfig::from_lookup(lookup(&[("STELLAR_BASE_RESERVE", "half")])).is_err());
	}
}
