//! Balance synchronizer.
//!
//! Pulls the account document, derives one [`AssetBalance`] per asset and replaces the local
//! balance set in a single transaction. An account that does not exist yet is a valid state
//! (never funded) and syncs to an empty set.

use super::SyncGuard;
use crate::horizon::{AccountRecord, LedgerClient};
use crate::kit::types::{SyncError, SyncState};
use crate::models::{AssetBalance, StellarAsset};
use crate::storage::KitStore;

use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct BalanceSynchronizer {
	client: Arc<dyn LedgerClient>,
	store: Arc<KitStore>,
	account_id: String,
	base_reserve: Decimal,
	state: watch::Sender<SyncState>,
}

impl BalanceSynchronizer {
	pub fn new(
		client: Arc<dyn LedgerClient>,
		store: Arc<KitStore>,
		account_id: impl Into<String>,
		base_reserve: Decimal,
	) -> Self {
		let (state, _) = watch::channel(SyncState::default());
		Self {
			client,
			store,
			account_id: account_id.into(),
			base_reserve,
			state,
		}
	}

	pub fn sync_state(&self) -> SyncState {
		self.state.borrow().clone()
	}

	pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
		self.state.subscribe()
	}

	/// Refresh the local balance set.
	///
	/// Returns the resulting state. When a sync is already running this returns `Syncing`
	/// right away without fetching anything.
	pub async fn sync(&self) -> SyncState {
		let Some(guard) = SyncGuard::try_begin(&self.state) else {
			debug!("Balance sync already in progress, skipping");
			return self.sync_state();
		};

		let outcome = match self.fetch_and_store().await {
			Ok(count) => {
				info!("Balances synced: {} assets", count);
				SyncState::Synced
			}
			Err(e) => {
				warn!("Balance sync failed: {}", e);
				SyncState::NotSynced(e)
			}
		};

		guard.finish(outcome)
	}

	async fn fetch_and_store(&self) -> Result<usize, SyncError> {
		let balances = match self.client.fetch_account(&self.account_id).await {
			Ok(account) => self.balances_from(&account)?,
			Err(e) if e.is_not_found() => {
				info!("Account {} not found, treating as empty", self.account_id);
				Vec::new()
			}
			Err(e) => return Err(e.into()),
		};

		self.store.replace_balances(&balances)?;
		Ok(balances.len())
	}

	fn balances_from(&self, account: &AccountRecord) -> Result<Vec<AssetBalance>, SyncError> {
		let mut balances = Vec::with_capacity(account.balances.len());

		for record in &account.balances {
			let asset = match StellarAsset::from_horizon(
				&record.asset_type,
				record.asset_code.as_deref(),
				record.asset_issuer.as_deref(),
			) {
				Some(asset) => asset,
				None if record.liquidity_pool_id.is_some() => {
					debug!("Skipping liquidity pool share balance");
					continue;
				}
				None => {
					warn!("Skipping balance with unsupported asset type {}", record.asset_type);
					continue;
				}
			};

			let amount = Decimal::from_str(&record.balance).map_err(|_| {
				SyncError::Malformed(format!("balance `{}` of {}", record.balance, asset))
			})?;

			balances.push(AssetBalance::new(
				asset,
				amount,
				account.subentry_count,
				self.base_reserve,
			));
		}

		Ok(balances)
	}
}
