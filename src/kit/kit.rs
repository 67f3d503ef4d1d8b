//! The kit handle: one tracked account, its local store and the sync engine around it.
//!
//! [`StellarKit`] wires the [`UpdateListener`] to both synchronizers. A coordinator task waits
//! for the change signal and runs a sync cycle for every signal it consumes: balances and
//! operations are synced concurrently and the cycle ends when both are done, whatever their
//! outcome. Consumers read balances and history from the local store through the kit and use
//! the change streams to know when to read again.

use super::config::KitConfig;
use super::sync::{
	BackfillOutcome, BalanceSynchronizer, ChangeNotifier, ChangeReceiver, OperationSynchronizer,
	UpdateEvent, UpdateListener, change_channel,
};
use super::types::{KitError, SyncState};
use crate::horizon::{HorizonClient, LedgerClient};
use crate::models::{AssetBalance, Operation, OperationSyncMeta, StellarAsset, TagQuery};
use crate::storage::{DEFAULT_QUERY_LIMIT, KitStore, OperationQuery};

use futures::Stream;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Fee of a single-operation transaction, in native units.
pub const SEND_FEE: Decimal = Decimal::from_parts(1, 0, 0, false, 5);

pub struct StellarKit {
	account_id: String,
	config: KitConfig,
	client: Arc<dyn LedgerClient>,
	store: Arc<KitStore>,
	balances: Arc<BalanceSynchronizer>,
	operations: Arc<OperationSynchronizer>,
	listener: UpdateListener,
	notifier: ChangeNotifier,
	/// Handed to the coordinator task on the first `start`.
	signals: Mutex<Option<ChangeReceiver>>,
	coordinator: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StellarKit {
	/// Build a kit over an existing client and store.
	pub fn new(
		account_id: impl Into<String>,
		config: KitConfig,
		client: Arc<dyn LedgerClient>,
		store: Arc<KitStore>,
	) -> Self {
		let account_id = account_id.into();
		let (notifier, signals) = change_channel();

		let balances = Arc::new(BalanceSynchronizer::new(
			client.clone(),
			store.clone(),
			account_id.clone(),
			config.base_reserve,
		));
		let operations = Arc::new(OperationSynchronizer::new(
			client.clone(),
			store.clone(),
			account_id.clone(),
			config.page_size,
		));
		let listener = UpdateListener::new(
			client.clone(),
			account_id.clone(),
			notifier.clone(),
			config.reconnect.clone(),
		);

		Self {
			account_id,
			config,
			client,
			store,
			balances,
			operations,
			listener,
			notifier,
			signals: Mutex::new(Some(signals)),
			coordinator: Mutex::new(None),
		}
	}

	/// Open the kit for `account_id` against Horizon, with its store under `config.data_dir`.
	pub fn open(account_id: impl Into<String>, config: KitConfig) -> Result<Self, KitError> {
		config.validate()?;
		std::fs::create_dir_all(&config.data_dir)?;

		let client = HorizonClient::new(config.horizon_url())?;
		let store = KitStore::open(config.database_path())?;
		info!(
			"Opened kit on {} ({})",
			config.network,
			client.horizon_url()
		);

		Ok(Self::new(account_id, config, Arc::new(client), Arc::new(store)))
	}

	pub fn receive_address(&self) -> &str {
		&self.account_id
	}

	/// Start listening for remote changes and run one sync cycle right away.
	///
	/// Calling `start` again after [`Self::stop`] resumes listening.
	pub fn start(&self) {
		{
			let mut coordinator = lock(&self.coordinator);
			if coordinator.is_none() {
				if let Some(signals) = lock(&self.signals).take() {
					*coordinator = Some(self.spawn_coordinator(signals));
				}
			}
		}

		self.listener.start();
		self.notifier.notify(&UpdateEvent::Refresh);
	}

	/// Stop listening. Sync cycles already running are allowed to finish.
	pub fn stop(&self) {
		self.listener.stop();
	}

	fn spawn_coordinator(&self, mut signals: ChangeReceiver) -> JoinHandle<()> {
		let balances = self.balances.clone();
		let operations = self.operations.clone();

		tokio::spawn(async move {
			while signals.changed().await.is_some() {
				sync_cycle(&balances, &operations).await;
			}
			debug!("Change signal closed, coordinator exiting");
		})
	}

	/// Run one sync cycle now and return the resulting (balance, operation) states.
	pub async fn refresh(&self) -> (SyncState, SyncState) {
		sync_cycle(&self.balances, &self.operations).await
	}

	pub fn balance_sync_state(&self) -> SyncState {
		self.balances.sync_state()
	}

	pub fn subscribe_balance_sync_state(&self) -> watch::Receiver<SyncState> {
		self.balances.subscribe_state()
	}

	pub fn operation_sync_state(&self) -> SyncState {
		self.operations.sync_state()
	}

	pub fn subscribe_operation_sync_state(&self) -> watch::Receiver<SyncState> {
		self.operations.subscribe_state()
	}

	pub fn all_balances(&self) -> Result<Vec<AssetBalance>, KitError> {
		Ok(self.store.all_balances()?)
	}

	pub fn balance(&self, asset: &StellarAsset) -> Result<Option<AssetBalance>, KitError> {
		Ok(self.store.balance(asset)?)
	}

	/// Stream of the balance of `asset`, `None` while the account does not hold it.
	///
	/// Yields the current value first, then every committed change of that value.
	pub fn balance_changes(
		&self,
		asset: StellarAsset,
	) -> impl Stream<Item = Option<AssetBalance>> + Send + 'static {
		let rx = self.store.subscribe_balances();

		futures::stream::unfold(
			(rx, None::<Option<AssetBalance>>),
			move |(mut rx, last)| {
				let asset = asset.clone();
				async move {
					let mut first = last.is_none();
					loop {
						if !first && rx.changed().await.is_err() {
							return None;
						}
						first = false;

						let current = rx
							.borrow_and_update()
							.iter()
							.find(|balance| balance.asset == asset)
							.cloned();
						if last.as_ref() != Some(&current) {
							return Some((current.clone(), (rx, Some(current))));
						}
					}
				}
			},
		)
	}

	/// Non-native assets present in the stored balance set.
	pub fn enabled_assets_cached(&self) -> Result<Vec<StellarAsset>, KitError> {
		Ok(self
			.store
			.all_balances()?
			.into_iter()
			.map(|balance| balance.asset)
			.filter(|asset| !asset.is_native())
			.collect())
	}

	/// Read a page of the stored history.
	pub fn query_operations(&self, query: &OperationQuery) -> Result<Vec<Operation>, KitError> {
		Ok(self.store.query_operations(query)?)
	}

	/// Newest-first page of operations matching `filter`, older than `before_id`.
	pub fn operations(
		&self,
		filter: TagQuery,
		before_id: Option<i64>,
		limit: Option<usize>,
	) -> Result<Vec<Operation>, KitError> {
		self.query_operations(&OperationQuery::before(
			filter,
			before_id,
			limit.unwrap_or(DEFAULT_QUERY_LIMIT),
		))
	}

	/// Fires once per sync run that stored new operations.
	pub fn operation_changes(&self) -> impl Stream<Item = ()> + Send + 'static {
		let rx = self.operations.subscribe_changes();

		futures::stream::unfold(rx, |mut rx| async move {
			rx.changed().await.ok().map(|_| ((), rx))
		})
	}

	/// Load one more page of older history.
	pub async fn request_older_operations(&self) -> Result<BackfillOutcome, KitError> {
		Ok(self.operations.request_older().await?)
	}

	pub fn operation_sync_meta(&self) -> Result<OperationSyncMeta, KitError> {
		Ok(self.store.operation_sync_meta()?)
	}

	/// Drop the stored history and fetch it again.
	pub async fn resync_operations(&self) -> SyncState {
		self.operations.resync().await
	}

	/// Whether `account_id` exists and holds a trustline for `asset`.
	pub async fn is_asset_enabled(
		&self,
		asset: &StellarAsset,
		account_id: &str,
	) -> Result<bool, KitError> {
		let account = match self.client.fetch_account(account_id).await {
			Ok(account) => account,
			Err(e) if e.is_not_found() => return Ok(false),
			Err(e) => return Err(e.into()),
		};

		Ok(account.balances.iter().any(|balance| {
			StellarAsset::from_horizon(
				&balance.asset_type,
				balance.asset_code.as_deref(),
				balance.asset_issuer.as_deref(),
			)
			.as_ref() == Some(asset)
		}))
	}

	pub async fn does_account_exist(&self, account_id: &str) -> Result<bool, KitError> {
		match self.client.fetch_account(account_id).await {
			Ok(_) => Ok(true),
			Err(e) if e.is_not_found() => Ok(false),
			Err(e) => Err(e.into()),
		}
	}

	/// Check that the spendable native balance covers the reserve of one more trustline.
	pub fn validate_enabling_asset(&self) -> Result<(), KitError> {
		let native = self
			.store
			.balance(&StellarAsset::Native)?
			.ok_or(KitError::InsufficientBalance)?;

		if native.available() < self.config.base_reserve - SEND_FEE {
			return Err(KitError::InsufficientBalance);
		}
		Ok(())
	}
}

impl Drop for StellarKit {
	fn drop(&mut self) {
		if let Some(coordinator) = lock(&self.coordinator).take() {
			coordinator.abort();
		}
	}
}

/// Sync balances and operations concurrently; neither outcome affects the other.
async fn sync_cycle(
	balances: &BalanceSynchronizer,
	operations: &OperationSynchronizer,
) -> (SyncState, SyncState) {
	let (balance_state, operation_state) = tokio::join!(balances.sync(), operations.sync());
	debug!(
		"Sync cycle finished: balances {:?}, operations {:?}",
		balance_state, operation_state
	);
	(balance_state, operation_state)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::horizon::mock::{MockLedgerClient, account_record, change_trust_record, payment_record};
	use crate::kit::types::SyncError;
	use crate::models::TagType;
	use futures::StreamExt;
	use std::str::FromStr;
	use std::time::Duration;

	const ME: &str = "GTRACKED";

	fn setup() -> (Arc<MockLedgerClient>, Arc<KitStore>, StellarKit) {
		let client = Arc::new(MockLedgerClient::new());
		let store = Arc::new(KitStore::open_in_memory().unwrap());
		let kit = StellarKit::new(ME, KitConfig::default(), client.clone(), store.clone());
		(client, store, kit)
	}

	fn scenario(client: &MockLedgerClient) {
		client.set_account(Some(account_record(ME, 1, &[("100", None)])));
		client.push_operations(vec![
			payment_record(101, "GX", ME, "50", None),
			change_trust_record(102, ME, None, Some("pool-1")),
			payment_record(103, ME, "GY", "10", None),
		]);
	}

	async fn wait_synced(kit: &StellarKit) {
		let mut balances = kit.subscribe_balance_sync_state();
		let mut operations = kit.subscribe_operation_sync_state();
		balances.wait_for(|s| s.is_synced()).await.unwrap();
		operations.wait_for(|s| s.is_synced()).await.unwrap();
	}

	#[tokio::test]
	async fn test_start_runs_initial_cycle() {
		let (client, store, kit) = setup();
		scenario(&client);

		kit.start();
		wait_synced(&kit).await;

		assert_eq!(kit.all_balances().unwrap().len(), 1);
		assert_eq!(store.operation_count().unwrap(), 3);

		let incoming = kit
			.operations(
				TagQuery::new()
					.with_type(TagType::Incoming)
					.with_asset_id("native"),
				None,
				Some(10),
			)
			.unwrap();
		assert_eq!(incoming.iter().map(|op| op.id).collect::<Vec<_>>(), vec![101]);
		kit.stop();
	}

	#[tokio::test]
	async fn test_pushed_event_triggers_resync() {
		let (client, store, kit) = setup();
		scenario(&client);
		let stream = client.queue_subscription();

		kit.start();
		wait_synced(&kit).await;

		let record = payment_record(104, "GZ", ME, "1", None);
		client.push_operations(vec![record.clone()]);
		stream.send(Ok(record)).unwrap();

		while store.operation_count().unwrap() < 4 {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert!(store.operation(104).unwrap().is_some());
		kit.stop();
	}

	#[tokio::test]
	async fn test_refresh_during_running_sync_fetches_once() {
		let (client, store, kit) = setup();
		scenario(&client);
		let gate = client.gate_account();
		let mut balance_state = kit.subscribe_balance_sync_state();

		kit.start();
		balance_state.wait_for(|s| s.is_syncing()).await.unwrap();

		let (balances, _) = kit.refresh().await;
		assert_eq!(balances, SyncState::Syncing);

		gate.add_permits(1);
		balance_state.wait_for(|s| s.is_synced()).await.unwrap();
		assert_eq!(client.account_calls(), 1);
		assert_eq!(store.all_balances().unwrap()[0].balance, Decimal::from(100));
		kit.stop();
	}

	#[tokio::test]
	async fn test_failing_balances_do_not_block_operations() {
		let (client, store, kit) = setup();
		scenario(&client);
		client.fail_account("down");

		let (balances, operations) = kit.refresh().await;

		assert!(matches!(balances, SyncState::NotSynced(SyncError::Remote(_))));
		assert_eq!(operations, SyncState::Synced);
		assert_eq!(store.operation_count().unwrap(), 3);
	}

	#[tokio::test]
	async fn test_balance_changes_emit_current_then_updates() {
		let (client, _store, kit) = setup();
		let mut changes = Box::pin(kit.balance_changes(StellarAsset::Native));

		assert_eq!(changes.next().await, Some(None));

		client.set_account(Some(account_record(ME, 0, &[("5", None)])));
		kit.refresh().await;
		let native = changes.next().await.unwrap().unwrap();
		assert_eq!(native.balance, Decimal::from(5));

		// an unrelated asset appearing does not re-emit the native balance
		client.set_account(Some(account_record(
			ME,
			0,
			&[("5", None), ("1", Some(("USDC", "GISSUER")))],
		)));
		kit.refresh().await;
		client.set_account(Some(account_record(ME, 1, &[("6", None)])));
		kit.refresh().await;

		let native = changes.next().await.unwrap().unwrap();
		assert_eq!(native.balance, Decimal::from(6));
	}

	#[tokio::test]
	async fn test_operation_changes_fire_on_new_operations() {
		let (client, _store, kit) = setup();
		let mut changes = Box::pin(kit.operation_changes());
		scenario(&client);

		kit.refresh().await;
		assert_eq!(changes.next().await, Some(()));
	}

	#[tokio::test]
	async fn test_validate_enabling_asset() {
		let (client, _store, kit) = setup();
		assert!(matches!(
			kit.validate_enabling_asset(),
			Err(KitError::InsufficientBalance)
		));

		// min balance 1.0, available 1.0
		client.set_account(Some(account_record(ME, 0, &[("2", None)])));
		kit.refresh().await;
		assert!(kit.validate_enabling_asset().is_ok());

		// available 0.2
		client.set_account(Some(account_record(ME, 0, &[("1.2", None)])));
		kit.refresh().await;
		assert!(matches!(
			kit.validate_enabling_asset(),
			Err(KitError::InsufficientBalance)
		));

		// available exactly one reserve minus the fee
		client.set_account(Some(account_record(ME, 0, &[("1.49999", None)])));
		kit.refresh().await;
		assert!(kit.validate_enabling_asset().is_ok());
		assert_eq!(SEND_FEE, Decimal::from_str("0.00001").unwrap());
	}

	#[tokio::test]
	async fn test_remote_account_checks() {
		let (client, _store, kit) = setup();
		let usdc = StellarAsset::asset("USDC", "GISSUER");

		assert!(!kit.does_account_exist("GOTHER").await.unwrap());
		assert!(!kit.is_asset_enabled(&usdc, "GOTHER").await.unwrap());

		client.set_account(Some(account_record(
			"GOTHER",
			1,
			&[("5", None), ("1", Some(("USDC", "GISSUER")))],
		)));
		assert!(kit.does_account_exist("GOTHER").await.unwrap());
		assert!(kit.is_asset_enabled(&usdc, "GOTHER").await.unwrap());
		assert!(
			!kit.is_asset_enabled(&StellarAsset::asset("EURT", "GISSUER"), "GOTHER")
				.await
				.unwrap()
		);

		client.fail_account("down");
		assert!(kit.does_account_exist("GOTHER").await.is_err());
	}

	#[tokio::test]
	async fn test_enabled_assets_and_backfill() {
		let (client, _store, kit) = setup();
		scenario(&client);
		client.set_account(Some(account_record(
			ME,
			1,
			&[("5", None), ("1", Some(("USDC", "GISSUER")))],
		)));
		kit.refresh().await;

		assert_eq!(
			kit.enabled_assets_cached().unwrap(),
			vec![StellarAsset::asset("USDC", "GISSUER")]
		);

		assert!(!kit.operation_sync_meta().unwrap().all_synced);
		assert_eq!(
			kit.request_older_operations().await.unwrap(),
			BackfillOutcome::Fetched {
				inserted: 0,
				all_synced: true
			}
		);
		assert!(kit.operation_sync_meta().unwrap().all_synced);
	}

	#[tokio::test]
	async fn test_stop_is_safe_in_any_state() {
		let (_client, _store, kit) = setup();
		kit.stop();
		kit.start();
		kit.stop();
		kit.stop();
		kit.start();
		drop(kit);
	}
}
